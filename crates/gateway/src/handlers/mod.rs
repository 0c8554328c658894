//! API handlers module

pub mod analytics;
pub mod auth;
pub mod channels;
pub mod drive;
pub mod events;
pub mod health;
pub mod items;
pub mod notifications;
pub mod users;

#[cfg(test)]
mod tests;
