//! Batched reference loaders
//!
//! A loader lives for one request (or one job run). It collapses every lookup
//! of a given entity type into a single `IN (...)` query and memoizes the
//! answers, misses included.

use crate::db::models::{Channel, User};
use crate::db::Repository;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Fetches many entities by id in one round trip
#[async_trait]
pub trait BatchFetch: Send + Sync {
    type Value: Clone + Send + Sync;

    async fn fetch(&self, ids: &[Uuid]) -> Result<Vec<(Uuid, Self::Value)>>;
}

/// Memoizing loader over a batch fetcher
pub struct Loader<F: BatchFetch> {
    fetcher: F,
    cache: Mutex<HashMap<Uuid, Option<F::Value>>>,
}

impl<F: BatchFetch> Loader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Option<F::Value>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve many ids; ids that do not exist are absent from the result
    pub async fn load_many(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, F::Value>> {
        let missing: Vec<Uuid> = {
            let cache = self.cached();
            let mut missing: Vec<Uuid> = ids.iter().copied().filter(|id| !cache.contains_key(id)).collect();
            missing.sort_unstable();
            missing.dedup();
            missing
        };

        if !missing.is_empty() {
            let fetched: HashMap<Uuid, F::Value> = self.fetcher.fetch(&missing).await?.into_iter().collect();
            let mut cache = self.cached();
            for id in missing {
                cache.insert(id, fetched.get(&id).cloned());
            }
        }

        let cache = self.cached();
        Ok(ids
            .iter()
            .filter_map(|id| cache.get(id).cloned().flatten().map(|v| (*id, v)))
            .collect())
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<F::Value>> {
        Ok(self.load_many(&[id]).await?.remove(&id))
    }
}

pub struct UserFetch(pub Repository);

#[async_trait]
impl BatchFetch for UserFetch {
    type Value = User;

    async fn fetch(&self, ids: &[Uuid]) -> Result<Vec<(Uuid, User)>> {
        Ok(self.0.find_users_by_ids(ids).await?.into_iter().map(|u| (u.id, u)).collect())
    }
}

pub struct ChannelFetch(pub Repository);

#[async_trait]
impl BatchFetch for ChannelFetch {
    type Value = Channel;

    async fn fetch(&self, ids: &[Uuid]) -> Result<Vec<(Uuid, Channel)>> {
        Ok(self.0.find_channels_by_ids(ids).await?.into_iter().map(|c| (c.id, c)).collect())
    }
}

pub type UserLoader = Loader<UserFetch>;
pub type ChannelLoader = Loader<ChannelFetch>;

/// Loaders for one request scope
pub struct Loaders {
    pub users: UserLoader,
    pub channels: ChannelLoader,
}

impl Loaders {
    pub fn new(repo: &Repository) -> Self {
        Self {
            users: Loader::new(UserFetch(repo.clone())),
            channels: Loader::new(ChannelFetch(repo.clone())),
        }
    }
}
