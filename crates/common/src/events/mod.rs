//! In-process event bus for real-time fan-out
//!
//! One bus is built per process and handed to the services that publish and
//! to the HTTP layer that streams events to subscribers.

use crate::db::models::{Channel, Notification, UserStatus, WorkItem, WorkItemStatus};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default capacity of the broadcast ring
pub const DEFAULT_CAPACITY: usize = 1024;

/// Subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    NotificationReceived,
    WorkItemStatusChanged,
    WorkItemAssigned,
    WorkItemCompleted,
    UserStatusChanged,
    ChannelSubscribersUpdated,
}

/// Event payloads
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    NotificationReceived {
        recipient_id: Uuid,
        notification: Notification,
    },
    WorkItemStatusChanged {
        item: WorkItem,
        previous: WorkItemStatus,
    },
    WorkItemAssigned {
        item: WorkItem,
    },
    WorkItemCompleted {
        item: WorkItem,
    },
    UserStatusChanged {
        user_id: Uuid,
        status: UserStatus,
    },
    ChannelSubscribersUpdated {
        channel: Channel,
    },
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            DomainEvent::NotificationReceived { .. } => Topic::NotificationReceived,
            DomainEvent::WorkItemStatusChanged { .. } => Topic::WorkItemStatusChanged,
            DomainEvent::WorkItemAssigned { .. } => Topic::WorkItemAssigned,
            DomainEvent::WorkItemCompleted { .. } => Topic::WorkItemCompleted,
            DomainEvent::UserStatusChanged { .. } => Topic::UserStatusChanged,
            DomainEvent::ChannelSubscribersUpdated { .. } => Topic::ChannelSubscribersUpdated,
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = DomainEvent> + Send>>;

pub type EventPredicate = Box<dyn Fn(&DomainEvent) -> bool + Send + Sync>;

/// Publish/subscribe seam
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish; no subscribers is not an error
    fn publish(&self, event: DomainEvent);

    /// Events of one topic accepted by the predicate
    fn subscribe(&self, topic: Topic, predicate: EventPredicate) -> EventStream;
}

pub type SharedEventBus = Arc<dyn EventBus>;

/// Notifications addressed to one recipient
pub fn notifications_for(bus: &dyn EventBus, recipient: Uuid) -> EventStream {
    bus.subscribe(
        Topic::NotificationReceived,
        Box::new(move |event| {
            matches!(event, DomainEvent::NotificationReceived { recipient_id, .. } if *recipient_id == recipient)
        }),
    )
}

/// Status changes, optionally narrowed to one item or one assignee
pub fn status_changes(bus: &dyn EventBus, item_id: Option<Uuid>, assignee: Option<Uuid>) -> EventStream {
    bus.subscribe(
        Topic::WorkItemStatusChanged,
        Box::new(move |event| match event {
            DomainEvent::WorkItemStatusChanged { item, .. } => {
                item_id.map_or(true, |id| item.id == id)
                    && assignee.map_or(true, |user| item.assigned_to == Some(user))
            }
            _ => false,
        }),
    )
}

/// Assignments and reassignments landing on one producer
pub fn assignments_for(bus: &dyn EventBus, producer: Uuid) -> EventStream {
    bus.subscribe(
        Topic::WorkItemAssigned,
        Box::new(move |event| {
            matches!(event, DomainEvent::WorkItemAssigned { item } if item.assigned_to == Some(producer))
        }),
    )
}

pub fn completions(bus: &dyn EventBus) -> EventStream {
    bus.subscribe(Topic::WorkItemCompleted, Box::new(|_| true))
}

pub fn user_status_changes(bus: &dyn EventBus, user: Option<Uuid>) -> EventStream {
    bus.subscribe(
        Topic::UserStatusChanged,
        Box::new(move |event| match event {
            DomainEvent::UserStatusChanged { user_id, .. } => user.map_or(true, |id| *user_id == id),
            _ => false,
        }),
    )
}

pub fn subscriber_updates(bus: &dyn EventBus, channel_id: Option<Uuid>) -> EventStream {
    bus.subscribe(
        Topic::ChannelSubscribersUpdated,
        Box::new(move |event| match event {
            DomainEvent::ChannelSubscribersUpdated { channel } => channel_id.map_or(true, |id| channel.id == id),
            _ => false,
        }),
    )
}

/// Event bus backed by a tokio broadcast channel
pub struct BroadcastEventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn shared() -> SharedEventBus {
        Arc::new(Self::new(DEFAULT_CAPACITY))
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: DomainEvent) {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(receivers) => debug!(?topic, receivers, "Event published"),
            Err(_) => debug!(?topic, "Event dropped, no subscribers"),
        }
    }

    fn subscribe(&self, topic: Topic, predicate: EventPredicate) -> EventStream {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |msg| match msg {
            Ok(event) if event.topic() == topic && predicate(&event) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(?topic, skipped, "Subscriber lagged, events skipped");
                None
            }
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_filters_by_topic_and_predicate() {
        let bus = BroadcastEventBus::default();
        let wanted = Uuid::new_v4();
        let mut stream = bus.subscribe(
            Topic::UserStatusChanged,
            Box::new(move |e| matches!(e, DomainEvent::UserStatusChanged { user_id, .. } if *user_id == wanted)),
        );

        bus.publish(DomainEvent::UserStatusChanged {
            user_id: Uuid::new_v4(),
            status: UserStatus::Blocked,
        });
        bus.publish(DomainEvent::UserStatusChanged {
            user_id: wanted,
            status: UserStatus::Active,
        });

        match stream.next().await {
            Some(DomainEvent::UserStatusChanged { user_id, status }) => {
                assert_eq!(user_id, wanted);
                assert_eq!(status, UserStatus::Active);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_changes_narrowed_to_item() {
        let bus = BroadcastEventBus::default();
        let wanted = crate::testing::work_item(WorkItemStatus::InProgress);
        let mut stream = status_changes(&bus, Some(wanted.id), None);

        bus.publish(DomainEvent::WorkItemStatusChanged {
            item: crate::testing::work_item(WorkItemStatus::Assigned),
            previous: WorkItemStatus::Discovered,
        });
        bus.publish(DomainEvent::WorkItemStatusChanged {
            item: wanted.clone(),
            previous: WorkItemStatus::Assigned,
        });

        match stream.next().await {
            Some(DomainEvent::WorkItemStatusChanged { item, previous }) => {
                assert_eq!(item.id, wanted.id);
                assert_eq!(previous, WorkItemStatus::Assigned);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assignments_for_one_producer() {
        let bus = BroadcastEventBus::default();
        let producer = Uuid::new_v4();
        let mut stream = assignments_for(&bus, producer);

        bus.publish(DomainEvent::WorkItemAssigned {
            item: WorkItem {
                assigned_to: Some(Uuid::new_v4()),
                ..crate::testing::work_item(WorkItemStatus::Assigned)
            },
        });
        bus.publish(DomainEvent::WorkItemAssigned {
            item: WorkItem {
                assigned_to: Some(producer),
                ..crate::testing::work_item(WorkItemStatus::Assigned)
            },
        });

        match stream.next().await {
            Some(DomainEvent::WorkItemAssigned { item }) => assert_eq!(item.assigned_to, Some(producer)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = BroadcastEventBus::new(4);
        bus.publish(DomainEvent::UserStatusChanged {
            user_id: Uuid::new_v4(),
            status: UserStatus::Blocked,
        });
    }
}
