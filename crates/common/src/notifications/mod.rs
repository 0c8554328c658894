//! Notification dispatcher
//!
//! Every send persists a platform record first. Email and WhatsApp are then
//! attempted independently; their failures are logged and only reflected in
//! the record's delivery flags. The finished record is published on the
//! event bus for live subscribers.

mod email;
pub mod templates;
mod whatsapp;

pub use email::{EmailTransport, SmtpEmailTransport};
pub use whatsapp::{normalize_phone, MessageOutcome, MessagingTransport, WhatsAppClient};

use crate::db::models::{
    Notification, NotificationActiveModel, NotificationKind, NotificationSettings, User, WorkItem,
};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::events::{DomainEvent, SharedEventBus};
use crate::metrics;
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Await a side effect whose failure must never reach the caller
pub async fn run_best_effort<T, F>(operation: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation = operation, error = %e, "Best-effort side effect failed");
            None
        }
    }
}

/// Global switches editable by admins
///
/// Platform delivery is always on, so there is no switch for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
}

pub struct NotificationDispatcher {
    repo: Repository,
    bus: SharedEventBus,
    email: Option<Arc<dyn EmailTransport>>,
    messaging: Option<Arc<dyn MessagingTransport>>,
    frontend_url: String,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Repository,
        bus: SharedEventBus,
        email: Option<Arc<dyn EmailTransport>>,
        messaging: Option<Arc<dyn MessagingTransport>>,
        frontend_url: String,
    ) -> Self {
        Self {
            repo,
            bus,
            email,
            messaging,
            frontend_url,
        }
    }

    /// Stored settings, or defaults when an admin never saved any
    pub async fn settings(&self) -> Result<NotificationSettings> {
        Ok(self
            .repo
            .find_notification_settings()
            .await?
            .unwrap_or_else(|| NotificationSettings::defaults(Utc::now())))
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<NotificationSettings> {
        let saved = self
            .repo
            .save_notification_settings(update.email_enabled, update.whatsapp_enabled)
            .await?;
        info!(
            email = saved.email_enabled,
            whatsapp = saved.whatsapp_enabled,
            "Notification settings updated"
        );
        Ok(saved)
    }

    /// Send one notification to a recipient
    ///
    /// Does not deduplicate: each call yields a new record.
    pub async fn send(
        &self,
        recipient_id: Uuid,
        kind: NotificationKind,
        message: impl Into<String>,
        item: Option<&WorkItem>,
    ) -> Result<Notification> {
        let message = message.into();
        let recipient = self
            .repo
            .find_user_by_id(recipient_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", recipient_id))?;
        let settings = self.settings().await?;

        let notification = self
            .repo
            .create_notification(recipient.id, kind, message.clone(), item.map(|i| i.id))
            .await?;
        metrics::record_notification("platform", true);

        let emailed = settings.email_enabled && self.deliver_email(&recipient, kind, &message, item).await;
        let messaged = settings.whatsapp_enabled && self.deliver_whatsapp(&recipient, kind, &message).await;

        let notification = if emailed || messaged {
            let now = Utc::now();
            let mut active: NotificationActiveModel = notification.into();
            if emailed {
                active.sent_via_email = Set(true);
                active.email_sent_at = Set(Some(now));
            }
            if messaged {
                active.sent_via_whatsapp = Set(true);
                active.whatsapp_sent_at = Set(Some(now));
            }
            self.repo.update_notification(active).await?
        } else {
            notification
        };

        info!(
            notification_id = %notification.id,
            recipient_id = %recipient.id,
            kind = %kind,
            email = emailed,
            whatsapp = messaged,
            "Notification dispatched"
        );

        self.bus.publish(DomainEvent::NotificationReceived {
            recipient_id: recipient.id,
            notification: notification.clone(),
        });

        Ok(notification)
    }

    async fn deliver_email(
        &self,
        recipient: &User,
        kind: NotificationKind,
        message: &str,
        item: Option<&WorkItem>,
    ) -> bool {
        let Some(address) = recipient.notification_email() else {
            return false;
        };
        let Some(transport) = &self.email else {
            warn!(recipient_id = %recipient.id, "Email transport not configured, skipping email");
            return false;
        };

        let html = templates::render_email(kind, &recipient.username, message, item, &self.frontend_url);
        let sent = run_best_effort("send_email", transport.send_html(address, templates::email_subject(kind), html))
            .await
            .is_some();
        metrics::record_notification("email", sent);
        sent
    }

    async fn deliver_whatsapp(&self, recipient: &User, kind: NotificationKind, message: &str) -> bool {
        let Some(phone) = recipient.notification_phone() else {
            return false;
        };
        let Some(transport) = &self.messaging else {
            warn!(recipient_id = %recipient.id, "WhatsApp transport not configured, skipping message");
            return false;
        };

        let body = templates::whatsapp_body(kind, message);
        let sent = match run_best_effort("send_whatsapp", transport.send_text(phone, &body)).await {
            Some(MessageOutcome::Delivered { .. }) => true,
            Some(MessageOutcome::SessionExpired) => {
                warn!(recipient_id = %recipient.id, "WhatsApp 24h session window closed, message skipped");
                false
            }
            None => false,
        };
        metrics::record_notification("whatsapp", sent);
        sent
    }

    // ========================================================================
    // Inbox
    // ========================================================================

    /// Caller's notifications, newest first
    pub async fn list(&self, recipient_id: Uuid, unread_only: bool, limit: u64, offset: u64) -> Result<Vec<Notification>> {
        self.repo
            .list_notifications(recipient_id, unread_only, limit.clamp(1, 100), offset)
            .await
    }

    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<u64> {
        self.repo.count_unread_notifications(recipient_id).await
    }

    /// Mark one of the caller's own notifications as read
    pub async fn mark_as_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Notification> {
        let notification = self
            .repo
            .find_notification_by_id(notification_id)
            .await?
            .filter(|n| n.recipient_id == recipient_id)
            .ok_or_else(|| AppError::not_found("Notification", notification_id))?;

        if notification.read {
            return Ok(notification);
        }

        let mut active: NotificationActiveModel = notification.into();
        active.read = Set(true);
        active.read_at = Set(Some(Utc::now()));
        self.repo.update_notification(active).await
    }

    pub async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64> {
        self.repo.mark_all_notifications_read(recipient_id).await
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// Records every email; fails when `fail` is set
    #[derive(Default)]
    pub struct FakeEmail {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl EmailTransport for FakeEmail {
        async fn send_html(&self, to: &str, subject: &str, _html: String) -> Result<()> {
            if self.fail {
                return Err(AppError::external("smtp", "connection refused"));
            }
            self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    pub struct FakeMessaging {
        pub sent: Mutex<Vec<(String, String)>>,
        pub outcome: MessageOutcome,
    }

    impl Default for FakeMessaging {
        fn default() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                outcome: MessageOutcome::Delivered { message_id: None },
            }
        }
    }

    #[async_trait::async_trait]
    impl MessagingTransport for FakeMessaging {
        async fn send_text(&self, phone: &str, body: &str) -> Result<MessageOutcome> {
            self.sent.lock().unwrap().push((phone.to_string(), body.to_string()));
            Ok(self.outcome.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::db::models::{UserActiveModel, UserRole};
    use crate::db::{DbPool, NewUser};
    use crate::events::{notifications_for, BroadcastEventBus, EventBus};
    use tokio_stream::StreamExt;

    struct Harness {
        repo: Repository,
        bus: Arc<BroadcastEventBus>,
        email: Arc<FakeEmail>,
        messaging: Arc<FakeMessaging>,
        dispatcher: NotificationDispatcher,
    }

    async fn harness(email: FakeEmail, messaging: FakeMessaging) -> Harness {
        let repo = Repository::new(DbPool::in_memory().await.unwrap());
        let bus = Arc::new(BroadcastEventBus::default());
        let email = Arc::new(email);
        let messaging = Arc::new(messaging);
        let dispatcher = NotificationDispatcher::new(
            repo.clone(),
            bus.clone(),
            Some(email.clone()),
            Some(messaging.clone()),
            "http://localhost:5173".to_string(),
        );
        Harness {
            repo,
            bus,
            email,
            messaging,
            dispatcher,
        }
    }

    async fn user(repo: &Repository, email: Option<&str>, whatsapp: bool) -> User {
        let user = repo
            .create_user(NewUser {
                username: format!("u{}", Uuid::new_v4().simple()),
                email: email.map(String::from),
                password_hash: "x".to_string(),
                role: UserRole::Producer,
                phone: Some("+33600000000".to_string()),
            })
            .await
            .unwrap();
        let mut active: UserActiveModel = user.into();
        active.whatsapp_linked = Set(whatsapp);
        active.whatsapp_notifications = Set(whatsapp);
        repo.update_user(active).await.unwrap()
    }

    #[tokio::test]
    async fn test_platform_record_always_persisted() {
        let h = harness(FakeEmail::default(), FakeMessaging::default()).await;
        let recipient = user(&h.repo, None, false).await;

        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::VideoAssigned, "assigned", None)
            .await
            .unwrap();

        assert!(n.sent_via_platform);
        assert!(n.platform_sent_at.is_some());
        assert!(!n.sent_via_email);
        assert!(!n.sent_via_whatsapp);
        assert!(h.email.sent.lock().unwrap().is_empty());
        assert_eq!(h.repo.count_unread_notifications(recipient.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_email_failure_is_swallowed() {
        let h = harness(
            FakeEmail {
                fail: true,
                ..Default::default()
            },
            FakeMessaging::default(),
        )
        .await;
        let recipient = user(&h.repo, Some("ed@example.com"), false).await;

        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::VideoValidated, "ok", None)
            .await
            .unwrap();
        assert!(!n.sent_via_email);
        assert!(n.email_sent_at.is_none());
    }

    #[tokio::test]
    async fn test_email_and_whatsapp_flags_set_on_success() {
        let h = harness(FakeEmail::default(), FakeMessaging::default()).await;
        // WhatsApp master switch is off by default
        h.dispatcher
            .update_settings(SettingsUpdate {
                email_enabled: true,
                whatsapp_enabled: true,
            })
            .await
            .unwrap();
        let recipient = user(&h.repo, Some("ed@example.com"), true).await;

        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::DeadlineReminder, "2h left", None)
            .await
            .unwrap();

        assert!(n.sent_via_email && n.email_sent_at.is_some());
        assert!(n.sent_via_whatsapp && n.whatsapp_sent_at.is_some());
        let sent = h.messaging.sent.lock().unwrap();
        assert_eq!(sent[0].0, "+33600000000");
        assert!(sent[0].1.contains("2h left"));
    }

    #[tokio::test]
    async fn test_platform_channel_cannot_be_switched_off() {
        let h = harness(FakeEmail::default(), FakeMessaging::default()).await;
        let update: SettingsUpdate = serde_json::from_value(serde_json::json!({
            "platformEnabled": false,
            "emailEnabled": false,
            "whatsappEnabled": false
        }))
        .unwrap();
        let saved = h.dispatcher.update_settings(update).await.unwrap();
        assert!(saved.platform_enabled);

        let recipient = user(&h.repo, Some("ed@example.com"), true).await;
        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::AccountBlocked, "blocked", None)
            .await
            .unwrap();
        assert!(n.sent_via_platform && n.platform_sent_at.is_some());
        assert!(!n.sent_via_email);
    }

    #[tokio::test]
    async fn test_whatsapp_session_expired_leaves_flag_false() {
        let h = harness(
            FakeEmail::default(),
            FakeMessaging {
                outcome: MessageOutcome::SessionExpired,
                ..Default::default()
            },
        )
        .await;
        h.dispatcher
            .update_settings(SettingsUpdate {
                email_enabled: false,
                whatsapp_enabled: true,
            })
            .await
            .unwrap();
        let recipient = user(&h.repo, Some("ed@example.com"), true).await;

        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::VideoRejected, "fix audio", None)
            .await
            .unwrap();
        assert!(!n.sent_via_whatsapp);
        // Email master switch off
        assert!(!n.sent_via_email);
        assert!(h.email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_publishes_to_recipient_stream() {
        let h = harness(FakeEmail::default(), FakeMessaging::default()).await;
        let recipient = user(&h.repo, None, false).await;
        let mut stream = notifications_for(h.bus.as_ref() as &dyn EventBus, recipient.id);

        let n = h
            .dispatcher
            .send(recipient.id, NotificationKind::AccountUnblocked, "welcome back", None)
            .await
            .unwrap();

        match stream.next().await {
            Some(DomainEvent::NotificationReceived { notification, .. }) => assert_eq!(notification.id, n.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_as_read_only_own() {
        let h = harness(FakeEmail::default(), FakeMessaging::default()).await;
        let owner = user(&h.repo, None, false).await;
        let other = user(&h.repo, None, false).await;
        let n = h
            .dispatcher
            .send(owner.id, NotificationKind::VideoAssigned, "x", None)
            .await
            .unwrap();

        assert!(matches!(
            h.dispatcher.mark_as_read(other.id, n.id).await,
            Err(AppError::NotFound { .. })
        ));
        let read = h.dispatcher.mark_as_read(owner.id, n.id).await.unwrap();
        assert!(read.read && read.read_at.is_some());
        assert_eq!(h.dispatcher.unread_count(owner.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let out: Option<()> = run_best_effort("noop", async { Err(AppError::validation("bad")) }).await;
        assert!(out.is_none());
        assert_eq!(run_best_effort("ok", async { Ok(3) }).await, Some(3));
    }
}
