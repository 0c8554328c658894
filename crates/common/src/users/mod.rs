//! User directory: accounts, roles, assistants and contact channels

mod images;

pub use images::{ImageHost, ImageKitHost};

use crate::auth::{hash_password, verify_password, AuthContext};
use crate::db::models::{ActivityLog, NotificationKind, User, UserActiveModel, UserRole, UserStatus};
use crate::db::{ActivityFilter, NewActivity, NewUser, Repository};
use crate::errors::{AppError, Result};
use crate::events::{DomainEvent, SharedEventBus};
use crate::notifications::{run_best_effort, NotificationDispatcher};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub email_notifications: Option<bool>,
    pub whatsapp_notifications: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Admin reset of another account's password
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileImageRequest {
    /// Base64 image, optionally as a data URL
    #[validate(length(min = 1))]
    pub image: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConnectEmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConnectWhatsAppRequest {
    #[validate(length(min = 6, max = 20))]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

pub struct UserDirectory {
    repo: Repository,
    notifier: Arc<NotificationDispatcher>,
    bus: SharedEventBus,
    images: Option<Arc<dyn ImageHost>>,
}

impl UserDirectory {
    pub fn new(
        repo: Repository,
        notifier: Arc<NotificationDispatcher>,
        bus: SharedEventBus,
        images: Option<Arc<dyn ImageHost>>,
    ) -> Self {
        Self {
            repo,
            notifier,
            bus,
            images,
        }
    }

    /// Append to the audit trail; a failed write never fails the action
    async fn audit(&self, actor: &AuthContext, action: &str, user_id: Uuid) {
        run_best_effort(
            "record activity",
            self.repo.record_activity(NewActivity {
                user_id: actor.user_id,
                action: action.to_string(),
                resource_type: "User".to_string(),
                resource_id: user_id,
                details: None,
                ip_address: None,
            }),
        )
        .await;
    }

    async fn load(&self, id: Uuid) -> Result<User> {
        self.repo
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    /// Email addresses are unique across accounts
    async fn ensure_email_free(&self, email: &str, owner: Option<Uuid>) -> Result<()> {
        match self.repo.find_user_by_email(email).await? {
            Some(other) if Some(other.id) != owner => {
                Err(AppError::conflict(format!("Email {} is already in use", email)))
            }
            _ => Ok(()),
        }
    }

    pub async fn create(&self, actor: &AuthContext, request: CreateUserRequest) -> Result<User> {
        actor.require_admin()?;
        request.validate()?;

        let username = request.username.trim().to_string();
        if self.repo.find_user_by_username(&username).await?.is_some() {
            return Err(AppError::conflict(format!("Username {} is already taken", username)));
        }
        let email = request.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        if let Some(email) = email.as_deref() {
            self.ensure_email_free(email, None).await?;
        }

        let user = self
            .repo
            .create_user(NewUser {
                username,
                email,
                password_hash: hash_password(&request.password)?,
                role: request.role,
                phone: request.phone.filter(|p| !p.trim().is_empty()),
            })
            .await?;

        info!(user_id = %user.id, role = %user.role, created_by = %actor.user_id, "User created");
        self.audit(actor, "USER_CREATED", user.id).await;
        Ok(user)
    }

    /// Profile fields, by the user themselves or an admin
    pub async fn update(&self, actor: &AuthContext, id: Uuid, request: UpdateUserRequest) -> Result<User> {
        actor.require_self_or_admin(id)?;
        request.validate()?;
        let user = self.load(id).await?;

        let mut active: UserActiveModel = user.into();
        if let Some(email) = request.email {
            let email = email.trim().to_lowercase();
            self.ensure_email_free(&email, Some(id)).await?;
            active.email = Set(Some(email));
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone).filter(|p| !p.trim().is_empty()));
        }
        if let Some(enabled) = request.email_notifications {
            active.email_notifications = Set(enabled);
        }
        if let Some(enabled) = request.whatsapp_notifications {
            active.whatsapp_notifications = Set(enabled);
        }
        self.repo.update_user(active).await
    }

    /// Block or unblock an account and tell its owner
    pub async fn update_status(&self, actor: &AuthContext, id: Uuid, status: UserStatus) -> Result<User> {
        actor.require_admin()?;
        if id == actor.user_id && status == UserStatus::Blocked {
            return Err(AppError::validation("You cannot block your own account"));
        }
        let user = self.load(id).await?;

        let mut active: UserActiveModel = user.into();
        active.status = Set(status.as_str().to_string());
        let updated = self.repo.update_user(active).await?;

        info!(user_id = %id, status = status.as_str(), by = %actor.user_id, "User status changed");
        self.bus.publish(DomainEvent::UserStatusChanged { user_id: id, status });
        let action = match status {
            UserStatus::Blocked => "USER_BLOCKED",
            UserStatus::Active => "USER_UNBLOCKED",
        };
        self.audit(actor, action, id).await;

        let (kind, message) = match status {
            UserStatus::Blocked => (NotificationKind::AccountBlocked, "Your account has been blocked"),
            UserStatus::Active => (NotificationKind::AccountUnblocked, "Your account has been unblocked"),
        };
        run_best_effort("notify account status", self.notifier.send(id, kind, message, None)).await;
        Ok(updated)
    }

    /// Make `assistant_id` the supervisor of a producer
    pub async fn assign_assistant(&self, actor: &AuthContext, producer_id: Uuid, assistant_id: Uuid) -> Result<User> {
        actor.require_admin()?;
        let producer = self.load(producer_id).await?;
        let assistant = self.load(assistant_id).await?;

        if producer.user_role() != UserRole::Producer {
            return Err(AppError::validation(format!("User {} is not a producer", producer.username)));
        }
        if assistant.user_role() != UserRole::Assistant {
            return Err(AppError::validation(format!("User {} is not an assistant", assistant.username)));
        }

        let mut active: UserActiveModel = producer.into();
        active.supervisor_id = Set(Some(assistant.id));
        let updated = self.repo.update_user(active).await?;

        info!(producer_id = %producer_id, assistant_id = %assistant_id, "Assistant assigned");
        Ok(updated)
    }

    pub async fn connect_whatsapp(&self, actor: &AuthContext, request: ConnectWhatsAppRequest) -> Result<User> {
        request.validate()?;
        let phone = request.phone.trim().to_string();
        if let Some(other) = self.repo.find_user_by_phone(&phone).await? {
            if other.id != actor.user_id {
                return Err(AppError::conflict("This phone number is already in use by another account"));
            }
        }

        let mut active: UserActiveModel = self.load(actor.user_id).await?.into();
        active.phone = Set(Some(phone));
        active.whatsapp_linked = Set(true);
        active.whatsapp_notifications = Set(true);
        self.repo.update_user(active).await
    }

    pub async fn disconnect_whatsapp(&self, actor: &AuthContext) -> Result<User> {
        let mut active: UserActiveModel = self.load(actor.user_id).await?.into();
        active.phone = Set(None);
        active.whatsapp_linked = Set(false);
        active.whatsapp_notifications = Set(false);
        self.repo.update_user(active).await
    }

    pub async fn connect_email(&self, actor: &AuthContext, request: ConnectEmailRequest) -> Result<User> {
        request.validate()?;
        let email = request.email.trim().to_lowercase();
        self.ensure_email_free(&email, Some(actor.user_id)).await?;

        let mut active: UserActiveModel = self.load(actor.user_id).await?.into();
        active.email = Set(Some(email));
        active.email_notifications = Set(true);
        self.repo.update_user(active).await
    }

    pub async fn disconnect_email(&self, actor: &AuthContext) -> Result<User> {
        let mut active: UserActiveModel = self.load(actor.user_id).await?.into();
        active.email = Set(None);
        active.email_notifications = Set(false);
        self.repo.update_user(active).await
    }

    pub async fn change_password(&self, actor: &AuthContext, request: ChangePasswordRequest) -> Result<()> {
        request.validate()?;
        let user = self.load(actor.user_id).await?;
        if !verify_password(&request.old_password, &user.password_hash) {
            return Err(AppError::Validation {
                message: "Current password is incorrect".to_string(),
                field: Some("oldPassword".to_string()),
            });
        }

        let mut active: UserActiveModel = user.into();
        active.password_hash = Set(hash_password(&request.new_password)?);
        self.repo.update_user(active).await?;
        info!(user_id = %actor.user_id, "Password changed");
        Ok(())
    }

    /// Admin sets a new password without knowing the old one
    pub async fn admin_change_password(&self, actor: &AuthContext, id: Uuid, request: SetPasswordRequest) -> Result<()> {
        actor.require_admin()?;
        request.validate()?;
        let user = self.load(id).await?;

        let mut active: UserActiveModel = user.into();
        active.password_hash = Set(hash_password(&request.new_password)?);
        self.repo.update_user(active).await?;
        info!(user_id = %id, by = %actor.user_id, "Password reset by admin");
        self.audit(actor, "PASSWORD_RESET", id).await;
        Ok(())
    }

    pub async fn upload_profile_image(&self, actor: &AuthContext, request: ProfileImageRequest) -> Result<User> {
        request.validate()?;
        let host = self.images.as_ref().ok_or_else(|| AppError::Configuration {
            message: "Image upload service is not configured".to_string(),
        })?;
        let user = self.load(actor.user_id).await?;

        let file_name = format!("profile-{}-{}.jpg", user.id, Utc::now().timestamp_millis());
        let url = host.upload_image(&request.image, &file_name).await?;

        let mut active: UserActiveModel = user.into();
        active.profile_image_url = Set(Some(url));
        self.repo.update_user(active).await
    }

    /// Clears the link; the hosted file is left in place
    pub async fn remove_profile_image(&self, actor: &AuthContext) -> Result<User> {
        let mut active: UserActiveModel = self.load(actor.user_id).await?.into();
        active.profile_image_url = Set(None);
        self.repo.update_user(active).await
    }

    pub async fn activity_logs(&self, actor: &AuthContext, filter: &ActivityFilter) -> Result<Vec<ActivityLog>> {
        actor.require_admin()?;
        self.repo.list_activity_logs(filter).await
    }

    pub async fn delete(&self, actor: &AuthContext, id: Uuid) -> Result<()> {
        actor.require_admin()?;
        if id == actor.user_id {
            return Err(AppError::validation("You cannot delete your own account"));
        }
        if !self.repo.delete_user(id).await? {
            return Err(AppError::not_found("User", id));
        }
        info!(user_id = %id, by = %actor.user_id, "User deleted");
        self.audit(actor, "USER_DELETED", id).await;
        Ok(())
    }

    pub async fn list(&self, actor: &AuthContext, filter: &UserFilter) -> Result<Vec<User>> {
        actor.require_admin()?;
        self.repo.list_users(filter.role, filter.status).await
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.load(id).await
    }

    pub async fn me(&self, actor: &AuthContext) -> Result<User> {
        self.load(actor.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastEventBus, EventBus, Topic};
    use crate::testing;
    use futures::StreamExt;
    use super::images::fakes::FakeImageHost;

    struct Setup {
        directory: UserDirectory,
        repo: Repository,
        bus: Arc<BroadcastEventBus>,
        images: Arc<FakeImageHost>,
        admin: AuthContext,
    }

    async fn setup() -> Setup {
        let repo = testing::repo().await;
        let bus = Arc::new(BroadcastEventBus::default());
        let notifier = Arc::new(NotificationDispatcher::new(
            repo.clone(),
            bus.clone(),
            None,
            None,
            "http://localhost:5173".to_string(),
        ));
        let admin = testing::actor(&testing::user(&repo, UserRole::Admin).await);
        let images = Arc::new(FakeImageHost::default());
        Setup {
            directory: UserDirectory::new(repo.clone(), notifier, bus.clone(), Some(images.clone() as Arc<dyn ImageHost>)),
            images,
            repo,
            bus,
            admin,
        }
    }

    fn new_user(username: &str, email: Option<&str>) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            email: email.map(str::to_string),
            password: "secret-pw".to_string(),
            role: UserRole::Producer,
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_create_enforces_uniqueness() {
        let s = setup().await;

        let user = s
            .directory
            .create(&s.admin, new_user("editor", Some("Editor@Example.com")))
            .await
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("editor@example.com"));
        assert!(user.email_notifications);
        assert!(!user.whatsapp_notifications);
        assert!(verify_password("secret-pw", &user.password_hash));

        assert!(matches!(
            s.directory.create(&s.admin, new_user("editor", None)).await,
            Err(AppError::Conflict { .. })
        ));
        assert!(matches!(
            s.directory
                .create(&s.admin, new_user("other", Some("editor@example.com")))
                .await,
            Err(AppError::Conflict { .. })
        ));
        assert!(matches!(
            s.directory.create(&s.admin, new_user("x", None)).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_blocking_notifies_and_publishes() {
        let s = setup().await;
        let producer = testing::user(&s.repo, UserRole::Producer).await;
        let mut events = s.bus.subscribe(Topic::UserStatusChanged, Box::new(|_| true));

        let blocked = s
            .directory
            .update_status(&s.admin, producer.id, UserStatus::Blocked)
            .await
            .unwrap();
        assert_eq!(blocked.user_status(), UserStatus::Blocked);

        let notifications = s.repo.list_notifications(producer.id, false, 10, 0).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "ACCOUNT_BLOCKED");

        match events.next().await {
            Some(DomainEvent::UserStatusChanged { user_id, status }) => {
                assert_eq!(user_id, producer.id);
                assert_eq!(status, UserStatus::Blocked);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(matches!(
            s.directory
                .update_status(&s.admin, s.admin.user_id, UserStatus::Blocked)
                .await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_assign_assistant_checks_roles() {
        let s = setup().await;
        let producer = testing::user(&s.repo, UserRole::Producer).await;
        let assistant = testing::user(&s.repo, UserRole::Assistant).await;

        assert!(matches!(
            s.directory.assign_assistant(&s.admin, assistant.id, producer.id).await,
            Err(AppError::Validation { .. })
        ));

        let updated = s
            .directory
            .assign_assistant(&s.admin, producer.id, assistant.id)
            .await
            .unwrap();
        assert_eq!(updated.supervisor_id, Some(assistant.id));
    }

    #[tokio::test]
    async fn test_contact_channels() {
        let s = setup().await;
        let first = testing::user(&s.repo, UserRole::Producer).await;
        let second = testing::user(&s.repo, UserRole::Producer).await;

        let linked = s
            .directory
            .connect_whatsapp(&testing::actor(&first), ConnectWhatsAppRequest { phone: "+33600000000".to_string() })
            .await
            .unwrap();
        assert!(linked.whatsapp_linked && linked.whatsapp_notifications);
        assert_eq!(linked.notification_phone(), Some("+33600000000"));

        assert!(matches!(
            s.directory
                .connect_whatsapp(&testing::actor(&second), ConnectWhatsAppRequest { phone: "+33600000000".to_string() })
                .await,
            Err(AppError::Conflict { .. })
        ));

        let unlinked = s.directory.disconnect_whatsapp(&testing::actor(&first)).await.unwrap();
        assert!(unlinked.phone.is_none() && !unlinked.whatsapp_linked);

        s.directory
            .connect_email(&testing::actor(&first), ConnectEmailRequest { email: "a@example.com".to_string() })
            .await
            .unwrap();
        assert!(matches!(
            s.directory
                .connect_email(&testing::actor(&second), ConnectEmailRequest { email: "a@example.com".to_string() })
                .await,
            Err(AppError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_is_self_or_admin() {
        let s = setup().await;
        let first = testing::user(&s.repo, UserRole::Producer).await;
        let second = testing::user(&s.repo, UserRole::Producer).await;
        let request = UpdateUserRequest {
            email_notifications: Some(false),
            ..Default::default()
        };

        assert!(matches!(
            s.directory
                .update(&testing::actor(&second), first.id, request.clone())
                .await,
            Err(AppError::Forbidden { .. })
        ));
        let updated = s
            .directory
            .update(&testing::actor(&first), first.id, request)
            .await
            .unwrap();
        assert!(!updated.email_notifications);
    }

    #[tokio::test]
    async fn test_change_password_requires_old_one() {
        let s = setup().await;
        let user = s.directory.create(&s.admin, new_user("editor", None)).await.unwrap();
        let actor = testing::actor(&user);

        assert!(s
            .directory
            .change_password(
                &actor,
                ChangePasswordRequest {
                    old_password: "wrong".to_string(),
                    new_password: "new-secret".to_string(),
                },
            )
            .await
            .is_err());

        s.directory
            .change_password(
                &actor,
                ChangePasswordRequest {
                    old_password: "secret-pw".to_string(),
                    new_password: "new-secret".to_string(),
                },
            )
            .await
            .unwrap();
        let reloaded = s.directory.me(&actor).await.unwrap();
        assert!(verify_password("new-secret", &reloaded.password_hash));
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let s = setup().await;
        let user = testing::user(&s.repo, UserRole::Producer).await;

        assert!(s.directory.delete(&s.admin, s.admin.user_id).await.is_err());
        s.directory.delete(&s.admin, user.id).await.unwrap();
        assert!(matches!(
            s.directory.get(user.id).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_resets_password_and_it_is_audited() {
        let s = setup().await;
        let user = s.directory.create(&s.admin, new_user("editor", None)).await.unwrap();
        let request = SetPasswordRequest {
            new_password: "fresh-secret".to_string(),
        };

        assert!(matches!(
            s.directory
                .admin_change_password(&testing::actor(&user), user.id, request.clone())
                .await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            s.directory
                .admin_change_password(&s.admin, user.id, SetPasswordRequest { new_password: "x".to_string() })
                .await,
            Err(AppError::Validation { .. })
        ));

        s.directory.admin_change_password(&s.admin, user.id, request).await.unwrap();
        let reloaded = s.directory.get(user.id).await.unwrap();
        assert!(verify_password("fresh-secret", &reloaded.password_hash));

        let logs = s
            .directory
            .activity_logs(&s.admin, &ActivityFilter::default())
            .await
            .unwrap();
        let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, ["PASSWORD_RESET", "USER_CREATED"]);
        assert!(logs.iter().all(|l| l.user_id == s.admin.user_id && l.resource_id == user.id));

        assert!(matches!(
            s.directory
                .activity_logs(&testing::actor(&user), &ActivityFilter::default())
                .await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_profile_image_set_and_removed() {
        let s = setup().await;
        let user = testing::user(&s.repo, UserRole::Producer).await;
        let actor = testing::actor(&user);

        assert!(matches!(
            s.directory
                .upload_profile_image(&actor, ProfileImageRequest { image: String::new() })
                .await,
            Err(AppError::Validation { .. })
        ));

        let updated = s
            .directory
            .upload_profile_image(&actor, ProfileImageRequest { image: "aGVsbG8=".to_string() })
            .await
            .unwrap();
        let url = updated.profile_image_url.unwrap();
        assert!(url.starts_with(&format!("https://images.example.com/profile-{}-", user.id)));
        assert_eq!(s.images.uploads.lock().unwrap().len(), 1);

        let cleared = s.directory.remove_profile_image(&actor).await.unwrap();
        assert!(cleared.profile_image_url.is_none());
    }

    #[tokio::test]
    async fn test_profile_image_needs_a_host() {
        let s = setup().await;
        let directory = UserDirectory::new(s.repo.clone(), s.directory.notifier.clone(), s.bus.clone(), None);
        assert!(matches!(
            directory
                .upload_profile_image(&s.admin, ProfileImageRequest { image: "aGVsbG8=".to_string() })
                .await,
            Err(AppError::Configuration { .. })
        ));
    }
}
