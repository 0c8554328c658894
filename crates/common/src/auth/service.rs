//! Login, token refresh and per-request authentication

use super::{verify_password, AuthContext, JwtManager, TokenKind};
use crate::config::AuthConfig;
use crate::db::models::{User, UserActiveModel};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use chrono::Utc;
use sea_orm::Set;
use serde::Serialize;
use tracing::{info, warn};

/// Tokens issued on login or refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

pub struct AuthService {
    repo: Repository,
    access: JwtManager,
    refresh: JwtManager,
}

impl AuthService {
    pub fn new(repo: Repository, config: &AuthConfig) -> Self {
        Self {
            repo,
            access: JwtManager::new(TokenKind::Access, &config.jwt_secret, config.access_expiration_secs),
            refresh: JwtManager::new(
                TokenKind::Refresh,
                &config.refresh_secret,
                config.refresh_expiration_secs,
            ),
        }
    }

    fn issue(&self, user: User) -> Result<LoginResult> {
        let role = user.user_role();
        Ok(LoginResult {
            access_token: self.access.generate_token(user.id, role)?,
            refresh_token: self.refresh.generate_token(user.id, role)?,
            user,
        })
    }

    /// Check credentials and issue a token pair
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let user = self
            .repo
            .find_user_by_username(username)
            .await?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| {
                warn!(username = %username, "Login rejected");
                AppError::unauthenticated("Invalid username or password")
            })?;

        if !user.is_active() {
            return Err(AppError::AccountBlocked);
        }

        let mut active: UserActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now()));
        let user = self.repo.update_user(active).await?;

        info!(user_id = %user.id, role = %user.role, "User logged in");
        self.issue(user)
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResult> {
        let claims = self.refresh.validate_token(refresh_token)?;
        let user = self
            .repo
            .find_user_by_id(claims.user_id()?)
            .await?
            .ok_or_else(|| AppError::unauthenticated("Unknown user"))?;

        if !user.is_active() {
            return Err(AppError::AccountBlocked);
        }
        self.issue(user)
    }

    /// Resolve an access token to the caller, rejecting blocked or deleted users
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthContext> {
        let claims = self.access.validate_token(access_token)?;
        let user = self
            .repo
            .find_user_by_id(claims.user_id()?)
            .await?
            .ok_or_else(|| AppError::unauthenticated("Unknown user"))?;

        if !user.is_active() {
            return Err(AppError::AccountBlocked);
        }

        Ok(AuthContext {
            user_id: user.id,
            role: user.user_role(),
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::db::models::{UserRole, UserStatus};
    use crate::db::{DbPool, NewUser};

    async fn setup() -> (AuthService, Repository) {
        let repo = Repository::new(DbPool::in_memory().await.unwrap());
        let service = AuthService::new(repo.clone(), &AuthConfig::default());
        (service, repo)
    }

    async fn create(repo: &Repository, username: &str) -> User {
        repo.create_user(NewUser {
            username: username.to_string(),
            email: None,
            password_hash: hash_password("pw").unwrap(),
            role: UserRole::Producer,
            phone: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_then_authenticate() {
        let (service, repo) = setup().await;
        let user = create(&repo, "editor").await;

        let tokens = service.login("editor", "pw").await.unwrap();
        assert!(tokens.user.last_login_at.is_some());

        let ctx = service.authenticate(&tokens.access_token).await.unwrap();
        assert_eq!(ctx.user_id, user.id);
        assert_eq!(ctx.role, UserRole::Producer);

        let refreshed = service.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.id, user.id);
        assert!(service.refresh(&tokens.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthenticated() {
        let (service, repo) = setup().await;
        create(&repo, "editor").await;

        let err = service.login("editor", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn test_blocked_user_cannot_login_or_use_token() {
        let (service, repo) = setup().await;
        let user = create(&repo, "editor").await;
        let tokens = service.login("editor", "pw").await.unwrap();

        let mut active: UserActiveModel = user.into();
        active.status = Set(UserStatus::Blocked.as_str().to_string());
        repo.update_user(active).await.unwrap();

        assert!(matches!(
            service.login("editor", "pw").await,
            Err(AppError::AccountBlocked)
        ));
        assert!(matches!(
            service.authenticate(&tokens.access_token).await,
            Err(AppError::AccountBlocked)
        ));
    }
}
