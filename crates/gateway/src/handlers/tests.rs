use axum::{
    body::{to_bytes, Body, BodyDataStream},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shorthub_common::{
    auth::hash_password,
    config::AppConfig,
    db::{
        models::{
            Channel, ChannelRole, ContentType, User, UserRole, WorkItem, WorkItemActiveModel, WorkItemStatus,
        },
        schema, DbPool, NewChannel, NewUser, NewWorkItem,
    },
    auth::AuthContext,
    AppServices,
};
use futures::StreamExt;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use crate::middleware::rate_limit::RateLimit;
use crate::{create_router, timeout_layer, AppState};

const PASSWORD: &str = "password123";

struct TestApp {
    router: Router,
    services: AppServices,
}

impl TestApp {
    async fn new(rate_limit: Option<RateLimit>) -> Self {
        let conn = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        schema::create_tables(&conn).await.unwrap();
        let services = AppServices::from_pool(AppConfig::default(), DbPool::from_connection(conn)).unwrap();
        Self {
            router: create_router(AppState {
                services: services.clone(),
                rate_limit,
            }),
            services,
        }
    }

    async fn user(&self, username: &str, role: UserRole) -> User {
        self.services
            .repo
            .create_user(NewUser {
                username: username.to_string(),
                email: None,
                password_hash: hash_password(PASSWORD).unwrap(),
                role,
                phone: None,
            })
            .await
            .unwrap()
    }

    async fn source_channel(&self) -> Channel {
        self.services
            .repo
            .create_channel(NewChannel {
                external_channel_id: "UCsource".to_string(),
                role: ChannelRole::Source,
                display_name: "Source".to_string(),
                profile_image_url: None,
                content_type: ContentType::VfSansEdit,
                subscriber_count: 10,
            })
            .await
            .unwrap()
    }

    async fn assigned_item(&self, source_id: Uuid, owner: &User, n: usize) -> WorkItem {
        let item = self
            .services
            .repo
            .create_work_item(NewWorkItem {
                source_video_id: format!("vid{}", n),
                source_video_url: format!("https://youtube.com/shorts/vid{}", n),
                source_channel_id: source_id,
                title: Some(format!("Clip {}", n)),
                description: None,
                tags: Vec::new(),
            })
            .await
            .unwrap();
        let mut active: WorkItemActiveModel = item.into();
        active.status = sea_orm::Set(WorkItemStatus::Assigned.as_str().to_string());
        active.assigned_to = sea_orm::Set(Some(owner.id));
        active.assigned_at = sea_orm::Set(Some(chrono::Utc::now()));
        self.services.repo.update_work_item(active).await.unwrap()
    }

    /// Opens a feed and returns its status and body frames
    async fn open_feed(&self, uri: &str) -> (StatusCode, BodyDataStream) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        (response.status(), response.into_body().into_data_stream())
    }

    async fn token(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["accessToken"].as_str().unwrap().to_string()
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn test_health_reports_ok() {
    let app = TestApp::new(None).await;
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert!(body["timestamp"].is_string());

    let (status, body) = app.call(Method::GET, "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let app = TestApp::new(None).await;
    let (status, _) = app.call(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/api/items", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_me() {
    let app = TestApp::new(None).await;
    app.user("boss", UserRole::Admin).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "boss", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.token("boss").await;
    let (status, body) = app.call(Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "boss");
    assert_eq!(body["role"], "ADMIN");
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_admin_only_routes_are_forbidden_to_producers() {
    let app = TestApp::new(None).await;
    app.user("maker", UserRole::Producer).await;
    let token = app.token("maker").await;

    for uri in ["/api/users", "/api/analytics/dashboard", "/api/notification-settings"] {
        let (status, _) = app.call(Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
    }
}

#[tokio::test]
async fn test_admin_creates_user_and_duplicate_conflicts() {
    let app = TestApp::new(None).await;
    app.user("boss", UserRole::Admin).await;
    let token = app.token("boss").await;

    let request = json!({
        "username": "newbie",
        "email": "Newbie@Example.com",
        "password": "secret99",
        "role": "PRODUCER"
    });
    let (status, body) = app
        .call(Method::POST, "/api/users", Some(&token), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "newbie@example.com");

    let (status, _) = app.call(Method::POST, "/api/users", Some(&token), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_producer_item_list_is_scoped_to_own_assignments() {
    let app = TestApp::new(None).await;
    let mine = app.user("mine", UserRole::Producer).await;
    let theirs = app.user("theirs", UserRole::Producer).await;
    let source = app.source_channel().await;
    for (n, owner) in [&mine, &theirs].into_iter().enumerate() {
        app.assigned_item(source.id, owner, n).await;
    }

    let token = app.token("mine").await;
    let uri = format!("/api/items?assignedTo={}", theirs.id);
    let (status, body) = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["assignedTo"], mine.id.to_string());
}

#[tokio::test]
async fn test_unknown_item_is_not_found() {
    let app = TestApp::new(None).await;
    app.user("boss", UserRole::Admin).await;
    let token = app.token("boss").await;

    let uri = format!("/api/items/{}", Uuid::new_v4());
    let (status, body) = app.call(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_object());
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let app = TestApp::new(Some(RateLimit::new(1, 1).unwrap())).await;
    let (first, _) = app.call(Method::GET, "/api/health", None, None).await;
    let (second, _) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
}

fn actor(user: &User) -> AuthContext {
    AuthContext {
        user_id: user.id,
        role: user.user_role(),
        username: user.username.clone(),
    }
}

async fn next_frame(body: &mut BodyDataStream) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("no event before timeout")
        .expect("feed closed")
        .unwrap();
    String::from_utf8(frame.to_vec()).unwrap()
}

#[tokio::test]
async fn test_status_feed_delivers_only_the_producers_items() {
    let app = TestApp::new(None).await;
    let mine = app.user("mine", UserRole::Producer).await;
    let theirs = app.user("theirs", UserRole::Producer).await;
    let source = app.source_channel().await;
    let my_item = app.assigned_item(source.id, &mine, 0).await;
    let their_item = app.assigned_item(source.id, &theirs, 1).await;

    let token = app.token("mine").await;
    let (status, mut body) = app.open_feed(&format!("/api/events/item-status?token={}", token)).await;
    assert_eq!(status, StatusCode::OK);

    for (who, item) in [(&theirs, &their_item), (&mine, &my_item)] {
        app.services
            .lifecycle
            .update_status(&actor(who), item.id, WorkItemStatus::InProgress, None)
            .await
            .unwrap();
    }

    let frame = next_frame(&mut body).await;
    assert!(frame.contains("event: status_changed"), "{}", frame);
    assert!(frame.contains(&my_item.id.to_string()));
    assert!(!frame.contains(&their_item.id.to_string()));
    assert!(frame.contains("IN_PROGRESS"));
}

#[tokio::test]
async fn test_completion_feed_reaches_admins() {
    let app = TestApp::new(None).await;
    app.user("boss", UserRole::Admin).await;
    let maker = app.user("maker", UserRole::Producer).await;
    let item = app.assigned_item(app.source_channel().await.id, &maker, 0).await;

    let token = app.token("boss").await;
    let (status, mut body) = app.open_feed(&format!("/api/events/completions?token={}", token)).await;
    assert_eq!(status, StatusCode::OK);

    app.services
        .lifecycle
        .update_status(&actor(&maker), item.id, WorkItemStatus::Completed, None)
        .await
        .unwrap();

    let frame = next_frame(&mut body).await;
    assert!(frame.contains("event: completed"), "{}", frame);
    assert!(frame.contains(&item.id.to_string()));
}

#[tokio::test]
async fn test_feeds_check_token_and_role() {
    let app = TestApp::new(None).await;
    app.user("maker", UserRole::Producer).await;
    let other = app.user("other", UserRole::Producer).await;
    let token = app.token("maker").await;

    let (status, _) = app.open_feed("/api/events/channel-subscribers?token=garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.open_feed(&format!("/api/events/completions?token={}", token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/events/assignments?token={}&userId={}", token, other.id);
    let (status, _) = app.open_feed(&uri).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.open_feed(&format!("/api/events/assignments?token={}", token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_slow_requests_time_out() {
    let slow = Router::new()
        .route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .layer(timeout_layer(Duration::from_millis(20)));

    let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
    let response = slow.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_admin_resets_password_and_reads_activity() {
    let app = TestApp::new(None).await;
    app.user("boss", UserRole::Admin).await;
    let maker = app.user("maker", UserRole::Producer).await;
    let admin = app.token("boss").await;
    let producer = app.token("maker").await;

    let uri = format!("/api/users/{}/password", maker.id);
    let (status, _) = app
        .call(Method::POST, &uri, Some(&producer), Some(json!({ "newPassword": "changed99" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::POST, &uri, Some(&admin), Some(json!({ "newPassword": "changed99" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "maker", "password": "changed99" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::GET, "/api/activity-logs?resourceType=User", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let logs = body.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "PASSWORD_RESET");
    assert_eq!(logs[0]["resourceId"], maker.id.to_string());

    let (status, _) = app.call(Method::GET, "/api/activity-logs", Some(&producer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
