//! End-to-end session behaviour against a mock backend.

use std::sync::Arc;
use std::time::Duration;

use plantpal_core::auth::{
    AdminProfile, FileSessionStore, MemorySessionStore, Principal, SessionStore, UserProfile,
};
use plantpal_core::models::AdminProfileUpdate;
use plantpal_core::{ApiClient, ApiError, Config, Platform, SessionContext, SessionData, TokenPair};
use reqwest::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_with(config: Config, store: Arc<dyn SessionStore>) -> ApiClient {
    let session = SessionContext::init_shared(store);
    ApiClient::new(&config, session).expect("Failed to build client")
}

fn client_for(server: &MockServer, platform: Platform, store: Arc<dyn SessionStore>) -> ApiClient {
    client_with(Config::for_backend(server.uri(), platform), store)
}

fn user_session(access: &str, refresh: &str) -> SessionData {
    SessionData::new(
        Principal::User(UserProfile {
            email: "a@b.com".to_string(),
            id: None,
            username: None,
        }),
        TokenPair::new(access, refresh),
    )
}

fn seeded_store(access: &str, refresh: &str) -> Arc<MemorySessionStore> {
    let store = Arc::new(MemorySessionStore::new(Platform::Mobile));
    store
        .save(&user_session(access, refresh))
        .expect("Failed to seed store");
    store
}

async fn mount_refresh(server: &MockServer, refresh: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/refresh_token/"))
        .and(body_json(json!({ "refresh": refresh })))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_get(server: &MockServer, route: &str, token: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("Authorization", format!("Bearer {}", token).as_str()))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_stores_principal_and_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login/"))
        .and(body_json(json!({ "email": "a@b.com", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "email": "a@b.com" },
            "access": "A1",
            "refresh": "R1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new(Platform::Mobile));
    let client = client_for(&server, Platform::Mobile, store.clone());

    let principal = client.login("a@b.com", "secret").await.expect("login");
    assert_eq!(principal.email(), "a@b.com");

    let session = client.session();
    assert_eq!(session.principal(), Some(principal));
    assert_eq!(session.access_token().as_deref(), Some("A1"));
    assert_eq!(session.refresh_token().as_deref(), Some("R1"));

    let record = store.record().expect("session persisted");
    assert_eq!(record.get("user"), Some(r#"{"email":"a@b.com"}"#));
    assert_eq!(record.get("accessToken"), Some("A1"));
    assert_eq!(record.get("refreshToken"), Some("R1"));
}

#[tokio::test]
async fn login_with_bad_credentials_leaves_session_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin_login/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials." })),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new(Platform::Web));
    let client = client_for(&server, Platform::Web, store.clone());

    let err = client.login("a@b.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Invalid credentials."));
    assert!(!client.session().is_authenticated());
    assert!(store.record().is_none());
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried_once() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/get_plants/", "A1", ResponseTemplate::new(401), 1).await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(200).set_body_json(json!({ "access": "A2" })),
        1,
    )
    .await;
    mount_get(
        &server,
        "/api/get_plants/",
        "A2",
        ResponseTemplate::new(200).set_body_json(json!([{ "id": "p1", "plant_name": "Lagundi" }])),
        1,
    )
    .await;

    let store = seeded_store("A1", "R1");
    let client = client_for(&server, Platform::Mobile, store.clone());

    let response = client
        .request(Method::GET, "/api/get_plants/", None)
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().expect("json body");
    assert_eq!(body[0]["plant_name"], "Lagundi");

    assert_eq!(client.session().access_token().as_deref(), Some("A2"));
    assert_eq!(client.session().refresh_token().as_deref(), Some("R1"));
    let record = store.record().expect("still persisted");
    assert_eq!(record.get("accessToken"), Some("A2"));
    assert_eq!(record.get("refreshToken"), Some("R1"));

    server.verify().await;
}

#[tokio::test]
async fn failed_refresh_clears_session_without_second_retry() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/profile/", "A1", ResponseTemplate::new(401), 1).await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid or expired refresh token." })),
        1,
    )
    .await;

    let store = seeded_store("A1", "R1");
    let client = client_for(&server, Platform::Mobile, store.clone());

    let err = client
        .request(Method::GET, "/api/profile/", None)
        .await
        .unwrap_err();
    assert!(err.is_session_expired());

    let session = client.session();
    assert!(session.principal().is_none());
    assert!(session.access_token().is_none());
    assert!(session.refresh_token().is_none());
    assert!(store.record().is_none());

    server.verify().await;
}

#[tokio::test]
async fn retried_request_result_is_returned_even_if_unauthorized() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/get_terms_conditions/", "A1", ResponseTemplate::new(401), 1).await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(200).set_body_json(json!({ "access": "A2" })),
        1,
    )
    .await;
    mount_get(&server, "/api/get_terms_conditions/", "A2", ResponseTemplate::new(401), 1).await;

    let client = client_for(&server, Platform::Mobile, seeded_store("A1", "R1"));

    let response = client
        .request(Method::GET, "/api/get_terms_conditions/", None)
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // The refresh itself succeeded, so the session stays.
    assert_eq!(client.session().access_token().as_deref(), Some("A2"));

    server.verify().await;
}

#[tokio::test]
async fn refresh_without_refresh_token_fails_closed() {
    let server = MockServer::start().await;
    mount_refresh(&server, "R1", ResponseTemplate::new(200), 0).await;

    let client = client_for(
        &server,
        Platform::Mobile,
        Arc::new(MemorySessionStore::new(Platform::Mobile)),
    );

    assert_eq!(client.refresher().refresh_access_token().await, None);
    assert!(!client.session().is_authenticated());

    server.verify().await;
}

#[tokio::test]
async fn malformed_refresh_response_clears_session() {
    let server = MockServer::start().await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })),
        1,
    )
    .await;

    let store = seeded_store("A1", "R1");
    let client = client_for(&server, Platform::Mobile, store.clone());

    assert_eq!(client.refresher().refresh_access_token().await, None);
    assert!(!client.session().is_authenticated());
    assert!(store.record().is_none());
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/get_plants/", "A1", ResponseTemplate::new(401), 3).await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "access": "A2" }))
            .set_delay(Duration::from_millis(200)),
        1,
    )
    .await;
    mount_get(
        &server,
        "/api/get_plants/",
        "A2",
        ResponseTemplate::new(200).set_body_json(json!([])),
        3,
    )
    .await;

    let client = client_for(&server, Platform::Mobile, seeded_store("A1", "R1"));

    let (a, b, c) = tokio::join!(
        client.fetch_plants(),
        client.fetch_plants(),
        client.fetch_plants(),
    );
    assert!(a.expect("first").is_empty());
    assert!(b.expect("second").is_empty());
    assert!(c.expect("third").is_empty());
    assert_eq!(client.session().access_token().as_deref(), Some("A2"));

    server.verify().await;
}

#[tokio::test]
async fn non_unauthorized_errors_pass_through_without_refresh() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/api/get_plants/",
        "A1",
        ResponseTemplate::new(500).set_body_json(json!({ "error": "boom" })),
        2,
    )
    .await;
    mount_refresh(&server, "R1", ResponseTemplate::new(200), 0).await;

    let client = client_for(&server, Platform::Mobile, seeded_store("A1", "R1"));

    let response = client
        .request(Method::GET, "/api/get_plants/", None)
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let err = client.fetch_plants().await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError { status: 500, ref message } if message == "boom"));
    assert_eq!(client.session().access_token().as_deref(), Some("A1"));

    server.verify().await;
}

#[tokio::test]
async fn unreachable_backend_is_a_connectivity_error() {
    // Bind then release a port so nothing is listening on it.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("http://{}", listener.local_addr().expect("local addr"))
    };

    let client = client_with(
        Config::for_backend(uri, Platform::Mobile),
        seeded_store("A1", "R1"),
    );

    let err = client
        .request(Method::GET, "/api/get_plants/", None)
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(client.session().access_token().as_deref(), Some("A1"));
}

#[tokio::test]
async fn slow_backend_times_out_as_connectivity_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/get_plants/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = Config::for_backend(server.uri(), Platform::Mobile);
    config.request_timeout_secs = 1;
    let client = client_with(config, seeded_store("A1", "R1"));

    let err = client.fetch_plants().await.unwrap_err();
    assert!(err.is_connectivity());
    assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn request_without_session_is_rejected_locally() {
    let server = MockServer::start().await;
    let client = client_for(
        &server,
        Platform::Web,
        Arc::new(MemorySessionStore::new(Platform::Web)),
    );

    let err = client.fetch_terms().await.unwrap_err();
    assert!(err.is_session_expired());
    let received = server.received_requests().await.expect("recording enabled");
    assert!(received.is_empty());
}

#[tokio::test]
async fn file_session_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin_login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Login successful!",
            "admin": { "id": 7, "email": "admin@plantpal.app", "user_name": "Moss",
                       "created_at": "2025-01-05T09:30:00+00:00" },
            "access": "A1",
            "refresh": "R1"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let client = client_for(
        &server,
        Platform::Web,
        Arc::new(FileSessionStore::new(Platform::Web, dir.path())),
    );
    client.login("Admin@PlantPal.app ", "secret").await.expect("login");
    let saved = client.session().snapshot().expect("session");

    // Fresh context over the same directory.
    let restarted = SessionContext::init(FileSessionStore::new(Platform::Web, dir.path()));
    assert!(restarted.is_loading());
    restarted.wait_until_loaded().await;
    assert_eq!(restarted.snapshot(), Some(saved));
}

#[tokio::test]
async fn logout_removes_persisted_session() {
    let server = MockServer::start().await;
    let store = seeded_store("A1", "R1");
    let client = client_for(&server, Platform::Mobile, store.clone());
    client.session().wait_until_loaded().await;
    assert!(client.session().is_authenticated());

    client.logout().expect("logout");
    assert!(!client.session().is_authenticated());
    assert!(store.record().is_none());
}

#[tokio::test]
async fn admin_profile_update_replaces_principal_and_keeps_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/update_admin_profile/"))
        .and(header("Authorization", "Bearer A1"))
        .and(body_json(json!({ "id": "7", "user_name": "Fern" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Profile updated successfully!",
            "admin": { "id": 7, "email": "admin@plantpal.app", "user_name": "Fern" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySessionStore::new(Platform::Web));
    store
        .save(&SessionData::new(
            Principal::Admin(AdminProfile {
                id: "7".to_string(),
                email: "admin@plantpal.app".to_string(),
                user_name: "Moss".to_string(),
                created_at: None,
            }),
            TokenPair::new("A1", "R1"),
        ))
        .expect("seed");
    let client = client_for(&server, Platform::Web, store.clone());

    let update = AdminProfileUpdate {
        id: "7".to_string(),
        user_name: Some("Fern".to_string()),
        ..Default::default()
    };
    let admin = client
        .update_admin_profile(&update)
        .await
        .expect("update")
        .expect("admin returned");
    assert_eq!(admin.user_name, "Fern");

    let session = client.session().snapshot().expect("session");
    assert_eq!(session.principal, Principal::Admin(admin));
    assert_eq!(session.tokens, TokenPair::new("A1", "R1"));
    let stored = store.load().expect("load").expect("stored session");
    assert_eq!(stored, session);
}

#[tokio::test]
async fn signup_does_not_touch_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/signup/"))
        .and(body_json(json!({ "email": "new@b.com", "password": "secret" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "message": "User signed up successfully!",
            "user": { "email": "new@b.com", "username": "user_4821" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin-signup/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Email already exists" })),
        )
        .mount(&server)
        .await;

    let client = client_for(
        &server,
        Platform::Mobile,
        Arc::new(MemorySessionStore::new(Platform::Mobile)),
    );

    let user = client.signup("New@b.com", "secret").await.expect("signup");
    assert_eq!(user.username.as_deref(), Some("user_4821"));
    assert!(!client.session().is_authenticated());

    let err = client
        .admin_signup("taken@b.com", "secret", "Moss")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { status: 400, ref message } if message == "Email already exists"));
}

#[tokio::test]
async fn user_listing_goes_through_refresh_and_retry() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/get_users/", "A1", ResponseTemplate::new(401), 1).await;
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(200).set_body_json(json!({ "access": "A2" })),
        1,
    )
    .await;
    mount_get(
        &server,
        "/api/get_users/",
        "A2",
        ResponseTemplate::new(200).set_body_json(json!([{
            "id": 12,
            "user_name": "Fern",
            "user_email": "fern@b.com",
            "date_joined": "2025-03-01T10:00:00Z",
            "city": "Cebu",
            "avatar_url": null,
            "is_premium": false
        }])),
        1,
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete_user/12/"))
        .and(header("Authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "User deleted successfully" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Platform::Mobile, seeded_store("A1", "R1"));

    let users = client.fetch_users().await.expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "12");
    assert_eq!(users[0].city.as_deref(), Some("Cebu"));

    client.delete_user(&users[0].id).await.expect("delete");
    let err = client.delete_user("12/../plants").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    server.verify().await;
}

#[tokio::test]
async fn feedback_listing_requires_a_session() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/api/get_feedbacks/",
        "A1",
        ResponseTemplate::new(200).set_body_json(json!([{
            "id": "f1",
            "user_name": "Fern",
            "email": "fern@b.com",
            "message": "The scanner found my lagundi!",
            "date_submitted": "2025-03-02"
        }])),
        1,
    )
    .await;

    let client = client_for(&server, Platform::Mobile, seeded_store("A1", "R1"));
    let feedbacks = client.fetch_feedbacks().await.expect("feedbacks");
    assert_eq!(feedbacks[0].message, "The scanner found my lagundi!");

    client.logout().expect("logout");
    let err = client.fetch_feedbacks().await.unwrap_err();
    assert!(err.is_session_expired());

    server.verify().await;
}

#[tokio::test]
async fn stale_refresh_does_not_affect_a_newer_login() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/get_plants/", "A1", ResponseTemplate::new(401), 1).await;
    // The old session's refresh is slow and then rejected.
    mount_refresh(
        &server,
        "R1",
        ResponseTemplate::new(400)
            .set_body_json(json!({ "error": "Invalid or expired refresh token." }))
            .set_delay(Duration::from_millis(500)),
        1,
    )
    .await;
    mount_get(&server, "/api/get_plants/", "B1", ResponseTemplate::new(401), 1).await;
    mount_refresh(
        &server,
        "RB",
        ResponseTemplate::new(200).set_body_json(json!({ "access": "B2" })),
        1,
    )
    .await;
    mount_get(
        &server,
        "/api/get_plants/",
        "B2",
        ResponseTemplate::new(200).set_body_json(json!([])),
        1,
    )
    .await;

    let store = seeded_store("A1", "R1");
    let client = client_for(&server, Platform::Mobile, store.clone());
    client.session().wait_until_loaded().await;

    let old_request = client.request(Method::GET, "/api/get_plants/", None);
    let new_login = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client
            .session()
            .set_session(Some(user_session("B1", "RB")))
            .expect("login");
        client.fetch_plants().await
    };
    let (old, new) = tokio::join!(old_request, new_login);

    assert!(old.unwrap_err().is_session_expired());
    assert!(new.expect("new session request").is_empty());

    let session = client.session();
    assert_eq!(session.access_token().as_deref(), Some("B2"));
    assert_eq!(session.refresh_token().as_deref(), Some("RB"));
    let record = store.record().expect("newer session kept");
    assert_eq!(record.get("accessToken"), Some("B2"));

    server.verify().await;
}
