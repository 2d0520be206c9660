use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use memberhub::config::{Config, SecurityConfig};
use tower::ServiceExt;

const LOCAL: &str = "127.0.0.1:50000";
const REMOTE: &str = "203.0.113.7:50000";

async fn spawn_app() -> Router {
    let db_path = std::env::temp_dir().join(format!("memberhub-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.user_activation.auto_activate = true;
    config.security = SecurityConfig {
        argon2_memory_cost_kib: 64,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
        ..SecurityConfig::default()
    };

    let state = memberhub::api::create_app_state(config, None)
        .await
        .expect("Failed to create app state");
    memberhub::api::router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    peer: &str,
    cookie: Option<&str>,
    form: &[(&str, &str)],
) -> Response<Body> {
    let peer: SocketAddr = peer.parse().unwrap();
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }

    let body = if form.is_empty() {
        Body::empty()
    } else {
        builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        let encoded: Vec<String> = form
            .iter()
            .map(|(k, v)| format!("{k}={}", v.replace(' ', "+")))
            .collect();
        Body::from(encoded.join("&"))
    };

    let mut request = builder.body(body).unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    app.clone().oneshot(request).await.unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("No session cookie")
        .to_string()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn register(app: &Router, peer: &str, username: &str, password: &str) -> Response<Body> {
    let email = format!("{username}@example.org");
    send(
        app,
        "POST",
        "/register",
        peer,
        None,
        &[
            ("username", username),
            ("password", password),
            ("confirm_password", password),
            ("email", &email),
            ("name", "Test"),
            ("surname", "User"),
        ],
    )
    .await
}

async fn login(app: &Router, username: &str, password: &str) -> Response<Body> {
    send(
        app,
        "POST",
        "/login",
        REMOTE,
        None,
        &[("username", username), ("password", password)],
    )
    .await
}

#[tokio::test]
async fn test_anonymous_is_sent_to_login() {
    let app = spawn_app().await;

    let response = send(&app, "GET", "/", REMOTE, None, &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = send(&app, "GET", "/login", REMOTE, None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("name=\"username\""));
    assert!(body.contains("Login - Memberhub"));
}

#[tokio::test]
async fn test_register_then_login() {
    let app = spawn_app().await;

    let response = register(&app, REMOTE, "bob", "Tiger7Lamp").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = login(&app, "bob", "Tiger7Lamp").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response);

    let response = send(&app, "GET", "/", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("href=\"/about\""));
    assert!(!body.contains("href=\"/users\""));

    let response = send(&app, "GET", "/login", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_failed_login_is_generic() {
    let app = spawn_app().await;
    register(&app, REMOTE, "carol", "Tiger7Lamp").await;

    let wrong = login(&app, "carol", "Cobra8Wind").await;
    assert_eq!(wrong.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&wrong), "/login");
    let cookie = session_cookie(&wrong);

    let page = send(&app, "GET", "/login", REMOTE, Some(&cookie), &[]).await;
    let body = body_text(page).await;
    assert!(body.contains("Unknown user or wrong password."));

    let unknown = login(&app, "nobody", "Cobra8Wind").await;
    let cookie = session_cookie(&unknown);
    let page = send(&app, "GET", "/login", REMOTE, Some(&cookie), &[]).await;
    assert!(body_text(page).await.contains("Unknown user or wrong password."));
}

#[tokio::test]
async fn test_denied_page_looks_missing() {
    let app = spawn_app().await;
    register(&app, REMOTE, "dave", "Tiger7Lamp").await;
    let cookie = session_cookie(&login(&app, "dave", "Tiger7Lamp").await);

    let denied = send(&app, "GET", "/users", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(denied.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(denied).await, "/users - Not found");

    let missing = send(&app, "GET", "/nope", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(missing).await, "/nope - Not found");
}

#[tokio::test]
async fn test_admin_bootstrap_only_from_local_peer() {
    let app = spawn_app().await;

    // A remote "admin" is an ordinary member.
    register(&app, REMOTE, "admin", "Tiger7Lamp").await;
    let cookie = session_cookie(&login(&app, "admin", "Tiger7Lamp").await);
    let response = send(&app, "GET", "/users", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = spawn_app().await;
    register(&app, LOCAL, "admin", "Tiger7Lamp").await;
    let cookie = session_cookie(&login(&app, "admin", "Tiger7Lamp").await);
    let response = send(&app, "GET", "/users", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("admin@example.org"));
}

#[tokio::test]
async fn test_reset_password_forces_change() {
    let app = spawn_app().await;
    register(&app, LOCAL, "admin", "Tiger7Lamp").await;
    register(&app, REMOTE, "erin", "Mango5Desk").await;
    let admin = session_cookie(&login(&app, "admin", "Tiger7Lamp").await);

    let response = send(
        &app,
        "POST",
        "/users/reset-password",
        REMOTE,
        Some(&admin),
        &[("username", "erin")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"], false);
    let temporary = json["temporary_password"].as_str().unwrap().to_string();

    let old = login(&app, "erin", "Mango5Desk").await;
    assert_eq!(location(&old), "/login");

    let response = login(&app, "erin", &temporary).await;
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response);

    let response = send(&app, "GET", "/about", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/change-password");

    let response = send(
        &app,
        "POST",
        "/change-password",
        REMOTE,
        Some(&cookie),
        &[
            ("old_password", &temporary),
            ("new_password", "Pilot4Rust"),
            ("confirm_password", "Pilot4Rust"),
        ],
    )
    .await;
    assert_eq!(location(&response), "/change-password");

    let response = send(&app, "GET", "/about", REMOTE, Some(&cookie), &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_post_is_flashed_back() {
    let app = spawn_app().await;

    let response = send(
        &app,
        "POST",
        "/users/activate",
        REMOTE,
        None,
        &[("username", "bob")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_process_endpoints_are_local_only() {
    let app = spawn_app().await;

    let response = send(&app, "GET", "/stop-process", REMOTE, None, &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "/stop-process - Not found");

    let response = send(&app, "GET", "/metrics", REMOTE, None, &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/metrics", LOCAL, None, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = spawn_app().await;
    let response = send(&app, "GET", "/login", REMOTE, None, &[]).await;

    assert_eq!(
        response.headers().get("x-frame-options").unwrap(),
        "DENY"
    );
    assert!(response.headers().contains_key("content-security-policy"));
}
