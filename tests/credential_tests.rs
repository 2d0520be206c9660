//! Integration tests for the credential lifecycle: lockout, rotation history,
//! temporary passwords and per-user address restrictions.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use memberhub::config::{Config, SecurityConfig};
use memberhub::db::Store;
use memberhub::domain::{ValidationOutcome, timestamp};
use memberhub::entities::users;
use memberhub::services::{
    AuthService, CredentialError, CredentialService, PolicyViolation, RegisterRequest,
    SeaOrmAuthService, SeaOrmCredentialService, access_catalog,
};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

const REMOTE: &str = "203.0.113.7";

struct Harness {
    store: Store,
    auth: SeaOrmAuthService,
    credentials: Arc<dyn CredentialService>,
}

fn test_config() -> Config {
    let db_path = std::env::temp_dir().join(format!(
        "memberhub-credential-test-{}.db",
        uuid::Uuid::new_v4()
    ));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.user_activation.auto_activate = true;
    config.password_rules.max_allowed_failed_atmpts = 3;
    config.password_rules.password_fail_interval = 15;
    config.password_rules.not_repeat_last_x_passwords = 2;
    config.security = SecurityConfig {
        argon2_memory_cost_kib: 64,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
        ..SecurityConfig::default()
    };
    config
}

async fn harness(config: Config) -> Harness {
    let store = Store::new(&config.general.database_path)
        .await
        .expect("Failed to open store");
    access_catalog::seed(&store).await.expect("Failed to seed");

    let credentials: Arc<dyn CredentialService> = Arc::new(SeaOrmCredentialService::new(
        store.clone(),
        config.password_rules.clone(),
        config.security.clone(),
    ));
    let auth = SeaOrmAuthService::new(store.clone(), credentials.clone(), config);

    Harness {
        store,
        auth,
        credentials,
    }
}

async fn register(h: &Harness, username: &str, password: &str) {
    register_from(h, username, password, REMOTE).await;
}

async fn register_from(h: &Harness, username: &str, password: &str, client_ip: &str) {
    h.auth
        .register(RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
            email: format!("{username}@example.org"),
            name: "Test".to_string(),
            surname: "User".to_string(),
            client_ip: client_ip.to_string(),
        })
        .await
        .expect("Registration failed");
}

async fn active_valid_until(h: &Harness, username: &str) -> Option<DateTime<Utc>> {
    let id = user(h, username).await.id;
    h.store
        .active_credential(id)
        .await
        .unwrap()
        .expect("No active credential")
        .valid_until
        .map(|until| {
            DateTime::parse_from_rfc3339(&until)
                .expect("Unparseable valid_until")
                .with_timezone(&Utc)
        })
}

fn minutes_from_now(until: DateTime<Utc>) -> i64 {
    (until - Utc::now()).num_minutes()
}

async fn user(h: &Harness, username: &str) -> users::Model {
    h.store
        .get_user(username)
        .await
        .unwrap()
        .expect("User missing")
}

#[tokio::test]
async fn test_lockout_after_max_failed_attempts() {
    let h = harness(test_config()).await;
    register(&h, "carol", "Tiger7Lamp").await;

    for _ in 0..2 {
        let err = h
            .credentials
            .validate_password("carol", "Wrong9Pass", REMOTE)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::WrongPassword));
    }

    let err = h
        .credentials
        .validate_password("carol", "Wrong9Pass", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::LockedOut));

    let carol = user(&h, "carol").await;
    assert!(carol.locked_out);
    assert_eq!(carol.failed_password_attempts, 3);
    assert!(h.store.active_credential(carol.id).await.unwrap().is_none());

    // The right password no longer helps.
    let err = h
        .credentials
        .validate_password("carol", "Tiger7Lamp", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::LockedOut));
}

#[tokio::test]
async fn test_failure_counter_restarts_after_window() {
    let h = harness(test_config()).await;
    register(&h, "dave", "Cobra8Wind").await;

    for _ in 0..2 {
        let _ = h
            .credentials
            .validate_password("dave", "Wrong9Pass", REMOTE)
            .await;
    }
    let dave = user(&h, "dave").await;
    assert_eq!(dave.failed_password_attempts, 2);

    let stale = timestamp(Utc::now() - Duration::minutes(30));
    users::Entity::update_many()
        .col_expr(users::Column::FirstFailedPassword, Expr::value(stale))
        .filter(users::Column::Id.eq(dave.id))
        .exec(&h.store.conn)
        .await
        .unwrap();

    let err = h
        .credentials
        .validate_password("dave", "Wrong9Pass", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::WrongPassword));

    let dave = user(&h, "dave").await;
    assert_eq!(dave.failed_password_attempts, 1);
    assert!(!dave.locked_out);
}

#[tokio::test]
async fn test_successful_login_resets_counter() {
    let h = harness(test_config()).await;
    register(&h, "erin", "Mango5Desk").await;

    let _ = h
        .credentials
        .validate_password("erin", "Wrong9Pass", REMOTE)
        .await;
    let outcome = h
        .credentials
        .validate_password("erin", "Mango5Desk", REMOTE)
        .await
        .unwrap();
    assert_eq!(outcome, ValidationOutcome::Ok);

    let erin = user(&h, "erin").await;
    assert_eq!(erin.failed_password_attempts, 0);
    assert_eq!(erin.first_failed_password, None);
    assert_eq!(erin.last_connect_ip.as_deref(), Some(REMOTE));
}

#[tokio::test]
async fn test_zero_max_attempts_never_locks() {
    let mut config = test_config();
    config.password_rules.max_allowed_failed_atmpts = 0;
    let h = harness(config).await;
    register(&h, "frank", "Pilot4Rust").await;

    for _ in 0..6 {
        let err = h
            .credentials
            .validate_password("frank", "Wrong9Pass", REMOTE)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::WrongPassword));
    }
    assert!(!user(&h, "frank").await.locked_out);
}

#[tokio::test]
async fn test_recent_passwords_cannot_be_reused() {
    let h = harness(test_config()).await;
    register(&h, "gina", "Tiger7Lamp").await;

    h.credentials
        .change_password("gina", "Cobra8Wind")
        .await
        .unwrap();

    // Depth 2 covers the current and the previous credential.
    let err = h
        .credentials
        .change_password("gina", "Tiger7Lamp")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Reused));
    let err = h
        .credentials
        .change_password("gina", "Cobra8Wind")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Reused));

    h.credentials
        .change_password("gina", "Mango5Desk")
        .await
        .unwrap();
    h.credentials
        .change_password("gina", "Tiger7Lamp")
        .await
        .unwrap();

    let gina = user(&h, "gina").await;
    let history = h.store.password_history(gina.id).await.unwrap();
    assert_eq!(history.len(), 4);

    let now = timestamp(Utc::now());
    let open: Vec<_> = history
        .iter()
        .filter(|c| c.valid_until.as_deref().is_none_or(|until| until > now.as_str()))
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, history[0].id);
}

#[tokio::test]
async fn test_policy_violation_writes_nothing() {
    let h = harness(test_config()).await;
    register(&h, "hank", "Tiger7Lamp").await;

    let err = h
        .credentials
        .change_password("hank", "short")
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Policy(_)));

    let hank = user(&h, "hank").await;
    assert_eq!(h.store.password_history(hank.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_temporary_password_unlocks_account() {
    let h = harness(test_config()).await;
    register(&h, "ivy", "Tiger7Lamp").await;

    for _ in 0..3 {
        let _ = h
            .credentials
            .validate_password("ivy", "Wrong9Pass", REMOTE)
            .await;
    }
    assert!(user(&h, "ivy").await.locked_out);

    let temporary = h.credentials.issue_temporary_password("ivy").await.unwrap();
    assert_eq!(temporary.chars().count(), 14);

    let ivy = user(&h, "ivy").await;
    assert!(!ivy.locked_out);
    assert_eq!(ivy.failed_password_attempts, 0);

    let outcome = h
        .credentials
        .validate_password("ivy", &temporary, REMOTE)
        .await
        .unwrap();
    assert_eq!(outcome, ValidationOutcome::TemporaryPassword);

    let active = h.store.active_credential(ivy.id).await.unwrap().unwrap();
    assert!(active.temporary);
    assert!(active.valid_until.is_none());
}

#[tokio::test]
async fn test_allowed_ips_restrict_logins() {
    let h = harness(test_config()).await;
    register(&h, "jack", "Tiger7Lamp").await;

    h.auth
        .set_allowed_ips("jack", vec!["198.51.100.4".to_string()])
        .await
        .unwrap();

    let err = h
        .credentials
        .validate_password("jack", "Tiger7Lamp", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::IpNotAllowed));
    // Address rejections are not counted as password failures.
    assert_eq!(user(&h, "jack").await.failed_password_attempts, 0);

    h.credentials
        .validate_password("jack", "Tiger7Lamp", "198.51.100.4")
        .await
        .unwrap();

    h.auth.set_allowed_ips("jack", Vec::new()).await.unwrap();
    h.credentials
        .validate_password("jack", "Tiger7Lamp", REMOTE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unactivated_account_cannot_log_in() {
    let mut config = test_config();
    config.user_activation.auto_activate = false;
    let h = harness(config).await;
    register(&h, "kate", "Tiger7Lamp").await;

    let err = h
        .credentials
        .validate_password("kate", "Tiger7Lamp", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::NotActivated));

    h.auth.activate_user("kate").await.unwrap();
    h.credentials
        .validate_password("kate", "Tiger7Lamp", REMOTE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let h = harness(test_config()).await;
    let err = h
        .credentials
        .validate_password("nobody", "Tiger7Lamp", REMOTE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::NotFound));
    assert!(err.is_authentication_failure());
}

#[tokio::test]
async fn test_change_interval_sets_credential_expiry() {
    let config = test_config();
    let h = harness(config.clone()).await;
    register(&h, "lena", "Tiger7Lamp").await;

    let until = active_valid_until(&h, "lena").await.expect("Credential should expire");
    let minutes = minutes_from_now(until);
    assert!((90 * 1440 - 5..=90 * 1440).contains(&minutes), "{minutes}");

    h.credentials
        .change_password("lena", "Cobra8Wind")
        .await
        .unwrap();
    let until = active_valid_until(&h, "lena").await.expect("Credential should expire");
    let minutes = minutes_from_now(until);
    assert!((90 * 1440 - 5..=90 * 1440).contains(&minutes), "{minutes}");

    // Same database, expiry switched off.
    let mut config = config;
    config.password_rules.change_interval = 0;
    let h = harness(config).await;
    h.credentials
        .change_password("lena", "Mango5Desk")
        .await
        .unwrap();
    assert_eq!(active_valid_until(&h, "lena").await, None);
    h.credentials
        .validate_password("lena", "Mango5Desk", REMOTE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_admin_credential_never_expires() {
    let h = harness(test_config()).await;
    register_from(&h, "admin", "Tiger7Lamp", "127.0.0.1").await;

    let admin = user(&h, "admin").await;
    assert!(!admin.password_expires);
    assert_eq!(active_valid_until(&h, "admin").await, None);

    h.credentials
        .change_password("admin", "Cobra8Wind")
        .await
        .unwrap();
    assert_eq!(active_valid_until(&h, "admin").await, None);
}

#[tokio::test]
async fn test_oversized_password_is_refused_without_counting() {
    let h = harness(test_config()).await;
    register(&h, "mona", "Tiger7Lamp").await;
    let huge = "Ab1".repeat(50_000);

    for _ in 0..5 {
        let err = h
            .credentials
            .validate_password("mona", &huge, REMOTE)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::WrongPassword));
    }
    let mona = user(&h, "mona").await;
    assert_eq!(mona.failed_password_attempts, 0);
    assert!(!mona.locked_out);

    let err = h
        .credentials
        .change_password("mona", &huge)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CredentialError::Policy(PolicyViolation::TooLong(128))
    ));
    assert_eq!(h.store.password_history(mona.id).await.unwrap().len(), 1);
}
