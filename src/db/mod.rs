use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::SecurityConfig;
use crate::domain::{RequestMethod, now_timestamp};
use crate::entities::{roles, user_passwords, users};

pub mod migrator;
pub mod repositories;

pub use repositories::credential::{
    FailedAttempt, HashedPassword, RotateOutcome, RotateRequest, generate_temporary_password,
    hash_password, verify_password,
};
pub use repositories::request::{
    ActionRef, MenuEntry, RequestSeed, ResolveQuery, ResolvedRow, RuleCounts, SeedReport,
};
pub use repositories::role::RoleHistoryEntry;
pub use repositories::user::{CreateOutcome, NewUser, Registration, UserSummary};

/// Database handle plus the process-wide save locks.
///
/// Credential writes and role writes each serialize on their own mutex; a
/// registration takes both, credential first.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    credential_lock: Arc<Mutex<()>>,
    role_lock: Arc<Mutex<()>>,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self {
            conn,
            credential_lock: Arc::new(Mutex::new(())),
            role_lock: Arc::new(Mutex::new(())),
        })
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(
            self.conn.clone(),
            self.credential_lock.clone(),
            self.role_lock.clone(),
        )
    }

    fn credential_repo(&self) -> repositories::credential::CredentialRepository {
        repositories::credential::CredentialRepository::new(
            self.conn.clone(),
            self.credential_lock.clone(),
        )
    }

    fn role_repo(&self) -> repositories::role::RoleRepository {
        repositories::role::RoleRepository::new(self.conn.clone(), self.role_lock.clone())
    }

    fn request_repo(&self) -> repositories::request::RequestRepository {
        repositories::request::RequestRepository::new(self.conn.clone())
    }

    // Users

    pub async fn get_user(&self, username: &str) -> Result<Option<users::Model>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn create_user(&self, registration: Registration) -> Result<CreateOutcome> {
        self.user_repo().create(registration).await
    }

    pub async fn set_user_activated(&self, user_id: i32, activated: bool) -> Result<()> {
        self.user_repo().set_activated(user_id, activated).await
    }

    pub async fn list_users(&self, page: u64, per_page: u64) -> Result<(Vec<UserSummary>, u64)> {
        self.user_repo().list(page, per_page).await
    }

    // Credentials

    pub async fn active_credential(&self, user_id: i32) -> Result<Option<user_passwords::Model>> {
        self.credential_repo()
            .active_credential(user_id, &now_timestamp())
            .await
    }

    pub async fn verify_credential(
        &self,
        credential: &user_passwords::Model,
        password: &str,
    ) -> Result<bool> {
        self.credential_repo().verify(credential, password).await
    }

    pub async fn allowed_ips(&self, user_id: i32) -> Result<Vec<String>> {
        self.credential_repo().allowed_ips(user_id).await
    }

    pub async fn replace_allowed_ips(&self, user_id: i32, ips: &[String]) -> Result<()> {
        self.credential_repo().replace_allowed_ips(user_id, ips).await
    }

    pub async fn record_failed_login(
        &self,
        user_id: i32,
        window_minutes: i64,
        max_attempts: i32,
    ) -> Result<FailedAttempt> {
        self.credential_repo()
            .record_failure(user_id, chrono::Utc::now(), window_minutes, max_attempts)
            .await
    }

    pub async fn record_successful_login(&self, user_id: i32, ip: &str) -> Result<()> {
        self.credential_repo()
            .record_success(user_id, &now_timestamp(), ip)
            .await
    }

    pub async fn rotate_password(
        &self,
        user_id: i32,
        candidate: &str,
        request: RotateRequest,
    ) -> Result<RotateOutcome> {
        self.credential_repo().rotate(user_id, candidate, request).await
    }

    pub async fn issue_temporary_password(
        &self,
        user_id: i32,
        password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.credential_repo()
            .issue_temporary(user_id, password, security)
            .await
    }

    pub async fn password_history(&self, user_id: i32) -> Result<Vec<user_passwords::Model>> {
        self.credential_repo().history(user_id).await
    }

    // Roles

    pub async fn ensure_role(&self, name: &str) -> Result<roles::Model> {
        self.role_repo().ensure(name).await
    }

    pub async fn find_role(&self, name: &str) -> Result<Option<roles::Model>> {
        self.role_repo().find(name).await
    }

    pub async fn list_roles(&self) -> Result<Vec<roles::Model>> {
        self.role_repo().list().await
    }

    pub async fn assign_role(&self, user_id: i32, role_id: i32) -> Result<bool> {
        self.role_repo()
            .assign(user_id, role_id, &now_timestamp())
            .await
    }

    pub async fn revoke_role(&self, user_id: i32, role_id: i32) -> Result<bool> {
        self.role_repo()
            .revoke(user_id, role_id, &now_timestamp())
            .await
    }

    pub async fn roles_of(&self, user_id: i32, as_of: &str) -> Result<Vec<roles::Model>> {
        self.role_repo().roles_of(user_id, as_of).await
    }

    pub async fn role_has_member(&self, role_id: i32, user_id: i32, as_of: &str) -> Result<bool> {
        self.role_repo().has_member(role_id, user_id, as_of).await
    }

    pub async fn role_history(&self, user_id: i32) -> Result<Vec<RoleHistoryEntry>> {
        self.role_repo().history(user_id).await
    }

    // Access rules

    pub async fn seed_access_rules(
        &self,
        catalog: &[RequestSeed],
        role_names: &[&str],
        catch_all_role: &str,
    ) -> Result<SeedReport> {
        self.request_repo()
            .seed(catalog, role_names, catch_all_role)
            .await
    }

    pub async fn resolve_request(
        &self,
        method: RequestMethod,
        url: &str,
        query: &ResolveQuery<'_>,
    ) -> Result<Option<ResolvedRow>> {
        self.request_repo().resolve(method, url, query).await
    }

    pub async fn menu(&self, query: &ResolveQuery<'_>) -> Result<Vec<MenuEntry>> {
        self.request_repo().menu(query).await
    }

    pub async fn referenced_actions(&self) -> Result<Vec<ActionRef>> {
        self.request_repo().referenced_actions().await
    }

    pub async fn access_rule_counts(&self) -> Result<RuleCounts> {
        self.request_repo().counts().await
    }

    pub async fn granted_roles(&self, method: RequestMethod, url: &str) -> Result<Vec<String>> {
        self.request_repo().granted_roles(method, url).await
    }
}
