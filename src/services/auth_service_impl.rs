//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{CreateOutcome, NewUser, Registration, Store, hash_password};
use crate::domain::{
    Identity, ROLE_ADMINISTRATOR, ROLE_MEMBER, now_timestamp, timestamp_days_after,
};
use crate::services::auth_service::{
    AuthError, AuthService, ChangePasswordRequest, LoginRequest, RegisterRequest, RegisteredUser,
    UserListing, UserPage,
};
use crate::services::credential_service::CredentialService;
use crate::services::password_policy::PasswordPolicy;

/// Username that becomes an administrator when registered from a trusted address.
pub const BOOTSTRAP_ADMIN: &str = "admin";

pub struct SeaOrmAuthService {
    store: Store,
    credentials: Arc<dyn CredentialService>,
    config: Config,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, credentials: Arc<dyn CredentialService>, config: Config) -> Self {
        Self {
            store,
            credentials,
            config,
        }
    }

    /// Loopback, or listed in `server.admin_ips`.
    fn is_admin_address(&self, client_ip: &str) -> bool {
        let Ok(addr) = client_ip.trim().parse::<IpAddr>() else {
            return false;
        };
        addr.is_loopback()
            || self
                .config
                .server
                .admin_ips
                .iter()
                .filter_map(|ip| ip.parse::<IpAddr>().ok())
                .any(|ip| ip == addr)
    }

    async fn user_id(&self, username: &str) -> Result<i32, AuthError> {
        self.store
            .get_user(username)
            .await?
            .map(|u| u.id)
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, request: LoginRequest) -> Result<Identity, AuthError> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let outcome = match self
            .credentials
            .validate_password(&request.username, &request.password, &request.client_ip)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_authentication_failure() => {
                metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
                info!(
                    user = %request.username,
                    ip = %request.client_ip,
                    reason = %err,
                    "Login failed"
                );
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => return Err(err.into()),
        };

        let user = self
            .store
            .get_user(&request.username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
        info!(user = %user.username, ip = %request.client_ip, "User logged in");

        let display_name = format!("{} {}", user.name, user.surname);
        Ok(Identity::signed_in(
            user.username,
            &display_name,
            request.language,
            outcome.is_temporary(),
        ))
    }

    async fn register(&self, request: RegisterRequest) -> Result<RegisteredUser, AuthError> {
        let username = request.username.trim().to_string();

        if username.is_empty() {
            return Err(AuthError::Validation("User is empty".to_string()));
        }
        if request.password.is_empty() || request.password != request.confirm_password {
            return Err(AuthError::Validation(
                "Password is empty or is different from it's confirmation.".to_string(),
            ));
        }
        if request.email.trim().is_empty() {
            return Err(AuthError::Validation("E-mail is empty".to_string()));
        }

        PasswordPolicy::from(&self.config.password_rules)
            .check(&username, &request.password)
            .map_err(|v| AuthError::Validation(v.to_string()))?;

        let bootstrap =
            username.eq_ignore_ascii_case(BOOTSTRAP_ADMIN) && self.is_admin_address(&request.client_ip);

        let roles: Vec<String> = if bootstrap {
            vec![ROLE_ADMINISTRATOR.to_string(), ROLE_MEMBER.to_string()]
        } else {
            vec![ROLE_MEMBER.to_string()]
        };
        let activated = bootstrap || self.config.user_activation.auto_activate;
        let password_expires = !bootstrap;

        let change_interval = self.config.password_rules.change_interval;
        let credential_valid_until = if password_expires && change_interval > 0 {
            Some(timestamp_days_after(Utc::now(), change_interval)?)
        } else {
            None
        };

        let password = request.password.clone();
        let security = self.config.security.clone();
        let hashed = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task panicked: {e}")))??;

        let outcome = self
            .store
            .create_user(Registration {
                user: NewUser {
                    username: username.clone(),
                    name: request.name.trim().to_string(),
                    surname: request.surname.trim().to_string(),
                    email: request.email.trim().to_string(),
                    activated,
                    password_expires,
                },
                password: hashed,
                credential_valid_until,
                roles: roles.clone(),
            })
            .await?;

        match outcome {
            CreateOutcome::Created(user) => {
                info!(
                    user = %user.username,
                    ip = %request.client_ip,
                    activated,
                    bootstrap,
                    "User registered"
                );
                Ok(RegisteredUser {
                    username: user.username,
                    activated,
                    roles,
                })
            }
            CreateOutcome::UsernameTaken => {
                Err(AuthError::Conflict("The user name is already taken.".to_string()))
            }
            CreateOutcome::EmailTaken => Err(AuthError::Conflict(
                "The e-mail address is already registered.".to_string(),
            )),
        }
    }

    async fn change_password(
        &self,
        identity: &Identity,
        request: ChangePasswordRequest,
    ) -> Result<Identity, AuthError> {
        let Some(username) = identity.member() else {
            return Err(AuthError::NotLoggedIn);
        };

        if request.old_password.is_empty() {
            return Err(AuthError::Validation(
                "The current password is empty.".to_string(),
            ));
        }
        if request.new_password.is_empty() || request.new_password != request.confirm_password {
            return Err(AuthError::Validation(
                "The new password is empty or is different from it's confirmation.".to_string(),
            ));
        }
        if request.new_password == request.old_password {
            return Err(AuthError::Validation(
                "The new password must be different from the current one.".to_string(),
            ));
        }

        match self
            .credentials
            .validate_password(username, &request.old_password, &request.client_ip)
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_authentication_failure() => {
                warn!(user = %username, reason = %err, "Password change rejected");
                return Err(AuthError::Validation("Old password is not valid.".to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        self.credentials
            .change_password(username, &request.new_password)
            .await?;

        Ok(Identity {
            temporary_password: false,
            ..identity.clone()
        })
    }

    async fn list_users(&self, page: u64, per_page: u64) -> Result<UserPage, AuthError> {
        let (users, total) = self.store.list_users(page, per_page).await?;
        let as_of = now_timestamp();

        let mut listing = Vec::with_capacity(users.len());
        for user in users {
            let roles = self
                .store
                .roles_of(user.id, &as_of)
                .await?
                .into_iter()
                .map(|r| r.name)
                .collect();
            listing.push(UserListing { user, roles });
        }

        let roles = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        Ok(UserPage {
            users: listing,
            total,
            page,
            per_page,
            roles,
        })
    }

    async fn activate_user(&self, username: &str) -> Result<(), AuthError> {
        let id = self.user_id(username).await?;
        self.store.set_user_activated(id, true).await?;
        info!(user = %username, "User activated");
        Ok(())
    }

    async fn reset_password(&self, username: &str) -> Result<String, AuthError> {
        Ok(self.credentials.issue_temporary_password(username).await?)
    }

    async fn set_allowed_ips(&self, username: &str, ips: Vec<String>) -> Result<(), AuthError> {
        let mut cleaned = Vec::with_capacity(ips.len());
        for ip in ips.iter().map(|ip| ip.trim()).filter(|ip| !ip.is_empty()) {
            let addr: IpAddr = ip
                .parse()
                .map_err(|_| AuthError::Validation(format!("Invalid address: {ip}")))?;
            cleaned.push(addr.to_string());
        }

        let id = self.user_id(username).await?;
        self.store.replace_allowed_ips(id, &cleaned).await?;
        info!(user = %username, count = cleaned.len(), "Allowed addresses updated");
        Ok(())
    }
}
