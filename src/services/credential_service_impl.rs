//! `SeaORM` implementation of the `CredentialService` trait.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{PasswordRulesConfig, SecurityConfig};
use crate::db::{RotateOutcome, RotateRequest, Store, generate_temporary_password};
use crate::domain::ValidationOutcome;
use crate::services::credential_service::{CredentialError, CredentialService};
use crate::services::password_policy::PasswordPolicy;

pub struct SeaOrmCredentialService {
    store: Store,
    rules: PasswordRulesConfig,
    security: SecurityConfig,
}

impl SeaOrmCredentialService {
    #[must_use]
    pub const fn new(store: Store, rules: PasswordRulesConfig, security: SecurityConfig) -> Self {
        Self {
            store,
            rules,
            security,
        }
    }
}

#[async_trait]
impl CredentialService for SeaOrmCredentialService {
    async fn validate_password(
        &self,
        username: &str,
        password: &str,
        client_ip: &str,
    ) -> Result<ValidationOutcome, CredentialError> {
        // Oversized input is refused before the lookup and the hash.
        if PasswordPolicy::from(&self.rules).exceeds_max_length(password) {
            return Err(CredentialError::WrongPassword);
        }

        let user = self
            .store
            .get_user(username)
            .await?
            .ok_or(CredentialError::NotFound)?;

        if user.locked_out {
            return Err(CredentialError::LockedOut);
        }
        if !user.activated {
            return Err(CredentialError::NotActivated);
        }
        if !user.valid {
            return Err(CredentialError::Invalid);
        }

        let credential = self
            .store
            .active_credential(user.id)
            .await?
            .ok_or(CredentialError::NotFound)?;

        let allowed = self.store.allowed_ips(user.id).await?;
        if !allowed.is_empty() && !allowed.iter().any(|ip| ip == client_ip) {
            return Err(CredentialError::IpNotAllowed);
        }

        if !self.store.verify_credential(&credential, password).await? {
            let attempt = self
                .store
                .record_failed_login(
                    user.id,
                    self.rules.password_fail_interval,
                    self.rules.max_allowed_failed_atmpts,
                )
                .await?;

            if attempt.locked_out {
                metrics::counter!("auth_lockouts_total").increment(1);
                warn!(
                    user = %user.username,
                    attempts = attempt.attempts,
                    ip = %client_ip,
                    "Account locked after repeated failed logins"
                );
                return Err(CredentialError::LockedOut);
            }

            return Err(CredentialError::WrongPassword);
        }

        self.store.record_successful_login(user.id, client_ip).await?;

        Ok(if credential.temporary {
            ValidationOutcome::TemporaryPassword
        } else {
            ValidationOutcome::Ok
        })
    }

    async fn change_password(
        &self,
        username: &str,
        new_password: &str,
    ) -> Result<(), CredentialError> {
        let user = self
            .store
            .get_user(username)
            .await?
            .ok_or(CredentialError::NotFound)?;

        PasswordPolicy::from(&self.rules).check(&user.username, new_password)?;

        let valid_days = (user.password_expires && self.rules.change_interval > 0)
            .then_some(self.rules.change_interval);

        let outcome = self
            .store
            .rotate_password(
                user.id,
                new_password,
                RotateRequest {
                    history_depth: self.rules.not_repeat_last_x_passwords,
                    valid_days,
                    temporary: false,
                    security: self.security.clone(),
                },
            )
            .await?;

        match outcome {
            RotateOutcome::Rotated => {
                info!(user = %user.username, "Password changed");
                Ok(())
            }
            RotateOutcome::Reused => Err(CredentialError::Reused),
        }
    }

    async fn issue_temporary_password(&self, username: &str) -> Result<String, CredentialError> {
        let user = self
            .store
            .get_user(username)
            .await?
            .ok_or(CredentialError::NotFound)?;

        let password = generate_temporary_password(self.security.temporary_password_length);
        self.store
            .issue_temporary_password(user.id, &password, &self.security)
            .await?;

        info!(user = %user.username, "Temporary password issued");
        Ok(password)
    }
}
