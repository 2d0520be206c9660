//! Domain service for password credentials.
//!
//! Validates logins against the active credential, rotates passwords under the
//! configured policy and issues administrator-generated temporary passwords.

use thiserror::Error;

use crate::domain::ValidationOutcome;
use crate::services::password_policy::PolicyViolation;

/// Why a credential operation failed. Callers facing the public must collapse
/// the authentication variants into one generic message.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Unknown user or no active password")]
    NotFound,

    #[error("Account is locked out")]
    LockedOut,

    #[error("Account is not activated")]
    NotActivated,

    #[error("Account is not valid")]
    Invalid,

    #[error("Address not accepted for this account")]
    IpNotAllowed,

    #[error("Wrong password")]
    WrongPassword,

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("The password was used recently. Choose a different one.")]
    Reused,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Failures that mean "these credentials do not authenticate".
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::LockedOut
                | Self::NotActivated
                | Self::Invalid
                | Self::IpNotAllowed
                | Self::WrongPassword
        )
    }
}

impl From<sea_orm::DbErr> for CredentialError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for CredentialError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait CredentialService: Send + Sync {
    /// Checks a plaintext against the user's active credential.
    ///
    /// A mismatch counts toward the lockout threshold; reaching it locks the
    /// account and closes the active credential.
    async fn validate_password(
        &self,
        username: &str,
        password: &str,
        client_ip: &str,
    ) -> Result<ValidationOutcome, CredentialError>;

    /// Opens a new credential version after policy and reuse checks.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Policy`] or [`CredentialError::Reused`] when
    /// the candidate is rejected; nothing is written in that case.
    async fn change_password(&self, username: &str, new_password: &str)
    -> Result<(), CredentialError>;

    /// Unlocks the account and replaces its password with a generated temporary
    /// one, returned once.
    async fn issue_temporary_password(&self, username: &str) -> Result<String, CredentialError>;
}
