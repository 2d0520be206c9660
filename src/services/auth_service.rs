//! Domain service for the account flows behind the site's forms.
//!
//! Handles login, registration (including the `admin` bootstrap), password
//! changes and the administrator's user management.

use serde::Serialize;
use thiserror::Error;

use crate::db::UserSummary;
use crate::domain::Identity;
use crate::services::credential_service::CredentialError;

pub const INVALID_LOGIN_MESSAGE: &str = "Unknown user or wrong password.";

/// Errors specific to account operations. Display strings are shown to users.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown user or wrong password.")]
    InvalidCredentials,

    #[error("You must be logged in.")]
    NotLoggedIn,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Errors whose message can be shown back on the form that caused them.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::NotLoggedIn
                | Self::UserNotFound(_)
                | Self::Validation(_)
                | Self::Conflict(_)
        )
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Policy(violation) => Self::Validation(violation.to_string()),
            CredentialError::Reused => Self::Validation(CredentialError::Reused.to_string()),
            CredentialError::Database(msg) => Self::Database(msg),
            CredentialError::Internal(msg) => Self::Internal(msg),
            other if other.is_authentication_failure() => Self::InvalidCredentials,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub client_ip: String,
    pub language: String,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub client_ip: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
    pub client_ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub username: String,
    pub activated: bool,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListing {
    #[serde(flatten)]
    pub user: UserSummary,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserListing>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub roles: Vec<String>,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and returns the identity to store in the session.
    ///
    /// # Errors
    ///
    /// Every authentication failure is reported as
    /// [`AuthError::InvalidCredentials`], whatever the cause.
    async fn login(&self, request: LoginRequest) -> Result<Identity, AuthError>;

    /// Creates an account, its first credential and its roles.
    async fn register(&self, request: RegisterRequest) -> Result<RegisteredUser, AuthError>;

    /// Replaces the caller's password and returns the refreshed identity.
    async fn change_password(
        &self,
        identity: &Identity,
        request: ChangePasswordRequest,
    ) -> Result<Identity, AuthError>;

    async fn list_users(&self, page: u64, per_page: u64) -> Result<UserPage, AuthError>;

    async fn activate_user(&self, username: &str) -> Result<(), AuthError>;

    /// Unlocks the account and returns a generated temporary password.
    async fn reset_password(&self, username: &str) -> Result<String, AuthError>;

    /// Restricts logins to the given addresses; an empty list lifts the restriction.
    async fn set_allowed_ips(&self, username: &str, ips: Vec<String>) -> Result<(), AuthError>;
}
