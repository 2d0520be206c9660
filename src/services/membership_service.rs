//! Domain service for roles and user/role assignments.

use thiserror::Error;

use crate::db::RoleHistoryEntry;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("Role not found: {0}")]
    UnknownRole(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for MembershipError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for MembershipError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait MembershipService: Send + Sync {
    /// Grants `role`; returns `false` if the user already held it.
    async fn assign_role(&self, username: &str, role: &str) -> Result<bool, MembershipError>;

    /// Revokes `role`, archiving the closed assignment; returns `false` if the
    /// user did not hold it.
    async fn revoke_role(&self, username: &str, role: &str) -> Result<bool, MembershipError>;

    /// Role names held right now, sorted.
    async fn roles_of(&self, username: &str) -> Result<Vec<String>, MembershipError>;

    async fn role_has_member(&self, role: &str, username: &str) -> Result<bool, MembershipError>;

    /// Closed assignments, newest first.
    async fn role_history(&self, username: &str) -> Result<Vec<RoleHistoryEntry>, MembershipError>;

    async fn list_roles(&self) -> Result<Vec<String>, MembershipError>;
}
