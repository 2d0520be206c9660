//! `SeaORM` implementation of the `MembershipService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::db::{RoleHistoryEntry, Store};
use crate::domain::now_timestamp;
use crate::entities::{roles, users};
use crate::services::membership_service::{MembershipError, MembershipService};

pub struct SeaOrmMembershipService {
    store: Store,
}

impl SeaOrmMembershipService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    async fn user(&self, username: &str) -> Result<users::Model, MembershipError> {
        self.store
            .get_user(username)
            .await?
            .ok_or_else(|| MembershipError::UnknownUser(username.to_string()))
    }

    async fn role(&self, name: &str) -> Result<roles::Model, MembershipError> {
        self.store
            .find_role(name)
            .await?
            .ok_or_else(|| MembershipError::UnknownRole(name.to_string()))
    }
}

#[async_trait]
impl MembershipService for SeaOrmMembershipService {
    async fn assign_role(&self, username: &str, role: &str) -> Result<bool, MembershipError> {
        let user = self.user(username).await?;
        let role = self.role(role).await?;

        let added = self.store.assign_role(user.id, role.id).await?;
        if added {
            info!(user = %user.username, role = %role.name, "Role granted");
        }
        Ok(added)
    }

    async fn revoke_role(&self, username: &str, role: &str) -> Result<bool, MembershipError> {
        let user = self.user(username).await?;
        let role = self.role(role).await?;

        let removed = self.store.revoke_role(user.id, role.id).await?;
        if removed {
            info!(user = %user.username, role = %role.name, "Role revoked");
        }
        Ok(removed)
    }

    async fn roles_of(&self, username: &str) -> Result<Vec<String>, MembershipError> {
        let user = self.user(username).await?;
        let roles = self.store.roles_of(user.id, &now_timestamp()).await?;
        Ok(roles.into_iter().map(|r| r.name).collect())
    }

    async fn role_has_member(&self, role: &str, username: &str) -> Result<bool, MembershipError> {
        let user = self.user(username).await?;
        let role = self.role(role).await?;
        Ok(self
            .store
            .role_has_member(role.id, user.id, &now_timestamp())
            .await?)
    }

    async fn role_history(&self, username: &str) -> Result<Vec<RoleHistoryEntry>, MembershipError> {
        let user = self.user(username).await?;
        Ok(self.store.role_history(user.id).await?)
    }

    async fn list_roles(&self) -> Result<Vec<String>, MembershipError> {
        let roles = self.store.list_roles().await?;
        Ok(roles.into_iter().map(|r| r.name).collect())
    }
}
