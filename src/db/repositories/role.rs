use anyhow::{Context, Result};
use sea_orm::sea_query::{Condition, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::entities::{prelude::*, roles, user_role_history, user_roles};

/// A closed role assignment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoleHistoryEntry {
    pub role: String,
    pub valid_from: String,
    pub valid_until: Option<String>,
}

/// Insert the role if no role with the same case-folded name exists.
pub(crate) async fn ensure_role<C: ConnectionTrait>(db: &C, name: &str) -> Result<roles::Model, DbErr> {
    let lowered = name.to_lowercase();

    Roles::insert(roles::ActiveModel {
        name: Set(name.to_string()),
        lowered_name: Set(lowered.clone()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(roles::Column::LoweredName)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    Roles::find()
        .filter(roles::Column::LoweredName.eq(lowered))
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("role {name}")))
}

/// Assignments whose interval contains `as_of`.
fn assignment_active_at(as_of: &str) -> Condition {
    Condition::all()
        .add(user_roles::Column::ValidFrom.lte(as_of))
        .add(
            Condition::any()
                .add(user_roles::Column::ValidUntil.is_null())
                .add(user_roles::Column::ValidUntil.gt(as_of)),
        )
}

/// Roles and time-bounded user/role assignments.
pub struct RoleRepository {
    conn: DatabaseConnection,
    save_lock: Arc<Mutex<()>>,
}

impl RoleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, save_lock: Arc<Mutex<()>>) -> Self {
        Self { conn, save_lock }
    }

    pub async fn ensure(&self, name: &str) -> Result<roles::Model> {
        let _guard = self.save_lock.lock().await;
        ensure_role(&self.conn, name)
            .await
            .with_context(|| format!("Failed to ensure role {name}"))
    }

    pub async fn find(&self, name: &str) -> Result<Option<roles::Model>> {
        Roles::find()
            .filter(roles::Column::LoweredName.eq(name.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query role")
    }

    pub async fn list(&self) -> Result<Vec<roles::Model>> {
        Roles::find()
            .order_by_asc(roles::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list roles")
    }

    /// Returns `false` when an active assignment already existed.
    pub async fn assign(&self, user_id: i32, role_id: i32, as_of: &str) -> Result<bool> {
        let _guard = self.save_lock.lock().await;
        let txn = self.conn.begin().await?;

        let existing = UserRoles::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .filter(user_roles::Column::RoleId.eq(role_id))
            .count(&txn)
            .await?;
        if existing > 0 {
            return Ok(false);
        }

        UserRoles::insert(user_roles::ActiveModel {
            user_id: Set(user_id),
            role_id: Set(role_id),
            valid_from: Set(as_of.to_string()),
            valid_until: Set(None),
            ..Default::default()
        })
        .exec(&txn)
        .await
        .context("Failed to insert role assignment")?;

        txn.commit().await?;
        Ok(true)
    }

    /// Close the active assignment, archive it and drop the live row.
    /// Returns `false` when there was nothing to revoke.
    pub async fn revoke(&self, user_id: i32, role_id: i32, as_of: &str) -> Result<bool> {
        let _guard = self.save_lock.lock().await;
        let txn = self.conn.begin().await?;

        let Some(assignment) = UserRoles::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .filter(user_roles::Column::RoleId.eq(role_id))
            .one(&txn)
            .await?
        else {
            return Ok(false);
        };

        UserRoleHistory::insert(user_role_history::ActiveModel {
            user_id: Set(assignment.user_id),
            role_id: Set(assignment.role_id),
            valid_from: Set(assignment.valid_from),
            valid_until: Set(Some(as_of.to_string())),
            ..Default::default()
        })
        .exec(&txn)
        .await
        .context("Failed to archive role assignment")?;

        UserRoles::delete_by_id(assignment.id)
            .exec(&txn)
            .await
            .context("Failed to delete role assignment")?;

        txn.commit().await?;
        Ok(true)
    }

    pub async fn roles_of(&self, user_id: i32, as_of: &str) -> Result<Vec<roles::Model>> {
        Roles::find()
            .join(JoinType::InnerJoin, roles::Relation::UserRoles.def())
            .filter(user_roles::Column::UserId.eq(user_id))
            .filter(assignment_active_at(as_of))
            .order_by_asc(roles::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to query user roles")
    }

    pub async fn has_member(&self, role_id: i32, user_id: i32, as_of: &str) -> Result<bool> {
        let count = UserRoles::find()
            .filter(user_roles::Column::UserId.eq(user_id))
            .filter(user_roles::Column::RoleId.eq(role_id))
            .filter(assignment_active_at(as_of))
            .count(&self.conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn history(&self, user_id: i32) -> Result<Vec<RoleHistoryEntry>> {
        let rows = UserRoleHistory::find()
            .filter(user_role_history::Column::UserId.eq(user_id))
            .order_by_desc(user_role_history::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to query role history")?;

        let roles = self.list().await?;
        Ok(rows
            .into_iter()
            .map(|row| RoleHistoryEntry {
                role: roles
                    .iter()
                    .find(|r| r.id == row.role_id)
                    .map_or_else(|| row.role_id.to_string(), |r| r.name.clone()),
                valid_from: row.valid_from,
                valid_until: row.valid_until,
            })
            .collect())
    }
}
