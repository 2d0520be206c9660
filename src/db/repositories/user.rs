use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::credential::{HashedPassword, insert_credential};
use crate::domain::now_timestamp;
use crate::entities::{prelude::*, roles, user_roles, users};

/// Profile data for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub activated: bool,
    pub password_expires: bool,
}

/// Everything written by a registration, in one transaction.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: NewUser,
    pub password: HashedPassword,
    pub credential_valid_until: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(users::Model),
    UsernameTaken,
    EmailTaken,
}

/// Account listing row (no credential data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    #[serde(skip)]
    pub id: i32,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub activated: bool,
    pub locked_out: bool,
    pub last_connect_time: Option<String>,
}

impl From<users::Model> for UserSummary {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            name: model.name,
            surname: model.surname,
            email: model.email,
            activated: model.activated,
            locked_out: model.locked_out,
            last_connect_time: model.last_connect_time,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
    credential_lock: Arc<Mutex<()>>,
    role_lock: Arc<Mutex<()>>,
}

impl UserRepository {
    #[must_use]
    pub const fn new(
        conn: DatabaseConnection,
        credential_lock: Arc<Mutex<()>>,
        role_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            conn,
            credential_lock,
            role_lock,
        }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::LoweredUsername.eq(username.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }

    /// Insert the user, its first credential and its role grants.
    ///
    /// Holds the credential and role save locks, in that order, so concurrent
    /// registrations of the same name cannot both pass the duplicate check.
    pub async fn create(&self, registration: Registration) -> Result<CreateOutcome> {
        let _credential_guard = self.credential_lock.lock().await;
        let _role_guard = self.role_lock.lock().await;

        let txn = self.conn.begin().await?;
        let lowered_username = registration.user.username.trim().to_lowercase();
        let lowered_email = registration.user.email.trim().to_lowercase();

        let username_taken = Users::find()
            .filter(users::Column::LoweredUsername.eq(&lowered_username))
            .count(&txn)
            .await?
            > 0;
        if username_taken {
            return Ok(CreateOutcome::UsernameTaken);
        }

        let email_taken = Users::find()
            .filter(users::Column::LoweredEmail.eq(&lowered_email))
            .count(&txn)
            .await?
            > 0;
        if email_taken {
            return Ok(CreateOutcome::EmailTaken);
        }

        let now = now_timestamp();
        let user = users::ActiveModel {
            username: Set(registration.user.username.trim().to_string()),
            lowered_username: Set(lowered_username),
            name: Set(registration.user.name),
            surname: Set(registration.user.surname),
            email: Set(registration.user.email.trim().to_string()),
            lowered_email: Set(lowered_email),
            password_expires: Set(registration.user.password_expires),
            activated: Set(registration.user.activated),
            activation_time: Set(registration.user.activated.then(|| now.clone())),
            locked_out: Set(false),
            valid: Set(true),
            failed_password_attempts: Set(0),
            first_failed_password: Set(None),
            last_failed_password: Set(None),
            last_password_change: Set(Some(now.clone())),
            last_connect_time: Set(None),
            last_connect_ip: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .context("Failed to insert user")?;

        insert_credential(
            &txn,
            user.id,
            registration.password,
            false,
            &now,
            registration.credential_valid_until,
        )
        .await
        .context("Failed to insert first credential")?;

        for role_name in &registration.roles {
            let role = Roles::find()
                .filter(roles::Column::LoweredName.eq(role_name.to_lowercase()))
                .one(&txn)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Role not found: {role_name}"))?;

            UserRoles::insert(user_roles::ActiveModel {
                user_id: Set(user.id),
                role_id: Set(role.id),
                valid_from: Set(now.clone()),
                valid_until: Set(None),
                ..Default::default()
            })
            .exec(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(CreateOutcome::Created(user))
    }

    pub async fn set_activated(&self, user_id: i32, activated: bool) -> Result<()> {
        let now = now_timestamp();
        let activation_time = activated.then(|| now.clone());

        Users::update_many()
            .col_expr(users::Column::Activated, Expr::value(activated))
            .col_expr(users::Column::ActivationTime, Expr::value(activation_time))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to update activation")?;

        Ok(())
    }

    /// One page (1-based) of accounts ordered by username, plus the total count.
    pub async fn list(&self, page: u64, per_page: u64) -> Result<(Vec<UserSummary>, u64)> {
        let paginator = Users::find()
            .order_by_asc(users::Column::LoweredUsername)
            .paginate(&self.conn, per_page.max(1));

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((rows.into_iter().map(UserSummary::from).collect(), total))
    }
}
