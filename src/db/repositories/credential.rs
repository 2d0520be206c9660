use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;

use crate::config::SecurityConfig;
use crate::domain::{timestamp, timestamp_days_after, timestamp_minutes_before};
use crate::entities::{prelude::*, user_ips, user_passwords, users};

/// Salted Argon2id hash plus the salt it was produced with.
#[derive(Debug, Clone)]
pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempt {
    pub attempts: i32,
    pub locked_out: bool,
}

/// How a new credential version is opened.
#[derive(Debug, Clone)]
pub struct RotateRequest {
    /// How many of the most recent credentials the candidate must differ from.
    pub history_depth: u64,
    /// Lifetime of the new credential; `None` leaves it open-ended.
    pub valid_days: Option<i64>,
    pub temporary: bool,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    Reused,
}

/// Hash `salt ++ password` with a fresh per-credential salt.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<HashedPassword> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let salted = format!("{}{password}", salt.as_str());
    let hash = argon2
        .hash_password(salted.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(HashedPassword {
        hash: hash.to_string(),
        salt: salt.as_str().to_string(),
    })
}

/// Check `password` against a stored credential. Parameters come from the PHC string.
pub fn verify_password(password: &str, salt: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    let salted = format!("{salt}{password}");
    Ok(Argon2::default()
        .verify_password(salted.as_bytes(), &parsed)
        .is_ok())
}

#[must_use]
pub fn generate_temporary_password(length: usize) -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Credentials whose interval contains `now`.
fn active_at(now: &str) -> Condition {
    Condition::all()
        .add(user_passwords::Column::ValidFrom.lte(now))
        .add(
            Condition::any()
                .add(user_passwords::Column::ValidUntil.is_null())
                .add(user_passwords::Column::ValidUntil.gt(now)),
        )
}

pub(crate) async fn close_active<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    now: &str,
) -> Result<u64, DbErr> {
    let result = UserPasswords::update_many()
        .col_expr(
            user_passwords::Column::ValidUntil,
            Expr::value(now.to_string()),
        )
        .filter(user_passwords::Column::UserId.eq(user_id))
        .filter(active_at(now))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

pub(crate) async fn insert_credential<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    hashed: HashedPassword,
    temporary: bool,
    valid_from: &str,
    valid_until: Option<String>,
) -> Result<(), DbErr> {
    UserPasswords::insert(user_passwords::ActiveModel {
        user_id: Set(user_id),
        password_hash: Set(hashed.hash),
        password_salt: Set(hashed.salt),
        temporary: Set(temporary),
        valid_from: Set(valid_from.to_string()),
        valid_until: Set(valid_until),
        ..Default::default()
    })
    .exec(db)
    .await?;

    Ok(())
}

/// Password versions, failure bookkeeping and lockout.
///
/// Every write that opens or closes a credential holds `save_lock` for its
/// whole transaction.
pub struct CredentialRepository {
    conn: DatabaseConnection,
    save_lock: Arc<Mutex<()>>,
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, save_lock: Arc<Mutex<()>>) -> Self {
        Self { conn, save_lock }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<users::Model>> {
        Users::find()
            .filter(users::Column::LoweredUsername.eq(username.trim().to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }

    pub async fn active_credential(
        &self,
        user_id: i32,
        now: &str,
    ) -> Result<Option<user_passwords::Model>> {
        UserPasswords::find()
            .filter(user_passwords::Column::UserId.eq(user_id))
            .filter(active_at(now))
            .order_by_desc(user_passwords::Column::Id)
            .one(&self.conn)
            .await
            .context("Failed to query active credential")
    }

    pub async fn allowed_ips(&self, user_id: i32) -> Result<Vec<String>> {
        let rows = UserIps::find()
            .filter(user_ips::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await
            .context("Failed to query user IP allow-list")?;

        Ok(rows.into_iter().map(|r| r.ip).collect())
    }

    pub async fn replace_allowed_ips(&self, user_id: i32, ips: &[String]) -> Result<()> {
        let txn = self.conn.begin().await?;

        UserIps::delete_many()
            .filter(user_ips::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        if !ips.is_empty() {
            let rows: Vec<user_ips::ActiveModel> = ips
                .iter()
                .map(|ip| user_ips::ActiveModel {
                    user_id: Set(user_id),
                    ip: Set(ip.clone()),
                    ..Default::default()
                })
                .collect();

            UserIps::insert_many(rows).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Verify a plaintext against a stored credential off the async runtime.
    pub async fn verify(&self, credential: &user_passwords::Model, password: &str) -> Result<bool> {
        let password = password.to_string();
        let salt = credential.password_salt.clone();
        let hash = credential.password_hash.clone();

        task::spawn_blocking(move || verify_password(&password, &salt, &hash))
            .await
            .context("Password verification task panicked")?
    }

    /// Count a failed attempt and lock the account once `max_attempts` is reached.
    ///
    /// The counter restarts at 1 when the first failure of the current run is
    /// older than `window_minutes` (0 keeps the run open). `max_attempts` of 0
    /// never locks.
    pub async fn record_failure(
        &self,
        user_id: i32,
        at: DateTime<Utc>,
        window_minutes: i64,
        max_attempts: i32,
    ) -> Result<FailedAttempt> {
        let now = timestamp(at);

        let _guard = self.save_lock.lock().await;
        let txn = self.conn.begin().await?;

        let mut restart = Condition::any().add(users::Column::FirstFailedPassword.is_null());
        if window_minutes > 0 {
            let cutoff = timestamp_minutes_before(at, window_minutes)?;
            restart = restart.add(users::Column::FirstFailedPassword.lt(cutoff));
        }

        // Both CASEs read the pre-update row, so the counter and the run start
        // move together in a single statement.
        Users::update_many()
            .col_expr(
                users::Column::FailedPasswordAttempts,
                Expr::case(restart.clone(), 1)
                    .finally(Expr::col(users::Column::FailedPasswordAttempts).add(1))
                    .into(),
            )
            .col_expr(
                users::Column::FirstFailedPassword,
                Expr::case(restart, now.clone())
                    .finally(Expr::col(users::Column::FirstFailedPassword))
                    .into(),
            )
            .col_expr(users::Column::LastFailedPassword, Expr::value(now.clone()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&txn)
            .await
            .context("Failed to record failed password attempt")?;

        let user = Users::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {user_id} disappeared while recording failure"))?;

        let reached = max_attempts > 0 && user.failed_password_attempts >= max_attempts;

        if reached && !user.locked_out {
            Users::update_many()
                .col_expr(users::Column::LockedOut, Expr::value(true))
                .col_expr(users::Column::UpdatedAt, Expr::value(now.clone()))
                .filter(users::Column::Id.eq(user_id))
                .exec(&txn)
                .await?;

            close_active(&txn, user_id, &now).await?;
        }

        txn.commit().await?;

        Ok(FailedAttempt {
            attempts: user.failed_password_attempts,
            locked_out: reached || user.locked_out,
        })
    }

    pub async fn record_success(&self, user_id: i32, at: &str, ip: &str) -> Result<()> {
        Users::update_many()
            .col_expr(users::Column::FailedPasswordAttempts, Expr::value(0))
            .col_expr(
                users::Column::FirstFailedPassword,
                Expr::value(Option::<String>::None),
            )
            .col_expr(users::Column::LastConnectTime, Expr::value(at.to_string()))
            .col_expr(users::Column::LastConnectIp, Expr::value(ip.to_string()))
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to record successful login")?;

        Ok(())
    }

    /// Close the active credential and open a new one for `candidate`, unless it
    /// matches one of the `history_depth` most recent versions.
    pub async fn rotate(
        &self,
        user_id: i32,
        candidate: &str,
        request: RotateRequest,
    ) -> Result<RotateOutcome> {
        let _guard = self.save_lock.lock().await;
        let txn = self.conn.begin().await?;

        let recent = if request.history_depth > 0 {
            UserPasswords::find()
                .filter(user_passwords::Column::UserId.eq(user_id))
                .order_by_desc(user_passwords::Column::Id)
                .limit(request.history_depth)
                .all(&txn)
                .await
                .context("Failed to load password history")?
        } else {
            Vec::new()
        };

        let candidate = candidate.to_string();
        let security = request.security.clone();
        let hashed = task::spawn_blocking(move || -> Result<Option<HashedPassword>> {
            for previous in &recent {
                if verify_password(&candidate, &previous.password_salt, &previous.password_hash)? {
                    return Ok(None);
                }
            }
            hash_password(&candidate, &security).map(Some)
        })
        .await
        .context("Password hashing task panicked")??;

        let Some(hashed) = hashed else {
            return Ok(RotateOutcome::Reused);
        };

        let at = Utc::now();
        let now = timestamp(at);
        let valid_until = request
            .valid_days
            .filter(|days| *days > 0)
            .map(|days| timestamp_days_after(at, days))
            .transpose()?;

        close_active(&txn, user_id, &now).await?;
        insert_credential(&txn, user_id, hashed, request.temporary, &now, valid_until).await?;

        Users::update_many()
            .col_expr(users::Column::LastPasswordChange, Expr::value(now.clone()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(RotateOutcome::Rotated)
    }

    /// Unlock the account and replace its credential with an open-ended temporary one.
    pub async fn issue_temporary(
        &self,
        user_id: i32,
        password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        let password = password.to_string();
        let security = security.clone();
        let hashed = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .context("Password hashing task panicked")??;

        let _guard = self.save_lock.lock().await;
        let txn = self.conn.begin().await?;
        let now = timestamp(Utc::now());

        close_active(&txn, user_id, &now).await?;
        insert_credential(&txn, user_id, hashed, true, &now, None).await?;

        Users::update_many()
            .col_expr(users::Column::LockedOut, Expr::value(false))
            .col_expr(users::Column::FailedPasswordAttempts, Expr::value(0))
            .col_expr(
                users::Column::FirstFailedPassword,
                Expr::value(Option::<String>::None),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Every credential version of a user, newest first.
    pub async fn history(&self, user_id: i32) -> Result<Vec<user_passwords::Model>> {
        UserPasswords::find()
            .filter(user_passwords::Column::UserId.eq(user_id))
            .order_by_desc(user_passwords::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to load password history")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("Secret123!", &fast_security()).unwrap();
        assert!(hashed.hash.starts_with("$argon2id$"));
        assert!(verify_password("Secret123!", &hashed.salt, &hashed.hash).unwrap());
        assert!(!verify_password("Secret124!", &hashed.salt, &hashed.hash).unwrap());
    }

    #[test]
    fn test_salt_is_part_of_the_input() {
        let hashed = hash_password("Secret123!", &fast_security()).unwrap();
        let other = hash_password("Secret123!", &fast_security()).unwrap();
        assert_ne!(hashed.salt, other.salt);
        assert!(!verify_password("Secret123!", &other.salt, &hashed.hash).unwrap());
    }

    #[test]
    fn test_generate_temporary_password() {
        let password = generate_temporary_password(14);
        assert_eq!(password.len(), 14);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
