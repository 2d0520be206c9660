//! Session-held state: the identity record and the one-shot flash message.

use tower_sessions::Session;
use tracing::warn;

use super::{ApiError, Flash};
use crate::domain::Identity;

pub const IDENTITY_KEY: &str = "identity";
pub const FLASH_KEY: &str = "flash";

/// The session's identity, or an anonymous one in `default_language`.
pub async fn identity(session: &Session, default_language: &str) -> Identity {
    match session.get::<Identity>(IDENTITY_KEY).await {
        Ok(Some(identity)) => identity,
        Ok(None) => Identity::anonymous(default_language),
        Err(e) => {
            warn!(error = %e, "Unreadable session identity, treating as anonymous");
            Identity::anonymous(default_language)
        }
    }
}

/// Stores a freshly authenticated identity under a new session id.
pub async fn sign_in(session: &Session, identity: &Identity) -> Result<(), ApiError> {
    session.cycle_id().await?;
    session.insert(IDENTITY_KEY, identity).await?;
    Ok(())
}

pub async fn update_identity(session: &Session, identity: &Identity) -> Result<(), ApiError> {
    session.insert(IDENTITY_KEY, identity).await?;
    Ok(())
}

pub async fn sign_out(session: &Session) -> Result<(), ApiError> {
    session.remove::<Identity>(IDENTITY_KEY).await?;
    session.cycle_id().await?;
    Ok(())
}

pub async fn set_flash(session: &Session, flash: &Flash) -> Result<(), ApiError> {
    if flash.is_empty() {
        return Ok(());
    }
    session.insert(FLASH_KEY, flash).await?;
    Ok(())
}

/// Returns and clears the pending flash message.
pub async fn take_flash(session: &Session) -> Flash {
    match session.remove::<Flash>(FLASH_KEY).await {
        Ok(flash) => flash.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Unreadable flash message dropped");
            Flash::default()
        }
    }
}
