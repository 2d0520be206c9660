use crate::config::Config;
use crate::db::Store;
use crate::services::{CredentialError, CredentialService, SeaOrmCredentialService};

pub async fn cmd_reset_password(config: &Config, username: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let credentials = SeaOrmCredentialService::new(
        store,
        config.password_rules.clone(),
        config.security.clone(),
    );

    match credentials.issue_temporary_password(username).await {
        Ok(password) => {
            println!("✓ {username} unlocked");
            println!("  Temporary password: {password}");
            println!("  It must be changed at the next login.");
        }
        Err(CredentialError::NotFound) => {
            println!("User '{username}' not found.");
        }
        Err(e) => return Err(anyhow::anyhow!(e)),
    }

    Ok(())
}
