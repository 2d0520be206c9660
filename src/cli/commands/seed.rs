use crate::config::Config;
use crate::db::Store;
use crate::services::access_catalog;

pub async fn cmd_seed(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let report = access_catalog::seed(&store).await?;
    let counts = store.access_rule_counts().await?;

    println!("✓ Access rules seeded");
    println!(
        "  Added: {} requests, {} explicit grants, {} inherited, {} catch-all",
        report.requests_added,
        report.grants_added,
        report.inherited_grants,
        report.catch_all_grants
    );
    println!(
        "  Total: {} requests, {} names, {} grants",
        counts.requests, counts.names, counts.grants
    );

    Ok(())
}
