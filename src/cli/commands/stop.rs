use std::time::Duration;

use anyhow::Context;

use crate::config::Config;

pub async fn cmd_stop(config: &Config) -> anyhow::Result<()> {
    let url = config.stop_url();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("No instance answered at {url}"))?;

    if response.status().is_success() {
        println!("✓ Stop requested");
    } else {
        println!("Stop refused ({}).", response.status());
    }

    Ok(())
}
