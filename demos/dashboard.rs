use std::sync::Arc;

use analytics_http::{AnalyticsClient, MemoryCredentialStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("analytics_http=debug")),
        )
        .init();

    let channel_id = std::env::var("ANALYTICS_CHANNEL_ID")?;
    let token = std::env::var("ANALYTICS_TOKEN").unwrap_or_default();

    let client = AnalyticsClient::from_env()?.with_credential_stores(
        Arc::new(MemoryCredentialStore::new().with_value("auth_token", token)),
        Arc::new(MemoryCredentialStore::new()),
    );

    let batch = client.get_batch(&channel_id, 30).await?;
    println!("{}", serde_json::to_string_pretty(&batch)?);

    Ok(())
}
