use std::sync::Arc;

use anyhow::Result;

use wxbridge::config::Config;
use wxbridge::gateway;
use wxbridge::providers::OpenAIProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let provider = Arc::new(OpenAIProvider::with_config(
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
    ));

    gateway::start(&config, provider).await
}
