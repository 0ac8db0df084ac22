//! Server peer binary.
//!
//! Takes no arguments; configuration comes from `$SHADOWPIPE_CONFIG`
//! (default `./config.json`). Exits non-zero if the listener cannot bind.

use shadowpipe::{Config, ServerNode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::load()?;
    let node = ServerNode::bind(config).await?;
    node.run().await?;
    Ok(())
}
