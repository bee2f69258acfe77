use lookout_agent::Agent;
use lookout_agent::config::Config;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting lookout agent...");

    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: disconnect={}s, expire={}s, evict every {}s, report every {}s, {} rule lists",
        config.player_disconnect_timeout,
        config.player_expire_timeout,
        config.evict_interval.as_secs(),
        config.report_interval.as_secs(),
        config.rule_lists.len()
    );

    let agent = Agent::new(config).await?;
    agent.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}
