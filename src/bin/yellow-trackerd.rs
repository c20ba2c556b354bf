use clap::Parser;
use tracing_subscriber::EnvFilter;
use yellow_tracker::config::Config;
use yellow_tracker::daemon;
use yellow_tracker::error::Result;

#[derive(Parser, Debug)]
#[command(name = "yellow-trackerd")]
#[command(about = "Yellow Tracker HTTP daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7979)]
    port: u16,

    #[arg(long, env = "YELLOW_TRACKER_CONFIG")]
    config: Option<String>,

    #[arg(long, env = "YELLOW_TRACKER_TOKEN")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,yellow_tracker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let token = cli
        .token
        .or_else(|| config.token.clone())
        .unwrap_or_default();
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    daemon::run_with_shutdown(&cli.host, cli.port, config, &token, shutdown).await
}
