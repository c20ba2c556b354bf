use std::io::{self as std_io, Write};

use clap::Parser;
use console::style;
use tokio::io::{self, AsyncBufReadExt};
use tracing_subscriber::EnvFilter;

use yellow_tracker::client::YellowTracker;
use yellow_tracker::config::{Config, StoreConfig};
use yellow_tracker::error::{Result, YellowTrackerError};
use yellow_tracker::interfaces::providers::AssetClass;
use yellow_tracker::services::conversation::{InboundMessage, TurnStatus};

#[derive(Parser, Debug)]
#[command(name = "yellow-tracker")]
#[command(about = "Yellow Tracker personal finance assistant")]
struct Cli {
    #[arg(long, env = "YELLOW_TRACKER_CONFIG")]
    config: Option<String>,

    #[arg(long, default_value = "cli_user")]
    user_id: String,

    #[arg(long, default_value_t = false, help = "Keep the ledger in memory only")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Interactive chat (default).
    Chat,
    /// Send a single message.
    Say {
        text: String,
    },
    /// Send a receipt or other image, with an optional caption.
    Photo {
        #[arg(long)]
        path: String,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Send a voice note for transcription.
    Voice {
        #[arg(long)]
        path: String,
    },
    Holdings,
    /// Holdings with current market prices.
    Portfolio,
    Price {
        ticker: String,
        #[arg(long, default_value = "stock")]
        asset_type: String,
    },
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a stored memory by id.
    Forget {
        id: i32,
    },
    Welcome,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,yellow_tracker=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.ephemeral {
        config.store = Some(StoreConfig {
            sqlite_path: None,
            ephemeral: Some(true),
        });
    }
    let tracker = YellowTracker::from_config(config).await?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&tracker, &cli.user_id).await?,
        Commands::Say { text } => {
            let reply = tracker
                .process(&cli.user_id, InboundMessage::Text(text))
                .await?;
            print_reply(&reply.text, reply.status);
        }
        Commands::Photo { path, caption } => {
            let bytes = read_file(&path)?;
            let reply = tracker
                .process(&cli.user_id, InboundMessage::Photo { bytes, caption })
                .await?;
            print_reply(&reply.text, reply.status);
        }
        Commands::Voice { path } => {
            let bytes = read_file(&path)?;
            let format = std::path::Path::new(&path)
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("ogg")
                .to_string();
            let reply = tracker
                .process(&cli.user_id, InboundMessage::Voice { bytes, format })
                .await?;
            print_reply(&reply.text, reply.status);
        }
        Commands::Holdings => {
            let holdings = tracker.holdings(&cli.user_id).await?;
            if holdings.is_empty() {
                println!("{}", style("No holdings.").color256(245));
            }
            for h in holdings {
                println!(
                    "{} {} {} units @ avg {} {} [ID: {}]",
                    style(&h.ticker).color256(214).bold(),
                    style(format!("({})", h.asset_type)).color256(245),
                    h.shares.normalize(),
                    h.avg_cost.normalize(),
                    h.currency,
                    h.id
                );
            }
        }
        Commands::Portfolio => {
            let lines = tracker.portfolio(&cli.user_id).await?;
            if lines.is_empty() {
                println!("{}", style("No holdings.").color256(245));
            }
            for line in lines {
                let value = match (line.price, line.market_value) {
                    (Some(price), Some(value)) => format!(
                        "{} x {} = {} {}",
                        line.holding.shares.normalize(),
                        price.round_dp(4).normalize(),
                        value.round_dp(2),
                        line.holding.currency
                    ),
                    _ => "price unavailable".to_string(),
                };
                println!(
                    "{} {}",
                    style(&line.holding.ticker).color256(214).bold(),
                    value
                );
            }
        }
        Commands::Price { ticker, asset_type } => {
            let class = AssetClass::from_asset_type(&asset_type);
            match tracker.price(&ticker, class).await {
                Some(price) => println!("{} {}", style(&ticker).color256(214).bold(), price),
                None => println!("{}", style("Price unavailable.").color256(245)),
            }
        }
        Commands::History { limit } => {
            for message in tracker.history(&cli.user_id, limit).await? {
                println!(
                    "{} {}",
                    style(format!("{}:", message.role)).color256(81).bold(),
                    message.content
                );
            }
        }
        Commands::Forget { id } => {
            if tracker.forget_memory(&cli.user_id, id).await? {
                println!("Memory {id} deleted.");
            } else {
                println!("{}", style(format!("No memory with id {id}.")).color256(245));
            }
        }
        Commands::Welcome => println!("{}", tracker.welcome()),
    }

    tracker.shutdown();
    Ok(())
}

async fn run_chat(tracker: &YellowTracker, user_id: &str) -> Result<()> {
    println!("{}", style(tracker.welcome()).color256(220));
    println!();
    println!("{}", style("Enter your messages (Ctrl+D to exit):").color256(245));
    let stdin = io::BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    loop {
        print_user_prompt().map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        let line = lines
            .next_line()
            .await
            .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
        let Some(line) = line else {
            println!("\n{}", style("Goodbye").color256(245));
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = tracker
            .process(user_id, InboundMessage::Text(line))
            .await?;
        print_reply(&reply.text, reply.status);
    }
    Ok(())
}

fn print_user_prompt() -> std_io::Result<()> {
    let mut out = std_io::stdout();
    write!(
        out,
        "{} {} ",
        style(">").color256(45).bold(),
        style("You").color256(81).bold()
    )?;
    out.flush()
}

fn print_reply(text: &str, status: TurnStatus) {
    let label = style("Yellow:").color256(214).bold();
    match status {
        TurnStatus::TranslationFailed | TurnStatus::TranscriptionFailed => {
            println!("{} {}", label, style(text).color256(203))
        }
        _ => println!("{} {}", label, text),
    }
}

fn read_file(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| YellowTrackerError::Runtime(format!("{path}: {e}")))
}
