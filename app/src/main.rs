#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use clap::{Parser, Subcommand};
use parley_config::Config;
use tracing_subscriber::EnvFilter;

mod command;
mod script;

use command::{
    CommandStrategy, ConsoleInput, ConsoleStrategy, InfoStrategy, InitStrategy, TelegramInput,
    TelegramStrategy, VersionStrategy,
};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "parley scripted conversation bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the demo script in this terminal
    Console {
        /// Tick interval in milliseconds (overrides config)
        #[arg(short = 't', long)]
        tick_ms: Option<u64>,
    },
    /// Run the demo script as a Telegram bot
    Telegram {
        /// Bot token (overrides config)
        #[arg(long)]
        token: Option<String>,

        /// Allowed chat ids, comma separated (overrides config)
        #[arg(long, value_delimiter = ',')]
        allow_from: Option<Vec<String>>,
    },
    /// Initialize configuration
    Init,
    /// Show configuration
    Info,
    /// Show version
    Version,
}

/// `RUST_LOG` wins; otherwise the configured level, otherwise `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = Config::load().map_or_else(|_| "info".to_string(), |c| c.log.level);
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();

    match cli.command {
        Commands::Console { tick_ms } => ConsoleStrategy.execute(ConsoleInput { tick_ms }).await,
        Commands::Telegram { token, allow_from } => {
            TelegramStrategy
                .execute(TelegramInput { token, allow_from })
                .await
        }
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Info => InfoStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}
