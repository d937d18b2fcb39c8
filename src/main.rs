//! Grid trading engine - entry point.
//!
//! Two subcommands:
//! - `live`: run the engine loop against the real exchange adapter
//! - `backtest`: replay historical candles against the simulated adapter

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-engine")]
#[command(about = "Grid trading engine core: live and backtest drivers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay historical candles through the engine against a simulated exchange
    Backtest {
        /// Path to configuration file
        #[arg(short, long)]
        config: String,

        /// Path to OHLCV CSV data
        #[arg(short, long)]
        data: String,

        /// Optional SQLite path for the event log; in-memory if omitted
        #[arg(long)]
        db: Option<String>,
    },

    /// Run the engine loop against the real exchange adapter
    Live {
        /// Path to configuration file
        #[arg(short, long)]
        config: String,

        /// SQLite path for the event log and session state
        #[arg(long, default_value = "grid-engine.db")]
        db: String,

        /// Current market price, used to resolve the ladder center at startup
        #[arg(long)]
        current_price: f64,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!("{},hyper=warn,reqwest=warn,rustls=warn,h2=warn", level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Live { .. } => "live",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest { config, data, db } => commands::backtest::run(config, data, db).await,
        Commands::Live { config, db, current_price } => commands::live::run(config, db, current_price).await,
    }
}
