use crate::{helpers::load_config::Config, runtime};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "twitter-to-kafka-service",
    long_about = "Connects to the Twitter filtered stream, filters by the configured keywords and logs every received status.",
    about = "Keyword filtered Twitter status ingestion",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        twitter-to-kafka-service run --config /etc/twitter-to-kafka-service.toml
        twitter-to-kafka-service validate --config ./twitter-to-kafka-service.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the service until SIGINT/SIGTERM
    Run {
        #[arg(short, long, default_value = "/etc/twitter-to-kafka-service.toml")]
        config: PathBuf,
    },

    /// Load and validate a configuration file, then print it
    Validate {
        #[arg(short, long, default_value = "/etc/twitter-to-kafka-service.toml")]
        config: PathBuf,
    },

    /// Display version information
    Version,
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => runtime::runtime::run_service(config).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Validate configuration file
fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    println!("Configuration valid:\n{:#?}", redacted(cfg));
    Ok(())
}

/// Hide the bearer token before printing.
fn redacted(mut cfg: Config) -> Config {
    if cfg.twitter.bearer_token.is_some() {
        cfg.twitter.bearer_token = Some("<redacted>".into());
    }
    cfg
}

/// Show version information
fn show_version() {
    println!("twitter-to-kafka-service {}", env!("CARGO_PKG_VERSION"));
}
