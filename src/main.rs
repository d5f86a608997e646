use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guardrail_tuner::{
    config::{Config, LogFormat},
    tuner::{cli, TuneArgs},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TuneArgs::parse();

    // Load configuration
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        dataset = %args.dataset.display(),
        "Guardrail tuner starting"
    );

    let result = cli::execute(args, config).await;

    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }

    std::process::exit(result.exit_code);
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
