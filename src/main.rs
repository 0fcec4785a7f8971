use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use chaosgrid::cli::commands;
use chaosgrid::config::engine::EngineConfig;

#[derive(Parser)]
#[command(name = "chaosgrid")]
#[command(about = "A self-mutating grid world that rewrites its own rules while it runs")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "chaosgrid.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the world, start every loop and log snapshots until stopped
    Run {
        /// Grid side length (overrides the config file)
        #[arg(short, long)]
        size: Option<i32>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,

        /// Milliseconds between logged snapshots
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Build a world without scheduling and print a summary
    Summary {
        /// Grid side length (overrides the config file)
        #[arg(short, long)]
        size: Option<i32>,
    },
}

fn load_config(path: &str, size: Option<i32>) -> EngineConfig {
    let mut config = match EngineConfig::from_file_or_default(Path::new(path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(size) = size {
        config.size = size;
    }
    config
}

fn init_logging(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            size,
            seconds,
            interval_ms,
        } => {
            let config = load_config(&cli.config, size);
            init_logging(&config);

            if let Err(e) = commands::run_simulation(config, seconds, interval_ms).await {
                eprintln!("Simulation error: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Summary { size } => {
            let config = load_config(&cli.config, size);
            init_logging(&config);

            if let Err(e) = commands::summary(&config) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
