use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tallyd::config::{self, Config};

#[derive(Parser)]
#[command(name = "tallyd", version, about = "Line-oriented JSON counter server")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Directory holding the credential and counter snapshots (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server (default)
    Serve,
    /// Print the effective configuration as TOML
    PrintConfig,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir.clone_from(dir);
        }
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::resolve(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Serve => {
            init_logging(&config);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tallyd");
            tallyd::server::run(config).await
        }
    }
}
