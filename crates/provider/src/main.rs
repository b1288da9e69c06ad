//! Terraform Provider for write-only data
//!
//! Started by Terraform through the plugin launch protocol, or by hand with
//! `--debug` to print reattach settings.

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wodata_provider::config::{self, ServeConfig};
use wodata_provider::server;

/// Log line format written to stderr
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// terraform-provider-wodata
#[derive(Parser)]
#[command(name = "terraform-provider-wodata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run without Terraform and print TF_REATTACH_PROVIDERS settings
    #[arg(long)]
    debug: bool,

    /// Provider source address used in reattach output
    #[arg(long, env = "WODATA_PROVIDER_ADDRESS", default_value = config::DEFAULT_PROVIDER_ADDRESS)]
    provider_address: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the handshake, so logs go to stderr
    let filter = EnvFilter::new(config::log_filter(|key| std::env::var(key).ok()));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let mut config = ServeConfig::from_env()?;
    config.debug = cli.debug;
    config.provider_address = cli.provider_address;

    if !config.debug && !config.launched_by_terraform() {
        eprintln!("{}", server::NOT_LAUNCHED_BY_TERRAFORM);
        std::process::exit(1);
    }

    info!("Starting wodata Terraform provider {}", env!("CARGO_PKG_VERSION"));

    server::serve(config).await
}
