//! virtd - remote management daemon for virtualization hosts
//!
//! The daemon accepts length-framed binary remote procedure calls over
//! TCP, authenticates clients via a SASL sub-protocol, and dispatches
//! each call to a hypervisor driver.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod dispatch;
mod handlers;
mod hypervisor;
mod proc_table;
mod sasl;
mod server;
mod session;

use cli::{Cli, Commands};
use config::DaemonConfig;
use dispatch::ServerEnv;
use hypervisor::mem::MemHypervisor;
use sasl::StaticSasl;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cli.verbose { "debug" } else { "info" };
        EnvFilter::new(format!("virtd={level},virtd_common={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Commands::GenerateConfig) = cli.command {
        println!("{}", DaemonConfig::generate_sample());
        return Ok(());
    }

    let config = DaemonConfig::load(cli.config.as_deref())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        auth = ?config.auth_type(),
        "starting virtd"
    );

    let env = Arc::new(ServerEnv {
        hypervisor: Arc::new(MemHypervisor::new()),
        sasl: Arc::new(StaticSasl::new(config.sasl_config())),
        auth: config.auth_type(),
    });

    server::run(config, env).await
}
