//! stackplan compiles a declarative serverless stack into an ordered set of
//! resources and provisions it against a control plane.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;
mod gateway;
mod prelude;
mod provider;
mod state_store;

/// Declarative serverless stack compiler and provisioner
#[derive(Debug, Parser)]
#[command(name = "stackplan")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: Global,

    #[command(subcommand)]
    command: commands::Commands,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Silence the command output
    #[clap(long, global = true)]
    pub silent: bool,

    /// Enable verbose output
    #[clap(long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[clap(long, global = true)]
    pub log_json: bool,

    /// Stack configuration file
    #[clap(
        long,
        global = true,
        default_value = "stack.json",
        env = "STACKPLAN_CONFIG"
    )]
    pub config: PathBuf,

    /// Applied state file
    #[clap(
        long,
        global = true,
        default_value = ".stackplan/state.json",
        env = "STACKPLAN_STATE"
    )]
    pub state: PathBuf,
}

impl Global {
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

fn init_tracing(global: &Global) {
    let default_filter = if global.is_verbose() {
        "stackplan=debug,stackplan_core=debug"
    } else {
        "stackplan=info,stackplan_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if global.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.global);

    commands::run(cli.command, cli.global).await?;

    Ok(())
}
