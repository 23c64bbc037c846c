//! Stack commands.

mod apply;
mod destroy;
mod outputs;
mod plan;
mod serve;
mod validate;

use std::path::Path;

use stackplan_core::descriptor::StackConfig;
use stackplan_core::Stack;
use tokio::sync::watch;

use crate::error::{CommandError, Result};
use crate::Global;

pub use apply::ApplyCommand;
pub use destroy::DestroyCommand;
pub use outputs::OutputsCommand;
pub use plan::PlanCommand;
pub use serve::ServeCommand;
pub use validate::ValidateCommand;

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Build the descriptors and print the provisioning order
    Validate(ValidateCommand),

    /// Print the changes an apply would make
    Plan(PlanCommand),

    /// Provision the stack
    Apply(ApplyCommand),

    /// Tear down every applied resource
    Destroy(DestroyCommand),

    /// Print the outputs of the last apply
    Outputs(OutputsCommand),

    /// Serve the route tree with a local gateway emulator
    Serve(ServeCommand),
}

/// Main entry point for stack commands.
pub async fn run(command: Commands, global: Global) -> Result<()> {
    match command {
        Commands::Validate(cmd) => validate::run(cmd, &global).await,
        Commands::Plan(cmd) => plan::run(cmd, &global).await,
        Commands::Apply(cmd) => apply::run(cmd, &global).await,
        Commands::Destroy(cmd) => destroy::run(cmd, &global).await,
        Commands::Outputs(cmd) => outputs::run(cmd, &global).await,
        Commands::Serve(cmd) => serve::run(cmd, &global).await,
    }
}

/// Reads and compiles the stack file.
pub(crate) async fn load_stack(path: &Path) -> Result<Stack> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let config = StackConfig::from_json(&source).map_err(stackplan_core::StackError::from)?;
    let stack = Stack::from_config(&config)?;
    tracing::debug!(
        stack = %stack.name(),
        resources = stack.resources().len(),
        "stack compiled"
    );
    Ok(stack)
}

/// Cancellation signal raised on the first Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling...");
            let _ = tx.send(true);
        }
    });
    rx
}
