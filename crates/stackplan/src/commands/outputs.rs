use stackplan_core::provision::StackOutputs;

use crate::error::Result;
use crate::prelude::*;
use crate::state_store::StateStore;
use crate::Global;

/// Print the outputs recorded by the last successful apply.
#[derive(Debug, clap::Parser)]
pub struct OutputsCommand {
    /// Print the outputs as a JSON object.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(cmd: OutputsCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;
    let state = StateStore::new(&global.state).load(stack.name()).await?;

    if cmd.json {
        aprintln!("{}", serde_json::to_string_pretty(&state.outputs)?);
        return Ok(());
    }

    if global.is_silent() {
        return Ok(());
    }

    if state.outputs.is_empty() {
        aprintln!(
            "{}",
            p_y("No outputs recorded. Run `stackplan apply` first.")
        );
        return Ok(());
    }

    print_outputs(&state.outputs);
    Ok(())
}

pub(crate) fn print_outputs(outputs: &StackOutputs) {
    aprintln!("{}", p_c("Outputs:"));
    let width = outputs.keys().map(|k| k.len()).max().unwrap_or(0);
    for (name, value) in outputs {
        aprintln!("  {} {}", p_b(&format!("{:<width$}", name)), value);
    }
}
