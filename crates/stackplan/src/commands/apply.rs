use dialoguer::Confirm;
use stackplan_core::descriptor::ResourceKind;
use stackplan_core::provision::{
    format_apply_report, format_plan, plan_changes, Driver, RemovalStatus,
};

use super::outputs::print_outputs;
use crate::config::Config;
use crate::error::{CommandError, Result};
use crate::prelude::*;
use crate::provider::{self, Target};
use crate::state_store::StateStore;
use crate::Global;

/// Provision the stack.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Provision the stack.

Shows the change plan, asks for confirmation, then creates or updates every
resource in dependency order. Independent resources are provisioned
concurrently. A failed resource blocks only the resources depending on it.
Ctrl+C stops new work; calls in flight are reported as indeterminate.

The applied state is saved after every run, successful or not.

Environment variables:
  STACKPLAN_MAX_ATTEMPTS     - Attempts per control plane call (default 5)
  STACKPLAN_BASE_DELAY_MS    - First retry delay (default 200)
  STACKPLAN_MAX_DELAY_MS     - Retry delay cap (default 10000)
  STACKPLAN_MAX_CONCURRENCY  - Calls in flight (default 4)
  AWS_ENDPOINT_URL           - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION                 - AWS region (defaults to us-east-1)")]
pub struct ApplyCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Control plane to provision against.
    #[arg(long, value_enum, default_value_t = Target::Local)]
    pub target: Target,
}

pub async fn run(cmd: ApplyCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;
    let store = StateStore::new(&global.state);
    let prior = store.load(stack.name()).await?;
    let plan = plan_changes(&stack, &prior);

    if !global.is_silent() {
        aprintln!("{}", p_c("Deploy Plan:"));
        print_lines(&format_plan(&plan));
        aprintln!();
    }

    if !plan.has_changes() {
        if !global.is_silent() {
            aprintln!("{}", p_g("Infrastructure is up to date."));
            if !prior.outputs.is_empty() {
                aprintln!();
                print_outputs(&prior.outputs);
            }
        }
        return Ok(());
    }

    if !cmd.force {
        let deletes_data = plan
            .removals
            .iter()
            .any(|r| r.id.kind == ResourceKind::Table && !r.retain);
        let confirmed = if deletes_data {
            Confirm::new()
                .with_prompt("This plan deletes tables. ALL DATA WILL BE LOST. Continue?")
                .default(false)
                .interact()?
        } else {
            Confirm::new()
                .with_prompt("Apply these changes?")
                .default(true)
                .interact()?
        };

        if !confirmed {
            return Err(CommandError::UserCancelled);
        }
    }

    let config = Config::from_env();
    let control_plane =
        provider::connect(cmd.target, stack.name(), &config, &prior, global.is_silent()).await;
    let driver = Driver::new(control_plane, config.driver_options());

    if !global.is_silent() {
        aprintln!("{}", p_b("Applying changes..."));
    }

    let report = driver
        .apply(&stack, &prior, super::cancel_on_ctrl_c())
        .await;
    store.save(&report.state).await?;

    tracing::info!(
        deployment_id = %report.deployment_id,
        mutations = report.mutations(),
        success = report.is_success(),
        "apply finished"
    );

    if !global.is_silent() {
        print_lines(&format_apply_report(&report));
        aprintln!();
        if let Some(outputs) = &report.outputs {
            print_outputs(outputs);
            aprintln!();
        }
    }

    if report.cancelled {
        return Err(CommandError::Interrupted);
    }
    if !report.is_success() {
        return Err(CommandError::ApplyFailed {
            failed: report.failed().count(),
            blocked: report.blocked().count(),
            removals: report
                .removals
                .iter()
                .filter(|r| matches!(r.status, RemovalStatus::Failed(_)))
                .count(),
        });
    }

    if !global.is_silent() {
        aprintln!("{}", p_g("Stack applied successfully."));
    }
    Ok(())
}
