use dialoguer::Confirm;
use stackplan_core::descriptor::ResourceKind;
use stackplan_core::provision::{format_removal_reports, format_removals, plan_destroy, Driver};

use crate::config::Config;
use crate::error::{CommandError, Result};
use crate::prelude::*;
use crate::provider::{self, Target};
use crate::state_store::StateStore;
use crate::Global;

/// Tear down every applied resource, in reverse dependency order.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Tear down every applied resource, in reverse dependency order.

Tables with the retain removal policy are only forgotten: they stay in place
with their data. The first failed removal stops the teardown.")]
pub struct DestroyCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Control plane the stack was applied to.
    #[arg(long, value_enum, default_value_t = Target::Local)]
    pub target: Target,
}

pub async fn run(cmd: DestroyCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;
    let store = StateStore::new(&global.state);
    let prior = store.load(stack.name()).await?;
    let removals = plan_destroy(&prior);

    if removals.is_empty() {
        if !global.is_silent() {
            aprintln!("{}", p_g("Nothing to destroy."));
        }
        return Ok(());
    }

    if !global.is_silent() {
        aprintln!("{}", p_y("Destroy Plan:"));
        print_lines(&format_removals(&removals));
        aprintln!();
    }

    if !cmd.force {
        let deletes_data = removals
            .iter()
            .any(|r| r.id.kind == ResourceKind::Table && !r.retain);
        let prompt = if deletes_data {
            "Are you sure you want to destroy this stack? ALL DATA WILL BE LOST"
        } else {
            "Are you sure you want to destroy this stack?"
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        if !confirmed {
            return Err(CommandError::UserCancelled);
        }
    }

    let config = Config::from_env();
    let control_plane =
        provider::connect(cmd.target, stack.name(), &config, &prior, global.is_silent()).await;
    let driver = Driver::new(control_plane, config.driver_options());

    if !global.is_silent() {
        aprintln!("{}", p_b("Destroying resources..."));
    }

    let report = driver.destroy(&prior, super::cancel_on_ctrl_c()).await;
    store.save(&report.state).await?;

    if !global.is_silent() {
        print_lines(&format_removal_reports(&report.removals));
        aprintln!();
    }

    if !report.is_success() {
        return Err(CommandError::DestroyFailed {
            remaining: report.state.resources.len(),
        });
    }

    if !global.is_silent() {
        aprintln!("{}", p_g("Stack destroyed successfully."));
    }
    Ok(())
}
