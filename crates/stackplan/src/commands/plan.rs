use stackplan_core::provision::{format_plan, plan_changes};

use crate::error::Result;
use crate::prelude::*;
use crate::state_store::StateStore;
use crate::Global;

/// Print the changes an apply would make, without calling any control plane.
#[derive(Debug, clap::Parser)]
pub struct PlanCommand {}

pub async fn run(_cmd: PlanCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;
    let state = StateStore::new(&global.state).load(stack.name()).await?;
    let plan = plan_changes(&stack, &state);

    if global.is_silent() {
        return Ok(());
    }

    aprintln!("{}", p_c("Deploy Plan:"));
    print_lines(&format_plan(&plan));
    aprintln!();

    if plan.replacements().next().is_some() {
        aprintln!(
            "{}",
            p_r("Some resources need replacement. Remove them from the stack, apply, then add them back.")
        );
    } else if plan.has_changes() {
        aprintln!("{}", p_y("Run `stackplan apply` to apply these changes."));
    } else {
        aprintln!("{}", p_g("Infrastructure is up to date."));
    }

    Ok(())
}
