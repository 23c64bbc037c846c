use stackplan_core::routes::HttpMethod;

use crate::error::Result;
use crate::prelude::*;
use crate::Global;

/// Build descriptors, bind permissions and resolve the provisioning order.
#[derive(Debug, clap::Parser)]
pub struct ValidateCommand {}

pub async fn run(_cmd: ValidateCommand, global: &Global) -> Result<()> {
    let stack = super::load_stack(&global.config).await?;

    if global.is_silent() {
        return Ok(());
    }

    aprintln!("{} {}", p_b("Stack:"), stack.name());
    aprintln!();

    aprintln!("{}", p_c("Provisioning order:"));
    for (i, id) in stack.order().iter().enumerate() {
        aprintln!("  {:>3}. {}", i + 1, id);
    }
    aprintln!();

    if !stack.roles().is_empty() {
        aprintln!("{}", p_c("Grants:"));
        for role in stack.roles() {
            aprintln!("  {}", p_m(&role.name));
            if role.log_delivery {
                aprintln!("    log delivery");
            }
            for grant in &role.grants {
                let actions: Vec<&str> = grant.actions.iter().map(|a| a.as_str()).collect();
                aprintln!("    {}: {}", grant.table, actions.join(", "));
            }
        }
        aprintln!();
    }

    if let Some(api) = stack.api() {
        aprintln!("{} {} ({})", p_c("Routes:"), api.name, api.stage);
        for node in stack.route_tree().nodes() {
            if node.methods.is_empty() {
                continue;
            }
            let methods: Vec<&str> = node
                .methods
                .iter()
                .map(|b| b.method)
                .filter(|m| *m != HttpMethod::Options)
                .map(|m| m.as_str())
                .collect();
            let preflight = if node.preflight().is_some() {
                " + preflight"
            } else {
                ""
            };
            aprintln!("  {} {}{}", node.path, methods.join(","), preflight);
        }
        aprintln!();
    }

    aprintln!("{}", p_g("Stack is valid."));
    Ok(())
}
