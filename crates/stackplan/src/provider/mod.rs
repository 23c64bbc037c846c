//! Control plane targets.

#[cfg(feature = "aws")]
mod aws;

use std::sync::Arc;

use stackplan_core::provision::{AppliedState, ControlPlane, LocalControlPlane};

use crate::config::Config;
use crate::prelude::*;

/// Where resources are provisioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    /// In-memory control plane, identities derived from names
    #[default]
    Local,
    /// DynamoDB tables for real (AWS_ENDPOINT_URL for a local DynamoDB),
    /// other kinds emulated
    #[cfg(feature = "aws")]
    Aws,
}

/// Builds the control plane for a target, primed with the identities of the
/// previous apply.
pub async fn connect(
    target: Target,
    stack: &str,
    config: &Config,
    prior: &AppliedState,
    silent: bool,
) -> Arc<dyn ControlPlane> {
    let local = LocalControlPlane::new(stack, &config.region, &config.account_id);
    local.seed(prior).await;

    match target {
        Target::Local => {
            if !silent {
                aprintln!("{} Local control plane ({})", p_b("Target:"), config.region);
                aprintln!();
            }
            Arc::new(local)
        }
        #[cfg(feature = "aws")]
        Target::Aws => {
            let aws_config = aws::AwsConfig::from(config);
            if !silent {
                aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
                aprintln!();
            }
            let client = aws::create_client(&aws_config).await;
            Arc::new(aws::AwsControlPlane::new(client, config, local))
        }
    }
}
