use std::{env, time::Duration};

use stackplan_core::provision::{DriverOptions, RetryPolicy, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};

/// Provisioning configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Attempts per control plane call, first call included (default: 5)
    pub max_attempts: u32,
    /// First retry delay in milliseconds (default: 200)
    pub base_delay_ms: u64,
    /// Retry delay cap in milliseconds (default: 10,000)
    pub max_delay_ms: u64,
    /// Control plane calls in flight (default: 4)
    pub max_concurrency: usize,
    /// Region used for identities and the AWS client (default: "us-east-1")
    pub region: String,
    /// Custom endpoint URL, e.g. a local DynamoDB
    pub endpoint_url: Option<String>,
    /// Account used to build local identities (default: "000000000000")
    pub account_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STACKPLAN_MAX_ATTEMPTS` - Attempts per call (default: 5)
    /// - `STACKPLAN_BASE_DELAY_MS` - First retry delay (default: 200)
    /// - `STACKPLAN_MAX_DELAY_MS` - Retry delay cap (default: 10,000)
    /// - `STACKPLAN_MAX_CONCURRENCY` - Calls in flight (default: 4)
    /// - `STACKPLAN_ACCOUNT_ID` - Local account id (default: "000000000000")
    /// - `AWS_REGION` - Region (default: "us-east-1")
    /// - `AWS_ENDPOINT_URL` - Custom endpoint, unset for AWS
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            max_attempts: lookup("STACKPLAN_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(5),
            base_delay_ms: lookup("STACKPLAN_BASE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            max_delay_ms: lookup("STACKPLAN_MAX_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            max_concurrency: lookup("STACKPLAN_MAX_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(4),
            region: lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: lookup("AWS_ENDPOINT_URL").filter(|v| !v.is_empty()),
            account_id: lookup("STACKPLAN_ACCOUNT_ID")
                .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            retry: self.retry_policy(),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
