//! Provisioning driver: change planning, reference resolution and the
//! concurrent apply against a control plane.

mod driver;
mod error;
mod local;
mod planning;
mod report;
mod resource;
mod retry;
mod state;
mod traits;

pub use driver::{Driver, DriverOptions};
pub use error::{ApplyError, ProviderError, Result};
pub use local::{Call, LocalControlPlane, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
pub use planning::{
    diff_spec, format_plan, format_removals, plan_changes, plan_destroy, Change, Plan,
    PlannedChange, Removal,
};
pub use report::{
    format_apply_report, format_removal_reports, ApplyReport, DestroyReport, RemovalReport,
    RemovalStatus, ResourceReport,
};
pub use resource::{
    resolve_references, Identities, Identity, ResolvedFunction, ResolvedIntegration,
    ResolvedMethod, ResolvedResource, ResolvedRole, ResolvedRoute, ResourceSpec,
};
pub use retry::{with_retry, Backoff, RetryPolicy};
pub use state::{AppliedResource, AppliedState, ResourceState, StackOutputs};
pub use traits::{ControlPlane, EnsureOutcome, Ensured};
