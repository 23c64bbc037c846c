//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `ProviderError`, splitting retryable failures from
//! fatal ones.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stackplan_core::provision::ProviderError;

/// Error codes DynamoDB returns for conditions that clear up on their own.
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "LimitExceededException",
    "ResourceInUseException",
    "InternalServerError",
    "ServiceUnavailable",
];

pub fn is_transient_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(&code)
}

/// Map any DynamoDB SDK error to ProviderError.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, operation: &'static str) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        _ => err.code().is_some_and(is_transient_code),
    };
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));

    if transient {
        ProviderError::Transient(message)
    } else {
        ProviderError::Fatal(message)
    }
}

/// Request builders only fail on missing required fields.
pub fn map_build_error(err: BuildError) -> ProviderError {
    ProviderError::Fatal(format!("Invalid DynamoDB request: {}", err))
}
