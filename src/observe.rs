//! Failure logging around remote calls
//!
//! Every client operation runs through [`observe`], which reports a failure
//! together with the operation context to a [`FailureSink`] and then hands
//! the very same error back to the caller. Sinks only ever see a shared
//! reference, so logging cannot swallow or rewrite an error.

use crate::error::{Error, Result};
use std::future::Future;

/// Identifies an operation in failure logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub operation: &'static str,
    pub profile: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub path: Option<String>,
}

impl OperationContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Default::default()
        }
    }

    pub fn profile(mut self, profile: &str) -> Self {
        self.profile = Some(profile.to_string());
        self
    }

    pub fn bucket(mut self, bucket: &str) -> Self {
        self.bucket = Some(bucket.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }
}

/// Receives failures observed at the call site.
pub trait FailureSink: Send + Sync {
    fn record(&self, context: &OperationContext, error: &Error);
}

/// Default sink: structured `tracing` events.
///
/// Not-found results are routine (existence checks), so they go to `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record(&self, context: &OperationContext, error: &Error) {
        let profile = context.profile.as_deref().unwrap_or("-");
        let bucket = context.bucket.as_deref().unwrap_or("-");
        let key = context.key.as_deref().unwrap_or("-");
        let path = context.path.as_deref().unwrap_or("-");

        match error {
            Error::NotFound { .. } => tracing::debug!(
                operation = context.operation,
                profile,
                bucket,
                key,
                path,
                "{error}"
            ),
            Error::Timeout { .. } => tracing::warn!(
                operation = context.operation,
                profile,
                bucket,
                key,
                path,
                "{error}"
            ),
            _ => tracing::error!(
                operation = context.operation,
                profile,
                bucket,
                key,
                path,
                error = ?error,
                "{} failed",
                context.operation
            ),
        }
    }
}

/// Await `fut`, reporting a failure to `sink` before returning it unchanged.
pub async fn observe<T, F>(sink: &dyn FailureSink, context: OperationContext, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Ok(value),
        Err(error) => {
            sink.record(&context, &error);
            Err(error)
        }
    }
}
