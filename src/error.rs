//! Error types shared by the Parameter Store and S3 clients.

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the AWS helper clients.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote resource (object, bucket, parameter path) does not exist.
    #[error("{resource} not found")]
    NotFound {
        /// Human readable resource identifier, e.g. `s3://bucket/key`
        resource: String,
    },

    /// A bounded call exceeded its deadline.
    #[error("{operation} timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        /// Operation that was cancelled
        operation: &'static str,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Caller supplied something unusable: unknown profile, bad page size,
    /// out-of-order multipart calls.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other failure reported by the remote store.
    #[error("{operation} failed: {source}")]
    Transport {
        /// Operation that failed
        operation: &'static str,
        /// Underlying SDK error
        #[source]
        source: BoxError,
    },

    /// Local I/O failure while reading a payload or file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::InvalidInput`] from anything printable.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Wrap a remote failure for `operation`.
    pub fn transport<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Transport {
            operation,
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Classify an AWS SDK error.
///
/// HTTP 404 responses become [`Error::NotFound`] for `resource`; everything
/// else is kept as [`Error::Transport`]. S3 and SSM share the smithy error
/// type, so this serves both clients.
pub(crate) fn map_sdk_error<E>(
    operation: &'static str,
    resource: &str,
    err: SdkError<E, HttpResponse>,
) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ref service_err) = err {
        if service_err.raw().status().as_u16() == 404 {
            return Error::NotFound {
                resource: resource.to_string(),
            };
        }
    }
    Error::transport(operation, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_timed_out() {
        let err = Error::Timeout {
            operation: "upload object",
            timeout: Duration::from_secs(900),
        };
        assert_eq!(err.to_string(), "upload object timed out after 900 seconds");
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transport_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = Error::transport("list buckets", io);
        assert!(err.to_string().starts_with("list buckets failed"));
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            resource: "s3://bucket/missing.txt".to_string(),
        };
        assert_eq!(err.to_string(), "s3://bucket/missing.txt not found");
        assert!(err.is_not_found());
    }
}
