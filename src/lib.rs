//! AWS Helper Library
//!
//! Administrative helpers for AWS Systems Manager Parameter Store and S3.
//! The `aws-helper` binary is a thin command line front-end over these
//! modules.

pub mod config;
pub mod credentials;
pub mod error;
pub mod observe;
pub mod s3;
pub mod ssm;
pub mod storages;

pub use error::{Error, Result};
