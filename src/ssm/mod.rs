//! AWS Systems Manager Parameter Store module
//!
//! This module provides:
//! - [`client::ParameterStoreClient`] - Bulk `KEY=VALUE` upload and paged listing
//! - [`store`] - The SSM call surface and its `aws-sdk-ssm` implementation
//! - [`memory::MemoryParameterStore`] - In-process store for tests and dry runs
//! - [`types`] - Parameter data types

pub mod client;
pub mod memory;
pub mod store;
pub mod types;

pub use client::{parse_variables, ParameterStoreClient, MAX_PAGE_SIZE};
pub use memory::MemoryParameterStore;
pub use store::{ParameterStore, SdkParameterStore};
pub use types::{Parameter, ParameterPage};
