//! S3 object storage module
//!
//! This module provides:
//! - [`client::ObjectStoreClient`] - High-level per-profile S3 operations
//! - [`multipart::MultipartUpload`] - Sequential multipart upload state machine
//! - [`store`] - The S3 call surface and its `aws-sdk-s3` implementation
//! - [`memory::MemoryObjectStore`] - In-process store for tests and dry runs
//! - [`types`] - S3 data types (Bucket, S3Object, S3Url, BrowserItem)

pub mod client;
pub mod memory;
pub mod multipart;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use client::ObjectStoreClient;
pub use memory::MemoryObjectStore;
pub use multipart::{CompletedPart, MultipartUpload, UploadLimits, UploadState};
pub use store::{ObjectBody, ObjectStore, ObjectStoreProvider, SdkObjectStore, SdkObjectStoreProvider};
pub use types::{Bucket, BrowserItem, Folder, ObjectMetadata, ObjectPage, S3Object, S3Url};
