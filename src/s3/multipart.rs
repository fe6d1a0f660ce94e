//! Sequential multipart upload
//!
//! A [`MultipartUpload`] moves through
//! `Initiated -> Uploading -> Completed`, or ends in `Aborted` when anything
//! fails after the upload id was issued. Parts are read in fixed-size chunks
//! and sent one at a time; there is no part-level concurrency.
//!
//! Abort is best-effort: if the abort call itself fails it is logged and the
//! failure that caused the abort is what the caller gets back.

use crate::error::{Error, Result};
use crate::s3::store::ObjectStore;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

const MIB: u64 = 1024 * 1024;

/// S3 part numbers run from 1 to 10,000
pub const MAX_PARTS: i32 = 10_000;

/// Smallest part S3 accepts for anything but the last part
pub const MIN_PART_SIZE: u64 = 5 * MIB;

/// Routing threshold and deadlines for uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Largest payload sent with a single PutObject (100 MiB)
    pub single_part_threshold: u64,
    /// Size of every part except the last (5 MiB)
    pub part_size: u64,
    /// Deadline for a single-shot upload (15 minutes)
    pub single_upload_timeout_secs: u64,
    /// Deadline for each part upload (5 minutes)
    pub part_upload_timeout_secs: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            single_part_threshold: 100 * MIB,
            part_size: 5 * MIB,
            single_upload_timeout_secs: 15 * 60,
            part_upload_timeout_secs: 5 * 60,
        }
    }
}

impl UploadLimits {
    pub fn single_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.single_upload_timeout_secs)
    }

    pub fn part_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.part_upload_timeout_secs)
    }

    /// Whether a payload of `content_length` bytes goes through multipart
    pub fn is_multipart(&self, content_length: u64) -> bool {
        content_length > self.single_part_threshold
    }

    /// Reject a part size S3 would refuse at completion (`EntityTooSmall`)
    pub fn validate(&self) -> Result<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(Error::invalid_input(format!(
                "part size {} is below the S3 minimum of {} bytes",
                self.part_size, MIN_PART_SIZE
            )));
        }
        Ok(())
    }
}

/// A successfully uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Lifecycle of a multipart upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    /// Upload id issued, no parts yet
    Initiated { upload_id: String },
    /// At least one part uploaded
    Uploading {
        upload_id: String,
        parts: Vec<CompletedPart>,
    },
    /// Object assembled
    Completed { etag: String },
    /// Session released after a failure
    Aborted { upload_id: String },
}

/// One multipart upload session against an [`ObjectStore`]
pub struct MultipartUpload<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    key: String,
    limits: UploadLimits,
    expected_length: Option<u64>,
    state: UploadState,
}

impl std::fmt::Debug for MultipartUpload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartUpload")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> MultipartUpload<'a> {
    /// Obtain an upload id. Nothing exists to abort if this fails.
    ///
    /// `limits.part_size` is taken as given; see [`UploadLimits::validate`]
    /// for the S3 minimum.
    pub async fn initiate(
        store: &'a dyn ObjectStore,
        bucket: &str,
        key: &str,
        content_type: &str,
        limits: UploadLimits,
    ) -> Result<Self> {
        if limits.part_size == 0 {
            return Err(Error::invalid_input("part size must be greater than zero"));
        }

        let upload_id = store.create_multipart_upload(bucket, key, content_type).await?;
        tracing::debug!(bucket, key, upload_id = %upload_id, "Initiated multipart upload");

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            limits,
            expected_length: None,
            state: UploadState::Initiated { upload_id },
        })
    }

    /// Require [`upload_from`](Self::upload_from) to read exactly `length`
    /// bytes; a shorter or longer source fails and aborts the upload
    pub fn expect_length(mut self, length: u64) -> Self {
        self.expected_length = Some(length);
        self
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Upload id while the session is open or after abort
    pub fn upload_id(&self) -> Option<&str> {
        match &self.state {
            UploadState::Initiated { upload_id }
            | UploadState::Uploading { upload_id, .. }
            | UploadState::Aborted { upload_id } => Some(upload_id),
            UploadState::Completed { .. } => None,
        }
    }

    /// Parts uploaded so far
    pub fn parts(&self) -> &[CompletedPart] {
        match &self.state {
            UploadState::Uploading { parts, .. } => parts,
            _ => &[],
        }
    }

    /// Upload `chunk` as the next part number
    pub async fn upload_part(&mut self, chunk: Bytes) -> Result<()> {
        let (upload_id, part_number) = match &self.state {
            UploadState::Initiated { upload_id } => (upload_id.clone(), 1),
            UploadState::Uploading { upload_id, parts } => (upload_id.clone(), parts.len() as i32 + 1),
            other => {
                return Err(Error::invalid_input(format!(
                    "cannot upload a part in state {:?}",
                    other
                )))
            }
        };

        if part_number > MAX_PARTS {
            return Err(Error::invalid_input(format!(
                "upload of s3://{}/{} needs more than {} parts",
                self.bucket, self.key, MAX_PARTS
            )));
        }

        let size = chunk.len();
        let timeout = self.limits.part_upload_timeout();
        let etag = tokio::time::timeout(
            timeout,
            self.store
                .upload_part(&self.bucket, &self.key, &upload_id, part_number, chunk),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "upload part",
            timeout,
        })??;

        tracing::debug!(part_number, size, "Uploaded part");

        let part = CompletedPart { part_number, etag };
        match &mut self.state {
            UploadState::Uploading { parts, .. } => parts.push(part),
            state => {
                *state = UploadState::Uploading {
                    upload_id,
                    parts: vec![part],
                }
            }
        }
        Ok(())
    }

    /// Submit the ordered part list and return the object ETag
    pub async fn complete(&mut self) -> Result<String> {
        let (upload_id, parts) = match &self.state {
            UploadState::Uploading { upload_id, parts } => (upload_id.clone(), parts.clone()),
            UploadState::Initiated { .. } => {
                return Err(Error::invalid_input("cannot complete a multipart upload without parts"))
            }
            other => {
                return Err(Error::invalid_input(format!(
                    "cannot complete upload in state {:?}",
                    other
                )))
            }
        };

        if !is_contiguous(&parts) {
            return Err(Error::invalid_input(
                "multipart parts are not contiguous from 1",
            ));
        }

        let etag = self
            .store
            .complete_multipart_upload(&self.bucket, &self.key, &upload_id, &parts)
            .await?;

        tracing::info!(
            "Completed multipart upload of s3://{}/{} in {} parts",
            self.bucket,
            self.key,
            parts.len()
        );

        self.state = UploadState::Completed { etag: etag.clone() };
        Ok(etag)
    }

    /// Release the session. Failures are logged, never returned.
    pub async fn abort(&mut self) {
        let upload_id = match &self.state {
            UploadState::Initiated { upload_id } | UploadState::Uploading { upload_id, .. } => {
                upload_id.clone()
            }
            _ => return,
        };

        let timeout = self.limits.part_upload_timeout();
        let result = tokio::time::timeout(
            timeout,
            self.store
                .abort_multipart_upload(&self.bucket, &self.key, &upload_id),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout {
                operation: "abort multipart upload",
                timeout,
            })
        });

        if let Err(e) = result {
            tracing::warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %upload_id,
                error = %e,
                "Failed to abort multipart upload, orphaned parts may remain"
            );
        }

        self.state = UploadState::Aborted { upload_id };
    }

    /// Read `reader` to the end in part-size chunks, upload each, and
    /// complete. Any failure aborts the session before it is returned.
    pub async fn upload_from<R>(mut self, reader: &mut R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        match self.drive(reader).await {
            Ok(etag) => Ok(etag),
            Err(e) => {
                tracing::warn!(
                    "Multipart upload of s3://{}/{} failed after {} parts: {}",
                    self.bucket,
                    self.key,
                    self.parts().len(),
                    e
                );
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn drive<R>(&mut self, reader: &mut R) -> Result<String>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut total: u64 = 0;
        loop {
            let chunk = read_chunk(reader, self.limits.part_size).await?;
            if chunk.is_empty() {
                break;
            }
            total += chunk.len() as u64;
            if let Some(expected) = self.expected_length.filter(|&e| total > e) {
                return Err(Error::invalid_input(format!(
                    "source for s3://{}/{} is longer than the declared {} bytes",
                    self.bucket, self.key, expected
                )));
            }
            self.upload_part(chunk).await?;
        }

        if let Some(expected) = self.expected_length.filter(|&e| total != e) {
            return Err(Error::invalid_input(format!(
                "source for s3://{}/{} ended after {} of the declared {} bytes",
                self.bucket, self.key, total, expected
            )));
        }
        self.complete().await
    }
}

/// Fill up to `size` bytes, stopping early only at end of stream
async fn read_chunk<R>(reader: &mut R, size: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(size as usize);
    reader.take(size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

fn is_contiguous(parts: &[CompletedPart]) -> bool {
    !parts.is_empty()
        && parts
            .iter()
            .enumerate()
            .all(|(i, p)| p.part_number == i as i32 + 1)
}
