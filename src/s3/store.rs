//! Remote object store operations
//!
//! [`ObjectStore`] is the set of S3 calls the clients consume, one method per
//! API operation. [`SdkObjectStore`] implements it over `aws-sdk-s3`; tests
//! and local runs can use [`crate::s3::MemoryObjectStore`] instead.

use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::error::{map_sdk_error, Error, Result};
use crate::s3::multipart::CompletedPart;
use crate::s3::types::{Bucket, ObjectMetadata, ObjectPage, S3Object};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tracing::instrument;

/// Live, single-use reader over an object's content
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// S3 operations consumed by [`crate::s3::ObjectStoreClient`]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    /// One ListObjectsV2 page
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Single-shot upload, returns the object ETag
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<String>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Start a multipart upload, returns the upload id
    async fn create_multipart_upload(&self, bucket: &str, key: &str, content_type: &str) -> Result<String>;

    /// Upload one part, returns the part ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String>;

    /// Finish a multipart upload, returns the object ETag
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;
}

/// Opens an [`ObjectStore`] for a named profile.
///
/// Every client operation connects anew and drops the store when it
/// returns, so no connection state is shared between operations.
#[async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    async fn connect(&self, profile: &str) -> Result<Box<dyn ObjectStore>>;
}

/// Builds `aws-sdk-s3` clients from profile credentials
#[derive(Debug, Clone)]
pub struct SdkObjectStoreProvider {
    resolver: CredentialResolver,
    config: Config,
}

impl SdkObjectStoreProvider {
    pub fn new(resolver: CredentialResolver, config: Config) -> Self {
        Self { resolver, config }
    }
}

#[async_trait]
impl ObjectStoreProvider for SdkObjectStoreProvider {
    async fn connect(&self, profile: &str) -> Result<Box<dyn ObjectStore>> {
        let credentials = self.resolver.resolve_credentials(profile).ok_or_else(|| {
            Error::invalid_input(format!("Profile '{}' not found or invalid", profile))
        })?;

        let credentials = aws_sdk_s3::config::Credentials::new(
            credentials.access_key_id,
            credentials.secret_access_key,
            credentials.session_token,
            None,
            "aws-helper-profile",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(self.config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &self.config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if self.config.force_path_style {
            builder = builder.force_path_style(true);
        }

        tracing::debug!("Connected S3 client for profile '{}' in {}", profile, self.config.region);

        Ok(Box::new(SdkObjectStore {
            client: Client::from_conf(builder.build()),
        }))
    }
}

/// [`ObjectStore`] over an `aws-sdk-s3` client
#[derive(Debug, Clone)]
pub struct SdkObjectStore {
    client: Client,
}

impl SdkObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_chrono(d: &SdkDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(d.secs(), d.subsec_nanos()).unwrap_or_default()
}

fn resource(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

#[async_trait]
impl ObjectStore for SdkObjectStore {
    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error("list buckets", "buckets", e))?;

        Ok(response
            .buckets()
            .iter()
            .map(|b| Bucket {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().map(to_chrono),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys);

        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_sdk_error("list objects", &format!("s3://{}", bucket), e))?;

        let objects = response
            .contents()
            .iter()
            .map(|obj| S3Object {
                bucket: bucket.to_string(),
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
                last_modified: obj.last_modified().map(to_chrono),
                storage_class: obj.storage_class().map(|s| s.as_str().to_string()),
                etag: obj.e_tag().map(|s| s.to_string()),
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token().map(|s| s.to_string()),
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }

    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("get object", &resource(bucket, key), e))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("head object", &resource(bucket, key), e))?;

        Ok(ObjectMetadata {
            content_length: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(|s| s.to_string()),
            etag: response.e_tag().map(|s| s.to_string()),
            last_modified: response.last_modified().map(to_chrono),
            storage_class: response.storage_class().map(|s| s.as_str().to_string()),
            user_metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<String> {
        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error("put object", &resource(bucket, key), e))?;

        Ok(response.e_tag().unwrap_or_default().to_string())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("delete object", &resource(bucket, key), e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_multipart_upload(&self, bucket: &str, key: &str, content_type: &str) -> Result<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error("create multipart upload", &resource(bucket, key), e))?;

        response
            .upload_id()
            .map(|id| id.to_string())
            .ok_or_else(|| Error::transport("create multipart upload", "S3 did not return an upload id"))
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error("upload part", &resource(bucket, key), e))?;

        Ok(response.e_tag().unwrap_or_default().to_string())
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let parts = parts
            .iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error("complete multipart upload", &resource(bucket, key), e))?;

        Ok(response.e_tag().unwrap_or_default().to_string())
    }

    #[instrument(skip(self))]
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("abort multipart upload", &resource(bucket, key), e))?;

        Ok(())
    }
}
