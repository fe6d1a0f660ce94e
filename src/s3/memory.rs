//! In-process S3 store
//!
//! Keeps buckets, objects and open multipart sessions in memory with the
//! same observable behavior the clients rely on: key-ordered listing with
//! continuation tokens, 404s for missing buckets and keys, idempotent delete
//! and part validation on completion.

use crate::error::{Error, Result};
use crate::s3::multipart::CompletedPart;
use crate::s3::store::{ObjectBody, ObjectStore, ObjectStoreProvider};
use crate::s3::types::{Bucket, ObjectMetadata, ObjectPage, S3Object};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct OpenUpload {
    bucket: String,
    key: String,
    content_type: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, (DateTime<Utc>, BTreeMap<String, StoredObject>)>,
    uploads: HashMap<String, OpenUpload>,
    next_upload: u64,
}

/// Shared in-memory store; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
}

fn etag_of(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

fn no_bucket(bucket: &str) -> Error {
    Error::NotFound {
        resource: format!("s3://{}", bucket),
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `bucket` if it doesn't exist yet
    pub fn create_bucket(&self, bucket: &str) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| (Utc::now(), BTreeMap::new()));
    }

    /// Stored bytes of an object, if present
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|(_, objects)| objects.get(key))
            .map(|o| o.data.to_vec())
    }

    /// Multipart sessions neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }
}

#[async_trait]
impl ObjectStoreProvider for MemoryObjectStore {
    async fn connect(&self, profile: &str) -> Result<Box<dyn ObjectStore>> {
        if profile.is_empty() {
            return Err(Error::invalid_input("Profile '' not found or invalid"));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        Ok(self
            .lock()
            .buckets
            .iter()
            .map(|(name, (created, _))| Bucket {
                name: name.clone(),
                creation_date: Some(*created),
            })
            .collect())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: i32,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage> {
        let state = self.lock();
        let (_, objects) = state.buckets.get(bucket).ok_or_else(|| no_bucket(bucket))?;
        let page_size = max_keys.clamp(0, 1000) as usize;

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |token| key.as_str() > token));

        let page: Vec<S3Object> = matching
            .by_ref()
            .take(page_size)
            .map(|(key, o)| S3Object {
                bucket: bucket.to_string(),
                key: key.clone(),
                size: o.data.len() as u64,
                last_modified: Some(o.last_modified),
                storage_class: Some("STANDARD".to_string()),
                etag: Some(o.etag.clone()),
            })
            .collect();

        let is_truncated = matching.next().is_some();
        let next_token = if is_truncated {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_token,
            is_truncated,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let data = self
            .object_bytes(bucket, key)
            .ok_or_else(|| Error::NotFound {
                resource: format!("s3://{}/{}", bucket, key),
            })?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let state = self.lock();
        let object = state
            .buckets
            .get(bucket)
            .and_then(|(_, objects)| objects.get(key))
            .ok_or_else(|| Error::NotFound {
                resource: format!("s3://{}/{}", bucket, key),
            })?;

        Ok(ObjectMetadata {
            content_length: object.data.len() as u64,
            content_type: Some(object.content_type.clone()),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
            storage_class: Some("STANDARD".to_string()),
            user_metadata: HashMap::new(),
        })
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<String> {
        let mut state = self.lock();
        let (_, objects) = state.buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        let etag = etag_of(&body);
        objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.lock();
        let (_, objects) = state.buckets.get_mut(bucket).ok_or_else(|| no_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str, content_type: &str) -> Result<String> {
        let mut state = self.lock();
        if !state.buckets.contains_key(bucket) {
            return Err(no_bucket(bucket));
        }
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            OpenUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        let mut state = self.lock();
        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| Error::NotFound {
            resource: format!("upload {}", upload_id),
        })?;
        let etag = etag_of(&body);
        upload.parts.insert(part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let mut state = self.lock();
        let upload = state.uploads.remove(upload_id).ok_or_else(|| Error::NotFound {
            resource: format!("upload {}", upload_id),
        })?;

        let bad_part = parts
            .iter()
            .find(|p| !matches!(upload.parts.get(&p.part_number), Some((etag, _)) if *etag == p.etag))
            .map(|p| p.part_number);
        if let Some(number) = bad_part {
            state.uploads.insert(upload_id.to_string(), upload);
            return Err(Error::invalid_input(format!("invalid part {}", number)));
        }

        let mut data = Vec::new();
        for part in parts {
            if let Some((_, body)) = upload.parts.get(&part.part_number) {
                data.extend_from_slice(body);
            }
        }

        let etag = format!("{}-{}\"", etag_of(&data).trim_end_matches('"'), parts.len());
        let (_, objects) = state
            .buckets
            .get_mut(&upload.bucket)
            .ok_or_else(|| no_bucket(&upload.bucket))?;
        objects.insert(
            upload.key,
            StoredObject {
                data: Bytes::from(data),
                content_type: upload.content_type,
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn abort_multipart_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.lock().uploads.remove(upload_id);
        Ok(())
    }
}
