//! High-level S3 operations for a named profile

use crate::error::{Error, Result};
use crate::observe::{observe, FailureSink, OperationContext, TracingSink};
use crate::s3::multipart::{MultipartUpload, UploadLimits};
use crate::s3::store::{ObjectBody, ObjectStoreProvider};
use crate::s3::types::{browse_items, Bucket, BrowserItem, ObjectMetadata, S3Object};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// S3 page size cap
const MAX_PAGE_SIZE: usize = 1000;

/// S3 client wrapper. Every call opens its own store for the profile.
#[derive(Clone)]
pub struct ObjectStoreClient {
    provider: Arc<dyn ObjectStoreProvider>,
    limits: UploadLimits,
    sink: Arc<dyn FailureSink>,
}

impl ObjectStoreClient {
    pub fn new(provider: Arc<dyn ObjectStoreProvider>) -> Self {
        Self {
            provider,
            limits: UploadLimits::default(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// All buckets, sorted by name
    pub async fn list_buckets(&self, profile: &str) -> Result<Vec<Bucket>> {
        let context = OperationContext::new("list buckets").profile(profile);
        observe(self.sink.as_ref(), context, async {
            let store = self.provider.connect(profile).await?;
            let mut buckets = store.list_buckets().await?;
            buckets.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(buckets)
        })
        .await
    }

    /// Up to `max_keys` objects under `prefix`, sorted by key.
    ///
    /// Pages are fetched until the store reports the listing is complete or
    /// `max_keys` objects have been collected. A final page that overshoots
    /// is trimmed, so the result never exceeds `max_keys`.
    pub async fn list_objects(
        &self,
        profile: &str,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<S3Object>> {
        let context = OperationContext::new("list objects")
            .profile(profile)
            .bucket(bucket)
            .key(prefix);
        observe(self.sink.as_ref(), context, async {
            if max_keys == 0 {
                return Err(Error::invalid_input("max_keys must be greater than zero"));
            }

            let store = self.provider.connect(profile).await?;
            let page_size = max_keys.min(MAX_PAGE_SIZE) as i32;
            let mut objects = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let page = store
                    .list_objects_page(bucket, prefix, page_size, token.as_deref())
                    .await?;
                objects.extend(page.objects);
                token = page.next_token;

                if !page.is_truncated || token.is_none() || objects.len() >= max_keys {
                    break;
                }
            }

            objects.truncate(max_keys);
            objects.sort_by(|a, b| a.key.cmp(&b.key));
            tracing::debug!("Listed {} objects in s3://{}/{}", objects.len(), bucket, prefix);
            Ok(objects)
        })
        .await
    }

    /// Folder-style view of the listing below `prefix`
    pub async fn browse(
        &self,
        profile: &str,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<BrowserItem>> {
        let objects = self.list_objects(profile, bucket, prefix, max_keys).await?;
        Ok(browse_items(&objects, prefix))
    }

    /// Stream over the object content; the caller owns and drops it
    pub async fn download_object(&self, profile: &str, bucket: &str, key: &str) -> Result<ObjectBody> {
        let context = OperationContext::new("download object")
            .profile(profile)
            .bucket(bucket)
            .key(key);
        observe(self.sink.as_ref(), context, async {
            let store = self.provider.connect(profile).await?;
            store.get_object(bucket, key).await
        })
        .await
    }

    pub async fn get_metadata(&self, profile: &str, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let context = OperationContext::new("get object metadata")
            .profile(profile)
            .bucket(bucket)
            .key(key);
        observe(self.sink.as_ref(), context, async {
            let store = self.provider.connect(profile).await?;
            store.head_object(bucket, key).await
        })
        .await
    }

    /// `true` if metadata can be fetched, `false` on not-found; other
    /// failures propagate
    pub async fn object_exists(&self, profile: &str, bucket: &str, key: &str) -> Result<bool> {
        match self.get_metadata(profile, bucket, key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Upload `content_length` bytes from `content` and return the ETag.
    ///
    /// Payloads up to the single-part threshold go out in one PutObject
    /// bounded by the single-upload deadline; larger ones are sent as a
    /// multipart upload. A source that is shorter or longer than
    /// `content_length` fails with [`Error::InvalidInput`] and stores nothing.
    pub async fn upload_object<R>(
        &self,
        profile: &str,
        bucket: &str,
        key: &str,
        content: &mut R,
        content_length: u64,
        content_type: &str,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let context = OperationContext::new("upload object")
            .profile(profile)
            .bucket(bucket)
            .key(key);
        observe(self.sink.as_ref(), context, async {
            let store = self.provider.connect(profile).await?;

            if self.limits.is_multipart(content_length) {
                tracing::info!(
                    "Uploading {} bytes to s3://{}/{} as multipart",
                    content_length,
                    bucket,
                    key
                );
                let upload =
                    MultipartUpload::initiate(store.as_ref(), bucket, key, content_type, self.limits)
                        .await?
                        .expect_length(content_length);
                return upload.upload_from(content).await;
            }

            // One byte past the declared length tells a long source apart
            let mut buf = Vec::with_capacity(content_length as usize);
            content
                .take(content_length.saturating_add(1))
                .read_to_end(&mut buf)
                .await?;
            if buf.len() as u64 != content_length {
                return Err(Error::invalid_input(format!(
                    "source for s3://{}/{} does not match the declared {} bytes",
                    bucket, key, content_length
                )));
            }

            let timeout = self.limits.single_upload_timeout();
            let etag = tokio::time::timeout(
                timeout,
                store.put_object(bucket, key, Bytes::from(buf), content_type),
            )
            .await
            .map_err(|_| Error::Timeout {
                operation: "upload object",
                timeout,
            })??;

            tracing::info!("Uploaded s3://{}/{} ({} bytes)", bucket, key, content_length);
            Ok(etag)
        })
        .await
    }

    /// Delete an object; deleting a missing key also succeeds
    pub async fn delete_object(&self, profile: &str, bucket: &str, key: &str) -> Result<()> {
        let context = OperationContext::new("delete object")
            .profile(profile)
            .bucket(bucket)
            .key(key);
        observe(self.sink.as_ref(), context, async {
            let store = self.provider.connect(profile).await?;
            store.delete_object(bucket, key).await?;
            tracing::info!("Deleted s3://{}/{}", bucket, key);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::memory::MemoryObjectStore;
    use crate::s3::multipart::CompletedPart;
    use crate::s3::store::ObjectStore;
    use crate::s3::types::ObjectPage;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::Mutex;

    const PROFILE: &str = "dev";

    fn client_with(store: &MemoryObjectStore) -> ObjectStoreClient {
        ObjectStoreClient::new(Arc::new(store.clone()))
    }

    async fn seed(store: &MemoryObjectStore, bucket: &str, keys: &[&str]) {
        store.create_bucket(bucket);
        for key in keys {
            store
                .put_object(bucket, key, Bytes::from(key.as_bytes().to_vec()), "text/plain")
                .await
                .unwrap();
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        operations: Mutex<Vec<(&'static str, String)>>,
    }

    impl FailureSink for RecordingSink {
        fn record(&self, context: &OperationContext, error: &Error) {
            self.operations
                .lock()
                .unwrap()
                .push((context.operation, error.to_string()));
        }
    }

    #[tokio::test]
    async fn test_list_buckets_sorted() {
        let store = MemoryObjectStore::new();
        for name in ["zeta", "alpha", "mid"] {
            store.create_bucket(name);
        }

        let buckets = client_with(&store).list_buckets(PROFILE).await.unwrap();
        let names: Vec<_> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_list_buckets_empty() {
        let store = MemoryObjectStore::new();
        assert!(client_with(&store).list_buckets(PROFILE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_objects_never_exceeds_max_keys() {
        let store = MemoryObjectStore::new();
        let keys: Vec<String> = (0..25).map(|i| format!("logs/{:02}.txt", 24 - i)).collect();
        let key_refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        seed(&store, "bucket1", &key_refs).await;
        let client = client_with(&store);

        for max_keys in [1, 7, 10, 24, 25, 100] {
            let objects = client.list_objects(PROFILE, "bucket1", "logs/", max_keys).await.unwrap();
            assert_eq!(objects.len(), max_keys.min(25));
            assert!(objects.windows(2).all(|w| w[0].key < w[1].key));
        }
    }

    #[tokio::test]
    async fn test_list_objects_follows_continuation_tokens() {
        let store = MemoryObjectStore::new();
        let keys: Vec<String> = (0..2500).map(|i| format!("k{:05}", i)).collect();
        let key_refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        seed(&store, "bucket1", &key_refs).await;

        let objects = client_with(&store)
            .list_objects(PROFILE, "bucket1", "", 2200)
            .await
            .unwrap();
        assert_eq!(objects.len(), 2200);
        assert_eq!(objects[0].key, "k00000");
        assert_eq!(objects[2199].key, "k02199");
    }

    #[tokio::test]
    async fn test_list_objects_zero_max_keys_is_invalid() {
        let store = MemoryObjectStore::new();
        seed(&store, "bucket1", &["a"]).await;
        let err = client_with(&store)
            .list_objects(PROFILE, "bucket1", "", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_browse_groups_listing() {
        let store = MemoryObjectStore::new();
        seed(&store, "bucket1", &["docs/a.md", "docs/b.md", "top.txt"]).await;

        let items = client_with(&store).browse(PROFILE, "bucket1", "", 100).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_folder());
        assert_eq!(items[1].name(), "top.txt");
    }

    #[tokio::test]
    async fn test_round_trip_then_delete() {
        let store = MemoryObjectStore::new();
        store.create_bucket("bucket1");
        let client = client_with(&store);
        let content = b"line one\nline two\n".to_vec();

        let etag = client
            .upload_object(
                PROFILE,
                "bucket1",
                "dir/file.txt",
                &mut Cursor::new(content.clone()),
                content.len() as u64,
                "text/plain",
            )
            .await
            .unwrap();
        assert!(!etag.is_empty());

        let mut body = client.download_object(PROFILE, "bucket1", "dir/file.txt").await.unwrap();
        let mut downloaded = Vec::new();
        body.read_to_end(&mut downloaded).await.unwrap();
        assert_eq!(downloaded, content);

        let meta = client.get_metadata(PROFILE, "bucket1", "dir/file.txt").await.unwrap();
        assert_eq!(meta.content_length, content.len() as u64);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));

        assert!(client.object_exists(PROFILE, "bucket1", "dir/file.txt").await.unwrap());
        client.delete_object(PROFILE, "bucket1", "dir/file.txt").await.unwrap();
        assert!(!client.object_exists(PROFILE, "bucket1", "dir/file.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let store = MemoryObjectStore::new();
        store.create_bucket("bucket1");
        client_with(&store)
            .delete_object(PROFILE, "bucket1", "never-existed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_object_exists_propagates_other_errors() {
        let store = MemoryObjectStore::new();
        let err = client_with(&store)
            .object_exists("", "bucket1", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_failures_are_logged_and_returned_unchanged() {
        let store = MemoryObjectStore::new();
        let sink = Arc::new(RecordingSink::default());
        let client = client_with(&store).with_sink(sink.clone());

        let err = client.get_metadata(PROFILE, "missing", "k").await.unwrap_err();
        assert!(err.is_not_found());

        let recorded = sink.operations.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "get object metadata");
        assert_eq!(recorded[0].1, err.to_string());
    }

    /// Counts which upload path the client takes
    #[derive(Clone, Default)]
    struct RoutingStore {
        inner: MemoryObjectStore,
        puts: Arc<Mutex<usize>>,
        parts: Arc<Mutex<Vec<usize>>>,
        hang_put: bool,
    }

    #[async_trait]
    impl ObjectStoreProvider for RoutingStore {
        async fn connect(&self, _profile: &str) -> Result<Box<dyn ObjectStore>> {
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl ObjectStore for RoutingStore {
        async fn list_buckets(&self) -> Result<Vec<Bucket>> {
            self.inner.list_buckets().await
        }

        async fn list_objects_page(&self, b: &str, p: &str, m: i32, t: Option<&str>) -> Result<ObjectPage> {
            self.inner.list_objects_page(b, p, m, t).await
        }

        async fn get_object(&self, b: &str, k: &str) -> Result<ObjectBody> {
            self.inner.get_object(b, k).await
        }

        async fn head_object(&self, b: &str, k: &str) -> Result<ObjectMetadata> {
            self.inner.head_object(b, k).await
        }

        async fn put_object(&self, b: &str, k: &str, body: Bytes, ct: &str) -> Result<String> {
            if self.hang_put {
                std::future::pending::<()>().await;
            }
            *self.puts.lock().unwrap() += 1;
            self.inner.put_object(b, k, body, ct).await
        }

        async fn delete_object(&self, b: &str, k: &str) -> Result<()> {
            self.inner.delete_object(b, k).await
        }

        async fn create_multipart_upload(&self, b: &str, k: &str, ct: &str) -> Result<String> {
            self.inner.create_multipart_upload(b, k, ct).await
        }

        async fn upload_part(&self, b: &str, k: &str, id: &str, n: i32, body: Bytes) -> Result<String> {
            self.parts.lock().unwrap().push(body.len());
            self.inner.upload_part(b, k, id, n, body).await
        }

        async fn complete_multipart_upload(
            &self,
            b: &str,
            k: &str,
            id: &str,
            parts: &[CompletedPart],
        ) -> Result<String> {
            self.inner.complete_multipart_upload(b, k, id, parts).await
        }

        async fn abort_multipart_upload(&self, b: &str, k: &str, id: &str) -> Result<()> {
            self.inner.abort_multipart_upload(b, k, id).await
        }
    }

    fn routing_client(store: &RoutingStore) -> ObjectStoreClient {
        store.inner.create_bucket("bucket1");
        ObjectStoreClient::new(Arc::new(store.clone())).with_limits(UploadLimits {
            single_part_threshold: 10,
            part_size: 4,
            single_upload_timeout_secs: 900,
            part_upload_timeout_secs: 300,
        })
    }

    #[tokio::test]
    async fn test_threshold_payload_uses_single_put() {
        let store = RoutingStore::default();
        let client = routing_client(&store);
        let data = vec![1u8; 10];

        client
            .upload_object(PROFILE, "bucket1", "k", &mut Cursor::new(data.clone()), 10, "application/octet-stream")
            .await
            .unwrap();

        assert_eq!(*store.puts.lock().unwrap(), 1);
        assert!(store.parts.lock().unwrap().is_empty());
        assert_eq!(store.inner.object_bytes("bucket1", "k"), Some(data));
    }

    #[tokio::test]
    async fn test_large_payload_uses_multipart() {
        let store = RoutingStore::default();
        let client = routing_client(&store);
        let data: Vec<u8> = (0..11u8).collect();

        let etag = client
            .upload_object(PROFILE, "bucket1", "big", &mut Cursor::new(data.clone()), 11, "application/octet-stream")
            .await
            .unwrap();

        assert!(etag.ends_with("-3\""));
        assert_eq!(*store.puts.lock().unwrap(), 0);
        assert_eq!(*store.parts.lock().unwrap(), vec![4, 4, 3]);
        assert_eq!(store.inner.object_bytes("bucket1", "big"), Some(data));
    }

    #[tokio::test]
    async fn test_single_put_rejects_length_mismatch() {
        let store = RoutingStore::default();
        let client = routing_client(&store);

        for (data, declared) in [(vec![1u8, 2, 3], 10), (vec![1u8, 2, 3, 4, 5], 2)] {
            let err = client
                .upload_object(PROFILE, "bucket1", "k", &mut Cursor::new(data), declared, "text/plain")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }

        assert_eq!(*store.puts.lock().unwrap(), 0);
        assert!(store.inner.object_bytes("bucket1", "k").is_none());
    }

    #[tokio::test]
    async fn test_multipart_rejects_length_mismatch() {
        let store = RoutingStore::default();
        let client = routing_client(&store);

        // shorter than declared: every part goes up, completion never happens
        let err = client
            .upload_object(PROFILE, "bucket1", "short", &mut Cursor::new(vec![7u8; 11]), 15, "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.inner.object_bytes("bucket1", "short").is_none());

        // longer than declared: stops at the chunk that crosses the length
        let err = client
            .upload_object(PROFILE, "bucket1", "long", &mut Cursor::new(vec![7u8; 20]), 11, "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.inner.object_bytes("bucket1", "long").is_none());

        assert_eq!(store.inner.open_uploads(), 0);
        assert_eq!(*store.puts.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_put_timeout_is_distinct() {
        let store = RoutingStore {
            hang_put: true,
            ..Default::default()
        };
        let client = routing_client(&store);

        let err = client
            .upload_object(PROFILE, "bucket1", "k", &mut Cursor::new(vec![0u8; 3]), 3, "text/plain")
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "upload object timed out after 900 seconds");
    }
}
