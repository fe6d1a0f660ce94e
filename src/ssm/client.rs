//! Bulk upload and listing of Parameter Store values

use crate::error::{Error, Result};
use crate::observe::{observe, FailureSink, OperationContext, TracingSink};
use crate::ssm::store::ParameterStore;
use crate::ssm::types::{Parameter, ParameterPage};
use std::sync::Arc;

/// GetParametersByPath accepts at most 10 results per call
pub const MAX_PAGE_SIZE: i32 = 10;

/// Parse `KEY=VALUE` records.
///
/// Records are separated by `\n` or `\r`. Each is split at its first `=`,
/// so values may contain `=`. Key and value are trimmed. Empty records,
/// records without `=`, and records with an empty key are skipped.
pub fn parse_variables(text: &str) -> Vec<(String, String)> {
    text.split(['\n', '\r'])
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Full parameter name for `key` below `prefix`
pub fn parameter_path(prefix: &str, key: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), key)
}

/// Parameter Store client
#[derive(Clone)]
pub struct ParameterStoreClient {
    store: Arc<dyn ParameterStore>,
    sink: Arc<dyn FailureSink>,
}

impl ParameterStoreClient {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self {
            store,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Write every `KEY=VALUE` record in `text` below `path_prefix`.
    ///
    /// Writes go out one by one and are not transactional: the first failure
    /// stops the batch and is returned, and parameters written before it
    /// stay in place. Returns the number of parameters written.
    ///
    /// Records that [`parse_variables`] skips, including `=value` lines with
    /// an empty key, are dropped without being reported or counted.
    pub async fn upload_variables(&self, text: &str, path_prefix: &str) -> Result<usize> {
        let context = OperationContext::new("upload variables").path(path_prefix);
        observe(self.sink.as_ref(), context, async {
            let records = parse_variables(text);
            let mut written = 0;

            for (key, value) in &records {
                let name = parameter_path(path_prefix, key);
                let version = self.store.put_parameter(&name, value).await?;
                tracing::debug!("Wrote {} (version {})", name, version);
                written += 1;
            }

            tracing::info!("Uploaded {} parameters to {}", written, path_prefix);
            Ok(written)
        })
        .await
    }

    /// One page of parameters below `path_prefix`.
    ///
    /// `search_term` filters only the parameters of this page, matching
    /// name or value case-insensitively. Matches on other pages are found
    /// only by following `next_token`, which is returned as the store gave
    /// it whether or not anything on this page matched.
    pub async fn list_parameters(
        &self,
        path_prefix: &str,
        max_items: i32,
        continuation_token: Option<&str>,
        search_term: Option<&str>,
    ) -> Result<ParameterPage> {
        let context = OperationContext::new("list parameters").path(path_prefix);
        observe(self.sink.as_ref(), context, async {
            if !(1..=MAX_PAGE_SIZE).contains(&max_items) {
                return Err(Error::invalid_input(format!(
                    "max_items must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, max_items
                )));
            }

            let mut page = self
                .store
                .get_parameters_by_path(path_prefix, max_items, continuation_token)
                .await?;

            if let Some(term) = search_term.filter(|t| !t.is_empty()) {
                page.parameters.retain(|p| p.matches(term));
            }
            Ok(page)
        })
        .await
    }

    /// Every parameter below `path_prefix` matching `term`, following all
    /// pages
    pub async fn search_parameters(&self, path_prefix: &str, term: &str) -> Result<Vec<Parameter>> {
        let mut found = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .list_parameters(path_prefix, MAX_PAGE_SIZE, token.as_deref(), Some(term))
                .await?;
            found.extend(page.parameters);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssm::memory::MemoryParameterStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_parse_splits_on_first_equals() {
        assert_eq!(
            parse_variables("A=B=C"),
            vec![("A".to_string(), "B=C".to_string())]
        );
    }

    #[test]
    fn test_parse_skips_blank_and_malformed_lines() {
        let records = parse_variables("FOO=bar\n\nBADLINE\n   \n=orphan\r\nBAZ = spaced out \r");
        assert_eq!(
            records,
            vec![
                ("FOO".to_string(), "bar".to_string()),
                ("BAZ".to_string(), "spaced out".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_allows_empty_value() {
        assert_eq!(parse_variables("EMPTY="), vec![("EMPTY".to_string(), String::new())]);
    }

    #[test]
    fn test_parameter_path_trims_trailing_slashes() {
        assert_eq!(parameter_path("/app/", "FOO"), "/app/FOO");
        assert_eq!(parameter_path("/app", "FOO"), "/app/FOO");
        assert_eq!(parameter_path("/app//", "FOO"), "/app/FOO");
    }

    #[tokio::test]
    async fn test_upload_scenario_writes_exactly_two() {
        let store = MemoryParameterStore::new();
        let client = ParameterStoreClient::new(Arc::new(store.clone()));

        let written = client
            .upload_variables("FOO=bar\nBAZ=1=2\n\nBADLINE\n", "/app/")
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            store.writes(),
            vec![
                ("/app/FOO".to_string(), "bar".to_string()),
                ("/app/BAZ".to_string(), "1=2".to_string()),
            ]
        );
        assert_eq!(store.get("/app/BAZ").unwrap().kind, "String");
    }

    /// Fails the write for one name, delegating the rest
    struct FailOn {
        inner: MemoryParameterStore,
        name: &'static str,
        attempts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ParameterStore for FailOn {
        async fn put_parameter(&self, name: &str, value: &str) -> Result<i64> {
            self.attempts.lock().unwrap().push(name.to_string());
            if name == self.name {
                return Err(Error::transport("put parameter", "AccessDeniedException"));
            }
            self.inner.put_parameter(name, value).await
        }

        async fn get_parameters_by_path(
            &self,
            path: &str,
            max_results: i32,
            next_token: Option<&str>,
        ) -> Result<ParameterPage> {
            self.inner.get_parameters_by_path(path, max_results, next_token).await
        }
    }

    #[tokio::test]
    async fn test_empty_key_record_is_dropped_not_written() {
        let store = MemoryParameterStore::new();
        let client = ParameterStoreClient::new(Arc::new(store.clone()));

        let written = client.upload_variables("=orphan
KEEP=1
", "/app").await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.writes(), vec![("/app/KEEP".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_failure_stops_batch_without_rollback() {
        let inner = MemoryParameterStore::new();
        let store = Arc::new(FailOn {
            inner: inner.clone(),
            name: "/app/B",
            attempts: Mutex::new(Vec::new()),
        });
        let client = ParameterStoreClient::new(store.clone());

        let err = client
            .upload_variables("A=1\nB=2\nC=3\n", "/app")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("AccessDeniedException"));
        assert_eq!(*store.attempts.lock().unwrap(), vec!["/app/A", "/app/B"]);
        assert!(inner.get("/app/A").is_some());
        assert!(inner.get("/app/C").is_none());
    }

    async fn seeded_client() -> ParameterStoreClient {
        let store = MemoryParameterStore::new();
        for i in 0..15 {
            store
                .put_parameter(&format!("/svc/KEY_{:02}", i), &format!("value-{}", i))
                .await
                .unwrap();
        }
        store.put_parameter("/svc/DATABASE_URL", "postgres://db").await.unwrap();
        ParameterStoreClient::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_list_parameters_pages() {
        let client = seeded_client().await;

        let first = client.list_parameters("/svc", 10, None, None).await.unwrap();
        assert_eq!(first.parameters.len(), 10);
        let token = first.next_token.expect("more pages");

        let second = client.list_parameters("/svc", 10, Some(&token), None).await.unwrap();
        assert_eq!(second.parameters.len(), 6);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_search_is_page_scoped() {
        let client = seeded_client().await;

        // "/svc/DATABASE_URL" sorts first, so the first page contains it
        let first = client
            .list_parameters("/svc", 10, None, Some("postgres"))
            .await
            .unwrap();
        assert_eq!(first.parameters.len(), 1);
        let token = first.next_token.expect("token survives filtering");

        // KEY_14 sits on the second page; the first page cannot see it
        let first_only = client
            .list_parameters("/svc", 10, None, Some("value-14"))
            .await
            .unwrap();
        assert!(first_only.parameters.is_empty());

        let second = client
            .list_parameters("/svc", 10, Some(&token), Some("VALUE-14"))
            .await
            .unwrap();
        assert_eq!(second.parameters.len(), 1);
        assert_eq!(second.parameters[0].name, "/svc/KEY_14");
    }

    #[tokio::test]
    async fn test_search_parameters_walks_all_pages() {
        let client = seeded_client().await;
        let found = client.search_parameters("/svc", "key_1").await.unwrap();
        let names: Vec<_> = found.iter().map(|p| p.short_name()).collect();
        assert_eq!(
            names,
            vec!["KEY_10", "KEY_11", "KEY_12", "KEY_13", "KEY_14"]
        );
    }

    #[tokio::test]
    async fn test_page_size_is_validated() {
        let client = seeded_client().await;
        for bad in [0, 11, -1] {
            let err = client.list_parameters("/svc", bad, None, None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }
}
