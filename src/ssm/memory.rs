//! In-process parameter store

use crate::error::{Error, Result};
use crate::ssm::store::ParameterStore;
use crate::ssm::types::{Parameter, ParameterPage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    parameters: BTreeMap<String, Parameter>,
    writes: Vec<(String, String)>,
}

/// Parameters kept in a sorted map. Page tokens are stringified offsets.
#[derive(Debug, Clone, Default)]
pub struct MemoryParameterStore {
    state: Arc<Mutex<State>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `(name, value)` write in the order received
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock().writes.clone()
    }

    pub fn get(&self, name: &str) -> Option<Parameter> {
        self.lock().parameters.get(name).cloned()
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn put_parameter(&self, name: &str, value: &str) -> Result<i64> {
        let mut state = self.lock();
        state.writes.push((name.to_string(), value.to_string()));

        let version = state.parameters.get(name).map_or(1, |p| p.version + 1);
        state.parameters.insert(
            name.to_string(),
            Parameter {
                name: name.to_string(),
                value: value.to_string(),
                kind: "String".to_string(),
                last_modified: Some(Utc::now()),
                version,
                arn: Some(format!("arn:aws:ssm:us-east-1:000000000000:parameter{}", name)),
            },
        );
        Ok(version)
    }

    async fn get_parameters_by_path(
        &self,
        path: &str,
        max_results: i32,
        next_token: Option<&str>,
    ) -> Result<ParameterPage> {
        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::invalid_input(format!("invalid next token '{}'", token)))?,
            None => 0,
        };
        let page_size = max_results.max(1) as usize;
        let below = format!("{}/", path.trim_end_matches('/'));

        let state = self.lock();
        let matching: Vec<&Parameter> = state
            .parameters
            .values()
            .filter(|p| p.name.starts_with(&below))
            .collect();

        let parameters: Vec<Parameter> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|p| (*p).clone())
            .collect();
        let consumed = offset + parameters.len();
        let next_token = (consumed < matching.len()).then(|| consumed.to_string());

        Ok(ParameterPage {
            parameters,
            next_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overwrite_bumps_version() {
        let store = MemoryParameterStore::new();
        assert_eq!(store.put_parameter("/app/A", "1").await.unwrap(), 1);
        assert_eq!(store.put_parameter("/app/A", "2").await.unwrap(), 2);
        assert_eq!(store.get("/app/A").unwrap().value, "2");
    }

    #[tokio::test]
    async fn test_recursive_paging() {
        let store = MemoryParameterStore::new();
        for name in ["/app/A", "/app/B", "/app/nested/C", "/apple/D", "/other/E"] {
            store.put_parameter(name, "v").await.unwrap();
        }

        let first = store.get_parameters_by_path("/app", 2, None).await.unwrap();
        let names: Vec<_> = first.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["/app/A", "/app/B"]);

        let second = store
            .get_parameters_by_path("/app/", 2, first.next_token.as_deref())
            .await
            .unwrap();
        let names: Vec<_> = second.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["/app/nested/C"]);
        assert!(second.next_token.is_none());
    }
}
