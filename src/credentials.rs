//! Named-profile credential resolution
//!
//! Profiles come from a read-only [`ProfileStore`]. The default store is the
//! AWS shared credentials file (`~/.aws/credentials`), which is re-read on
//! every call so edits made while the process runs are picked up.
//!
//! Resolution fails soft: an empty, unknown or incomplete profile yields
//! `None` and the caller decides whether that is an error.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable overriding the credentials file location
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Key material of one profile as stored, possibly incomplete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEntry {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Static credentials resolved from a profile
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Read-only lookup of named profiles
pub trait ProfileStore: Send + Sync {
    /// All profile names, sorted and without duplicates
    fn profile_names(&self) -> Result<Vec<String>>;

    /// One profile, or `None` if the name is unknown
    fn profile(&self, name: &str) -> Result<Option<ProfileEntry>>;
}

/// The INI-style AWS shared credentials file
#[derive(Debug, Clone)]
pub struct SharedCredentialsFile {
    path: PathBuf,
}

impl SharedCredentialsFile {
    /// Use the file at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$AWS_SHARED_CREDENTIALS_FILE`, falling back to `~/.aws/credentials`
    pub fn default_location() -> Self {
        let path = std::env::var_os(CREDENTIALS_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".aws"))
                    .unwrap_or_else(|| PathBuf::from(".aws"))
                    .join("credentials")
            });
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole file; a missing file is an empty store
    fn load(&self) -> Result<BTreeMap<String, ProfileEntry>> {
        if !self.path.exists() {
            tracing::debug!("Credentials file {:?} not found", self.path);
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse_credentials(&content))
    }
}

impl ProfileStore for SharedCredentialsFile {
    fn profile_names(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }

    fn profile(&self, name: &str) -> Result<Option<ProfileEntry>> {
        Ok(self.load()?.remove(name))
    }
}

/// Parse credentials file content. Repeated sections merge, later keys win.
fn parse_credentials(content: &str) -> BTreeMap<String, ProfileEntry> {
    let mut profiles: BTreeMap<String, ProfileEntry> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim();
            if name.is_empty() {
                current = None;
                continue;
            }
            profiles.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let (Some(name), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };
        let Some(entry) = profiles.get_mut(name) else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => entry.access_key_id = Some(value),
            "aws_secret_access_key" => entry.secret_access_key = Some(value),
            "aws_session_token" => entry.session_token = Some(value),
            _ => {}
        }
    }

    profiles
}

/// Resolves profile names to credentials
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn ProfileStore>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Resolver over the shared credentials file, at `path` when given
    pub fn shared(path: Option<&Path>) -> Self {
        let file = match path {
            Some(p) => SharedCredentialsFile::at(p),
            None => SharedCredentialsFile::default_location(),
        };
        Self::new(Arc::new(file))
    }

    /// Profile names in alphabetical order
    pub fn list_profiles(&self) -> Vec<String> {
        match self.store.profile_names() {
            Ok(mut names) => {
                names.sort();
                names.dedup();
                names
            }
            Err(e) => {
                tracing::warn!("Failed to read profiles: {}", e);
                Vec::new()
            }
        }
    }

    /// Credentials for `profile_name`, or `None` if the profile is empty,
    /// unknown, or lacks either key
    pub fn resolve_credentials(&self, profile_name: &str) -> Option<Credentials> {
        let entry = self.entry(profile_name)?;
        match (entry.access_key_id, entry.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key))
                if !access_key_id.is_empty() && !secret_access_key.is_empty() =>
            {
                Some(Credentials {
                    access_key_id,
                    secret_access_key,
                    session_token: entry.session_token.filter(|t| !t.is_empty()),
                })
            }
            _ => {
                tracing::debug!("Profile '{}' has no static keys", profile_name);
                None
            }
        }
    }

    pub fn profile_exists(&self, profile_name: &str) -> bool {
        self.entry(profile_name).is_some()
    }

    /// Raw `(access_key, secret_key)` pair for building a client by hand
    pub fn raw_keys(&self, profile_name: &str) -> Option<(String, String)> {
        self.resolve_credentials(profile_name)
            .map(|c| (c.access_key_id, c.secret_access_key))
    }

    fn entry(&self, profile_name: &str) -> Option<ProfileEntry> {
        if profile_name.is_empty() {
            return None;
        }
        match self.store.profile(profile_name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read profile '{}': {}", profile_name, e);
                None
            }
        }
    }
}
