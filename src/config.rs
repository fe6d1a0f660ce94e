//! Application configuration
//!
//! Stored as JSON in the platform-specific config folder:
//! - Linux: ~/.config/aws-helper/config.json
//! - Windows: %APPDATA%/aws-helper/config.json
//! - macOS: ~/Library/Application Support/aws-helper/config.json
//!
//! A missing file means defaults. `AWS_HELPER_*` environment variables
//! override whatever the file says.

use crate::s3::multipart::UploadLimits;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Region used when neither the config file nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Settings shared by the S3 and Parameter Store clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// AWS region for both services
    pub region: String,

    /// Custom endpoint (MinIO, LocalStack)
    pub endpoint_url: Option<String>,

    /// Path-style S3 addressing, required by most S3-compatible servers
    pub force_path_style: bool,

    /// Shared credentials file; `None` means `$AWS_SHARED_CREDENTIALS_FILE`
    /// or `~/.aws/credentials`
    pub credentials_file: Option<PathBuf>,

    /// Directory holding `parameter-storages.json`; `None` means the
    /// platform data directory
    pub data_dir: Option<PathBuf>,

    /// Upload routing thresholds and deadlines
    pub upload: UploadLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            force_path_style: false,
            credentials_file: None,
            data_dir: None,
            upload: UploadLimits::default(),
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from `path`, returning defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;

        config
            .upload
            .validate()
            .with_context(|| format!("Invalid upload limits in {:?}", path))?;

        tracing::info!(
            "Loaded config: region={}, endpoint={:?}, path_style={}",
            config.region,
            config.endpoint_url,
            config.force_path_style
        );

        Ok(config)
    }

    /// Save to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::debug!("Saved config to {:?}", path);

        Ok(())
    }

    /// Apply `AWS_HELPER_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup("AWS_HELPER_REGION").filter(|r| !r.is_empty()) {
            self.region = region;
        }
        if let Some(endpoint) = lookup("AWS_HELPER_ENDPOINT_URL").filter(|e| !e.is_empty()) {
            self.endpoint_url = Some(endpoint);
        }
        if let Some(flag) = lookup("AWS_HELPER_FORCE_PATH_STYLE") {
            self.force_path_style = matches!(flag.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Some(file) = lookup("AWS_HELPER_CREDENTIALS_FILE").filter(|f| !f.is_empty()) {
            self.credentials_file = Some(PathBuf::from(file));
        }
    }

    /// Get the path to the default config file
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.json"))
    }

    /// Directory for application data such as saved parameter paths
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "github.n-orlov", "aws-helper")
            .context("Failed to determine application directories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.endpoint_url.is_none());
        assert!(!config.force_path_style);
        assert_eq!(config.upload, UploadLimits::default());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            region: "eu-west-1".to_string(),
            endpoint_url: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"region": "sa-east-1", "upload": {"part_upload_timeout_secs": 60}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.region, "sa-east-1");
        assert_eq!(config.upload.part_upload_timeout(), Duration::from_secs(60));
        assert_eq!(config.upload.part_size, UploadLimits::default().part_size);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_part_size_below_s3_minimum_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"upload": {"part_size": 1048576}}"#).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid upload limits"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AWS_HELPER_REGION", "ap-south-1"),
            ("AWS_HELPER_ENDPOINT_URL", "http://minio:9000"),
            ("AWS_HELPER_FORCE_PATH_STYLE", "true"),
            ("AWS_HELPER_CREDENTIALS_FILE", "/tmp/creds"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.region, "ap-south-1");
        assert_eq!(config.endpoint_url.as_deref(), Some("http://minio:9000"));
        assert!(config.force_path_style);
        assert_eq!(config.credentials_file, Some(PathBuf::from("/tmp/creds")));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(|name| (name == "AWS_HELPER_REGION").then(String::new));
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_explicit_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/srv/aws-helper")),
            ..Default::default()
        };
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/aws-helper"));
    }
}
