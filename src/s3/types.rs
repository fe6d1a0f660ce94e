//! S3 data types

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Represents an S3 bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Represents a stored S3 object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
    pub etag: Option<String>,
}

impl S3Object {
    /// Last component of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Everything before the last `/`, empty for top-level keys
    pub fn directory(&self) -> &str {
        self.key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn size_string(&self) -> String {
        format_size(self.size)
    }
}

/// Result of a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

/// One ListObjectsV2 response
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<S3Object>,
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// Aggregated view of the keys below a common prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub full_path: String,
    pub file_count: usize,
    pub total_size: u64,
}

impl Folder {
    pub fn size_string(&self) -> String {
        format_size(self.total_size)
    }
}

/// An entry in a folder-style listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserItem {
    Folder(Folder),
    File(S3Object),
}

impl BrowserItem {
    pub fn name(&self) -> &str {
        match self {
            BrowserItem::Folder(folder) => &folder.name,
            BrowserItem::File(object) => object.file_name(),
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, BrowserItem::Folder(_))
    }
}

/// Group `objects` into the immediate children of `prefix`.
///
/// Folders come first, both groups ordered by name. Keys outside `prefix`
/// are ignored.
pub fn browse_items(objects: &[S3Object], prefix: &str) -> Vec<BrowserItem> {
    let mut folders: BTreeMap<&str, Folder> = BTreeMap::new();
    let mut files = Vec::new();

    for object in objects {
        let Some(rest) = object.key.strip_prefix(prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((name, _)) => {
                let folder = folders.entry(name).or_insert_with(|| Folder {
                    name: name.to_string(),
                    full_path: format!("{}{}/", prefix, name),
                    file_count: 0,
                    total_size: 0,
                });
                folder.file_count += 1;
                folder.total_size += object.size;
            }
            None if !rest.is_empty() => files.push(object.clone()),
            None => {}
        }
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    folders
        .into_values()
        .map(BrowserItem::Folder)
        .chain(files.into_iter().map(BrowserItem::File))
        .collect()
}

/// Human-readable size string
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if size >= TB {
        format!("{:.2} TB", size as f64 / TB as f64)
    } else if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Bucket and key addressed by an `s3://` or HTTPS URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    pub bucket: String,
    pub key: String,
}

impl FromStr for S3Url {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        let (bucket, key) = if let Some(rest) = url.strip_prefix("s3://") {
            rest.split_once('/').unwrap_or((rest, ""))
        } else if url.starts_with("https://") || url.starts_with("http://") {
            return parse_http_url(url);
        } else {
            return Err(Error::invalid_input(format!("'{}' is not an S3 URL", url)));
        };

        if bucket.is_empty() {
            return Err(Error::invalid_input(format!("'{}' has no bucket", url)));
        }
        Ok(S3Url {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Virtual-hosted (`bucket.s3.region.amazonaws.com/key`) or path-style
/// (`s3.region.amazonaws.com/bucket/key`) URLs
fn parse_http_url(raw: &str) -> Result<S3Url> {
    let invalid = || Error::invalid_input(format!("'{}' is not an S3 URL", raw));
    let parsed = url::Url::parse(raw).map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?;
    let decoded = percent_encoding::percent_decode_str(parsed.path().trim_start_matches('/'))
        .decode_utf8()
        .map_err(|_| invalid())?;
    let path: &str = &decoded;

    if !host.ends_with(".amazonaws.com") {
        return Err(invalid());
    }
    if let Some((bucket, _)) = host.split_once(".s3.") {
        return Ok(S3Url {
            bucket: bucket.to_string(),
            key: path.to_string(),
        });
    }
    if host.starts_with("s3.") {
        let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(invalid());
        }
        return Ok(S3Url {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }
    Err(invalid())
}

impl std::fmt::Display for S3Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.key)
        }
    }
}
