//! Command line front-end
//!
//! Parses arguments with clap and dispatches to the library clients.

use anyhow::{bail, Context, Result};
use aws_helper::config::Config;
use aws_helper::credentials::CredentialResolver;
use aws_helper::s3::{BrowserItem, ObjectStoreClient, S3Url, SdkObjectStoreProvider};
use aws_helper::ssm::{ParameterStoreClient, SdkParameterStore, MAX_PAGE_SIZE};
use aws_helper::storages::ParameterStorageRegistry;
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Administrative helper for AWS Parameter Store and S3
#[derive(Parser, Debug)]
#[command(name = "aws-helper")]
#[command(version)]
#[command(about = "Bulk parameter upload, parameter search and S3 object management", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "AWS_HELPER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List profiles in the shared credentials file
    Profiles,

    /// List buckets
    Buckets(ProfileArgs),

    /// List objects below an s3:// prefix
    Ls(LsArgs),

    /// Show object metadata
    Stat(ObjectArgs),

    /// Download an object
    Get(GetArgs),

    /// Upload a local file
    Put(PutArgs),

    /// Delete an object
    Rm(ObjectArgs),

    /// Parameter Store operations
    #[command(subcommand)]
    Params(ParamsCommand),

    /// Saved parameter paths
    #[command(subcommand)]
    Storages(StoragesCommand),
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Profile from the shared credentials file
    #[arg(short, long, env = "AWS_PROFILE")]
    pub profile: String,
}

#[derive(Args, Debug)]
pub struct ObjectArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Object URL, e.g. s3://bucket/key
    pub url: S3Url,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Bucket and optional prefix, e.g. s3://bucket/logs/
    pub url: S3Url,

    /// Maximum number of objects to list
    #[arg(long, default_value = "1000")]
    pub max_keys: usize,

    /// Group keys into folders below the prefix
    #[arg(long)]
    pub tree: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub object: ObjectArgs,

    /// Destination file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Local file to upload
    pub file: PathBuf,

    /// Destination URL, e.g. s3://bucket/key
    pub url: S3Url,

    /// Content type stored with the object
    #[arg(long, default_value = DEFAULT_CONTENT_TYPE)]
    pub content_type: String,
}

#[derive(Subcommand, Debug)]
pub enum ParamsCommand {
    /// Upload KEY=VALUE lines as String parameters
    Upload(ParamsUploadArgs),

    /// List parameters below a path
    Ls(ParamsLsArgs),
}

#[derive(Args, Debug)]
pub struct ParamsUploadArgs {
    /// Path prefix, e.g. /app/prod
    #[arg(long)]
    pub prefix: String,

    /// Profile to use instead of the default credential chain
    #[arg(short, long)]
    pub profile: Option<String>,

    /// File with KEY=VALUE lines (default: stdin)
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ParamsLsArgs {
    /// Path prefix, e.g. /app/prod
    #[arg(long)]
    pub prefix: String,

    /// Page size
    #[arg(long, default_value_t = MAX_PAGE_SIZE)]
    pub max_items: i32,

    /// Continuation token from a previous page
    #[arg(long)]
    pub token: Option<String>,

    /// Case-insensitive filter on name or value
    #[arg(long)]
    pub search: Option<String>,

    /// Follow every page instead of printing one
    #[arg(long)]
    pub all: bool,

    /// Profile to use instead of the default credential chain
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum StoragesCommand {
    /// List saved paths
    List,

    /// Save a path
    Add {
        /// Short description (2-50 characters)
        description: String,
        /// Parameter path (2-200 characters)
        path: String,
    },

    /// Remove a saved path
    Remove {
        id: Uuid,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let resolver = CredentialResolver::shared(config.credentials_file.as_deref());

        match self.command {
            Commands::Profiles => {
                for profile in resolver.list_profiles() {
                    println!("{}", profile);
                }
            }
            Commands::Buckets(args) => {
                let client = object_client(resolver, &config);
                for bucket in client.list_buckets(&args.profile).await? {
                    let created = bucket
                        .creation_date
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("{:<20} {}", created, bucket.name);
                }
            }
            Commands::Ls(args) => {
                let client = object_client(resolver, &config);
                let profile = &args.profile.profile;
                let url = &args.url;
                if args.tree {
                    for item in client.browse(profile, &url.bucket, &url.key, args.max_keys).await? {
                        match item {
                            BrowserItem::Folder(folder) => println!(
                                "{:>10} {:>6} {}/",
                                folder.size_string(),
                                folder.file_count,
                                folder.name
                            ),
                            BrowserItem::File(object) => {
                                println!("{:>10} {:>6} {}", object.size_string(), "", object.file_name())
                            }
                        }
                    }
                } else {
                    for object in client
                        .list_objects(profile, &url.bucket, &url.key, args.max_keys)
                        .await?
                    {
                        let modified = object
                            .last_modified
                            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default();
                        println!("{:<20} {:>10} {}", modified, object.size_string(), object.key);
                    }
                }
            }
            Commands::Stat(args) => {
                let client = object_client(resolver, &config);
                let url = require_key(&args.url)?;
                let metadata = client
                    .get_metadata(&args.profile.profile, &url.bucket, &url.key)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            }
            Commands::Get(args) => {
                let client = object_client(resolver, &config);
                let url = require_key(&args.object.url)?;
                let mut body = client
                    .download_object(&args.object.profile.profile, &url.bucket, &url.key)
                    .await?;

                match &args.output {
                    Some(path) => {
                        let mut file = tokio::fs::File::create(path)
                            .await
                            .with_context(|| format!("Failed to create {:?}", path))?;
                        let written = tokio::io::copy(&mut body, &mut file).await?;
                        file.flush().await?;
                        tracing::info!("Wrote {} bytes to {:?}", written, path);
                    }
                    None => {
                        let mut stdout = tokio::io::stdout();
                        tokio::io::copy(&mut body, &mut stdout).await?;
                        stdout.flush().await?;
                    }
                }
            }
            Commands::Put(args) => {
                let client = object_client(resolver, &config);
                let url = require_key(&args.url)?;
                let mut file = tokio::fs::File::open(&args.file)
                    .await
                    .with_context(|| format!("Failed to open {:?}", args.file))?;
                let length = file.metadata().await?.len();

                let etag = client
                    .upload_object(
                        &args.profile.profile,
                        &url.bucket,
                        &url.key,
                        &mut file,
                        length,
                        &args.content_type,
                    )
                    .await?;
                println!("{} {}", etag, url);
            }
            Commands::Rm(args) => {
                let client = object_client(resolver, &config);
                let url = require_key(&args.url)?;
                client
                    .delete_object(&args.profile.profile, &url.bucket, &url.key)
                    .await?;
                println!("deleted {}", url);
            }
            Commands::Params(ParamsCommand::Upload(args)) => {
                let text = match &args.file {
                    Some(path) => std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {:?}", path))?,
                    None => {
                        let mut text = String::new();
                        std::io::stdin()
                            .read_to_string(&mut text)
                            .context("Failed to read stdin")?;
                        text
                    }
                };

                let client = parameter_client(&resolver, args.profile.as_deref(), &config).await?;
                let written = client.upload_variables(&text, &args.prefix).await?;
                println!("uploaded {} parameters to {}", written, args.prefix);
            }
            Commands::Params(ParamsCommand::Ls(args)) => {
                let client = parameter_client(&resolver, args.profile.as_deref(), &config).await?;
                let mut token = args.token.clone();

                loop {
                    let page = client
                        .list_parameters(&args.prefix, args.max_items, token.as_deref(), args.search.as_deref())
                        .await?;
                    for parameter in &page.parameters {
                        println!("{} = {}", parameter.name, parameter.value);
                    }

                    token = page.next_token;
                    match (&token, args.all) {
                        (Some(_), true) => continue,
                        (Some(next), false) => {
                            println!("next token: {}", next);
                            break;
                        }
                        (None, _) => break,
                    }
                }
            }
            Commands::Storages(command) => {
                let registry = ParameterStorageRegistry::new(&config.data_dir()?);
                match command {
                    StoragesCommand::List => {
                        for storage in registry.list() {
                            println!("{}  {:<50}  {}", storage.id, storage.description, storage.path);
                        }
                    }
                    StoragesCommand::Add { description, path } => {
                        let storage = registry.add(&description, &path)?;
                        println!("{}", storage.id);
                    }
                    StoragesCommand::Remove { id } => {
                        if !registry.delete(id)? {
                            bail!("No saved path with id {}", id);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env(|name| std::env::var(name).ok());
            Ok(config)
        }
        None => Config::load(),
    }
}

fn object_client(resolver: CredentialResolver, config: &Config) -> ObjectStoreClient {
    let provider = SdkObjectStoreProvider::new(resolver, config.clone());
    ObjectStoreClient::new(Arc::new(provider)).with_limits(config.upload)
}

async fn parameter_client(
    resolver: &CredentialResolver,
    profile: Option<&str>,
    config: &Config,
) -> Result<ParameterStoreClient> {
    let store = match profile {
        Some(profile) => SdkParameterStore::for_profile(resolver, profile, config)?,
        None => SdkParameterStore::from_env(config).await,
    };
    Ok(ParameterStoreClient::new(Arc::new(store)))
}

fn require_key(url: &S3Url) -> Result<&S3Url> {
    if url.key.is_empty() {
        bail!("{} does not name an object", url);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from([
            "aws-helper",
            "put",
            "--profile",
            "dev",
            "report.csv",
            "s3://reports/2024/report.csv",
            "--content-type",
            "text/csv",
        ])
        .unwrap();

        let Commands::Put(args) = cli.command else {
            panic!("expected put");
        };
        assert_eq!(args.profile.profile, "dev");
        assert_eq!(args.url.bucket, "reports");
        assert_eq!(args.url.key, "2024/report.csv");
        assert_eq!(args.content_type, "text/csv");
    }

    #[test]
    fn test_parse_params_ls_defaults() {
        let cli = Cli::try_parse_from(["aws-helper", "params", "ls", "--prefix", "/app"]).unwrap();

        let Commands::Params(ParamsCommand::Ls(args)) = cli.command else {
            panic!("expected params ls");
        };
        assert_eq!(args.max_items, MAX_PAGE_SIZE);
        assert!(!args.all);
        assert!(args.search.is_none());
    }

    #[test]
    fn test_rejects_non_s3_url() {
        let result = Cli::try_parse_from(["aws-helper", "stat", "--profile", "dev", "/tmp/file"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_key() {
        let bucket_only: S3Url = "s3://bucket".parse().unwrap();
        assert!(require_key(&bucket_only).is_err());

        let object: S3Url = "s3://bucket/key".parse().unwrap();
        assert!(require_key(&object).is_ok());
    }
}
