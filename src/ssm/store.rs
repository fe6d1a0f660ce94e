//! Remote parameter store operations

use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::error::{map_sdk_error, Error, Result};
use crate::ssm::types::{Parameter, ParameterPage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;
use chrono::DateTime;
use tracing::instrument;

/// SSM calls consumed by [`crate::ssm::ParameterStoreClient`]
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write `value` at `name` as a `String` parameter, overwriting any
    /// existing value. Returns the new version.
    async fn put_parameter(&self, name: &str, value: &str) -> Result<i64>;

    /// One recursive page of parameters below `path`
    async fn get_parameters_by_path(
        &self,
        path: &str,
        max_results: i32,
        next_token: Option<&str>,
    ) -> Result<ParameterPage>;
}

/// [`ParameterStore`] over an `aws-sdk-ssm` client
#[derive(Debug, Clone)]
pub struct SdkParameterStore {
    client: Client,
}

impl SdkParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client using the default AWS credential chain
    pub async fn from_env(config: &Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_ssm::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!("Created SSM client from ambient credentials in {}", config.region);
        Self::new(Client::from_conf(builder.build()))
    }

    /// Client using a named profile's static keys
    pub fn for_profile(resolver: &CredentialResolver, profile: &str, config: &Config) -> Result<Self> {
        let credentials = resolver.resolve_credentials(profile).ok_or_else(|| {
            Error::invalid_input(format!("Profile '{}' not found or invalid", profile))
        })?;

        let credentials = aws_sdk_ssm::config::Credentials::new(
            credentials.access_key_id,
            credentials.secret_access_key,
            credentials.session_token,
            None,
            "aws-helper-profile",
        );

        let mut builder = aws_sdk_ssm::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_ssm::config::Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!("Created SSM client for profile '{}' in {}", profile, config.region);
        Ok(Self::new(Client::from_conf(builder.build())))
    }
}

#[async_trait]
impl ParameterStore for SdkParameterStore {
    #[instrument(skip(self, value))]
    async fn put_parameter(&self, name: &str, value: &str) -> Result<i64> {
        let response = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| map_sdk_error("put parameter", name, e))?;

        Ok(response.version())
    }

    #[instrument(skip(self))]
    async fn get_parameters_by_path(
        &self,
        path: &str,
        max_results: i32,
        next_token: Option<&str>,
    ) -> Result<ParameterPage> {
        let response = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .max_results(max_results)
            .set_next_token(next_token.map(|t| t.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error("get parameters by path", path, e))?;

        let parameters = response
            .parameters()
            .iter()
            .map(|p| Parameter {
                name: p.name().unwrap_or_default().to_string(),
                value: p.value().unwrap_or_default().to_string(),
                kind: p
                    .r#type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "String".to_string()),
                last_modified: p
                    .last_modified_date()
                    .and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos())),
                version: p.version(),
                arn: p.arn().map(|s| s.to_string()),
            })
            .collect();

        Ok(ParameterPage {
            parameters,
            next_token: response.next_token().map(|s| s.to_string()),
        })
    }
}
