/// Configuration management for the cluster reflector
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::azure::client::{ClientOptions, ServerFqdn, DEFAULT_API_VERSION, DEFAULT_ENDPOINT};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectorConfig {
    /// Azure provider configuration
    #[serde(default)]
    pub azure: AzureConfig,
}

/// Azure subscription and control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Subscription to discover clusters in (can also be set via AZURE_SUBSCRIPTION_ID env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Resource Manager endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Managed clusters API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Address the returned kubeconfigs point at (public or private)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_fqdn: Option<ServerFqdn>,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            server_fqdn: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl ReflectorConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a file if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: ReflectorConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(subscription_id) = &self.azure.subscription_id {
            if subscription_id.trim().is_empty() {
                anyhow::bail!("azure.subscription_id cannot be empty");
            }
        }

        if self.azure.api_version.trim().is_empty() {
            anyhow::bail!("azure.api_version cannot be empty");
        }

        let endpoint = url::Url::parse(&self.azure.endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid endpoint {}: {}", self.azure.endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("Endpoint must be an http(s) URL: {}", self.azure.endpoint);
        }

        Ok(())
    }

    /// Get the subscription id from config or environment
    pub fn get_subscription_id(&self) -> anyhow::Result<String> {
        self.subscription_id_from(std::env::var("AZURE_SUBSCRIPTION_ID").ok())
    }

    fn subscription_id_from(&self, env_value: Option<String>) -> anyhow::Result<String> {
        self.azure
            .subscription_id
            .clone()
            .or(env_value)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!(
                "Azure subscription id not found. Set AZURE_SUBSCRIPTION_ID environment variable or specify azure.subscription_id in config"
            ))
    }

    /// Client options derived from the configuration
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            endpoint: self.azure.endpoint.clone(),
            api_version: self.azure.api_version.clone(),
            server_fqdn: self.azure.server_fqdn,
        }
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            azure: AzureConfig {
                subscription_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
                server_fqdn: Some(ServerFqdn::Public),
                ..AzureConfig::default()
            },
        }
    }
}
