//! Cluster providers
//!
//! A provider enumerates the managed clusters of one cloud account and
//! returns a ready-to-use kubeconfig for each of them. A discovery call either
//! returns the complete inventory or a single error naming the stage (and
//! cluster) that failed; partial inventories are never returned.

use async_trait::async_trait;
use futures::{pin_mut, TryStreamExt};
use kube::config::Kubeconfig;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::azure::client::{list_clusters, ClientOptions, ClusterApi, ManagedClustersClient};
use crate::azure::credential::{ChainedTokenCredential, TokenCredential};
use crate::azure::models::ManagedCluster;
use crate::azure::resource_id::parse_scope;
use crate::error::{DiscoveryError, Result};
use crate::kubeconfig;

/// A discovered cluster
#[derive(Clone)]
pub struct ProviderCluster {
    /// Cluster name, unique within the account
    pub name: String,
    /// Admin kubeconfig, `None` when the cloud returned no credentials
    pub kubeconfig: Option<Kubeconfig>,
}

impl fmt::Debug for ProviderCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCluster")
            .field("name", &self.name)
            .field(
                "server",
                &self.kubeconfig.as_ref().and_then(kubeconfig::server_url),
            )
            .finish()
    }
}

/// A source of managed clusters
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Discover every cluster, in the order the cloud returns them
    async fn list_clusters(&self, cancel: &CancellationToken) -> Result<Vec<ProviderCluster>>;
}

/// Azure Kubernetes Service provider for one subscription
#[derive(Clone)]
pub struct AzureProvider {
    subscription_id: String,
    options: ClientOptions,
    credential: Arc<dyn TokenCredential>,
}

impl AzureProvider {
    /// Create a provider using the default ambient credential chain
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self::with_options(subscription_id, ClientOptions::default())
    }

    pub fn with_options(subscription_id: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            options,
            credential: Arc::new(ChainedTokenCredential::default_chain()),
        }
    }

    /// Replace the credential source
    pub fn with_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
}

impl fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureProvider")
            .field("subscription_id", &self.subscription_id)
            .field("options", &self.options)
            .field("credential", &self.credential.name())
            .finish()
    }
}

#[async_trait]
impl ClusterProvider for AzureProvider {
    async fn list_clusters(&self, cancel: &CancellationToken) -> Result<Vec<ProviderCluster>> {
        let scope = self.options.scope();
        let token = self.credential.get_token(&[scope.as_str()], cancel).await?;

        let client =
            ManagedClustersClient::new(&self.subscription_id, &token, self.options.clone())?;

        let clusters = discover(&client, cancel).await?;
        info!(
            "Discovered {} managed clusters in subscription {}",
            clusters.len(),
            self.subscription_id
        );
        Ok(clusters)
    }
}

/// Walk every page of the listing and resolve each cluster's kubeconfig
///
/// Stops at the first failure and drops everything gathered so far.
pub async fn discover<A>(api: &A, cancel: &CancellationToken) -> Result<Vec<ProviderCluster>>
where
    A: ClusterApi + ?Sized,
{
    let pages = list_clusters(api, cancel);
    pin_mut!(pages);

    let mut clusters = Vec::new();
    while let Some(page) = pages.try_next().await.map_err(DiscoveryError::PageFetch)? {
        for managed in page {
            let cluster = resolve_cluster(api, &managed, cancel).await?;
            clusters.push(cluster);
        }
    }

    Ok(clusters)
}

async fn resolve_cluster<A>(
    api: &A,
    managed: &ManagedCluster,
    cancel: &CancellationToken,
) -> Result<ProviderCluster>
where
    A: ClusterApi + ?Sized,
{
    debug!(
        "Resolving cluster {} ({})",
        managed.name,
        managed.location.as_deref().unwrap_or("unknown location")
    );

    let resource_group = parse_scope(&managed.id).map_err(|source| DiscoveryError::Parse {
        cluster: managed.name.clone(),
        source,
    })?;

    let payload = api
        .list_admin_credentials(&resource_group, &managed.name, cancel)
        .await
        .map_err(|source| DiscoveryError::CredentialFetch {
            cluster: managed.name.clone(),
            source,
        })?;

    let kubeconfig = match payload {
        Some(bytes) => Some(kubeconfig::decode(&bytes).map_err(|source| {
            DiscoveryError::Decode {
                cluster: managed.name.clone(),
                source,
            }
        })?),
        None => {
            debug!("Cluster {} returned no admin credentials", managed.name);
            None
        }
    };

    Ok(ProviderCluster {
        name: managed.name.clone(),
        kubeconfig,
    })
}
