/// Azure Resource Manager client for managed clusters
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, Stream};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::credential::AccessToken;
use super::models::*;
use crate::error::{DiscoveryError, RemoteError};

/// Public Azure cloud control plane
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_API_VERSION: &str = "2023-08-01";

const MANAGED_CLUSTERS: [&str; 3] = [
    "providers",
    "Microsoft.ContainerService",
    "managedClusters",
];

/// Which API server address the returned kubeconfig points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFqdn {
    Public,
    Private,
}

impl ServerFqdn {
    fn as_str(&self) -> &'static str {
        match self {
            ServerFqdn::Public => "public",
            ServerFqdn::Private => "private",
        }
    }
}

/// Options for [`ManagedClustersClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Control plane base URL
    pub endpoint: String,
    pub api_version: String,
    pub server_fqdn: Option<ServerFqdn>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            server_fqdn: None,
        }
    }
}

impl ClientOptions {
    /// Token scope for the configured control plane
    pub fn scope(&self) -> String {
        format!("{}/.default", self.endpoint.trim_end_matches('/'))
    }
}

/// Remote operations needed to discover clusters
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch one page of managed clusters, the first one when `next_link` is `None`
    async fn list_page(
        &self,
        next_link: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ManagedClusterListResult, RemoteError>;

    /// Fetch the first admin kubeconfig of a cluster, `None` when there is none
    async fn list_admin_credentials(
        &self,
        resource_group: &str,
        cluster_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, RemoteError>;
}

enum PageCursor {
    First,
    Next(String),
    Done,
}

/// Lazily page through every managed cluster of the subscription
///
/// Each call starts again from the first page. The stream ends after the
/// first error and cannot be resumed.
pub fn list_clusters<'a, A>(
    api: &'a A,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<Vec<ManagedCluster>, RemoteError>> + 'a
where
    A: ClusterApi + ?Sized,
{
    stream::try_unfold(PageCursor::First, move |cursor| async move {
        let next_link = match cursor {
            PageCursor::Done => return Ok::<_, RemoteError>(None),
            PageCursor::First => None,
            PageCursor::Next(link) => Some(link),
        };

        let page = api.list_page(next_link.as_deref(), cancel).await?;
        let cursor = match page.next_link {
            Some(link) if !link.is_empty() => PageCursor::Next(link),
            _ => PageCursor::Done,
        };

        Ok(Some((page.value, cursor)))
    })
}

/// Managed clusters client bound to one subscription
#[derive(Debug, Clone)]
pub struct ManagedClustersClient {
    client: Client,
    endpoint: Url,
    subscription_id: String,
    options: ClientOptions,
}

impl ManagedClustersClient {
    /// Create a client authenticated with a bearer token
    pub fn new(
        subscription_id: &str,
        token: &AccessToken,
        options: ClientOptions,
    ) -> Result<Self, DiscoveryError> {
        if subscription_id.trim().is_empty() {
            return Err(DiscoveryError::ClientConstruction(
                "subscription id cannot be empty".to_string(),
            ));
        }

        let endpoint = Url::parse(&options.endpoint).map_err(|e| {
            DiscoveryError::ClientConstruction(format!(
                "invalid endpoint {}: {}",
                options.endpoint, e
            ))
        })?;
        if endpoint.cannot_be_a_base() || !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DiscoveryError::ClientConstruction(format!(
                "endpoint {} is not an http(s) base URL",
                options.endpoint
            )));
        }

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token.secret()))
            .map_err(|_| {
                DiscoveryError::ClientConstruction("invalid access token format".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| {
                DiscoveryError::ClientConstruction(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            subscription_id: subscription_id.to_string(),
            options,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// URL of the subscription-wide listing
    pub(crate) fn list_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["subscriptions", self.subscription_id.as_str()])
                .extend(MANAGED_CLUSTERS);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.options.api_version);
        url
    }

    /// URL of the admin credential action for one cluster
    pub(crate) fn credentials_url(&self, resource_group: &str, cluster_name: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([
                    "subscriptions",
                    self.subscription_id.as_str(),
                    "resourceGroups",
                    resource_group,
                ])
                .extend(MANAGED_CLUSTERS)
                .extend([cluster_name, "listClusterAdminCredential"]);
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", &self.options.api_version);
            if let Some(fqdn) = self.options.server_fqdn {
                query.append_pair("server-fqdn", fqdn.as_str());
            }
        }
        url
    }

    /// Accept a continuation link only if it stays on the control plane
    pub(crate) fn resolve_next_link(&self, link: &str) -> Result<Url, RemoteError> {
        let url = Url::parse(link)
            .map_err(|e| RemoteError::InvalidResponse(format!("invalid nextLink {}: {}", link, e)))?;

        if url.origin() != self.endpoint.origin() {
            return Err(RemoteError::InvalidResponse(format!(
                "nextLink {} points outside {}",
                link, self.endpoint
            )));
        }

        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T, RemoteError> {
        debug!("GET {}", url);
        let request = self.client.get(url).send();
        self.execute(request, cancel).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T, RemoteError> {
        debug!("POST {}", url);
        let request = self.client.post(url).body(Vec::new()).send();
        self.execute(request, cancel).await
    }

    async fn execute<T, F>(&self, request: F, cancel: &CancellationToken) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let call = async {
            let response = request.await?;
            handle_response(response).await
        };

        cancel
            .run_until_cancelled(call)
            .await
            .unwrap_or(Err(RemoteError::Cancelled))
    }
}

#[async_trait]
impl ClusterApi for ManagedClustersClient {
    async fn list_page(
        &self,
        next_link: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ManagedClusterListResult, RemoteError> {
        let url = match next_link {
            Some(link) => self.resolve_next_link(link)?,
            None => self.list_url(),
        };

        let page: ManagedClusterListResult = self.get(url, cancel).await?;
        debug!("Fetched page with {} managed clusters", page.value.len());
        Ok(page)
    }

    async fn list_admin_credentials(
        &self,
        resource_group: &str,
        cluster_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, RemoteError> {
        let url = self.credentials_url(resource_group, cluster_name);
        let results: CredentialResults = self.post(url, cancel).await?;
        first_kubeconfig(results)
    }
}

/// Decode the first kubeconfig payload, if any
pub(crate) fn first_kubeconfig(results: CredentialResults) -> Result<Option<Vec<u8>>, RemoteError> {
    let Some(first) = results.kubeconfigs.and_then(|k| k.into_iter().next()) else {
        return Ok(None);
    };

    match first.value {
        Some(value) => STANDARD.decode(value.as_bytes()).map(Some).map_err(|e| {
            RemoteError::InvalidResponse(format!(
                "kubeconfig {} is not valid base64: {}",
                first.name.as_deref().unwrap_or("<unnamed>"),
                e
            ))
        }),
        None => Ok(None),
    }
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("failed to parse API response: {}", e)))
    } else {
        Err(api_error(status.as_u16(), &body))
    }
}

/// Build an error from a failed response, preferring the ARM error envelope
pub(crate) fn api_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(envelope) => RemoteError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => RemoteError::Api {
            status,
            code: "Unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}
