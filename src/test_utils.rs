//! In-memory stand-ins for the Azure control plane used by tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::azure::client::ClusterApi;
use crate::azure::credential::{AccessToken, TokenCredential};
use crate::azure::models::{ManagedCluster, ManagedClusterListResult};
use crate::error::{AuthError, RemoteError};
use crate::kubeconfig::tests::sample_kubeconfig;
use crate::provider::{discover, ClusterProvider, ProviderCluster};

/// Resource id of a cluster living in resource group `rg-{name}`
pub fn cluster_id(name: &str) -> String {
    format!(
        "/subscriptions/sub-123/resourceGroups/rg-{}/providers/Microsoft.ContainerService/managedClusters/{}",
        name, name
    )
}

/// A paged cluster listing with scripted failures
pub struct FakeBackend {
    pages: Vec<Vec<ManagedCluster>>,
    failing_page: Option<usize>,
    denied: HashSet<String>,
    without_credentials: HashSet<String>,
    payloads: HashMap<String, Vec<u8>>,
    pub page_calls: AtomicUsize,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|names| {
                names
                    .into_iter()
                    .map(|name| ManagedCluster {
                        id: cluster_id(name),
                        name: name.to_string(),
                        location: Some("westeurope".to_string()),
                        properties: None,
                    })
                    .collect()
            })
            .collect();

        Self {
            pages,
            failing_page: None,
            denied: HashSet::new(),
            without_credentials: HashSet::new(),
            payloads: HashMap::new(),
            page_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the page with this zero-based index
    pub fn fail_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    /// Reject the credential request of a cluster with 403
    pub fn deny(mut self, name: &str) -> Self {
        self.denied.insert(name.to_string());
        self
    }

    /// Return no kubeconfig for a cluster
    pub fn without_credentials(mut self, name: &str) -> Self {
        self.without_credentials.insert(name.to_string());
        self
    }

    /// Return a raw kubeconfig payload for a cluster
    pub fn with_payload(mut self, name: &str, payload: &[u8]) -> Self {
        self.payloads.insert(name.to_string(), payload.to_vec());
        self
    }

    /// Override the resource id of a cluster
    pub fn with_id(mut self, name: &str, id: &str) -> Self {
        for cluster in self.pages.iter_mut().flatten() {
            if cluster.name == name {
                cluster.id = id.to_string();
            }
        }
        self
    }

    /// Resource group and cluster name of every credential request so far
    pub fn credential_requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for FakeBackend {
    async fn list_page(
        &self,
        next_link: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ManagedClusterListResult, RemoteError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let index = match next_link {
            None => 0,
            Some(link) => link
                .strip_prefix("page-")
                .and_then(|i| i.parse().ok())
                .ok_or_else(|| RemoteError::InvalidResponse(format!("unknown link {}", link)))?,
        };

        if self.failing_page == Some(index) {
            return Err(RemoteError::Api {
                status: 500,
                code: "InternalServerError".to_string(),
                message: format!("page {} unavailable", index),
            });
        }

        let value = self.pages.get(index).cloned().unwrap_or_default();
        let next_link = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));

        Ok(ManagedClusterListResult { value, next_link })
    }

    async fn list_admin_credentials(
        &self,
        resource_group: &str,
        cluster_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, RemoteError> {
        self.requests
            .lock()
            .unwrap()
            .push((resource_group.to_string(), cluster_name.to_string()));

        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        if self.denied.contains(cluster_name) {
            return Err(RemoteError::Api {
                status: 403,
                code: "AuthorizationFailed".to_string(),
                message: format!("not allowed to list credentials of {}", cluster_name),
            });
        }

        if self.without_credentials.contains(cluster_name) {
            return Ok(None);
        }

        Ok(Some(
            self.payloads
                .get(cluster_name)
                .cloned()
                .unwrap_or_else(|| sample_kubeconfig(cluster_name).into_bytes()),
        ))
    }
}

#[async_trait]
impl ClusterProvider for FakeBackend {
    async fn list_clusters(
        &self,
        cancel: &CancellationToken,
    ) -> crate::error::Result<Vec<ProviderCluster>> {
        discover(self, cancel).await
    }
}

/// A credential that always returns the same token
pub struct StaticCredential(pub AccessToken);

#[async_trait]
impl TokenCredential for StaticCredential {
    fn name(&self) -> &'static str {
        "StaticCredential"
    }

    async fn get_token(
        &self,
        _scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<AccessToken, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(self.0.clone())
    }
}

/// A control plane that accepts connections but never finishes a response
///
/// When `page` is set, `GET` requests are answered with it and only other
/// requests stall. The listener runs until the returned handle is aborted.
pub async fn stalled_control_plane(page: Option<String>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(answer_or_stall(socket, page.clone()));
        }
    });

    (addr, server)
}

async fn answer_or_stall(mut socket: TcpStream, page: Option<String>) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        match &page {
            Some(body) if buf[..n].starts_with(b"GET ") => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
            _ => {
                // hold the connection open without replying
                std::future::pending::<()>().await;
            }
        }
    }
}
