/// Error types for cluster discovery
use thiserror::Error;

/// Failure to obtain an ambient credential
#[derive(Error, Debug)]
pub enum AuthError {
    /// The source is not configured in this environment
    #[error("{source_name} is unavailable: {reason}")]
    Unavailable {
        source_name: &'static str,
        reason: String,
    },

    /// The source is configured but the token request failed
    #[error("{source_name} failed: {message}")]
    Failed {
        source_name: &'static str,
        message: String,
    },

    /// Every source of a chain failed
    #[error("no usable credential found: {}", .0.join("; "))]
    NoCredential(Vec<String>),

    #[error("credential request cancelled")]
    Cancelled,
}

/// Failure of a call against the cloud control plane
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

/// A resource identifier that does not match the ARM grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid resource id {id:?}: {reason}")]
pub struct ParseError {
    pub id: String,
    pub reason: String,
}

/// A credential payload that is not a valid kubeconfig
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("kubeconfig is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("failed to parse kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to serialize kubeconfig: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Error returned by a discovery call, naming the stage that failed
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to obtain a credential: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to create client: {0}")]
    ClientConstruction(String),

    #[error("failed to advance page: {0}")]
    PageFetch(#[source] RemoteError),

    #[error("failed to get resource group of cluster {cluster}: {source}")]
    Parse { cluster: String, source: ParseError },

    #[error("failed to get credentials for cluster {cluster}: {source}")]
    CredentialFetch { cluster: String, source: RemoteError },

    #[error("failed to load kubeconfig for cluster {cluster}: {source}")]
    Decode { cluster: String, source: DecodeError },
}

impl DiscoveryError {
    /// Whether the discovery stopped because its cancellation token fired
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Auth(AuthError::Cancelled)
                | DiscoveryError::PageFetch(RemoteError::Cancelled)
                | DiscoveryError::CredentialFetch {
                    source: RemoteError::Cancelled,
                    ..
                }
        )
    }

    /// Cluster the failure is attributed to, if any
    pub fn cluster(&self) -> Option<&str> {
        match self {
            DiscoveryError::Parse { cluster, .. }
            | DiscoveryError::CredentialFetch { cluster, .. }
            | DiscoveryError::Decode { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
