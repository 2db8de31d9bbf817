/// Ambient credential resolution for Azure Resource Manager
///
/// Credentials are tried in a fixed order: environment client secret,
/// workload identity, managed identity, then the Azure CLI session. A source
/// that is not set up in this environment is skipped. The first token, or the
/// first failure of a source that is set up, ends the walk. Nothing is
/// prompted for and nothing is persisted.
use async_trait::async_trait;
use azure_core::credentials::{Secret, TokenCredential as SdkTokenCredential};
use azure_identity::{
    AzureCliCredential, ClientSecretCredential, ManagedIdentityCredential,
    ManagedIdentityCredentialOptions, UserAssignedId, WorkloadIdentityCredential,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AuthError;

/// Bounds managed identity requests until the first one succeeds, so hosts
/// without an instance metadata endpoint fall through quickly
const IMDS_REACH_TIMEOUT: Duration = Duration::from_secs(1);

/// A bearer token for the control plane
#[derive(Clone)]
pub struct AccessToken {
    token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// The raw bearer token
    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl From<azure_core::credentials::AccessToken> for AccessToken {
    fn from(token: azure_core::credentials::AccessToken) -> Self {
        let expires_on = DateTime::from_timestamp(token.expires_on.unix_timestamp(), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(token.token.secret(), expires_on)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// A source of access tokens
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &'static str;

    async fn get_token(
        &self,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<AccessToken, AuthError>;
}

/// Ordered list of credential sources
///
/// Sources reporting [`AuthError::Unavailable`] are skipped. Any other error
/// is returned as is.
pub struct ChainedTokenCredential {
    sources: Vec<Box<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// The default ambient chain, configured from the process environment
    pub fn default_chain() -> Self {
        Self::from_lookup(env_lookup)
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let sources: Vec<Box<dyn TokenCredential>> = vec![
            Box::new(IdentitySource::environment(&lookup)) as Box<dyn TokenCredential>,
            Box::new(IdentitySource::workload_identity(&lookup)),
            Box::new(IdentitySource::managed_identity(&lookup)),
            Box::new(IdentitySource::azure_cli()),
        ];
        Self::new(sources)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    fn name(&self) -> &'static str {
        "ChainedTokenCredential"
    }

    async fn get_token(
        &self,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<AccessToken, AuthError> {
        let mut skipped = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            debug!("Trying credential source {}", source.name());
            match source.get_token(scopes, cancel).await {
                Ok(token) => {
                    debug!(
                        "Using credential from {}, expires at {}",
                        source.name(),
                        token.expires_on
                    );
                    return Ok(token);
                }
                Err(e @ AuthError::Unavailable { .. }) => {
                    debug!("{}", e);
                    skipped.push(e.to_string());
                }
                Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
                Err(e) => {
                    warn!("{}", e);
                    return Err(e);
                }
            }
        }

        Err(AuthError::NoCredential(skipped))
    }
}

/// How a source's token request errors are reported to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// The source is configured, so any error is final
    Fatal,
    /// Errors only mean the source cannot be used here
    Unavailable,
    /// Unavailable until the first success, fatal afterwards
    UntilReached(Duration),
}

/// An `azure_identity` credential behind the chain's error contract
pub struct IdentitySource {
    name: &'static str,
    credential: Result<Arc<dyn SdkTokenCredential>, String>,
    mode: FailureMode,
    reached: AtomicBool,
}

impl IdentitySource {
    fn new(
        name: &'static str,
        credential: Result<Arc<dyn SdkTokenCredential>, String>,
        mode: FailureMode,
    ) -> Self {
        Self {
            name,
            credential,
            mode,
            reached: AtomicBool::new(false),
        }
    }

    /// Client secret read from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET`
    fn environment<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = match (
            lookup("AZURE_TENANT_ID"),
            lookup("AZURE_CLIENT_ID"),
            lookup("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(secret)) => {
                ClientSecretCredential::new(&tenant_id, client_id, Secret::new(secret), None)
                    .map(|c| c as Arc<dyn SdkTokenCredential>)
                    .map_err(|e| e.to_string())
            }
            _ => Err(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set"
                    .to_string(),
            ),
        };
        Self::new("EnvironmentCredential", credential, FailureMode::Fatal)
    }

    /// Federated token read from `AZURE_FEDERATED_TOKEN_FILE`
    fn workload_identity<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = match lookup("AZURE_FEDERATED_TOKEN_FILE") {
            Some(_) => WorkloadIdentityCredential::from_env(None)
                .map(|c| c as Arc<dyn SdkTokenCredential>)
                .map_err(|e| e.to_string()),
            None => Err("AZURE_FEDERATED_TOKEN_FILE is not set".to_string()),
        };
        Self::new("WorkloadIdentityCredential", credential, FailureMode::Fatal)
    }

    /// Instance metadata identity, user-assigned when `AZURE_CLIENT_ID` is set
    fn managed_identity<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let options = ManagedIdentityCredentialOptions {
            user_assigned_id: lookup("AZURE_CLIENT_ID").map(UserAssignedId::ClientId),
            ..Default::default()
        };
        let credential = ManagedIdentityCredential::new(Some(options))
            .map(|c| c as Arc<dyn SdkTokenCredential>)
            .map_err(|e| e.to_string());
        Self::new(
            "ManagedIdentityCredential",
            credential,
            FailureMode::UntilReached(IMDS_REACH_TIMEOUT),
        )
    }

    /// The signed-in `az` session
    fn azure_cli() -> Self {
        let credential = AzureCliCredential::new(None)
            .map(|c| c as Arc<dyn SdkTokenCredential>)
            .map_err(|e| e.to_string());
        Self::new("AzureCliCredential", credential, FailureMode::Unavailable)
    }

    fn error(&self, message: String) -> AuthError {
        let unavailable = match self.mode {
            FailureMode::Fatal => false,
            FailureMode::Unavailable => true,
            FailureMode::UntilReached(_) => !self.reached.load(Ordering::SeqCst),
        };

        if unavailable {
            AuthError::Unavailable {
                source_name: self.name,
                reason: message,
            }
        } else {
            AuthError::Failed {
                source_name: self.name,
                message,
            }
        }
    }
}

#[async_trait]
impl TokenCredential for IdentitySource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_token(
        &self,
        scopes: &[&str],
        cancel: &CancellationToken,
    ) -> Result<AccessToken, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let credential = match &self.credential {
            Ok(credential) => credential,
            Err(reason) => {
                return Err(AuthError::Unavailable {
                    source_name: self.name,
                    reason: reason.clone(),
                })
            }
        };

        let request = async {
            match self.mode {
                FailureMode::UntilReached(limit) if !self.reached.load(Ordering::SeqCst) => {
                    match tokio::time::timeout(limit, credential.get_token(scopes)).await {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(_) => Err(format!("no response within {:?}", limit)),
                    }
                }
                _ => credential.get_token(scopes).await.map_err(|e| e.to_string()),
            }
        };

        match cancel.run_until_cancelled(request).await {
            None => Err(AuthError::Cancelled),
            Some(Ok(token)) => {
                self.reached.store(true, Ordering::SeqCst);
                Ok(token.into())
            }
            Some(Err(message)) => Err(self.error(message)),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
