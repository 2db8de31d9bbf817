/// Azure Resource Manager data models for managed clusters
use serde::{Deserialize, Serialize};

/// A managed cluster as returned by the list operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedCluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub properties: Option<ManagedClusterProperties>,
}

/// Properties of a managed cluster that are useful for logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterProperties {
    pub fqdn: Option<String>,
    #[serde(rename = "privateFQDN")]
    pub private_fqdn: Option<String>,
    pub kubernetes_version: Option<String>,
    pub provisioning_state: Option<String>,
}

/// One page of the managed cluster listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterListResult {
    #[serde(default)]
    pub value: Vec<ManagedCluster>,
    pub next_link: Option<String>,
}

/// Response of the list cluster admin credential operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialResults {
    #[serde(default)]
    pub kubeconfigs: Option<Vec<CredentialResult>>,
}

/// A named kubeconfig, base64 encoded on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialResult {
    pub name: Option<String>,
    pub value: Option<String>,
}

/// ARM error envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
