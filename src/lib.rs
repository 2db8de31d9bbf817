//! Cluster Reflector - managed Kubernetes cluster discovery
//!
//! Enumerates the Azure Kubernetes Service clusters of a subscription and
//! returns an admin kubeconfig for each of them.

pub mod azure;
pub mod config;
pub mod error;
pub mod kubeconfig;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{DiscoveryError, Result};
pub use provider::{AzureProvider, ClusterProvider, ProviderCluster};
