/// Azure Kubernetes Service discovery building blocks
pub mod client;
pub mod credential;
pub mod models;
pub mod resource_id;

pub use client::{ClientOptions, ClusterApi, ManagedClustersClient, ServerFqdn};
pub use credential::{AccessToken, ChainedTokenCredential, TokenCredential};
pub use resource_id::{parse_scope, ResourceId};
