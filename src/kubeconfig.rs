/// Kubeconfig decoding for returned cluster credentials
use kube::config::Kubeconfig;

use crate::error::DecodeError;

/// Parse a kubeconfig payload
pub fn decode(payload: &[u8]) -> Result<Kubeconfig, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    Ok(Kubeconfig::from_yaml(text)?)
}

/// Serialize a kubeconfig back to YAML
pub fn encode(config: &Kubeconfig) -> Result<Vec<u8>, DecodeError> {
    Ok(serde_yaml::to_string(config)?.into_bytes())
}

/// API server of the current context, falling back to the first cluster
pub fn server_url(config: &Kubeconfig) -> Option<&str> {
    let current_cluster = config.current_context.as_ref().and_then(|current| {
        config
            .contexts
            .iter()
            .find(|c| &c.name == current)
            .and_then(|c| c.context.as_ref())
            .map(|c| c.cluster.as_str())
    });

    let cluster = match current_cluster {
        Some(name) => config.clusters.iter().find(|c| c.name == name),
        None => config.clusters.first(),
    };

    cluster
        .and_then(|c| c.cluster.as_ref())
        .and_then(|c| c.server.as_deref())
}
