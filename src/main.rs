/// Cluster Reflector
///
/// Discovers the managed Kubernetes clusters of an Azure subscription and
/// produces an admin kubeconfig for each of them.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cluster_reflector::config::ReflectorConfig;
use cluster_reflector::{kubeconfig, AzureProvider, ClusterProvider, ProviderCluster};

#[derive(Parser)]
#[command(name = "cluster-reflector")]
#[command(about = "Discover managed Kubernetes clusters and their kubeconfigs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "reflector.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered clusters
    List,

    /// Write the admin kubeconfig of one discovered cluster
    Kubeconfig {
        /// Cluster name
        #[arg(long)]
        cluster: String,

        /// Output file, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Generate example configuration file
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cluster_reflector={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::List => list_clusters(&cli).await,
        Commands::Kubeconfig {
            ref cluster,
            ref out,
        } => write_kubeconfig(&cli, cluster, out.as_ref()).await,
        Commands::Init => init_config(&cli).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Cancel the returned token on Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling discovery");
            guard.cancel();
        }
    });
    cancel
}

/// Build the provider and run one discovery pass
async fn discover(cli: &Cli) -> Result<Vec<ProviderCluster>> {
    let config =
        ReflectorConfig::load_or_default(&cli.config).context("Failed to load configuration")?;
    let subscription_id = config.get_subscription_id()?;

    info!("Discovering clusters in subscription {}", subscription_id);

    let provider = AzureProvider::with_options(subscription_id, config.client_options());
    let cancel = cancel_on_interrupt();

    provider.list_clusters(&cancel).await.map_err(|e| {
        if e.is_cancelled() {
            warn!("Discovery cancelled before completion");
        } else if let Some(cluster) = e.cluster() {
            warn!("Discovery stopped at cluster {}", cluster);
        }
        anyhow::Error::new(e).context("Cluster discovery failed")
    })
}

/// List discovered clusters
async fn list_clusters(cli: &Cli) -> Result<()> {
    let clusters = discover(cli).await?;

    if clusters.is_empty() {
        info!("No managed clusters found");
        return Ok(());
    }

    info!("Clusters:");
    for cluster in &clusters {
        match &cluster.kubeconfig {
            Some(config) => info!(
                "  - {} (API server: {}, context: {})",
                cluster.name,
                kubeconfig::server_url(config).unwrap_or("N/A"),
                config.current_context.as_deref().unwrap_or("N/A")
            ),
            None => info!("  - {} (no admin credentials available)", cluster.name),
        }
    }

    Ok(())
}

/// Write the kubeconfig of one cluster
async fn write_kubeconfig(cli: &Cli, name: &str, out: Option<&PathBuf>) -> Result<()> {
    let clusters = discover(cli).await?;

    let cluster = clusters
        .into_iter()
        .find(|c| c.name == name)
        .with_context(|| format!("Cluster {} not found", name))?;
    let config = cluster
        .kubeconfig
        .with_context(|| format!("Cluster {} returned no admin credentials", name))?;
    let yaml = kubeconfig::encode(&config)?;

    match out {
        Some(path) => {
            tokio::fs::write(path, &yaml)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Kubeconfig for {} written to {}", name, path.display());
        }
        None => print!("{}", String::from_utf8_lossy(&yaml)),
    }

    Ok(())
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ReflectorConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Set azure.subscription_id in the configuration file");
    info!("     (or export AZURE_SUBSCRIPTION_ID)");
    info!("  2. Sign in, e.g. with 'az login'");
    info!("  3. List clusters:");
    info!("     cluster-reflector list");

    Ok(())
}
