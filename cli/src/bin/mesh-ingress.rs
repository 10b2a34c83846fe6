use anyhow::{Context, Result};
use clap::Parser;
use kubert::ClientArgs;
use mesh_ingress_cli::{check, lookup};
use mesh_ingress_controller::{ApiVersion, MeshService};
use tokio::time;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Inspects the ingresses that route to mesh services.
struct Cli {
    #[command(flatten)]
    client: kubert::ClientArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone)]
enum OutputMode {
    Table,
    Json,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List the ingresses whose default backend or rules route to a service
    Lookup {
        /// Namespace of the service
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Name of the service
        #[arg(short, long)]
        service: String,

        /// The ingress API version to query
        #[arg(long, default_value = "networking.k8s.io/v1")]
        ingress_api_version: ApiVersion,

        /// How long to wait for the ingress cache to sync
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: OutputMode,
    },

    /// Check that the cluster serves the ingress API versions
    Check {
        /// The ingress API version that must be served
        #[arg(long, default_value = "networking.k8s.io/v1")]
        ingress_api_version: ApiVersion,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: OutputMode,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { client, command } = Cli::parse();

    match command {
        Commands::Lookup {
            namespace,
            service,
            ingress_api_version,
            timeout_secs,
            output,
        } => {
            let client = try_client(client).await?;

            let service = MeshService::new(namespace, service);
            let matches = lookup::lookup(
                client,
                ingress_api_version,
                &service,
                time::Duration::from_secs(timeout_secs),
            )
            .await?;
            match output {
                OutputMode::Table => lookup::print_lookup(&matches),
                OutputMode::Json => lookup::json_print_lookup(&matches),
            }
        }

        Commands::Check {
            ingress_api_version,
            output,
        } => {
            let client = try_client(client).await?;

            let results = check::run_checks(client, ingress_api_version).await;
            let success = match output {
                OutputMode::Table => check::print_checks(&results),
                OutputMode::Json => check::json_print_checks(&results),
            };

            if !success {
                std::process::exit(1);
            }
        }
    };

    Ok(())
}

async fn try_client(client: ClientArgs) -> Result<kubert::client::Client> {
    client
        .try_client()
        .await
        .context("failed to load a Kubernetes client configuration")
}
