mod commands;
mod runtime;

use clap::{Parser, Subcommand};
use skyfleet_cloud::{ServiceType, Status};
use skyfleet_config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyfleetd")]
#[command(about = "Multi-cloud deployment orchestrator", long_about = None, version)]
struct Cli {
    /// Configuration file (defaults to discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the deployment state file
    #[arg(long, global = true, env = "SKYFLEET_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Subject of the identity to act as
    #[arg(long, global = true, env = "SKYFLEET_SUBJECT")]
    subject: Option<String>,

    /// Organisation carried by the identity
    #[arg(long, global = true, env = "SKYFLEET_ORGANISATION")]
    organisation: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the providers available to a user group
    Rank {
        /// Requested service types; the first one is primary
        #[arg(short = 't', long = "service-type", required = true)]
        service_types: Vec<ServiceType>,
        /// User group (defaults to the identity's organisation)
        #[arg(short = 'g', long)]
        user_group: Option<String>,
    },
    /// List deployments
    List,
    /// Show one deployment
    Show {
        id: String,
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Override a deployment's status
    Reset {
        id: String,
        /// Target status (e.g. CREATE_IN_PROGRESS, DELETE_FAILED)
        status: Status,
    },
    /// Request cancellation of an in-flight run
    Cancel { id: String },
    /// Run the workflow for a deployment left in progress
    Resume { id: String },
    /// Delete a deployment
    Delete {
        id: String,
        /// Skip resource cleanup and tolerate deprovisioning errors
        #[arg(short, long)]
        force: bool,
    },
    /// Tear down a deployment's resources
    Cleanup { id: String },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };
    let state_dir = runtime::state_dir(&config, cli.state_dir.as_deref())?;
    let identity = runtime::identity(&config.identity, cli.subject, cli.organisation);
    let runtime = runtime::Runtime::build(&config, state_dir)?;
    let service = &runtime.service;

    match cli.command {
        Commands::Rank {
            service_types,
            user_group,
        } => {
            commands::rank::handle(
                runtime.resolver.as_ref(),
                identity.as_ref(),
                user_group.as_deref(),
                &service_types,
            )
            .await?;
        }
        Commands::List => commands::deployments::list(service).await?,
        Commands::Show { id, json } => commands::deployments::show(service, &id, json).await?,
        Commands::Reset { id, status } => {
            commands::deployments::reset(service, &id, status).await?;
        }
        Commands::Cancel { id } => commands::deployments::cancel(service, &id).await?,
        Commands::Resume { id } => commands::deployments::resume(service, &id, identity).await?,
        Commands::Delete { id, force } => {
            commands::deployments::delete(service, &id, force, identity).await?;
        }
        Commands::Cleanup { id } => {
            commands::deployments::cleanup(service, &runtime.cleanup, &id, identity.as_ref())
                .await?;
        }
    }

    Ok(())
}
