mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusterflow")]
#[command(about = "Provision Kubernetes clusters with terraform and kops, idempotently", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster, or bring an existing one up to date
    Create(CreateArgs),
    /// Show version information
    Version,
}

#[derive(clap::Args)]
pub struct CreateArgs {
    /// Cluster name (DNS style, e.g. dev.example.com)
    pub name: String,
    /// Roll nodes without waiting for cloud-side health checks
    #[arg(long)]
    pub fast: bool,
    /// Apply infra changes without asking for confirmation
    #[arg(short, long, env = "CLUSTERFLOW_YES")]
    pub yes: bool,
    /// JSON input file (repeatable); defaults to the inputs of the previous run
    #[arg(short, long = "input", value_name = "FILE")]
    pub inputs: Vec<PathBuf>,
    /// apiVersion of the kubeconfig exec credential
    #[arg(long, value_name = "VERSION")]
    pub client_authentication_api_version: Option<String>,
    /// Asset bundle directory (tf_state/, tf/, kops/, k8s/)
    #[arg(long, value_name = "DIR")]
    pub assets: Option<PathBuf>,
    /// Debug logging and verbose kops output
    #[arg(short, long)]
    pub verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("clusterflow {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = clusterflow_config::load_config();
    let verbose = match &cli.command {
        Commands::Create(args) => args.verbose,
        Commands::Version => false,
    } || config.as_ref().is_ok_and(|c| c.verbose);
    init_logging(verbose);

    let result = match (cli.command, config) {
        (_, Err(e)) => Err(e.into()),
        (Commands::Create(args), Ok(config)) => commands::create::handle(args, config).await,
        (Commands::Version, Ok(_)) => unreachable!("Version is handled before config loading"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
