use crate::CreateArgs;
use clusterflow_cloud::ExecutionContext;
use clusterflow_cloud_aws::{Kops, Kubectl, S3ObjectStore, Terraform};
use clusterflow_config::ClusterflowConfig;
use clusterflow_core::{ClusterIdentity, InputSet, InputSource};
use clusterflow_provision::{
    AssetBundle, ClusterExistence, Collaborators, ProvisionOptions, Provisioner, TokioClock,
};
use colored::Colorize;

pub async fn handle(args: CreateArgs, config: ClusterflowConfig) -> anyhow::Result<()> {
    let identity = ClusterIdentity::new(&args.name, config.work_root())?;

    let assets_dir = args.assets.clone().unwrap_or_else(|| config.assets_dir.clone());
    tracing::debug!(
        assets = %assets_dir.display(),
        work_root = %config.work_root().display(),
        "Resolved configuration"
    );
    let bundle = AssetBundle::load(&assets_dir).await?;
    let inputs = load_inputs(&args, &identity)?;

    println!("Cluster: {}", identity.name().cyan());
    println!("  State bucket: {}", identity.state_bucket().cyan());
    println!(
        "  Working directory: {}",
        identity.work_dir().display().to_string().cyan()
    );
    println!();

    let aws_profile = inputs
        .get_str("aws_profile")
        .map(str::to_string)
        .or_else(|| config.aws.profile.clone());
    let aws_region = inputs
        .get_str("aws_region")
        .map(str::to_string)
        .or_else(|| config.aws.region.clone());
    let verbose = args.verbose || config.verbose;

    let ctx = ExecutionContext::new(&identity)
        .with_aws(aws_profile.clone(), aws_region.clone())
        .with_verbose(verbose);

    let infra = Terraform::new(&config.binaries.terraform);
    let manager = Kops::new(&config.binaries.kops);
    let api = Kubectl::new(&config.binaries.kubectl);
    let store = S3ObjectStore::from_env(aws_profile.as_deref(), aws_region.as_deref()).await;
    let clock = TokioClock;

    let options = ProvisionOptions {
        fast: args.fast,
        auto_approve: args.yes,
        client_auth_api_version: args
            .client_authentication_api_version
            .unwrap_or_else(|| config.client_authentication_api_version.clone()),
        poll_interval: config.poll_interval(),
        grace_period: config.grace_period(),
        ..ProvisionOptions::default()
    };

    let collaborators = Collaborators {
        infra: &infra,
        manager: &manager,
        api: &api,
        store: &store,
        clock: &clock,
    };
    let report = Provisioner::new(collaborators, identity, inputs, bundle, options, ctx)
        .run()
        .await?;

    let action = match report.existence {
        ClusterExistence::New => "created",
        ClusterExistence::Existing => "updated",
    };
    println!();
    println!("{} Cluster {} {}", "✓".green(), report.cluster.cyan(), action);
    println!("{}", "Your cluster is ready!".green().bold());
    println!(
        "  Output directory: {}",
        report.output_dir.display().to_string().cyan()
    );
    println!(
        "  export KUBECONFIG={}",
        report.kubeconfig.display().to_string().cyan()
    );

    Ok(())
}

/// Explicit input files win; otherwise reuse the previous run's var files.
fn load_inputs(args: &CreateArgs, identity: &ClusterIdentity) -> anyhow::Result<InputSet> {
    if args.inputs.is_empty() {
        let inputs = InputSet::from_work_dir(identity.work_dir())?;
        if !inputs.is_empty() {
            println!(
                "{}",
                format!(
                    "Reusing inputs from the previous run: {}",
                    inputs.ids().collect::<Vec<_>>().join(", ")
                )
                .yellow()
            );
        }
        return Ok(inputs);
    }

    let sources = args
        .inputs
        .iter()
        .map(|path| InputSource::read(path))
        .collect::<clusterflow_core::Result<Vec<_>>>()?;
    Ok(InputSet::from_sources(sources))
}
