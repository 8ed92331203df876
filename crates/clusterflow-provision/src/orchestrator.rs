//! Provisioning orchestrator
//!
//! Drives one cluster from nothing (or from an earlier, possibly interrupted
//! run) to a validated cluster with working operator credentials:
//!
//! 1. bootstrap the state bucket inside its own state scope
//! 2. apply the full infra definition and capture its output
//! 3. decide once whether the cluster already exists, exporting the admin
//!    kubeconfig of an existing one
//! 4. force-replace the cluster spec rendered from the output
//! 5. let the cluster manager emit its infra document, patch it, apply again
//!    (a new cluster exports its admin kubeconfig once it has been created)
//! 6. wait (new cluster) or roll the nodes (existing cluster)
//! 7. poll validation, apply in-cluster manifests, write kubeconfig and `.env`
//! 8. poll until the new kubeconfig authenticates
//!
//! Every step converges on re-run, so the remedy for any failure is to run
//! the whole workflow again. Long calls made under the remote lock renew it
//! every poll interval.

use crate::bundle::{AssetBundle, BOOTSTRAP_DIR, INFRA_DIR, Template};
use crate::clock::Clock;
use crate::error::Result;
use crate::phase::{PhaseTracker, RunPhase};
use crate::poller::{DEFAULT_POLL_INTERVAL, Poller, await_auth_readiness, await_convergence};
use clusterflow_cloud::{
    ApplyRequest, AssetStore, BackendConfig, ClusterApi, ClusterManager, Destination,
    ExecutionContext, InfraApplier, ObjectStore, Probe, RemoteStateScope,
};
use clusterflow_core::environment::ENV_FILE_ASSET;
use clusterflow_core::kubeconfig::DEFAULT_CLIENT_AUTH_API_VERSION;
use clusterflow_core::output::OUTPUT_ASSET;
use clusterflow_core::{
    ClusterEndpoint, ClusterIdentity, ExpectedFailures, GENERATED_DOCUMENT, InfraOutput,
    InputSet, KubeconfigParams, TemplateProcessor, build_kubeconfig, default_environment_file,
    transform_file,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Admin kubeconfig exported by the cluster manager.
pub const ADMIN_KUBECONFIG: &str = "kubeconfig.admin.yaml";

/// Final kubeconfig handed to the operator.
pub const KUBECONFIG_ASSET: &str = "kubeconfig.yaml";

/// Local state of the bootstrap definition, mirrored to the bucket.
const BOOTSTRAP_STATE: &str = "tf_state/terraform.tfstate";

/// Every file below the var and bootstrap directories, nested modules included.
const BOOTSTRAP_ASSETS: &str = "{tf_vars,tf_state}/**/*";
const ACCESS_ASSETS: &str = "{kubeconfig.yaml,.env}";

/// Default control-plane bring-up wait for a new cluster.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(180);

/// Whether the cluster manager knew the cluster when the run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterExistence {
    New,
    Existing,
}

impl ClusterExistence {
    /// A successful lookup means the cluster exists; any failure means it
    /// does not.
    pub fn from_probe(probe: &Probe) -> Self {
        match probe {
            Probe::Succeeded => ClusterExistence::Existing,
            Probe::Failed(reason) => {
                debug!("Cluster lookup failed, treating cluster as new: {}", reason);
                ClusterExistence::New
            }
        }
    }

    pub fn is_new(self) -> bool {
        self == ClusterExistence::New
    }
}

impl fmt::Display for ClusterExistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterExistence::New => f.write_str("new"),
            ClusterExistence::Existing => f.write_str("existing"),
        }
    }
}

/// External systems the workflow drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub infra: &'a dyn InfraApplier,
    pub manager: &'a dyn ClusterManager,
    pub api: &'a dyn ClusterApi,
    pub store: &'a dyn ObjectStore,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Roll nodes without cloud-side health gating.
    pub fast: bool,
    /// Skip confirmation on the full infra applies.
    pub auto_approve: bool,
    /// `apiVersion` of the kubeconfig exec credential.
    pub client_auth_api_version: String,
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub expected_failures: ExpectedFailures,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            fast: false,
            auto_approve: false,
            client_auth_api_version: DEFAULT_CLIENT_AUTH_API_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            expected_failures: ExpectedFailures::default(),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub cluster: String,
    pub existence: ClusterExistence,
    pub phases: Vec<RunPhase>,
    pub output_dir: PathBuf,
    pub kubeconfig: PathBuf,
    pub validation_attempts: u32,
    pub readiness_attempts: u32,
}

pub struct Provisioner<'a> {
    collaborators: Collaborators<'a>,
    identity: ClusterIdentity,
    inputs: InputSet,
    bundle: AssetBundle,
    options: ProvisionOptions,
    ctx: ExecutionContext,
    assets: AssetStore,
    phases: PhaseTracker,
}

/// What the locked provisioning scope hands back.
struct ScopeOutcome {
    existence: ClusterExistence,
    validation_attempts: u32,
    kubeconfig: PathBuf,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        identity: ClusterIdentity,
        inputs: InputSet,
        bundle: AssetBundle,
        options: ProvisionOptions,
        ctx: ExecutionContext,
    ) -> Self {
        let assets = AssetStore::new(identity.work_dir());
        Self {
            collaborators,
            identity,
            inputs,
            bundle,
            options,
            ctx,
            assets,
            phases: PhaseTracker::new(),
        }
    }

    pub async fn run(mut self) -> Result<ProvisionReport> {
        info!(cluster = %self.identity.name(), "Provisioning cluster");

        self.bundle.stage_definitions(&mut self.assets).await?;
        self.stage_inputs()?;

        self.phases.advance(RunPhase::BootstrappingState)?;
        self.bootstrap().await?;

        let store = self.collaborators.store;
        let scope = RemoteStateScope::enter(store, &self.identity, &[]).await?;
        let result = self.provision(&scope).await;
        let outcome = scope.exit(result).await?;

        self.phases.advance(RunPhase::AwaitingAuthReadiness)?;
        self.ctx.set_kubeconfig(&outcome.kubeconfig);
        let poller = Poller::new(self.collaborators.clock, self.options.poll_interval);
        let readiness_attempts =
            await_auth_readiness(&poller, self.collaborators.api, &self.ctx).await?;

        self.phases.advance(RunPhase::Complete)?;
        info!(cluster = %self.identity.name(), existence = %outcome.existence, "Cluster is ready");

        Ok(ProvisionReport {
            cluster: self.identity.name().to_string(),
            existence: outcome.existence,
            phases: self.phases.visited().to_vec(),
            output_dir: self.identity.work_dir().to_path_buf(),
            kubeconfig: outcome.kubeconfig,
            validation_attempts: outcome.validation_attempts,
            readiness_attempts,
        })
    }

    /// Each input becomes a var file, synced so later runs can reuse it.
    fn stage_inputs(&mut self) -> Result<()> {
        for source in self.inputs.sources() {
            self.assets.stage(
                &source.var_file_path(),
                source.to_var_file()?,
                Destination::LocalAndRemote,
            )?;
        }
        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<()> {
        let store = self.collaborators.store;
        let scope = RemoteStateScope::enter(store, &self.identity, &[BOOTSTRAP_STATE]).await?;
        let result = self.apply_bootstrap(&scope).await;
        scope.exit(result).await
    }

    async fn apply_bootstrap(&mut self, scope: &RemoteStateScope<'_>) -> Result<()> {
        info!("Bootstrapping state bucket {}", self.identity.state_bucket());
        self.assets.flush(Some(BOOTSTRAP_ASSETS), Some(scope)).await?;

        let dir = self.work_path(BOOTSTRAP_DIR);
        let infra = self.collaborators.infra;
        infra.init(&self.ctx, &dir, None).await?;
        infra
            .apply(&self.ctx, &dir, &self.apply_request().auto_approve(true))
            .await?;
        Ok(())
    }

    async fn provision(&mut self, scope: &RemoteStateScope<'_>) -> Result<ScopeOutcome> {
        let Collaborators {
            infra,
            manager,
            api,
            clock,
            ..
        } = self.collaborators;
        let infra_dir = self.work_path(INFRA_DIR);
        let admin = self.work_path(ADMIN_KUBECONFIG);
        let poller = Poller::new(clock, self.options.poll_interval).with_lease(scope);

        self.phases.advance(RunPhase::ApplyingInfra)?;
        self.assets.flush(None, Some(scope)).await?;
        infra
            .init(
                &self.ctx,
                &infra_dir,
                Some(&BackendConfig::for_cluster(&self.identity)),
            )
            .await?;
        poller
            .hold(infra.apply(
                &self.ctx,
                &infra_dir,
                &self.apply_request().auto_approve(self.options.auto_approve),
            ))
            .await?;
        let output = self.capture_output(&infra_dir, scope).await?;

        self.phases.advance(RunPhase::DeterminingClusterExistence)?;
        let existence = ClusterExistence::from_probe(&manager.get_cluster(&self.ctx).await);
        info!(existence = %existence, "Cluster {} is {}", self.identity.name(), existence);

        if !existence.is_new() {
            manager.export_admin_kubeconfig(&self.ctx, &admin).await?;
            self.ctx.set_kubeconfig(admin.clone());
        }

        self.phases.advance(RunPhase::GeneratingClusterSpec)?;
        let spec = self
            .templates(&output)
            .render_documents(sources(self.bundle.cluster_spec()))?;
        // Forced so the same call creates a cluster or adds to an existing one.
        manager.replace_cluster_spec(&self.ctx, &spec, true).await?;

        self.phases.advance(RunPhase::FinalizingInfra)?;
        match existence {
            ClusterExistence::New => {
                self.ctx.set_kubeconfig(self.work_path(KUBECONFIG_ASSET));
                manager.update_cluster(&self.ctx, &infra_dir, true).await?;
                manager.export_admin_kubeconfig(&self.ctx, &admin).await?;
                self.ctx.set_kubeconfig(admin.clone());
            }
            ClusterExistence::Existing => {
                manager.update_cluster(&self.ctx, &infra_dir, false).await?;
            }
        }

        transform_file(&infra_dir.join(GENERATED_DOCUMENT), &output)?;
        // Only local documents changed, nothing to refresh.
        poller
            .hold(infra.apply(
                &self.ctx,
                &infra_dir,
                &self
                    .apply_request()
                    .auto_approve(self.options.auto_approve)
                    .refresh(false),
            ))
            .await?;
        let output = self.capture_output(&infra_dir, scope).await?;

        match existence {
            ClusterExistence::New => {
                info!(
                    "Waiting {} seconds for the control plane to come up",
                    self.options.grace_period.as_secs()
                );
                clock.sleep(self.options.grace_period).await;
            }
            ClusterExistence::Existing => {
                poller
                    .hold(manager.rolling_update(&self.ctx, self.options.fast))
                    .await?;
            }
        }

        self.phases.advance(RunPhase::AwaitingConvergence)?;
        let validation_attempts =
            await_convergence(&poller, manager, &self.ctx, &self.options.expected_failures)
                .await?;

        self.phases.advance(RunPhase::ApplyingClusterResources)?;
        if !self.bundle.manifests().is_empty() {
            let manifests = self
                .templates(&output)
                .render_documents(sources(self.bundle.manifests()))?;
            api.apply_manifests(&self.ctx, &manifests).await?;
        }

        let kubeconfig = self.stage_access_artifacts(&output).await?;
        self.assets.flush(Some(ACCESS_ASSETS), Some(scope)).await?;

        Ok(ScopeOutcome {
            existence,
            validation_attempts,
            kubeconfig,
        })
    }

    /// Read, flatten and persist the infra output of `dir`.
    async fn capture_output(
        &mut self,
        dir: &Path,
        scope: &RemoteStateScope<'_>,
    ) -> Result<InfraOutput> {
        let raw = self.collaborators.infra.output(&self.ctx, dir).await?;
        let output = InfraOutput::from_terraform_json(&raw)?;
        self.assets.stage(
            OUTPUT_ASSET,
            output.to_json_bytes()?,
            Destination::LocalAndRemote,
        )?;
        self.assets.flush(Some(OUTPUT_ASSET), Some(scope)).await?;
        Ok(output)
    }

    /// Stage the final kubeconfig and `.env`. Returns the kubeconfig path.
    async fn stage_access_artifacts(&mut self, output: &InfraOutput) -> Result<PathBuf> {
        let endpoint = self.cluster_endpoint().await;
        let kubeconfig = build_kubeconfig(KubeconfigParams {
            cluster_name: self.identity.name(),
            api_version: &self.options.client_auth_api_version,
            admin_role_arn: output.admin_role_arn()?,
            endpoint,
        });
        self.assets.stage(
            KUBECONFIG_ASSET,
            kubeconfig.to_yaml()?,
            Destination::LocalAndRemote,
        )?;

        let path = self.work_path(KUBECONFIG_ASSET);
        let env = default_environment_file(&self.identity, &path.display().to_string());
        self.assets
            .stage(ENV_FILE_ASSET, env, Destination::LocalAndRemote)?;
        Ok(path)
    }

    /// API endpoint from the kubeconfig the cluster manager wrote, or the
    /// conventional `api.<name>` when that is unavailable.
    async fn cluster_endpoint(&self) -> ClusterEndpoint {
        let name = self.identity.name();
        let Some(path) = self.ctx.kubeconfig() else {
            return ClusterEndpoint::fallback(name);
        };

        let endpoint = match tokio::fs::read_to_string(path).await {
            Ok(yaml) => ClusterEndpoint::from_kubeconfig(&yaml, name).unwrap_or_else(|e| {
                debug!("Unreadable kubeconfig {}: {}", path.display(), e);
                None
            }),
            Err(e) => {
                debug!("No kubeconfig at {}: {}", path.display(), e);
                None
            }
        };
        endpoint.unwrap_or_else(|| ClusterEndpoint::fallback(name))
    }

    fn templates(&self, output: &InfraOutput) -> TemplateProcessor {
        let mut processor = TemplateProcessor::new();
        for (key, value) in self.inputs.values() {
            processor.add_variable(key.as_str(), value.clone());
        }
        processor.add_output(output);
        processor.add_variable("cluster_name", self.identity.name().into());
        processor.add_variable("state_bucket_name", self.identity.state_bucket().into());
        processor.add_variable("state_store", self.identity.state_store_uri().into());
        processor
    }

    fn apply_request(&self) -> ApplyRequest {
        ApplyRequest::for_cluster(
            &self.identity,
            self.inputs.var_files(self.identity.work_dir()),
        )
    }

    fn work_path(&self, relative: &str) -> PathBuf {
        self.identity.work_dir().join(relative)
    }
}

fn sources(templates: &[Template]) -> impl Iterator<Item = (&str, &str)> {
    templates
        .iter()
        .map(|t| (t.name.as_str(), t.source.as_str()))
}
