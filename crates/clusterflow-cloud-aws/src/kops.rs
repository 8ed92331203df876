//! kops CLI wrapper

use crate::command::{Invocation, args};
use async_trait::async_trait;
use clusterflow_cloud::{ClusterManager, ExecutionContext, Probe};
use std::path::Path;

const VERBOSE_FLAG: &str = "-v7";

pub struct Kops {
    binary: String,
}

impl Kops {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn update_cluster_args(
        ctx: &ExecutionContext,
        out_dir: &Path,
        create_kubeconfig: bool,
    ) -> Vec<String> {
        let mut argv = args(&["update", "cluster", ctx.cluster_name()]);
        if !create_kubeconfig {
            argv.push("--create-kube-config=false".to_string());
        }
        argv.extend(args(&["--target", "terraform", "--out"]));
        argv.push(out_dir.display().to_string());
        argv.push("--yes".to_string());
        push_verbose(&mut argv, ctx);
        argv.push("--allow-kops-downgrade".to_string());
        argv
    }

    pub fn rolling_update_args(ctx: &ExecutionContext, cloud_only: bool) -> Vec<String> {
        let mut argv = args(&["rolling-update", "cluster", ctx.cluster_name()]);
        if cloud_only {
            argv.push("--cloudonly".to_string());
        }
        push_verbose(&mut argv, ctx);
        argv.push("--yes".to_string());
        argv
    }

    pub fn validate_args(ctx: &ExecutionContext) -> Vec<String> {
        let mut argv = args(&["validate", "cluster", ctx.cluster_name(), "-o", "json"]);
        push_verbose(&mut argv, ctx);
        argv
    }

    fn invocation(&self, argv: Vec<String>) -> Invocation {
        Invocation::new(&self.binary, argv)
    }
}

impl Default for Kops {
    fn default() -> Self {
        Self::new("kops")
    }
}

fn push_verbose(argv: &mut Vec<String>, ctx: &ExecutionContext) {
    if ctx.verbose() {
        argv.push(VERBOSE_FLAG.to_string());
    }
}

#[async_trait]
impl ClusterManager for Kops {
    fn name(&self) -> &str {
        "kops"
    }

    async fn get_cluster(&self, ctx: &ExecutionContext) -> Probe {
        let result = self
            .invocation(args(&["get", "cluster", ctx.cluster_name()]))
            .run(ctx)
            .await;
        Probe::from_result(result)
    }

    async fn replace_cluster_spec(
        &self,
        ctx: &ExecutionContext,
        spec: &str,
        force: bool,
    ) -> clusterflow_cloud::Result<()> {
        let mut argv = args(&["replace"]);
        if force {
            argv.push("--force".to_string());
        }
        argv.extend(args(&["-f", "-"]));

        self.invocation(argv).stdin(spec).run(ctx).await?;
        Ok(())
    }

    async fn update_cluster(
        &self,
        ctx: &ExecutionContext,
        out_dir: &Path,
        create_kubeconfig: bool,
    ) -> clusterflow_cloud::Result<()> {
        self.invocation(Self::update_cluster_args(ctx, out_dir, create_kubeconfig))
            .inherit_output()
            .run(ctx)
            .await?;
        Ok(())
    }

    async fn export_admin_kubeconfig(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
    ) -> clusterflow_cloud::Result<()> {
        let mut argv = args(&["export", "kubeconfig", ctx.cluster_name(), "--admin"]);
        argv.push("--kubeconfig".to_string());
        argv.push(path.display().to_string());

        self.invocation(argv).run(ctx).await?;
        Ok(())
    }

    async fn rolling_update(
        &self,
        ctx: &ExecutionContext,
        cloud_only: bool,
    ) -> clusterflow_cloud::Result<()> {
        self.invocation(Self::rolling_update_args(ctx, cloud_only))
            .inherit_output()
            .run(ctx)
            .await?;
        Ok(())
    }

    async fn validate(&self, ctx: &ExecutionContext) -> clusterflow_cloud::Result<Vec<u8>> {
        // kops exits non-zero while the cluster is not valid yet; the
        // report on stdout is what matters.
        let output = self.invocation(Self::validate_args(ctx)).output(ctx).await?;
        if !output.success {
            tracing::debug!("kops validate exited with {}: {}", output.status, output.stderr);
        }
        Ok(output.stdout)
    }
}
