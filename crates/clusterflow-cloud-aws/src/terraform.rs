//! terraform CLI wrapper

use crate::command::{Invocation, args};
use async_trait::async_trait;
use clusterflow_cloud::{ApplyRequest, BackendConfig, ExecutionContext, InfraApplier};
use std::path::Path;

pub struct Terraform {
    binary: String,
}

impl Terraform {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn init_args(backend: Option<&BackendConfig>) -> Vec<String> {
        let mut argv = args(&["init", "-upgrade"]);
        if let Some(backend) = backend {
            argv.push(format!("-backend-config=bucket={}", backend.bucket));
            argv.push(format!("-backend-config=key={}", backend.key));
        }
        argv
    }

    pub fn apply_args(request: &ApplyRequest) -> Vec<String> {
        let mut argv = args(&["apply", "-compact-warnings"]);
        if request.auto_approve {
            argv.push("-auto-approve".to_string());
        }
        if !request.refresh {
            argv.push("-refresh=false".to_string());
        }
        for (key, value) in &request.variables {
            argv.push("-var".to_string());
            argv.push(format!("{key}={value}"));
        }
        for file in &request.var_files {
            argv.push(format!("-var-file={}", file.display()));
        }
        argv
    }
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new("terraform")
    }
}

#[async_trait]
impl InfraApplier for Terraform {
    fn name(&self) -> &str {
        "terraform"
    }

    async fn init(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        backend: Option<&BackendConfig>,
    ) -> clusterflow_cloud::Result<()> {
        Invocation::new(&self.binary, Self::init_args(backend))
            .current_dir(dir)
            .run(ctx)
            .await?;
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
        request: &ApplyRequest,
    ) -> clusterflow_cloud::Result<()> {
        // Shares the terminal so the plan is visible and can be confirmed.
        Invocation::new(&self.binary, Self::apply_args(request))
            .current_dir(dir)
            .inherit_output()
            .run(ctx)
            .await?;
        Ok(())
    }

    async fn output(
        &self,
        ctx: &ExecutionContext,
        dir: &Path,
    ) -> clusterflow_cloud::Result<Vec<u8>> {
        let output = Invocation::new(&self.binary, args(&["output", "-json"]))
            .current_dir(dir)
            .run(ctx)
            .await?;
        Ok(output.stdout)
    }
}
