//! kubectl CLI wrapper

use crate::command::{Invocation, args};
use async_trait::async_trait;
use clusterflow_cloud::{ClusterApi, ExecutionContext, Probe};

pub struct Kubectl {
    binary: String,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

#[async_trait]
impl ClusterApi for Kubectl {
    fn name(&self) -> &str {
        "kubectl"
    }

    async fn apply_manifests(
        &self,
        ctx: &ExecutionContext,
        manifests: &str,
    ) -> clusterflow_cloud::Result<()> {
        Invocation::new(&self.binary, args(&["apply", "-f", "-"]))
            .stdin(manifests)
            .run(ctx)
            .await?;
        Ok(())
    }

    async fn probe(&self, ctx: &ExecutionContext) -> Probe {
        let result = Invocation::new(
            &self.binary,
            args(&["get", "pods", "-n", "kube-system", "-o", "name"]),
        )
        .run(ctx)
        .await;
        Probe::from_result(result)
    }
}
