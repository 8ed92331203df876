//! Hand-written collaborator fakes shared by the scenario tests.

#![allow(dead_code)]

use async_trait::async_trait;
use clusterflow_cloud::{
    ApplyRequest, BackendConfig, CloudError, ClusterApi, ClusterManager, ExecutionContext,
    InfraApplier, MemoryObjectStore, Probe, Result,
};
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const CLUSTER: &str = "dev.example.com";
pub const BUCKET: &str = "dev-example-com-state";
pub const ADMIN_ROLE: &str = "arn:aws:iam::123456789012:role/cluster-admin";
pub const KMS_KEY: &str = "arn:aws:kms:us-east-1:123456789012:key/abc";

/// Ordered record of every collaborator call.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn kubeconfig_name(ctx: &ExecutionContext) -> String {
    ctx.kubeconfig().map(dir_name).unwrap_or_else(|| "-".to_string())
}

/// Files below `dir`, relative and sorted.
pub fn files_below(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(dir) {
                files.push(relative.to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    files
}

pub fn kubeconfig_yaml(server: &str) -> String {
    format!(
        "apiVersion: v1\nkind: Config\nclusters:\n- name: {CLUSTER}\n  cluster:\n    server: {server}\n    certificate-authority-data: Q0E=\ncontexts: []\ncurrent-context: {CLUSTER}\nusers: []\n"
    )
}

/// terraform stand-in. The bootstrap apply creates the state bucket. Every
/// init records the files present in its directory.
pub struct FakeInfra {
    pub journal: Journal,
    pub store: Arc<MemoryObjectStore>,
    pub requests: Mutex<Vec<ApplyRequest>>,
    pub initialized: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeInfra {
    pub fn new(journal: Journal, store: Arc<MemoryObjectStore>) -> Self {
        Self {
            journal,
            store,
            requests: Mutex::new(Vec::new()),
            initialized: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InfraApplier for FakeInfra {
    fn name(&self) -> &str {
        "fake-terraform"
    }

    async fn init(
        &self,
        _ctx: &ExecutionContext,
        dir: &Path,
        backend: Option<&BackendConfig>,
    ) -> Result<()> {
        let backend = backend.map_or("local".to_string(), |b| b.bucket.clone());
        self.journal
            .record(format!("init {} backend={backend}", dir_name(dir)));
        self.initialized
            .lock()
            .unwrap()
            .push((dir_name(dir), files_below(dir)));
        Ok(())
    }

    async fn apply(&self, _ctx: &ExecutionContext, dir: &Path, request: &ApplyRequest) -> Result<()> {
        self.journal.record(format!(
            "apply {} auto_approve={} refresh={}",
            dir_name(dir),
            request.auto_approve,
            request.refresh
        ));
        self.requests.lock().unwrap().push(request.clone());

        if dir_name(dir) == "tf_state" {
            self.store.create_bucket(BUCKET);
            std::fs::write(dir.join("terraform.tfstate"), b"{\"serial\":1}")?;
        }
        Ok(())
    }

    async fn output(&self, _ctx: &ExecutionContext, dir: &Path) -> Result<Vec<u8>> {
        self.journal.record(format!("output {}", dir_name(dir)));
        Ok(serde_json::to_vec(&json!({
            "vpc_id": { "sensitive": false, "type": "string", "value": "vpc-1" },
            "aws_iam_cluster_admin_role_arn": { "value": ADMIN_ROLE },
            "encryption_key_arn": { "value": KMS_KEY },
        }))?)
    }
}

/// kops stand-in. The admin kubeconfig points at the new or the existing
/// API load balancer depending on `exists`.
pub struct FakeKops {
    pub journal: Journal,
    pub exists: bool,
    pub fail_rolling_update: bool,
    pub validations: Mutex<VecDeque<Vec<u8>>>,
    pub specs: Mutex<Vec<String>>,
}

impl FakeKops {
    pub fn new(journal: Journal, exists: bool, validations: Vec<Vec<u8>>) -> Self {
        Self {
            journal,
            exists,
            fail_rolling_update: false,
            validations: Mutex::new(validations.into()),
            specs: Mutex::new(Vec::new()),
        }
    }

    fn server(&self) -> &'static str {
        if self.exists {
            "https://api-existing.elb.amazonaws.com"
        } else {
            "https://api-new.elb.amazonaws.com"
        }
    }
}

pub fn generated_document() -> serde_json::Value {
    json!({
        "output": {
            "cluster_name": { "value": CLUSTER },
            "region": { "value": "us-east-1" }
        },
        "provider": { "aws": { "region": "us-east-1" } },
        "terraform": { "required_version": ">= 0.12.26" },
        "resource": {
            "aws_launch_template": {
                "nodes-dev-example-com": {
                    "block_device_mappings": [
                        { "device_name": "/dev/xvda", "ebs": [{ "volume_size": 128 }] }
                    ]
                }
            },
            "aws_route53_record": {
                "api-dev-example-com": {
                    "alias": [{ "name": "api-elb", "type": "A", "zone_id": "Z1" }]
                }
            }
        }
    })
}

#[async_trait]
impl ClusterManager for FakeKops {
    fn name(&self) -> &str {
        "fake-kops"
    }

    async fn get_cluster(&self, _ctx: &ExecutionContext) -> Probe {
        self.journal.record("get cluster");
        if self.exists {
            Probe::Succeeded
        } else {
            Probe::Failed("cluster not found".to_string())
        }
    }

    async fn replace_cluster_spec(&self, _ctx: &ExecutionContext, spec: &str, force: bool) -> Result<()> {
        self.journal.record(format!("replace force={force}"));
        self.specs.lock().unwrap().push(spec.to_string());
        Ok(())
    }

    async fn update_cluster(
        &self,
        ctx: &ExecutionContext,
        out_dir: &Path,
        create_kubeconfig: bool,
    ) -> Result<()> {
        self.journal.record(format!(
            "update cluster create_kubeconfig={create_kubeconfig} kubeconfig={}",
            kubeconfig_name(ctx)
        ));
        std::fs::write(
            out_dir.join("kubernetes.tf.json"),
            serde_json::to_vec_pretty(&generated_document())?,
        )?;
        if create_kubeconfig && let Some(path) = ctx.kubeconfig() {
            std::fs::write(path, kubeconfig_yaml(self.server()))?;
        }
        Ok(())
    }

    async fn export_admin_kubeconfig(&self, _ctx: &ExecutionContext, path: &Path) -> Result<()> {
        self.journal.record(format!("export admin {}", dir_name(path)));
        std::fs::write(path, kubeconfig_yaml(self.server()))?;
        Ok(())
    }

    async fn rolling_update(&self, _ctx: &ExecutionContext, cloud_only: bool) -> Result<()> {
        self.journal
            .record(format!("rolling-update cloud_only={cloud_only}"));
        if self.fail_rolling_update {
            return Err(CloudError::CommandFailed {
                program: "kops".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "error: node nodes-us-east-1a did not pass validation".to_string(),
            });
        }
        Ok(())
    }

    async fn validate(&self, ctx: &ExecutionContext) -> Result<Vec<u8>> {
        self.journal
            .record(format!("validate kubeconfig={}", kubeconfig_name(ctx)));
        Ok(self
            .validations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| b"{}".to_vec()))
    }
}

/// kubectl stand-in. Probes fail until `failures_left` reaches zero.
pub struct FakeKubectl {
    pub journal: Journal,
    pub failures_left: Mutex<u32>,
    pub applied: Mutex<Vec<String>>,
}

impl FakeKubectl {
    pub fn new(journal: Journal, failures: u32) -> Self {
        Self {
            journal,
            failures_left: Mutex::new(failures),
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClusterApi for FakeKubectl {
    fn name(&self) -> &str {
        "fake-kubectl"
    }

    async fn apply_manifests(&self, _ctx: &ExecutionContext, manifests: &str) -> Result<()> {
        self.journal.record("apply manifests");
        self.applied.lock().unwrap().push(manifests.to_string());
        Ok(())
    }

    async fn probe(&self, ctx: &ExecutionContext) -> Probe {
        self.journal
            .record(format!("probe kubeconfig={}", kubeconfig_name(ctx)));
        let mut left = self.failures_left.lock().unwrap();
        if *left == 0 {
            return Probe::Succeeded;
        }
        *left -= 1;
        Probe::Failed("error: You must be logged in to the server (Unauthorized)".to_string())
    }
}

/// Write a minimal asset bundle under `root`.
pub fn write_bundle(root: &Path) -> PathBuf {
    let files = [
        ("tf_state/main.tf.json", "{}"),
        ("tf/main.tf.json", "{}"),
        (
            "kops/01-cluster.yaml",
            "apiVersion: kops.k8s.io/v1alpha2\nkind: Cluster\nmetadata:\n  name: {{ cluster_name }}\nspec:\n  networkID: {{ vpc_id }}\n  configBase: {{ state_store }}/{{ cluster_name }}\n",
        ),
        (
            "kops/02-nodes.yaml",
            "apiVersion: kops.k8s.io/v1alpha2\nkind: InstanceGroup\nmetadata:\n  name: {{ node_group | default(value=\"nodes\") }}\n",
        ),
        ("k8s/aws-auth.yaml", "rolearn: {{ aws_iam_cluster_admin_role_arn }}\n"),
    ];
    for (path, content) in files {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    root.to_path_buf()
}

pub fn report(names: &[&str]) -> Vec<u8> {
    let failures: Vec<_> = names
        .iter()
        .map(|n| json!({ "type": "Pod", "name": n, "message": "not ready" }))
        .collect();
    serde_json::to_vec(&json!({ "failures": failures })).unwrap()
}
