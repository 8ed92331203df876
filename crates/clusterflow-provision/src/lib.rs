//! ClusterFlow provisioning workflow
//!
//! The forward-only phase machine that brings one Kubernetes cluster to a
//! ready state by driving the collaborators from `clusterflow-cloud`.
//!
//! ```text
//! BootstrappingState → ApplyingInfra → DeterminingClusterExistence
//!   → GeneratingClusterSpec → FinalizingInfra → AwaitingConvergence ⟲
//!   → ApplyingClusterResources → AwaitingAuthReadiness ⟲ → Complete
//! ```

pub mod bundle;
pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod poller;

pub use bundle::AssetBundle;
pub use clock::{Clock, RecordingClock, TokioClock};
pub use error::{ProvisionError, Result};
pub use orchestrator::{
    ClusterExistence, Collaborators, ProvisionOptions, ProvisionReport, Provisioner,
};
pub use phase::{PhaseTracker, RunPhase};
pub use poller::{PollOutcome, Poller};
