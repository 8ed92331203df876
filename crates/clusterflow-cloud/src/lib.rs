//! ClusterFlow Cloud
//!
//! Boundary between the provisioning workflow and the outside world.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              clusterflow-provision               │
//! │        (phase machine, pollers, workflow)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                clusterflow-cloud                 │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │            Collaborator ports             │   │
//! │  │  InfraApplier / ClusterManager /          │   │
//! │  │  ClusterApi / ObjectStore                 │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌─────────────────────────┐  │
//! │  │  AssetStore  │  │  RemoteStateScope/lock  │  │
//! │  └──────────────┘  └─────────────────────────┘  │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼──────────────────────────────┐
//! │         clusterflow-cloud-aws         │
//! │  terraform / kops / kubectl / S3      │
//! └──────────────────────────────────────┘
//! ```

pub mod assets;
pub mod context;
pub mod error;
pub mod memory;
pub mod provider;
pub mod state;

// Re-exports
pub use assets::{Asset, AssetStore, Destination};
pub use context::ExecutionContext;
pub use error::{CloudError, Result};
pub use memory::MemoryObjectStore;
pub use provider::{
    ApplyRequest, BackendConfig, ClusterApi, ClusterManager, InfraApplier, ObjectStore, Probe,
};
pub use state::{RemoteStateScope, StateLock};
