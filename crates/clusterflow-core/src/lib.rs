//! ClusterFlow core
//!
//! Pure domain logic shared by every other ClusterFlow crate. Nothing in
//! here invokes an external process or touches remote storage; the only
//! I/O is reading and rewriting local files handed in by the caller.
//!
//! # Contents
//!
//! - [`identity`]: cluster name, derived state bucket and working directory
//! - [`inputs`]: the resolved input set and its var-file identifiers
//! - [`output`]: flattened infra-applier output
//! - [`document`]: patches applied to the cluster manager's generated
//!   infra document before it is applied alongside ours
//! - [`validation`]: cluster validation reports and the convergence predicate
//! - [`kubeconfig`] / [`environment`]: final artifacts handed to the operator
//! - [`template`]: Tera rendering of cluster-spec and manifest templates

pub mod document;
pub mod environment;
pub mod error;
pub mod identity;
pub mod inputs;
pub mod kubeconfig;
pub mod output;
pub mod template;
pub mod validation;

// Re-exports
pub use document::{GENERATED_DOCUMENT, transform, transform_file};
pub use environment::{KOPS_FEATURE_FLAGS, default_environment_file};
pub use error::{CoreError, Result};
pub use identity::ClusterIdentity;
pub use inputs::{InputSet, InputSource};
pub use kubeconfig::{ClusterEndpoint, Kubeconfig, KubeconfigParams, build_kubeconfig};
pub use output::InfraOutput;
pub use template::TemplateProcessor;
pub use validation::{ExpectedFailures, ValidationFailure, ValidationReport};
