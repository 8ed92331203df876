//! Convergence pollers
//!
//! Fixed-interval, unbounded retry. A poll ends only when its check reports
//! ready; there is no attempt cap and no backoff. A poller running inside a
//! remote state scope renews the scope's locks on every wait so that an
//! unbounded wait never lets them go stale.

use crate::clock::Clock;
use crate::error::Result;
use clusterflow_cloud::{ClusterApi, ClusterManager, ExecutionContext, Probe, RemoteStateScope};
use clusterflow_core::{ExpectedFailures, ValidationReport};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait between attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    NotReady(String),
}

pub struct Poller<'a> {
    clock: &'a dyn Clock,
    interval: Duration,
    lease: Option<&'a RemoteStateScope<'a>>,
}

impl<'a> Poller<'a> {
    pub fn new(clock: &'a dyn Clock, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            lease: None,
        }
    }

    /// Renew the locks of `scope` on every wait.
    pub fn with_lease(mut self, scope: &'a RemoteStateScope<'a>) -> Self {
        self.lease = Some(scope);
        self
    }

    /// Run `check` until it reports ready, sleeping `interval` after every
    /// miss. Returns the number of attempts made. Fails only when the lease
    /// was lost.
    pub async fn poll_until<F, Fut>(&self, name: &str, mut check: F) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollOutcome>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match check().await {
                PollOutcome::Ready => {
                    info!(attempt, "{} succeeded", name);
                    return Ok(attempt);
                }
                PollOutcome::NotReady(reason) => {
                    warn!(
                        attempt,
                        "{} not ready: {}. Retrying in {} seconds",
                        name,
                        reason,
                        self.interval.as_secs()
                    );
                    if let Some(lease) = self.lease {
                        lease.renew().await?;
                    }
                    self.clock.sleep(self.interval).await;
                }
            }
        }
    }

    /// Await a long-running collaborator call, renewing the lease every
    /// interval while it runs.
    pub async fn hold<T, Fut>(&self, task: Fut) -> Result<T>
    where
        Fut: Future<Output = clusterflow_cloud::Result<T>>,
    {
        let Some(lease) = self.lease else {
            return Ok(task.await?);
        };

        let keep_alive = async {
            loop {
                self.clock.sleep(self.interval).await;
                if let Err(e) = lease.renew().await {
                    return e;
                }
                debug!("Lease renewed while waiting");
            }
        };

        tokio::select! {
            biased;
            result = task => Ok(result?),
            lost = keep_alive => Err(lost.into()),
        }
    }
}

/// One validation attempt.
pub async fn check_validation(
    manager: &dyn ClusterManager,
    ctx: &ExecutionContext,
    expected: &ExpectedFailures,
) -> PollOutcome {
    let bytes = match manager.validate(ctx).await {
        Ok(bytes) => bytes,
        Err(e) => return PollOutcome::NotReady(format!("validation could not run: {e}")),
    };

    let Some(report) = ValidationReport::parse(&bytes) else {
        return PollOutcome::NotReady("validation report is not readable yet".to_string());
    };
    debug!(?report, "Validation report");

    let unexpected: Vec<&str> = report
        .unexpected_failures(expected)
        .map(|f| f.name.as_str())
        .collect();
    if unexpected.is_empty() {
        PollOutcome::Ready
    } else {
        PollOutcome::NotReady(format!("validation failures: {}", unexpected.join(", ")))
    }
}

/// One authenticated API read.
pub async fn check_auth_readiness(api: &dyn ClusterApi, ctx: &ExecutionContext) -> PollOutcome {
    match api.probe(ctx).await {
        Probe::Succeeded => PollOutcome::Ready,
        Probe::Failed(reason) => PollOutcome::NotReady(reason),
    }
}

/// Block until validation passes, ignoring expected failures.
pub async fn await_convergence(
    poller: &Poller<'_>,
    manager: &dyn ClusterManager,
    ctx: &ExecutionContext,
    expected: &ExpectedFailures,
) -> Result<u32> {
    poller
        .poll_until("Cluster validation", move || {
            check_validation(manager, ctx, expected)
        })
        .await
}

/// Block until the cluster API accepts the credentials in `ctx`.
pub async fn await_auth_readiness(
    poller: &Poller<'_>,
    api: &dyn ClusterApi,
    ctx: &ExecutionContext,
) -> Result<u32> {
    poller
        .poll_until("Cluster authentication", move || check_auth_readiness(api, ctx))
        .await
}
