//! Remote state scope
//!
//! A provisioning run holds two locks while it works on a cluster: a lock
//! file in the local working directory and a lock object in the state
//! bucket. While the remote lock is held, the mirrored local state files
//! are pulled from the bucket on entry and pushed back on exit.
//!
//! The bucket does not exist before the first bootstrap apply. In that case
//! entry only takes the local lock, and exit takes the remote lock just long
//! enough to push the freshly created state.
//!
//! A lock goes stale when it has not been renewed for an hour. Long waits
//! inside a scope renew it through [`RemoteStateScope::renew`]. A scope that
//! finds its lock taken over neither pushes state nor deletes the new
//! holder's lock.

use crate::error::{CloudError, Result};
use crate::provider::ObjectStore;
use chrono::{DateTime, Utc};
use clusterflow_core::ClusterIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

const LOCK_FILE: &str = ".clusterflow.lock";

/// Key of the lock object in the state bucket.
pub const REMOTE_LOCK_KEY: &str = "locks/clusterflow.lock";

/// Key prefix of mirrored state files in the state bucket.
pub const REMOTE_STATE_PREFIX: &str = "state";

/// Locks not renewed for this long are considered abandoned.
const STALE_AFTER_MINUTES: i64 = 60;

static ACQUISITIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockInfo {
    /// `host:pid:sequence`, unique per acquisition.
    holder: String,
    acquired_at: DateTime<Utc>,
    #[serde(default)]
    renewed_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    fn current() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string());
        let sequence = ACQUISITIONS.fetch_add(1, Ordering::Relaxed);
        Self {
            holder: format!("{host}:{}:{sequence}", std::process::id()),
            acquired_at: Utc::now(),
            renewed_at: None,
        }
    }

    fn parse(content: &[u8], location: &str) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| {
            CloudError::LockError(format!("{location} holds an unreadable lock: {e}"))
        })
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.renewed_at.unwrap_or(self.acquired_at)
    }

    fn renewed(&self) -> Self {
        Self {
            renewed_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Fails while an existing lock is still fresh.
    fn ensure_stale(content: &[u8], location: &str) -> Result<()> {
        let existing = Self::parse(content, location)?;

        let idle = Utc::now().signed_duration_since(existing.last_seen());
        if idle.num_minutes() < STALE_AFTER_MINUTES {
            return Err(CloudError::LockError(format!(
                "{location} is locked by {} since {}",
                existing.holder, existing.acquired_at
            )));
        }

        warn!("Removing stale lock from {} in {}", existing.holder, location);
        Ok(())
    }

    /// Whether `content` is still this lock.
    fn is_held_in(&self, content: Option<&[u8]>) -> bool {
        content
            .and_then(|c| serde_json::from_slice::<LockInfo>(c).ok())
            .is_some_and(|current| current.holder == self.holder)
    }
}

/// RAII guard for the local lock file
pub struct StateLock {
    lock_path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl StateLock {
    pub async fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        let lock_path = dir.join(LOCK_FILE);

        if lock_path.exists() {
            let content = fs::read(&lock_path).await?;
            LockInfo::ensure_stale(&content, &lock_path.display().to_string())?;
            fs::remove_file(&lock_path).await?;
        }

        let info = LockInfo::current();
        fs::write(&lock_path, info.to_bytes()?).await?;

        debug!("Acquired local lock {}", lock_path.display());
        Ok(Self {
            lock_path,
            info,
            released: false,
        })
    }

    /// Refresh the lock file so it does not go stale.
    pub async fn renew(&self) -> Result<()> {
        let content = fs::read(&self.lock_path).await.ok();
        if !self.info.is_held_in(content.as_deref()) {
            return Err(CloudError::LockError(format!(
                "{} was taken over by another run",
                self.lock_path.display()
            )));
        }
        fs::write(&self.lock_path, self.info.renewed().to_bytes()?).await?;
        Ok(())
    }

    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            let content = fs::read(&self.lock_path).await.ok();
            if self.info.is_held_in(content.as_deref()) {
                fs::remove_file(&self.lock_path).await?;
                debug!("Released local lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let content = std::fs::read(&self.lock_path).ok();
        if self.info.is_held_in(content.as_deref()) {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// Locked access to the cluster's remote state.
///
/// Close it with [`RemoteStateScope::exit`] on every path. If it is dropped
/// instead, only the local lock is released and the remote lock is left to
/// go stale.
pub struct RemoteStateScope<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    work_dir: PathBuf,
    mirrored: Vec<String>,
    local_lock: Option<StateLock>,
    remote_lock: Option<LockInfo>,
}

impl fmt::Debug for RemoteStateScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStateScope")
            .field("bucket", &self.bucket)
            .field("mirrored", &self.mirrored)
            .field("remote_lock", &self.remote_lock)
            .finish()
    }
}

impl<'a> RemoteStateScope<'a> {
    /// Lock the cluster and pull `mirrored` (paths relative to the working
    /// directory) when the bucket already exists.
    pub async fn enter(
        store: &'a dyn ObjectStore,
        identity: &ClusterIdentity,
        mirrored: &[&str],
    ) -> Result<Self> {
        let local_lock = StateLock::acquire(identity.work_dir()).await?;

        let mut scope = Self {
            store,
            bucket: identity.state_bucket().to_string(),
            work_dir: identity.work_dir().to_path_buf(),
            mirrored: mirrored.iter().map(|p| p.to_string()).collect(),
            local_lock: Some(local_lock),
            remote_lock: None,
        };

        if !store.bucket_exists(&scope.bucket).await? {
            debug!(
                "State bucket {} does not exist yet, skipping remote state",
                scope.bucket
            );
            return Ok(scope);
        }

        scope.acquire_remote().await?;
        if let Err(e) = scope.pull().await {
            if let Err(release) = scope.release_remote().await {
                warn!("Failed to release remote lock: {}", release);
            }
            return Err(e);
        }
        Ok(scope)
    }

    /// Whether remote writes are allowed right now.
    pub fn holds_remote_lock(&self) -> bool {
        self.remote_lock.is_some()
    }

    /// Store and bucket to write through, while the remote lock is held.
    pub fn remote(&self) -> Option<(&'a dyn ObjectStore, &str)> {
        self.remote_lock
            .as_ref()
            .map(|_| (self.store, self.bucket.as_str()))
    }

    /// Keep both locks fresh. Fails when another run has taken either over.
    pub async fn renew(&self) -> Result<()> {
        if let Some(lock) = &self.local_lock {
            lock.renew().await?;
        }
        if let Some(info) = &self.remote_lock {
            if !self.owns_remote(info).await? {
                return Err(self.lost_remote());
            }
            self.store
                .put_object(&self.bucket, REMOTE_LOCK_KEY, info.renewed().to_bytes()?)
                .await?;
            debug!("Renewed remote lock");
        }
        Ok(())
    }

    /// Push mirrored state, release both locks and hand back `result`.
    /// A cleanup failure replaces a successful result; after a failed one it
    /// is only logged.
    pub async fn exit<T, E>(mut self, result: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<CloudError>,
    {
        let closed = self.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!("Failed to close remote state scope: {}", cleanup);
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.remote_lock.is_none() && self.store.bucket_exists(&self.bucket).await? {
            info!("State bucket {} now exists, locking it to push state", self.bucket);
            self.acquire_remote().await?;
        }

        let mut outcome = Ok(());
        if let Some(info) = self.remote_lock.clone() {
            if self.owns_remote(&info).await? {
                outcome = self.push().await;
                let released = self.release_remote().await;
                outcome = outcome.and(released);
            } else {
                self.remote_lock = None;
                outcome = Err(self.lost_remote());
            }
        }

        if let Some(lock) = self.local_lock.take() {
            lock.release().await?;
        }
        outcome
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, REMOTE_LOCK_KEY)
    }

    fn lost_remote(&self) -> CloudError {
        CloudError::LockError(format!(
            "{} was taken over by another run, local state was not pushed",
            self.location()
        ))
    }

    async fn owns_remote(&self, info: &LockInfo) -> Result<bool> {
        let current = self.store.get_object(&self.bucket, REMOTE_LOCK_KEY).await?;
        Ok(info.is_held_in(current.as_deref()))
    }

    async fn acquire_remote(&mut self) -> Result<()> {
        let location = self.location();
        let info = LockInfo::current();
        let body = info.to_bytes()?;

        if !self
            .store
            .put_object_if_absent(&self.bucket, REMOTE_LOCK_KEY, body.clone())
            .await?
        {
            let existing = self
                .store
                .get_object(&self.bucket, REMOTE_LOCK_KEY)
                .await?
                .unwrap_or_default();
            LockInfo::ensure_stale(&existing, &location)?;
            self.store
                .delete_object(&self.bucket, REMOTE_LOCK_KEY)
                .await?;

            if !self
                .store
                .put_object_if_absent(&self.bucket, REMOTE_LOCK_KEY, body)
                .await?
            {
                return Err(CloudError::LockError(format!(
                    "{location} was taken by another run"
                )));
            }
        }

        self.remote_lock = Some(info);
        debug!("Acquired remote lock {}", location);
        Ok(())
    }

    async fn release_remote(&mut self) -> Result<()> {
        if let Some(info) = self.remote_lock.take() {
            if self.owns_remote(&info).await? {
                self.store
                    .delete_object(&self.bucket, REMOTE_LOCK_KEY)
                    .await?;
                debug!("Released remote lock");
            } else {
                warn!("Remote lock {} is held by another run now", self.location());
            }
        }
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        for path in &self.mirrored {
            let key = remote_state_key(path);
            let Some(content) = self.store.get_object(&self.bucket, &key).await? else {
                debug!("No remote copy of {}", path);
                continue;
            };

            let local = self.work_dir.join(path);
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&local, content).await?;
            debug!("Pulled {} from s3://{}/{}", path, self.bucket, key);
        }
        Ok(())
    }

    async fn push(&self) -> Result<()> {
        for path in &self.mirrored {
            let local = self.work_dir.join(path);
            if !local.exists() {
                continue;
            }
            let content = fs::read(&local).await?;
            let key = remote_state_key(path);
            self.store.put_object(&self.bucket, &key, content).await?;
            debug!("Pushed {} to s3://{}/{}", path, self.bucket, key);
        }
        Ok(())
    }
}

fn remote_state_key(path: &str) -> String {
    format!("{REMOTE_STATE_PREFIX}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;
    use tempfile::tempdir;

    const MIRRORED: &[&str] = &["tf_state/terraform.tfstate"];

    fn identity(root: &Path) -> ClusterIdentity {
        ClusterIdentity::new("dev.example.com", root).unwrap()
    }

    #[tokio::test]
    async fn test_local_lock_conflict() {
        let temp_dir = tempdir().unwrap();

        let lock = StateLock::acquire(temp_dir.path()).await.unwrap();
        let second = StateLock::acquire(temp_dir.path()).await;
        assert!(matches!(second, Err(CloudError::LockError(_))));

        lock.release().await.unwrap();
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
        StateLock::acquire(temp_dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_lock_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        {
            let _lock = StateLock::acquire(temp_dir.path()).await.unwrap();
            assert!(temp_dir.path().join(LOCK_FILE).exists());
        }
        assert!(!temp_dir.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_stale_local_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let stale = LockInfo {
            holder: "old-host:1".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            renewed_at: None,
        };
        std::fs::write(
            temp_dir.path().join(LOCK_FILE),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        StateLock::acquire(temp_dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_scope_without_bucket_pushes_after_creation() {
        let temp_dir = tempdir().unwrap();
        let identity = identity(temp_dir.path());
        let store = MemoryObjectStore::new();

        let scope = RemoteStateScope::enter(&store, &identity, MIRRORED)
            .await
            .unwrap();
        assert!(!scope.holds_remote_lock());
        assert!(scope.remote().is_none());

        // The bootstrap apply creates the bucket and the local state.
        store.create_bucket("dev-example-com-state");
        let state = identity.work_dir().join("tf_state/terraform.tfstate");
        std::fs::create_dir_all(state.parent().unwrap()).unwrap();
        std::fs::write(&state, b"{\"serial\":1}").unwrap();

        scope.exit::<_, CloudError>(Ok(())).await.unwrap();

        assert_eq!(
            store
                .object("dev-example-com-state", "state/tf_state/terraform.tfstate")
                .unwrap(),
            b"{\"serial\":1}"
        );
        assert!(store.object("dev-example-com-state", REMOTE_LOCK_KEY).is_none());
        assert!(!identity.work_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_scope_pulls_on_enter_and_releases_on_failure() {
        let temp_dir = tempdir().unwrap();
        let identity = identity(temp_dir.path());
        let store = MemoryObjectStore::with_bucket("dev-example-com-state");
        store
            .put_object(
                "dev-example-com-state",
                "state/tf_state/terraform.tfstate",
                b"remote".to_vec(),
            )
            .await
            .unwrap();

        let scope = RemoteStateScope::enter(&store, &identity, MIRRORED)
            .await
            .unwrap();
        assert!(scope.holds_remote_lock());
        assert!(store.object("dev-example-com-state", REMOTE_LOCK_KEY).is_some());
        assert_eq!(
            std::fs::read(identity.work_dir().join("tf_state/terraform.tfstate")).unwrap(),
            b"remote"
        );

        let result: std::result::Result<(), CloudError> = scope
            .exit(Err(CloudError::CommandFailed {
                program: "terraform".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "apply failed".to_string(),
            }))
            .await;
        assert!(matches!(result, Err(CloudError::CommandFailed { .. })));
        assert!(store.object("dev-example-com-state", REMOTE_LOCK_KEY).is_none());
        assert!(!identity.work_dir().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_fresh_remote_lock_blocks_second_run() {
        let temp_dir = tempdir().unwrap();
        let store = MemoryObjectStore::with_bucket("dev-example-com-state");

        let first_root = temp_dir.path().join("first");
        let second_root = temp_dir.path().join("second");
        let first = identity(&first_root);
        let second = identity(&second_root);

        let scope = RemoteStateScope::enter(&store, &first, MIRRORED)
            .await
            .unwrap();

        let blocked = RemoteStateScope::enter(&store, &second, MIRRORED).await;
        assert!(matches!(blocked, Err(CloudError::LockError(_))));
        // The failed entry does not leave its local lock behind.
        assert!(!second.work_dir().join(LOCK_FILE).exists());

        scope.exit::<_, CloudError>(Ok(())).await.unwrap();
        let again = RemoteStateScope::enter(&store, &second, MIRRORED)
            .await
            .unwrap();
        again.exit::<_, CloudError>(Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_remote_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let identity = identity(temp_dir.path());
        let store = MemoryObjectStore::with_bucket("dev-example-com-state");
        let stale = LockInfo {
            holder: "old-host:1".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(3),
            renewed_at: None,
        };
        store
            .put_object(
                "dev-example-com-state",
                REMOTE_LOCK_KEY,
                serde_json::to_vec(&stale).unwrap(),
            )
            .await
            .unwrap();

        let scope = RemoteStateScope::enter(&store, &identity, MIRRORED)
            .await
            .unwrap();
        assert!(scope.holds_remote_lock());
        scope.exit::<_, CloudError>(Ok(())).await.unwrap();
    }

    /// Rewrite the remote lock of `scope` as if it had not been renewed for
    /// `hours`.
    async fn age_remote_lock(store: &MemoryObjectStore, scope: &RemoteStateScope<'_>, hours: i64) {
        let mut info = scope.remote_lock.clone().unwrap();
        info.acquired_at = Utc::now() - chrono::Duration::hours(hours);
        info.renewed_at = None;
        store
            .put_object(
                "dev-example-com-state",
                REMOTE_LOCK_KEY,
                serde_json::to_vec(&info).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_taken_over_scope_keeps_new_holders_lock() {
        let temp_dir = tempdir().unwrap();
        let store = MemoryObjectStore::with_bucket("dev-example-com-state");
        let first = identity(&temp_dir.path().join("first"));
        let second = identity(&temp_dir.path().join("second"));

        let first_scope = RemoteStateScope::enter(&store, &first, MIRRORED)
            .await
            .unwrap();
        age_remote_lock(&store, &first_scope, 2).await;

        let second_scope = RemoteStateScope::enter(&store, &second, MIRRORED)
            .await
            .unwrap();
        let second_holder = second_scope.remote_lock.clone().unwrap().holder;

        let state = first.work_dir().join("tf_state/terraform.tfstate");
        std::fs::create_dir_all(state.parent().unwrap()).unwrap();
        std::fs::write(&state, b"outdated").unwrap();

        assert!(matches!(first_scope.renew().await, Err(CloudError::LockError(_))));
        let result = first_scope.exit::<_, CloudError>(Ok(())).await;
        assert!(matches!(result, Err(CloudError::LockError(_))));

        let lock = store.object("dev-example-com-state", REMOTE_LOCK_KEY).unwrap();
        let lock: LockInfo = serde_json::from_slice(&lock).unwrap();
        assert_eq!(lock.holder, second_holder);
        assert!(
            store
                .object("dev-example-com-state", "state/tf_state/terraform.tfstate")
                .is_none()
        );
        assert!(!first.work_dir().join(LOCK_FILE).exists());

        second_scope.exit::<_, CloudError>(Ok(())).await.unwrap();
        assert!(store.object("dev-example-com-state", REMOTE_LOCK_KEY).is_none());
    }

    #[tokio::test]
    async fn test_renewed_lock_is_not_stale() {
        let temp_dir = tempdir().unwrap();
        let store = MemoryObjectStore::with_bucket("dev-example-com-state");
        let first = identity(&temp_dir.path().join("first"));
        let second = identity(&temp_dir.path().join("second"));

        let scope = RemoteStateScope::enter(&store, &first, MIRRORED)
            .await
            .unwrap();
        age_remote_lock(&store, &scope, 5).await;
        scope.renew().await.unwrap();

        let blocked = RemoteStateScope::enter(&store, &second, MIRRORED).await;
        assert!(matches!(blocked, Err(CloudError::LockError(_))));

        scope.exit::<_, CloudError>(Ok(())).await.unwrap();
        assert!(store.object("dev-example-com-state", REMOTE_LOCK_KEY).is_none());
    }

    #[test]
    fn test_staleness_follows_last_renewal() {
        let renewed = LockInfo {
            holder: "host:1:0".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(4),
            renewed_at: Some(Utc::now() - chrono::Duration::minutes(5)),
        };
        let content = serde_json::to_vec(&renewed).unwrap();
        assert!(LockInfo::ensure_stale(&content, "lock").is_err());

        let idle = LockInfo {
            renewed_at: Some(Utc::now() - chrono::Duration::minutes(90)),
            ..renewed
        };
        let content = serde_json::to_vec(&idle).unwrap();
        assert!(LockInfo::ensure_stale(&content, "lock").is_ok());
    }

    #[tokio::test]
    async fn test_local_lock_renew_and_takeover() {
        let temp_dir = tempdir().unwrap();
        let lock = StateLock::acquire(temp_dir.path()).await.unwrap();
        lock.renew().await.unwrap();

        let content = std::fs::read(temp_dir.path().join(LOCK_FILE)).unwrap();
        let info: LockInfo = serde_json::from_slice(&content).unwrap();
        assert!(info.renewed_at.is_some());

        // Another run replaced the file; releasing must not remove it.
        let other = LockInfo::current();
        std::fs::write(temp_dir.path().join(LOCK_FILE), other.to_bytes().unwrap()).unwrap();
        assert!(matches!(lock.renew().await, Err(CloudError::LockError(_))));
        lock.release().await.unwrap();
        assert!(temp_dir.path().join(LOCK_FILE).exists());
    }
}
