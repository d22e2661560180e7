//! Housekeeper (C9): background prune actor. Wakes on an interval, enforces
//! the storage budget by deleting the oldest sessions, and is cooperatively
//! cancellable via a `CancellationToken`.

use super::store::{BlobStore, MetadataIndex, SessionStore};
use crate::config::AppConfig;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Outcome of one prune cycle, also used as the return value of manual
/// `prune-size` invocations.
#[derive(Debug, Default, Serialize)]
pub struct PruneSummary {
    pub item_count: usize,
    pub deleted_count: usize,
    pub freed_mb: f64,
    pub final_mb: f64,
    pub target_mb: f64,
    pub anomalies: usize,
    pub exit_code: i32,
}

pub struct Housekeeper<B: BlobStore, M: MetadataIndex> {
    store: Arc<SessionStore<B, M>>,
    lock_path: PathBuf,
    max_bytes: u64,
    stale_after: Duration,
}

impl<B: BlobStore, M: MetadataIndex> Housekeeper<B, M> {
    pub fn new(store: Arc<SessionStore<B, M>>, config: &AppConfig) -> Self {
        Self {
            store,
            lock_path: config.prune_lock_path(),
            max_bytes: config.max_storage_bytes(),
            stale_after: Duration::from_secs(config.housekeeper_stale_after_s),
        }
    }

    /// Run forever until `cancel` fires, sleeping `interval` between cycles.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(event = "housekeeper_shutdown", operation = "housekeeper", stage = "shutdown", dependency = "none", cause_type = "cancelled", remediation = "none");
                    return;
                }
                _ = ticker.tick() => {
                    let summary = self.run_once().await;
                    tracing::info!(
                        event = "housekeeper_cycle",
                        operation = "prune_size",
                        item_count = summary.item_count,
                        deleted_count = summary.deleted_count,
                        freed_mb = summary.freed_mb,
                        final_mb = summary.final_mb,
                        target_mb = summary.target_mb,
                        anomalies = summary.anomalies,
                    );
                }
            }
        }
    }

    /// One prune cycle: acquire the file lock, compute total bytes, delete
    /// oldest-first until under budget, release the lock.
    pub async fn run_once(&self) -> PruneSummary {
        let target_mb = self.max_bytes as f64 / (1024.0 * 1024.0);

        if !self.acquire_lock().await {
            tracing::warn!(
                event = "lock_busy",
                operation = "prune_size",
                stage = "lock",
                dependency = "prune_lock",
                cause_type = "lock_held",
                remediation = "another process holds the prune lock; skipping this cycle",
            );
            return PruneSummary { target_mb, exit_code: 0, ..Default::default() };
        }

        let mut sessions = self.store.all_sessions().await;
        let item_count = sessions.len();
        let starting_bytes: u64 = sessions.iter().map(|s| s.total_size_bytes as u64).sum();
        let mut total_bytes = starting_bytes;
        let mut deleted_count = 0usize;
        let mut anomalies = 0usize;

        sessions.sort_by_key(|s| s.created_at);

        for session in sessions {
            if total_bytes <= self.max_bytes {
                break;
            }
            if !self.store.blob_exists(&session.session_id).await {
                anomalies += 1;
                tracing::warn!(
                    event = "prune_anomaly",
                    operation = "prune_size",
                    stage = "scan",
                    dependency = "session_store",
                    cause_type = "missing_blob",
                    remediation = "metadata entry has no backing blob; skipping without deleting",
                    session_id = %session.session_id,
                );
                continue;
            }
            match self.store.delete(&session.session_id).await {
                Ok(()) => {
                    total_bytes = total_bytes.saturating_sub(session.total_size_bytes as u64);
                    deleted_count += 1;
                }
                Err(err) => {
                    anomalies += 1;
                    tracing::warn!(
                        event = "prune_anomaly",
                        operation = "prune_size",
                        stage = "delete",
                        dependency = "session_store",
                        cause_type = "delete_failed",
                        remediation = "stopping this cycle; will retry next interval",
                        session_id = %session.session_id,
                        error = %err,
                    );
                    break;
                }
            }
        }

        self.release_lock().await;

        PruneSummary {
            item_count,
            deleted_count,
            freed_mb: starting_bytes.saturating_sub(total_bytes) as f64 / (1024.0 * 1024.0),
            final_mb: total_bytes as f64 / (1024.0 * 1024.0),
            target_mb,
            anomalies,
            exit_code: 0,
        }
    }

    async fn acquire_lock(&self) -> bool {
        match tokio::fs::metadata(&self.lock_path).await {
            Ok(meta) => {
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|m| SystemTime::now().duration_since(m).ok())
                    .unwrap_or(Duration::MAX);
                if age < self.stale_after {
                    return false;
                }
                let _ = tokio::fs::write(&self.lock_path, b"").await;
                true
            }
            Err(_) => {
                if let Some(parent) = self.lock_path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                tokio::fs::write(&self.lock_path, b"").await.is_ok()
            }
        }
    }

    async fn release_lock(&self) {
        let _ = tokio::fs::remove_file(&self.lock_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{FsBlobStore, FsMetadataIndex};
    use crate::types::SessionContentType;
    use tempfile::tempdir;

    async fn make_config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            storage_root: dir.to_path_buf(),
            max_storage_mb: 0,
            housekeeper_stale_after_s: 3600,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn prunes_oldest_sessions_first_until_under_budget() {
        let dir = tempdir().unwrap();
        let config = make_config(dir.path()).await;
        let blobs = FsBlobStore::new(config.blobs_dir());
        let metadata = FsMetadataIndex::load(config.metadata_path()).await.unwrap();
        let store = Arc::new(SessionStore::new(blobs, metadata));

        let old_id = store.create(&vec![0u8; 1000], "https://a.example.com", None, 100, SessionContentType::RawCrawl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let new_id = store.create(&vec![0u8; 1000], "https://b.example.com", None, 100, SessionContentType::RawCrawl).await.unwrap();

        let housekeeper = Housekeeper::new(store.clone(), &config);
        let summary = housekeeper.run_once().await;

        assert!(summary.deleted_count >= 1);
        assert!(store.info(&old_id, &[]).await.is_err());
        let _ = new_id;
    }

    #[tokio::test]
    async fn missing_blob_is_counted_as_anomaly_and_not_deleted_as_a_normal_hit() {
        let dir = tempdir().unwrap();
        let config = make_config(dir.path()).await;
        let blobs = FsBlobStore::new(config.blobs_dir());
        let metadata = FsMetadataIndex::load(config.metadata_path()).await.unwrap();
        let store = Arc::new(SessionStore::new(blobs, metadata));

        let orphan_id = store.create(&vec![0u8; 1000], "https://a.example.com", None, 100, SessionContentType::RawCrawl).await.unwrap();
        tokio::fs::remove_file(config.blobs_dir().join(format!("{orphan_id}.bin"))).await.unwrap();

        let housekeeper = Housekeeper::new(store.clone(), &config);
        let summary = housekeeper.run_once().await;

        assert_eq!(summary.anomalies, 1);
        assert_eq!(summary.deleted_count, 0);
        assert!(store.info(&orphan_id, &[]).await.is_ok(), "orphaned metadata entry should survive the cycle, not be blindly deleted");
    }

    #[tokio::test]
    async fn held_fresh_lock_skips_cycle() {
        let dir = tempdir().unwrap();
        let config = make_config(dir.path()).await;
        tokio::fs::create_dir_all(config.sessions_dir()).await.unwrap();
        tokio::fs::write(config.prune_lock_path(), b"").await.unwrap();

        let blobs = FsBlobStore::new(config.blobs_dir());
        let metadata = FsMetadataIndex::load(config.metadata_path()).await.unwrap();
        let store = Arc::new(SessionStore::new(blobs, metadata));
        let housekeeper = Housekeeper::new(store, &config);

        let summary = housekeeper.run_once().await;
        assert_eq!(summary.deleted_count, 0);
        assert_eq!(summary.item_count, 0);
    }
}
