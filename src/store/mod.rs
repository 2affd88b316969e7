//! # Sample Store (C1)
//!
//! Shared container history indexed by workload identity:
//! `Arc<RwLock<HashMap<...>>>`, reads return deep copies, writers hold the
//! lock only for the append itself. Persisted as a single JSON document
//! per snapshot, written atomically.

use crate::error::Result;
use crate::persistence;
use crate::types::{ContainerSample, WorkloadId};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Concurrent, time-bounded container sample history.
#[derive(Debug, Clone)]
pub struct SampleStore {
    samples: Arc<RwLock<HashMap<WorkloadId, Vec<ContainerSample>>>>,
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            samples: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append one sample. Amortized O(1) under a short-held write lock.
    #[instrument(skip(self, sample))]
    pub async fn add(&self, sample: ContainerSample) {
        let mut guard = self.samples.write().await;
        guard.entry(sample.workload.clone()).or_default().push(sample);
    }

    /// Samples for every workload in `namespace`, newer than `now - since`.
    #[instrument(skip(self))]
    pub async fn by_namespace(&self, namespace: &str, since: Duration) -> Vec<ContainerSample> {
        let cutoff = Utc::now() - since;
        let guard = self.samples.read().await;
        guard
            .iter()
            .filter(|(workload, _)| workload.namespace == namespace)
            .flat_map(|(_, samples)| samples.iter())
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Samples for one workload, newer than `now - since`.
    #[instrument(skip(self))]
    pub async fn by_workload(&self, workload: &WorkloadId, since: Duration) -> Vec<ContainerSample> {
        let cutoff = Utc::now() - since;
        let guard = self.samples.read().await;
        guard
            .get(workload)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove samples older than `max_age`; drop keys left empty. Returns
    /// the number of samples removed, for telemetry.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut guard = self.samples.write().await;
        let mut removed = 0usize;

        guard.retain(|_, samples| {
            let before = samples.len();
            samples.retain(|s| s.timestamp >= cutoff);
            removed += before - samples.len();
            !samples.is_empty()
        });

        debug!(removed, "sample store cleanup");
        removed
    }

    /// Drop any history whose workload is not in `active`.
    #[instrument(skip(self, active))]
    pub async fn sync(&self, active: &HashSet<WorkloadId>) {
        let mut guard = self.samples.write().await;
        guard.retain(|workload, _| active.contains(workload));
    }

    /// Write the full store to `path` as JSON, atomically.
    ///
    /// `WorkloadId` is not a string, so the map is flattened to a vector of
    /// `(key, value)` entries first: `serde_json` can only serialize
    /// string-keyed maps as JSON objects.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let guard = self.samples.read().await;
        let entries: Vec<(WorkloadId, Vec<ContainerSample>)> = guard.clone().into_iter().collect();
        persistence::save_json(path, &entries)
    }

    /// Replace the store's contents with the snapshot at `path`. Absence
    /// of the file is not an error: the store becomes empty.
    pub async fn load_snapshot(&self, path: &Path) -> Result<()> {
        let entries: Vec<(WorkloadId, Vec<ContainerSample>)> = persistence::load_json(path)?;
        let mut guard = self.samples.write().await;
        *guard = entries.into_iter().collect();
        Ok(())
    }

    /// Number of distinct workloads currently tracked. Useful for tests
    /// and CLI reporting.
    pub async fn workload_count(&self) -> usize {
        self.samples.read().await.len()
    }

    /// A full copy of every tracked workload's history, for CLI reporting
    /// (e.g. the `cost` subcommand) where per-workload/per-namespace
    /// filtering happens outside the store.
    pub async fn snapshot(&self) -> Vec<(WorkloadId, Vec<ContainerSample>)> {
        self.samples.read().await.clone().into_iter().collect()
    }
}

/// Spawn a background task that calls [`SampleStore::cleanup`] on a fixed
/// interval.
pub fn spawn_cleanup_task(store: SampleStore, interval: std::time::Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = store.cleanup(max_age).await;
            if removed > 0 {
                debug!(removed, "background cleanup removed stale samples");
            }
        }
    })
}

/// Default path for the sample store's durable snapshot.
pub fn default_snapshot_path(state_dir: &Path) -> PathBuf {
    state_dir.join("samples.json")
}

fn sample(workload: &WorkloadId, container: &str, timestamp: DateTime<Utc>) -> ContainerSample {
    ContainerSample {
        workload: workload.clone(),
        container: container.to_string(),
        timestamp,
        usage_cpu_millicores: 100.0,
        usage_memory_bytes: 1024.0,
        request_cpu_millicores: 200.0,
        request_memory_bytes: 2048.0,
        limit_cpu_millicores: 400.0,
        limit_memory_bytes: 4096.0,
    }
}
