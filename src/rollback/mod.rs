//! # Rollback Store (C11)
//!
//! Ring-buffer history of previously-applied resource configurations,
//! keyed by `(namespace, kind, name, container)`. Grounded on
//! `KnowledgeBase`'s persist/load and bounded-history shape, with the
//! persistence target swapped for the plain atomic-JSON-file helper in
//! `persistence.rs` (see `DESIGN.md` for why `sled` was dropped).

use crate::error::Result;
use crate::orchestrator::OrchestratorClient;
use crate::persistence;
use crate::types::{ResourcePatch, RollbackEntry, WorkloadId};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Ring-buffer depth per `(workload, container)`.
pub const MAX_HISTORY_PER_WORKLOAD: usize = 5;

/// Key identifying one container's rollback history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RollbackKey {
    /// Workload identity.
    pub workload: WorkloadId,
    /// Container name.
    pub container: String,
}

/// Bounded-history store of previously-applied resource configurations.
#[derive(Debug, Clone)]
pub struct RollbackStore {
    history: Arc<RwLock<HashMap<RollbackKey, Vec<RollbackEntry>>>>,
}

impl Default for RollbackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self {
            history: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Read the container's current configuration from the orchestrator and
    /// append it, evicting the oldest entry once the ring buffer is full.
    #[instrument(skip(self, client))]
    pub async fn save_previous(
        &self,
        client: &dyn OrchestratorClient,
        workload: &WorkloadId,
        container: &str,
    ) -> Result<()> {
        let current = client.get_resources(workload, container).await?;
        let entry = RollbackEntry {
            workload: workload.clone(),
            container: container.to_string(),
            cpu: current.cpu_request,
            memory: current.memory_request,
            timestamp: Utc::now(),
        };

        let key = RollbackKey {
            workload: workload.clone(),
            container: container.to_string(),
        };

        let mut guard = self.history.write().await;
        let entries = guard.entry(key).or_default();
        entries.push(entry);
        if entries.len() > MAX_HISTORY_PER_WORKLOAD {
            entries.remove(0);
        }

        Ok(())
    }

    /// Apply the penultimate (last-but-one) entry through the orchestrator,
    /// then drop the most recent entry. A no-op if fewer than two entries
    /// are on record.
    #[instrument(skip(self, client))]
    pub async fn rollback_workload(
        &self,
        client: &dyn OrchestratorClient,
        workload: &WorkloadId,
        container: &str,
    ) -> Result<bool> {
        let key = RollbackKey {
            workload: workload.clone(),
            container: container.to_string(),
        };

        let target = {
            let mut guard = self.history.write().await;
            let Some(entries) = guard.get_mut(&key) else {
                return Ok(false);
            };
            if entries.len() < 2 {
                return Ok(false);
            }
            entries.pop();
            entries.last().cloned()
        };

        let Some(target) = target else {
            return Ok(false);
        };

        let patch = ResourcePatch {
            cpu_request: target.cpu,
            memory_request: target.memory,
            cpu_limit: None,
            memory_limit: None,
        };
        client.patch_resources(workload, container, &patch).await?;
        debug!(workload = %workload.name, container, "rolled back to previous resource configuration");
        Ok(true)
    }

    /// Most recent entries for every tracked `(workload, container)`, for
    /// CLI inspection.
    pub async fn history_for(&self, workload: &WorkloadId) -> Vec<RollbackEntry> {
        let guard = self.history.read().await;
        guard
            .iter()
            .filter(|(key, _)| &key.workload == workload)
            .flat_map(|(_, entries)| entries.iter().cloned())
            .collect()
    }

    /// A full copy of every tracked `(workload, container)`'s history, for
    /// CLI reporting (e.g. the `history` subcommand).
    pub async fn all_entries(&self) -> Vec<(RollbackKey, Vec<RollbackEntry>)> {
        self.history.read().await.clone().into_iter().collect()
    }

    /// Write the full store to `path` as JSON, atomically.
    ///
    /// `RollbackKey` is not a string, so the map is flattened to a vector
    /// of `(key, value)` entries first: `serde_json` can only serialize
    /// string-keyed maps as JSON objects.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let guard = self.history.read().await;
        let entries: Vec<(RollbackKey, Vec<RollbackEntry>)> = guard.clone().into_iter().collect();
        persistence::save_json(path, &entries)
    }

    /// Replace the store's contents with the snapshot at `path`. Absence of
    /// the file is not an error: the store becomes empty.
    pub async fn load_snapshot(&self, path: &Path) -> Result<()> {
        let entries: Vec<(RollbackKey, Vec<RollbackEntry>)> = persistence::load_json(path)?;
        let mut guard = self.history.write().await;
        *guard = entries.into_iter().collect();
        Ok(())
    }
}

/// Default path for the rollback store's durable snapshot.
pub fn default_snapshot_path(state_dir: &Path) -> PathBuf {
    state_dir.join("rollback.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::NullOrchestratorClient;
    use crate::types::{ResourcePatch, ResourceSpec, WorkloadKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn workload() -> WorkloadId {
        WorkloadId::new("default", WorkloadKind::Deployment, "api")
    }

    #[tokio::test]
    async fn rollback_needs_at_least_two_entries() {
        let store = RollbackStore::new();
        let client = NullOrchestratorClient;
        store.save_previous(&client, &workload(), "app").await.unwrap();

        let rolled_back = store.rollback_workload(&client, &workload(), "app").await.unwrap();
        assert!(!rolled_back);
    }

    #[tokio::test]
    async fn rollback_applies_penultimate_entry_and_drops_latest() {
        #[derive(Default)]
        struct SequencedClient {
            calls: AtomicU32,
        }

        #[async_trait]
        impl OrchestratorClient for SequencedClient {
            async fn list_workloads(&self, _: &str, _: WorkloadKind) -> Result<Vec<WorkloadId>> {
                Ok(Vec::new())
            }
            async fn get_resources(&self, _: &WorkloadId, _: &str) -> Result<ResourceSpec> {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                let cpu = 100.0 * (call + 1) as f64;
                Ok(ResourceSpec {
                    cpu_request: cpu,
                    memory_request: 0.0,
                    cpu_limit: 0.0,
                    memory_limit: 0.0,
                })
            }
            async fn patch_resources(&self, _: &WorkloadId, _: &str, _: &ResourcePatch) -> Result<()> {
                Ok(())
            }
            async fn oom_count(&self, _: &WorkloadId, _: &str) -> Result<u32> {
                Ok(0)
            }
            async fn hpa_attached(&self, _: &WorkloadId) -> Result<bool> {
                Ok(false)
            }
            async fn pdb_would_violate(&self, _: &WorkloadId, _: u32) -> Result<bool> {
                Ok(false)
            }
            async fn sla_violation_active(&self, _: &WorkloadId) -> Result<bool> {
                Ok(false)
            }
            async fn emit_event(&self, _: &WorkloadId, _: crate::events::EventReason, _: &str) -> Result<()> {
                Ok(())
            }
        }

        let store = RollbackStore::new();
        let client = SequencedClient::default();
        store.save_previous(&client, &workload(), "app").await.unwrap(); // cpu 100
        store.save_previous(&client, &workload(), "app").await.unwrap(); // cpu 200

        let rolled_back = store.rollback_workload(&client, &workload(), "app").await.unwrap();
        assert!(rolled_back);

        let history = store.history_for(&workload()).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cpu, 100.0);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_beyond_capacity() {
        let store = RollbackStore::new();
        let client = NullOrchestratorClient;
        for _ in 0..(MAX_HISTORY_PER_WORKLOAD + 3) {
            store.save_previous(&client, &workload(), "app").await.unwrap();
        }
        let history = store.history_for(&workload()).await;
        assert_eq!(history.len(), MAX_HISTORY_PER_WORKLOAD);
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let store = RollbackStore::new();
        let client = NullOrchestratorClient;
        store.save_previous(&client, &workload(), "app").await.unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("rollback.json");
        store.save_snapshot(&path).await.unwrap();

        let restored = RollbackStore::new();
        restored.load_snapshot(&path).await.unwrap();
        assert_eq!(restored.history_for(&workload()).await.len(), 1);
    }

    #[tokio::test]
    async fn load_snapshot_missing_file_is_not_an_error() {
        let store = RollbackStore::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        store.load_snapshot(&path).await.unwrap();
        assert_eq!(store.history_for(&workload()).await.len(), 0);
    }
}
