//! # Orchestrator Client (consumed boundary)
//!
//! A capability trait at the cluster boundary: every read and write the
//! rest of the crate needs from the orchestrator, expressed as value types
//! rather than a concrete client, since the concrete orchestrator
//! integration is explicitly out of scope. No concrete Kubernetes client
//! is provided, only this trait and a test/demo double.

use crate::error::Result;
use crate::events::EventReason;
use crate::types::{ResourcePatch, ResourceSpec, WorkloadId, WorkloadKind};
use async_trait::async_trait;

/// Everything the reconciler, safety gate, and rollback store need from the
/// orchestrator.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// List workload identities of `kind` in `namespace`.
    async fn list_workloads(&self, namespace: &str, kind: WorkloadKind) -> Result<Vec<WorkloadId>>;

    /// Read a container's current resource configuration.
    async fn get_resources(&self, workload: &WorkloadId, container: &str) -> Result<ResourceSpec>;

    /// Apply a strategic-merge patch to a container's resource requests.
    async fn patch_resources(
        &self,
        workload: &WorkloadId,
        container: &str,
        patch: &ResourcePatch,
    ) -> Result<()>;

    /// Number of OOM kills observed for a container.
    async fn oom_count(&self, workload: &WorkloadId, container: &str) -> Result<u32>;

    /// Whether a horizontal autoscaler is attached to this workload.
    async fn hpa_attached(&self, workload: &WorkloadId) -> Result<bool>;

    /// Whether taking `unavailable` replicas offline would violate the
    /// workload's disruption budget.
    async fn pdb_would_violate(&self, workload: &WorkloadId, unavailable: u32) -> Result<bool>;

    /// Whether an active SLA violation is currently reported for this
    /// workload by an external health signal.
    async fn sla_violation_active(&self, workload: &WorkloadId) -> Result<bool>;

    /// Emit an orchestrator event with a typed reason code.
    async fn emit_event(&self, workload: &WorkloadId, reason: EventReason, message: &str) -> Result<()>;
}

/// A no-op [`OrchestratorClient`] for tests and demos: reports empty
/// inventories, no OOMs, no HPA/PDB conflicts, and swallows events.
#[derive(Debug, Clone, Default)]
pub struct NullOrchestratorClient;

#[async_trait]
impl OrchestratorClient for NullOrchestratorClient {
    async fn list_workloads(&self, _namespace: &str, _kind: WorkloadKind) -> Result<Vec<WorkloadId>> {
        Ok(Vec::new())
    }

    async fn get_resources(&self, _workload: &WorkloadId, _container: &str) -> Result<ResourceSpec> {
        Ok(ResourceSpec {
            cpu_request: 0.0,
            memory_request: 0.0,
            cpu_limit: 0.0,
            memory_limit: 0.0,
        })
    }

    async fn patch_resources(
        &self,
        _workload: &WorkloadId,
        _container: &str,
        _patch: &ResourcePatch,
    ) -> Result<()> {
        Ok(())
    }

    async fn oom_count(&self, _workload: &WorkloadId, _container: &str) -> Result<u32> {
        Ok(0)
    }

    async fn hpa_attached(&self, _workload: &WorkloadId) -> Result<bool> {
        Ok(false)
    }

    async fn pdb_would_violate(&self, _workload: &WorkloadId, _unavailable: u32) -> Result<bool> {
        Ok(false)
    }

    async fn sla_violation_active(&self, _workload: &WorkloadId) -> Result<bool> {
        Ok(false)
    }

    async fn emit_event(&self, _workload: &WorkloadId, _reason: EventReason, _message: &str) -> Result<()> {
        Ok(())
    }
}
