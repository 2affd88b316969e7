//! # Reconciler / Applier (C10)
//!
//! Sequential per-container apply pipeline: snapshot the current
//! configuration into the rollback store, emit `ScalingStarted`, compute
//! the patch, branch on dry-run, apply with retry, poll for readiness,
//! then emit `ScalingCompleted` or roll back on failure.
//!
//! Concurrency: a bounded `tokio::sync::Semaphore` caps in-flight applies
//! (default 4); a `tokio::sync::Mutex` per `(workload, container)` serializes
//! repeated applies to the same target across the apply+rollback-capture
//! span.
//!
//! The consumed [`OrchestratorClient`] trait has no dedicated
//! "wait for rollout" operation, so readiness is approximated by
//! re-reading `get_resources` until it reflects the applied patch or the
//! poll budget is exhausted.

use crate::error::{Error, Result};
use crate::events::EventReason;
use crate::orchestrator::OrchestratorClient;
use crate::rollback::RollbackStore;
use crate::safety::CircuitBreaker;
use crate::types::{ContainerRecommendation, ResourcePatch, WorkloadId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{instrument, warn};

/// Outcome of one container's apply attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The patch was applied and readiness confirmed.
    Applied,
    /// Dry-run mode recorded the intended change without mutating.
    DryRun,
    /// Current configuration already matches the recommendation.
    NoOp,
    /// The patch failed; the previous configuration was restored.
    RolledBack,
}

/// Tuning for one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    /// Skip mutation, only emit `DryRunSimulated`.
    pub dry_run: bool,
    /// Percent tolerance for idempotence comparisons.
    pub noop_tolerance_pct: f64,
    /// Maximum concurrent in-flight applies.
    pub max_concurrency: usize,
    /// Readiness polls after a successful patch, before declaring failure.
    pub readiness_attempts: u32,
    /// Base backoff between readiness polls and transient-error retries.
    pub backoff_base: std::time::Duration,
    /// Backoff multiplicative factor per attempt.
    pub backoff_factor: f64,
    /// Backoff ceiling.
    pub backoff_max: std::time::Duration,
    /// Maximum patch attempts on `OrchestratorTransient` errors.
    pub max_patch_attempts: u32,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            noop_tolerance_pct: 1.0,
            max_concurrency: 4,
            readiness_attempts: 5,
            backoff_base: std::time::Duration::from_secs(1),
            backoff_factor: 2.0,
            backoff_max: std::time::Duration::from_secs(60),
            max_patch_attempts: 5,
        }
    }
}

/// Applies approved recommendations through the [`OrchestratorClient`],
/// gated by a bounded worker pool and per-target serialization.
pub struct Reconciler {
    client: Arc<dyn OrchestratorClient>,
    rollback: RollbackStore,
    breaker: Arc<CircuitBreaker>,
    semaphore: Arc<Semaphore>,
    locks: Mutex<HashMap<(WorkloadId, String), Arc<Mutex<()>>>>,
}

impl Reconciler {
    /// Construct a reconciler over `client`, sharing `rollback` and
    /// `breaker` with the rest of the control loop.
    pub fn new(
        client: Arc<dyn OrchestratorClient>,
        rollback: RollbackStore,
        breaker: Arc<CircuitBreaker>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            client,
            rollback,
            breaker,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, workload: &WorkloadId, container: &str) -> Arc<Mutex<()>> {
        let key = (workload.clone(), container.to_string());
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Apply one container's recommendation, end to end.
    #[instrument(skip(self, recommendation, settings))]
    pub async fn apply_container(
        &self,
        workload: &WorkloadId,
        container: &str,
        recommendation: &ContainerRecommendation,
        settings: &ReconcilerSettings,
    ) -> Result<ApplyOutcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::Internal(format!("semaphore closed: {e}")))?;

        let target_lock = self.lock_for(workload, container).await;
        let _guard = target_lock.lock().await;

        let current = self.client.get_resources(workload, container).await?;
        let patch = ResourcePatch {
            cpu_request: recommendation.recommended_cpu,
            memory_request: recommendation.recommended_memory,
            cpu_limit: None,
            memory_limit: None,
        };

        if patch.is_noop(&current, settings.noop_tolerance_pct) {
            return Ok(ApplyOutcome::NoOp);
        }

        self.rollback.save_previous(self.client.as_ref(), workload, container).await?;
        self.client
            .emit_event(workload, EventReason::ScalingStarted, "resource patch computed")
            .await?;

        if settings.dry_run {
            self.client
                .emit_event(workload, EventReason::DryRunSimulated, &describe_patch(&patch))
                .await?;
            return Ok(ApplyOutcome::DryRun);
        }

        match self.apply_with_retry(workload, container, &patch, settings).await {
            Ok(()) => {
                if self.poll_readiness(workload, container, &patch, settings).await {
                    self.breaker.record_success(Utc::now());
                    self.client
                        .emit_event(workload, EventReason::ScalingCompleted, &describe_patch(&patch))
                        .await?;
                    Ok(ApplyOutcome::Applied)
                } else {
                    self.fail_and_rollback(workload, container, "readiness timed out").await
                }
            }
            Err(e) => self.fail_and_rollback(workload, container, &e.to_string()).await,
        }
    }

    async fn apply_with_retry(
        &self,
        workload: &WorkloadId,
        container: &str,
        patch: &ResourcePatch,
        settings: &ReconcilerSettings,
    ) -> Result<()> {
        let mut attempt = 0u32;
        let mut backoff = settings.backoff_base;
        loop {
            attempt += 1;
            match self.client.patch_resources(workload, container, patch).await {
                Ok(()) => return Ok(()),
                Err(e @ Error::OrchestratorTransient { .. }) if attempt < settings.max_patch_attempts => {
                    warn!(attempt, "transient orchestrator error, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = scale_backoff(backoff, settings.backoff_factor, settings.backoff_max);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn poll_readiness(
        &self,
        workload: &WorkloadId,
        container: &str,
        patch: &ResourcePatch,
        settings: &ReconcilerSettings,
    ) -> bool {
        let mut backoff = settings.backoff_base;
        for _ in 0..settings.readiness_attempts {
            match self.client.get_resources(workload, container).await {
                Ok(current) if patch.is_noop(&current, settings.noop_tolerance_pct) => return true,
                _ => {
                    tokio::time::sleep(backoff).await;
                    backoff = scale_backoff(backoff, settings.backoff_factor, settings.backoff_max);
                }
            }
        }
        false
    }

    async fn fail_and_rollback(
        &self,
        workload: &WorkloadId,
        container: &str,
        detail: &str,
    ) -> Result<ApplyOutcome> {
        self.breaker.record_error(Utc::now());
        self.client
            .emit_event(workload, EventReason::ScalingFailed, detail)
            .await?;
        self.rollback.rollback_workload(self.client.as_ref(), workload, container).await?;
        Ok(ApplyOutcome::RolledBack)
    }
}

fn scale_backoff(current: std::time::Duration, factor: f64, max: std::time::Duration) -> std::time::Duration {
    let scaled = current.mul_f64(factor);
    if scaled > max {
        max
    } else {
        scaled
    }
}

fn describe_patch(patch: &ResourcePatch) -> String {
    format!(
        "cpu={}m memory={}bytes",
        patch.cpu_request as i64, patch.memory_request as i64
    )
}
