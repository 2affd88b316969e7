//! # Optimizer Controller - Reconciliation Orchestration
//!
//! Ties every component into one reconciliation cycle: discover workloads,
//! size them, evaluate policy, gate on safety, apply. Grounded on
//! `AutonomicController::execute_cycle`'s orchestration shape (phases each
//! bracketed by a pre/post hook pair, `#[instrument]` on the public entry
//! point, an atomic cycle counter and an atomic running flag). Workloads,
//! and containers within a workload, reconcile through a bounded
//! `futures::stream::buffer_unordered` fan-out keyed off
//! `ReconcilerSettings::max_concurrency`, so the `Reconciler`'s own
//! apply-side semaphore actually sees concurrent callers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use resource_optimizer::config::OptimizerConfig;
//! use resource_optimizer::controller::OptimizerController;
//! use resource_optimizer::cost::Price;
//! use resource_optimizer::orchestrator::NullOrchestratorClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> resource_optimizer::error::Result<()> {
//! let mut config = OptimizerConfig::default();
//! config.target_namespaces.push("default".into());
//!
//! let mut controller = OptimizerController::new(
//!     config,
//!     Arc::new(NullOrchestratorClient),
//!     Price::default(),
//! )?;
//!
//! let summary = controller.execute_cycle().await?;
//! println!("{summary:?}");
//! # Ok(())
//! # }
//! ```

use crate::config::{HpaConflictPolicy, OptimizerConfig, Strategy as ConfigStrategy, TargetResource};
use crate::error::{Error, Result};
use crate::events::EventReason;
use crate::hooks::{HookContext, HookRegistry, HookType};
use crate::leak::{self, MemorySample};
use crate::orchestrator::OrchestratorClient;
use crate::policy::env::{ClusterContext, WorkloadContext};
use crate::policy::{PolicyDecision, PolicyEngine};
use crate::predictor::HoltWintersModel;
use crate::reconciler::{ApplyOutcome, Reconciler, ReconcilerSettings};
use crate::recommender::{Clamp, ClampSettings, Recommender, RecommenderSettings, Strategy as RecommenderStrategy};
use crate::rollback::RollbackStore;
use crate::safety::{self, CircuitBreaker, GateInputs};
use crate::store::SampleStore;
use crate::types::{PolicySet, SafetyVetoReason, WorkloadId, WorkloadKind};
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Per-cycle outcome counters, mirroring `OptimizerStatus.counters`.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    /// Cycle ordinal.
    pub cycle_number: u64,
    /// Workloads considered this cycle.
    pub workloads_considered: usize,
    /// Container recommendations produced this cycle.
    pub containers_recommended: usize,
    /// Containers actually patched.
    pub applied: usize,
    /// Containers recorded only as a dry-run.
    pub dry_run: usize,
    /// Containers already matching their recommendation.
    pub noop: usize,
    /// Containers rolled back after a failed apply.
    pub rolled_back: usize,
    /// Containers blocked by policy (`Deny`/`RequireApproval`).
    pub policy_blocked: usize,
    /// Containers vetoed by the safety gate, by reason.
    pub safety_vetoed: HashMap<String, u64>,
}

impl CycleSummary {
    /// Fold a per-workload or per-container partial into this summary.
    /// `cycle_number` and `workloads_considered` are set once up front and
    /// left untouched here.
    fn merge(&mut self, other: CycleSummary) {
        self.containers_recommended += other.containers_recommended;
        self.applied += other.applied;
        self.dry_run += other.dry_run;
        self.noop += other.noop;
        self.rolled_back += other.rolled_back;
        self.policy_blocked += other.policy_blocked;
        for (reason, count) in other.safety_vetoed {
            *self.safety_vetoed.entry(reason).or_insert(0) += count;
        }
    }
}

fn convert_strategy(strategy: ConfigStrategy) -> RecommenderStrategy {
    match strategy {
        ConfigStrategy::Aggressive => RecommenderStrategy::Aggressive,
        ConfigStrategy::Balanced => RecommenderStrategy::Balanced,
        ConfigStrategy::Conservative => RecommenderStrategy::Conservative,
    }
}

fn recommender_settings(config: &OptimizerConfig) -> RecommenderSettings {
    let r = &config.recommendations;
    RecommenderSettings {
        cpu_percentile: r.cpu_percentile,
        memory_percentile: r.memory_percentile,
        safety_margin: r.safety_margin,
        min_samples: r.min_samples,
        history_window: ChronoDuration::seconds((r.history_duration_hours * 3600.0) as i64),
        ttl: ChronoDuration::hours(24),
        strategy: convert_strategy(config.strategy),
    }
}

fn clamp_settings(config: &OptimizerConfig) -> ClampSettings {
    let t = &config.resource_thresholds;
    ClampSettings {
        cpu: Clamp {
            min: t.cpu.min,
            max: t.cpu.max,
        },
        memory: Clamp {
            min: t.memory.min,
            max: t.memory.max,
        },
    }
}

fn target_kind(resource: TargetResource) -> WorkloadKind {
    match resource {
        TargetResource::Deployments => WorkloadKind::Deployment,
        TargetResource::Statefulsets => WorkloadKind::StatefulSet,
        TargetResource::Daemonsets => WorkloadKind::DaemonSet,
    }
}

/// Whether `name` matches any of `patterns`. Substring matching only: no
/// regex crate is in the dependency stack, and an exclude list is a small,
/// operator-authored set of literal/partial names in practice.
fn is_excluded(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| name.contains(p.as_str()))
}

fn to_memory_samples(samples: &[crate::types::ContainerSample]) -> Vec<MemorySample> {
    samples
        .iter()
        .map(|s| MemorySample {
            timestamp: s.timestamp,
            bytes: s.usage_memory_bytes,
        })
        .collect()
}

/// Best-effort Holt-Winters peak forecast for a container's CPU and memory
/// series, used only when the sizing strategy is `Conservative`. Returns
/// `None` if there isn't enough history to fit a 24-period seasonal model.
fn predict_peak(samples: &[crate::types::ContainerSample]) -> Option<(f64, f64)> {
    const PERIOD: usize = 24;
    let cpu: Vec<f64> = samples.iter().map(|s| s.usage_cpu_millicores).collect();
    let memory: Vec<f64> = samples.iter().map(|s| s.usage_memory_bytes).collect();

    let cpu_model = HoltWintersModel::fit(&cpu, PERIOD).ok()?;
    let memory_model = HoltWintersModel::fit(&memory, PERIOD).ok()?;

    let last_ts = samples.iter().map(|s| s.timestamp).max()?;
    let cpu_forecast = cpu_model.forecast(PERIOD, last_ts, ChronoDuration::hours(1));
    let memory_forecast = memory_model.forecast(PERIOD, last_ts, ChronoDuration::hours(1));
    Some((cpu_forecast.peak_value, memory_forecast.peak_value))
}

/// Orchestrates one full discover → size → gate → apply reconciliation
/// cycle across every configured namespace and workload kind.
pub struct OptimizerController {
    config: Arc<RwLock<OptimizerConfig>>,
    client: Arc<dyn OrchestratorClient>,
    store: SampleStore,
    recommender: Recommender,
    policy_engine: PolicyEngine,
    policies: Arc<RwLock<PolicySet>>,
    breaker: Arc<CircuitBreaker>,
    reconciler: Reconciler,
    rollback: RollbackStore,
    hooks: Arc<RwLock<HookRegistry>>,
    running: Arc<AtomicBool>,
    cycle_number: Arc<AtomicU64>,
}

impl OptimizerController {
    /// Construct a controller over `client`, validating `config` first.
    #[instrument(skip(config, client))]
    pub fn new(
        config: OptimizerConfig,
        client: Arc<dyn OrchestratorClient>,
        pricing: crate::cost::Price,
    ) -> Result<Self> {
        config.validate()?;
        info!("initializing optimizer controller");

        let store = SampleStore::new();
        let rollback = RollbackStore::new();
        let breaker = Arc::new(CircuitBreaker::new(
            config.circuit_breaker.error_threshold,
            config.circuit_breaker.success_threshold,
            ChronoDuration::seconds(config.circuit_breaker.timeout_seconds as i64),
        ));
        let reconciler = Reconciler::new(
            Arc::clone(&client),
            rollback.clone(),
            Arc::clone(&breaker),
            4,
        );

        Ok(Self {
            recommender: Recommender::new(store.clone(), pricing),
            store,
            policy_engine: PolicyEngine::new(),
            policies: Arc::new(RwLock::new(PolicySet {
                policies: Vec::new(),
                default_action: crate::types::PolicyAction::Allow,
            })),
            breaker,
            reconciler,
            rollback,
            hooks: Arc::new(RwLock::new(HookRegistry::new())),
            running: Arc::new(AtomicBool::new(false)),
            cycle_number: Arc::new(AtomicU64::new(0)),
            config: Arc::new(RwLock::new(config)),
            client,
        })
    }

    /// Replace the active policy set.
    pub async fn set_policies(&self, policies: PolicySet) -> Result<()> {
        policies.validate()?;
        *self.policies.write().await = policies;
        Ok(())
    }

    /// Run `execute_cycle` on a fixed interval until [`Self::stop`] is
    /// called.
    #[instrument(skip(self))]
    pub async fn start(&mut self, period: std::time::Duration) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Config("controller already running".to_string()));
        }

        info!(?period, "starting reconciliation loop");
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match self.execute_cycle().await {
                Ok(summary) => debug!(?summary, "cycle complete"),
                Err(e) => error!("reconciliation cycle failed: {e}"),
            }
        }

        info!("reconciliation loop stopped");
        Ok(())
    }

    /// Stop the reconciliation loop started by [`Self::start`].
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run one full reconciliation cycle.
    #[instrument(skip(self))]
    pub async fn execute_cycle(&self) -> Result<CycleSummary> {
        let cycle_number = self.cycle_number.fetch_add(1, Ordering::SeqCst) + 1;
        let config = self.config.read().await.clone();
        let mut summary = CycleSummary {
            cycle_number,
            ..CycleSummary::default()
        };

        if !config.enabled {
            debug!("optimizer disabled, skipping cycle");
            return Ok(summary);
        }

        let mut ctx = HookContext::new();
        ctx.set("cycle_number", cycle_number)?;
        self.run_hook(HookType::PreIngest, &ctx).await?;

        let workloads = self.discover_workloads(&config).await?;
        summary.workloads_considered = workloads.len();
        ctx.set("workloads_considered", workloads.len())?;
        self.run_hook(HookType::PostIngest, &ctx).await?;

        let policies = self.policies.read().await.clone();
        let settings = recommender_settings(&config);
        let clamps = clamp_settings(&config);
        let reconciler_settings = ReconcilerSettings {
            dry_run: config.dry_run,
            ..ReconcilerSettings::default()
        };

        let max_concurrency = reconciler_settings.max_concurrency.max(1);
        let partials: Vec<CycleSummary> = stream::iter(workloads.iter())
            .map(|workload| self.reconcile_workload(workload, &config, &policies, &settings, &clamps, &reconciler_settings))
            .buffer_unordered(max_concurrency)
            .collect()
            .await;
        for partial in partials {
            summary.merge(partial);
        }

        debug!(?summary, "reconciliation cycle complete");
        Ok(summary)
    }

    async fn discover_workloads(&self, config: &OptimizerConfig) -> Result<Vec<WorkloadId>> {
        let mut workloads = Vec::new();
        for namespace in &config.target_namespaces {
            for resource in &config.target_resources {
                let kind = target_kind(*resource);
                let found = self.client.list_workloads(namespace, kind).await?;
                workloads.extend(found.into_iter().filter(|w| !is_excluded(&w.name, &config.exclude_workloads)));
            }
        }
        Ok(workloads)
    }

    async fn reconcile_workload(
        &self,
        workload: &WorkloadId,
        config: &OptimizerConfig,
        policies: &PolicySet,
        settings: &RecommenderSettings,
        clamps: &ClampSettings,
        reconciler_settings: &ReconcilerSettings,
    ) -> CycleSummary {
        let mut partial = CycleSummary::default();
        let samples = self.store.by_workload(workload, settings.history_window).await;
        let mut by_container: HashMap<String, Vec<crate::types::ContainerSample>> = HashMap::new();
        for sample in samples {
            by_container.entry(sample.container.clone()).or_default().push(sample);
        }

        let mut oom_counts = HashMap::new();
        let mut predicted_peaks = HashMap::new();
        for (container, container_samples) in &by_container {
            let oom_count = self.client.oom_count(workload, container).await.unwrap_or(0);
            oom_counts.insert(container.clone(), oom_count);

            if settings.strategy == RecommenderStrategy::Conservative {
                if let Some(peak) = predict_peak(container_samples) {
                    predicted_peaks.insert(container.clone(), peak);
                }
            }
        }

        let mut ctx = HookContext::new();
        let _ = ctx.set("workload", &workload.name);
        if let Err(e) = self.run_hook(HookType::PreRecommend, &ctx).await {
            warn!("PreRecommend hook failed for {}: {e}", workload.name);
        }

        let Some(recommendation) = self
            .recommender
            .recommend(workload, settings, clamps, &oom_counts, &predicted_peaks)
            .await
        else {
            return partial;
        };
        partial.containers_recommended += recommendation.containers.len();

        if let Err(e) = self.run_hook(HookType::PostRecommend, &ctx).await {
            warn!("PostRecommend hook failed for {}: {e}", workload.name);
        }

        let hpa_attached = self.client.hpa_attached(workload).await.unwrap_or(false);
        let sla_violation_active = self.client.sla_violation_active(workload).await.unwrap_or(false);

        let max_concurrency = reconciler_settings.max_concurrency.max(1);
        let container_partials: Vec<CycleSummary> = stream::iter(recommendation.containers.iter())
            .map(|container_rec| {
                self.reconcile_container(
                    workload,
                    container_rec,
                    &by_container,
                    config,
                    policies,
                    reconciler_settings,
                    hpa_attached,
                    sla_violation_active,
                )
            })
            .buffer_unordered(max_concurrency)
            .collect()
            .await;
        for container_partial in container_partials {
            partial.merge(container_partial);
        }

        partial
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_container(
        &self,
        workload: &WorkloadId,
        container_rec: &crate::types::ContainerRecommendation,
        by_container: &HashMap<String, Vec<crate::types::ContainerSample>>,
        config: &OptimizerConfig,
        policies: &PolicySet,
        reconciler_settings: &ReconcilerSettings,
        hpa_attached: bool,
        sla_violation_active: bool,
    ) -> CycleSummary {
        let mut partial = CycleSummary::default();
        let mut ctx = HookContext::new();
        let _ = ctx.set("container", &container_rec.container_name);
        let _ = self.run_hook(HookType::PrePolicy, &ctx).await;

        let decision = self.policy_engine.evaluate(
            policies,
            workload,
            &WorkloadContext::default(),
            container_rec,
            Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );

        let _ = self.run_hook(HookType::PostPolicy, &ctx).await;

        if !decision.permits_apply() {
            partial.policy_blocked += 1;
            return partial;
        }

        let effective = match &decision {
            PolicyDecision::Modify { adjusted, .. } => adjusted.clone(),
            _ => container_rec.clone(),
        };

        let leak_blocks = by_container
            .get(&container_rec.container_name)
            .map(|samples| {
                let memory_samples = to_memory_samples(samples);
                let limit = samples.iter().map(|s| s.limit_memory_bytes).find(|&l| l > 0.0);
                let report = leak::analyze(&memory_samples, limit);
                report.is_leak && report.severity.should_block_scaling()
            })
            .unwrap_or(false);

        let pdb_would_violate = self.client.pdb_would_violate(workload, 1).await.unwrap_or(false);

        let _ = self.run_hook(HookType::PreRollbackCheck, &ctx).await;
        let history = self.rollback.history_for(workload).await;
        let _ = ctx.set("rollback_history_len", history.len());
        let _ = self.run_hook(HookType::PostRollbackCheck, &ctx).await;

        let gate_inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &config.maintenance_windows,
            hpa_attached,
            hpa_conflict_policy: config.hpa_awareness.conflict_policy,
            pdb_would_violate,
            leak_blocks,
            sla_violation_active,
            policy_decision: &decision,
        };

        if let Err(veto) = safety::check(&self.breaker, &gate_inputs) {
            *partial.safety_vetoed.entry(veto_label(veto)).or_insert(0) += 1;
            let _ = self
                .client
                .emit_event(workload, veto_event_reason(veto), &veto.to_string())
                .await;
            return partial;
        }

        let _ = self.run_hook(HookType::PreApply, &ctx).await;
        let outcome = self
            .reconciler
            .apply_container(workload, &effective.container_name, &effective, reconciler_settings)
            .await;
        let _ = self.run_hook(HookType::PostApply, &ctx).await;

        match outcome {
            Ok(ApplyOutcome::Applied) => partial.applied += 1,
            Ok(ApplyOutcome::DryRun) => partial.dry_run += 1,
            Ok(ApplyOutcome::NoOp) => partial.noop += 1,
            Ok(ApplyOutcome::RolledBack) => partial.rolled_back += 1,
            Err(e) => warn!("apply failed for {}/{}: {e}", workload.name, effective.container_name),
        }
        partial
    }

    async fn run_hook(&self, hook_type: HookType, ctx: &HookContext) -> Result<()> {
        self.hooks.read().await.execute(hook_type, ctx).await
    }

    /// Registry of lifecycle hooks, for external registration.
    pub fn hooks(&self) -> Arc<RwLock<HookRegistry>> {
        Arc::clone(&self.hooks)
    }

    /// Shared sample store, for external ingestion.
    pub fn store(&self) -> SampleStore {
        self.store.clone()
    }

    /// Shared rollback store, for CLI inspection.
    pub fn rollback(&self) -> RollbackStore {
        self.rollback.clone()
    }

    /// Current circuit breaker state.
    pub fn circuit_state(&self) -> crate::types::CircuitState {
        self.breaker.state(Utc::now())
    }
}

fn veto_label(reason: SafetyVetoReason) -> String {
    format!("{reason:?}")
}

fn veto_event_reason(reason: SafetyVetoReason) -> EventReason {
    match reason {
        SafetyVetoReason::HpaConflict => EventReason::HPAConflictDetected,
        SafetyVetoReason::PdbViolation => EventReason::PDBViolation,
        SafetyVetoReason::Maintenance => EventReason::MaintenanceWindowSkipped,
        SafetyVetoReason::CircuitOpen => EventReason::CircuitBreakerOpen,
        SafetyVetoReason::LeakDetected | SafetyVetoReason::SlaViolation | SafetyVetoReason::Policy => {
            EventReason::ScalingFailed
        }
    }
}

impl std::fmt::Display for SafetyVetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Price;
    use crate::orchestrator::NullOrchestratorClient;
    use crate::types::{ContainerSample, WorkloadKind};

    fn pricing() -> Price {
        Price {
            cpu_per_core_hour: 0.04,
            memory_per_gb_hour: 0.01,
        }
    }

    fn config() -> OptimizerConfig {
        let mut config = OptimizerConfig::default();
        config.target_namespaces.push("default".into());
        config
    }

    #[tokio::test]
    async fn disabled_config_skips_cycle() {
        let mut config = config();
        config.enabled = false;
        let controller = OptimizerController::new(config, Arc::new(NullOrchestratorClient), pricing()).unwrap();
        let summary = controller.execute_cycle().await.unwrap();
        assert_eq!(summary.workloads_considered, 0);
    }

    #[tokio::test]
    async fn empty_inventory_produces_empty_summary() {
        let controller = OptimizerController::new(config(), Arc::new(NullOrchestratorClient), pricing()).unwrap();
        let summary = controller.execute_cycle().await.unwrap();
        assert_eq!(summary.workloads_considered, 0);
        assert_eq!(summary.applied, 0);
    }

    #[tokio::test]
    async fn exclude_pattern_filters_by_substring() {
        assert!(is_excluded("canary-api", &["canary".to_string()]));
        assert!(!is_excluded("api", &["canary".to_string()]));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_construction() {
        let config = OptimizerConfig::default(); // no target_namespaces
        let result = OptimizerController::new(config, Arc::new(NullOrchestratorClient), pricing());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ingested_samples_without_orchestrator_inventory_are_never_recommended() {
        // Demonstrates that sample ingestion alone does not drive a cycle:
        // discovery only sees what `list_workloads` reports.
        let controller = OptimizerController::new(config(), Arc::new(NullOrchestratorClient), pricing()).unwrap();
        let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");
        controller
            .store()
            .add(ContainerSample {
                workload,
                container: "app".into(),
                timestamp: Utc::now(),
                usage_cpu_millicores: 100.0,
                usage_memory_bytes: 1024.0,
                request_cpu_millicores: 200.0,
                request_memory_bytes: 2048.0,
                limit_cpu_millicores: 0.0,
                limit_memory_bytes: 0.0,
            })
            .await;

        let summary = controller.execute_cycle().await.unwrap();
        assert_eq!(summary.containers_recommended, 0);
    }
}
