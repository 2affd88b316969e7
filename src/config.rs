//! # Configuration Resource
//!
//! `OptimizerConfig` mirrors a CRD-style configuration object: mostly
//! optional fields with documented defaults, validated once at admission
//! (construct, then `validate()` before the control loop starts) and
//! serialized with `serde` the way every other persisted/wire type in
//! this crate is.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

/// Deployment profile, controlling conservative defaults for the override
/// fields below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Production defaults: conservative, approval-gated.
    Production,
    /// Staging defaults.
    Staging,
    /// Development defaults: permissive.
    Development,
    /// Test defaults: permissive, dry-run by default.
    Test,
    /// Operator-supplied overrides only.
    Custom,
}

/// Sizing aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Favor larger headroom and faster scale-up.
    Aggressive,
    /// Default behavior.
    Balanced,
    /// Favor stability and slower, smaller changes.
    Conservative,
}

/// Per-profile overrides.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    /// Minimum confidence required to apply, `[0,100]`.
    pub min_confidence: Option<f64>,
    /// Maximum percent change allowed in a single apply.
    pub max_change_percent: Option<f64>,
    /// Force `require-approval` semantics regardless of policy.
    pub require_approval: Option<bool>,
    /// Delay, in seconds, between recommendation and apply.
    pub apply_delay_seconds: Option<u64>,
    /// Force dry-run regardless of the top-level `dry_run` flag.
    pub dry_run: Option<bool>,
}

/// A maintenance window during which reconciliation is permitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// 5-field cron expression (`minute hour dom month dow`).
    pub schedule_cron: String,
    /// Window duration, in minutes.
    pub duration_minutes: u32,
    /// IANA timezone name; defaults to `UTC`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Min/max bound pair for one resource dimension.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceBounds {
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

/// CPU and memory threshold pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceThresholds {
    /// CPU bounds, in millicores.
    pub cpu: ResourceBounds,
    /// Memory bounds, in bytes.
    pub memory: ResourceBounds,
}

/// Recommendation sizing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationSettings {
    /// CPU percentile, `[50,99]`.
    pub cpu_percentile: f64,
    /// Memory percentile, `[50,99]`.
    pub memory_percentile: f64,
    /// Minimum samples required, `>=10`.
    pub min_samples: usize,
    /// Multiplicative safety margin, `[1.0,3.0]`.
    pub safety_margin: f64,
    /// History window, in hours.
    pub history_duration_hours: f64,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            cpu_percentile: 95.0,
            memory_percentile: 95.0,
            min_samples: 100,
            safety_margin: 1.2,
            history_duration_hours: 24.0,
        }
    }
}

/// Update rollout strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum UpdateStrategyType {
    /// Patch resources in place without a rollout.
    InPlace,
    /// Perform a rolling update.
    RollingUpdate,
}

/// Rolling-update tuning.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RollingUpdateSettings {
    /// Maximum unavailable replicas during rollout.
    pub max_unavailable: Option<u32>,
    /// Maximum surge replicas during rollout.
    pub max_surge: Option<u32>,
}

/// Update strategy configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateStrategy {
    /// Strategy kind.
    #[serde(rename = "type")]
    pub kind: UpdateStrategyType,
    /// Rolling-update tuning, used when `kind = RollingUpdate`.
    #[serde(default)]
    pub rolling_update: RollingUpdateSettings,
}

impl Default for UpdateStrategy {
    fn default() -> Self {
        Self {
            kind: UpdateStrategyType::InPlace,
            rolling_update: RollingUpdateSettings::default(),
        }
    }
}

/// Conflict resolution when a horizontal autoscaler is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HpaConflictPolicy {
    /// Skip the workload entirely.
    Skip,
    /// Override the autoscaler (explicit operator opt-in).
    Override,
    /// Apply, but emit a warning event.
    Warn,
}

/// Horizontal-autoscaler awareness settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HpaAwareness {
    /// Whether HPA awareness is enabled.
    pub enabled: bool,
    /// Conflict resolution policy.
    pub conflict_policy: HpaConflictPolicy,
}

impl Default for HpaAwareness {
    fn default() -> Self {
        Self {
            enabled: true,
            conflict_policy: HpaConflictPolicy::Skip,
        }
    }
}

/// Disruption-budget awareness settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdbAwareness {
    /// Whether PDB awareness is enabled.
    pub enabled: bool,
    /// Whether to respect `minAvailable` strictly.
    pub respect_min_available: bool,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Whether the breaker is enabled.
    pub enabled: bool,
    /// Consecutive errors before opening, `[1,20]`.
    pub error_threshold: u32,
    /// Consecutive successes in half-open before closing, `[1,10]`.
    pub success_threshold: u32,
    /// Cooldown before probing again, in seconds.
    pub timeout_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            error_threshold: 5,
            success_threshold: 3,
            timeout_seconds: 300,
        }
    }
}

/// Target resource kinds, as configuration strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetResource {
    /// Deployments.
    Deployments,
    /// StatefulSets.
    Statefulsets,
    /// DaemonSets.
    Daemonsets,
}

/// The full optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Master enable switch.
    pub enabled: bool,
    /// Namespaces to operate in. Required, at least one.
    pub target_namespaces: Vec<String>,
    /// Deployment profile.
    pub profile: Profile,
    /// Per-profile overrides.
    pub profile_overrides: ProfileOverrides,
    /// Sizing aggressiveness.
    pub strategy: Strategy,
    /// Global dry-run switch.
    pub dry_run: bool,
    /// Maintenance windows.
    pub maintenance_windows: Vec<MaintenanceWindow>,
    /// Resource clamp thresholds.
    pub resource_thresholds: ResourceThresholds,
    /// Recommendation sizing parameters.
    pub recommendations: RecommendationSettings,
    /// Update rollout strategy.
    pub update_strategy: UpdateStrategy,
    /// Horizontal-autoscaler awareness.
    pub hpa_awareness: HpaAwareness,
    /// Disruption-budget awareness.
    pub pdb_awareness: PdbAwareness,
    /// Circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Target workload kinds.
    pub target_resources: Vec<TargetResource>,
    /// Regex patterns for workloads to exclude.
    pub exclude_workloads: Vec<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            target_namespaces: Vec::new(),
            profile: Profile::Production,
            profile_overrides: ProfileOverrides::default(),
            strategy: Strategy::Balanced,
            dry_run: false,
            maintenance_windows: Vec::new(),
            resource_thresholds: ResourceThresholds::default(),
            recommendations: RecommendationSettings::default(),
            update_strategy: UpdateStrategy::default(),
            hpa_awareness: HpaAwareness::default(),
            pdb_awareness: PdbAwareness::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            target_resources: vec![TargetResource::Deployments],
            exclude_workloads: Vec::new(),
        }
    }
}

impl OptimizerConfig {
    /// Validate required fields and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        if self.target_namespaces.is_empty() {
            return Err(Error::Config("targetNamespaces must contain at least one entry".into()));
        }

        let r = &self.recommendations;
        if !(50.0..=99.0).contains(&r.cpu_percentile) {
            return Err(Error::Config(format!(
                "recommendations.cpuPercentile must be in [50,99], got {}",
                r.cpu_percentile
            )));
        }
        if !(50.0..=99.0).contains(&r.memory_percentile) {
            return Err(Error::Config(format!(
                "recommendations.memoryPercentile must be in [50,99], got {}",
                r.memory_percentile
            )));
        }
        if r.min_samples < 10 {
            return Err(Error::Config(format!(
                "recommendations.minSamples must be >= 10, got {}",
                r.min_samples
            )));
        }
        if !(1.0..=3.0).contains(&r.safety_margin) {
            return Err(Error::Config(format!(
                "recommendations.safetyMargin must be in [1.0,3.0], got {}",
                r.safety_margin
            )));
        }

        let cb = &self.circuit_breaker;
        if !(1..=20).contains(&cb.error_threshold) {
            return Err(Error::Config(format!(
                "circuitBreaker.errorThreshold must be in [1,20], got {}",
                cb.error_threshold
            )));
        }
        if !(1..=10).contains(&cb.success_threshold) {
            return Err(Error::Config(format!(
                "circuitBreaker.successThreshold must be in [1,10], got {}",
                cb.success_threshold
            )));
        }

        Ok(())
    }
}

/// Overall reconciliation phase, mirrored into `OptimizerStatus.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Not yet observed a full cycle.
    Pending,
    /// Actively reconciling.
    Active,
    /// Paused by configuration.
    Paused,
    /// Circuit breaker open; reconciliation suspended.
    CircuitOpen,
    /// Last cycle ended in error.
    Error,
}

/// Condition type, mirroring Kubernetes-style status conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    /// The optimizer is ready to reconcile.
    Ready,
    /// A horizontal-autoscaler conflict is present.
    HPAConflict,
    /// A disruption-budget violation is present.
    PDBViolation,
    /// Currently inside a maintenance window.
    MaintenanceWindow,
    /// Circuit breaker is open.
    CircuitBreakerOpen,
    /// Metrics are available for sizing.
    MetricsAvailable,
}

/// Tri-state condition status, Kubernetes-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Condition state is not known.
    Unknown,
}

/// One status condition entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type.
    #[serde(rename = "type")]
    pub kind: ConditionType,
    /// Current status.
    pub status: ConditionStatus,
    /// When this condition last changed.
    pub last_transition_time: chrono::DateTime<chrono::Utc>,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
}

/// Observed status of the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerStatus {
    /// Current phase.
    pub phase: Phase,
    /// Generation of `OptimizerConfig` last acted on.
    pub observed_generation: u64,
    /// When a recommendation was last computed.
    pub last_recommendation: Option<chrono::DateTime<chrono::Utc>>,
    /// When the status was last updated.
    pub last_update: Option<chrono::DateTime<chrono::Utc>>,
    /// Start of the next configured maintenance window, if any.
    pub next_maintenance_window: Option<chrono::DateTime<chrono::Utc>>,
    /// Circuit breaker state.
    pub circuit_state: crate::types::CircuitState,
    /// Free-form counters (applied, skipped, failed, ...).
    pub counters: HashMap<String, u64>,
    /// Status conditions.
    pub conditions: Vec<Condition>,
}

impl Default for OptimizerStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            observed_generation: 0,
            last_recommendation: None,
            last_update: None,
            next_maintenance_window: None,
            circuit_state: crate::types::CircuitState::Closed,
            counters: HashMap::new(),
            conditions: Vec::new(),
        }
    }
}
