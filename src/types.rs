//! Core data model for the resource optimizer.
//!
//! These types are the single source of truth shared by every component —
//! the sample store writes `ContainerSample`s, the recommender reads them
//! back and produces `WorkloadRecommendation`s, the policy engine consumes
//! and modifies them, the reconciler applies and the rollback store
//! remembers what was applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of workload object a recommendation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    /// A Deployment.
    Deployment,
    /// A StatefulSet.
    StatefulSet,
    /// A DaemonSet.
    DaemonSet,
}

/// Identity of a workload: namespace, kind, and name.
///
/// `name` is the owner name with the orchestrator's trailing hash segments
/// (replica-set hash, pod hash) stripped, per the naming convention
/// `owner-replicasetHash-podHash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadId {
    /// Namespace the workload lives in.
    pub namespace: String,
    /// Workload kind.
    pub kind: WorkloadKind,
    /// Workload (owner) name, hash segments stripped.
    pub name: String,
}

impl WorkloadId {
    /// Construct a new identity.
    pub fn new(namespace: impl Into<String>, kind: WorkloadKind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            name: name.into(),
        }
    }

    /// Derive a workload name from a pod/container-group name by stripping
    /// trailing hash segments (owner name + replica-set hash + pod hash,
    /// joined by `-`).
    ///
    /// Heuristic: an orchestrator hash segment is alphanumeric, lowercase,
    /// and either exactly 5 characters (pod hash) or 8-10 characters
    /// (replica-set hash). We strip trailing segments matching that shape,
    /// one at a time, stopping at the first segment that does not.
    pub fn owner_name_from_pod_name(pod_name: &str) -> String {
        let mut segments: Vec<&str> = pod_name.split('-').collect();

        while segments.len() > 1 {
            let last = segments[segments.len() - 1];
            if is_hash_segment(last) {
                segments.pop();
            } else {
                break;
            }
        }

        segments.join("-")
    }
}

fn is_hash_segment(segment: &str) -> bool {
    let len = segment.len();
    if !(5..=10).contains(&len) {
        return false;
    }
    segment
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// A single immutable usage sample for one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    /// Workload this container belongs to.
    pub workload: WorkloadId,
    /// Container name within the workload's pod template.
    pub container: String,
    /// When the sample was observed.
    pub timestamp: DateTime<Utc>,
    /// Observed CPU usage, in millicores.
    pub usage_cpu_millicores: f64,
    /// Observed memory usage, in bytes.
    pub usage_memory_bytes: f64,
    /// Configured CPU request at sample time, in millicores.
    pub request_cpu_millicores: f64,
    /// Configured memory request at sample time, in bytes.
    pub request_memory_bytes: f64,
    /// Configured CPU limit at sample time, in millicores (0 = unset).
    pub limit_cpu_millicores: f64,
    /// Configured memory limit at sample time, in bytes (0 = unset).
    pub limit_memory_bytes: f64,
}

/// Categorical confidence level, derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    /// Score below 20.
    VeryLow,
    /// Score in [20, 40).
    Low,
    /// Score in [40, 60).
    Moderate,
    /// Score in [60, 80).
    High,
    /// Score in [80, 100].
    VeryHigh,
}

/// The five weighted sub-scores behind a confidence number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    /// Duration sub-score, in `[0,100]`.
    pub duration: f64,
    /// Sample-count sub-score, in `[0,100]`.
    pub samples: f64,
    /// Consistency (coefficient-of-variation derived) sub-score.
    pub consistency: f64,
    /// Recency sub-score.
    pub recency: f64,
    /// Coverage (gap-fraction derived) sub-score.
    pub coverage: f64,
}

/// OOM boost priority, derived from OOM count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OomPriority {
    /// No recent OOM.
    None,
    /// 1-2 OOMs.
    Low,
    /// 3-4 OOMs.
    Medium,
    /// 5-9 OOMs.
    High,
    /// 10+ OOMs.
    Critical,
}

/// A single container's sizing recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    /// Container name.
    pub container_name: String,
    /// Current CPU request, in millicores.
    pub current_cpu: f64,
    /// Current memory request, in bytes.
    pub current_memory: f64,
    /// Recommended CPU request, in millicores.
    pub recommended_cpu: f64,
    /// Recommended memory request, in bytes.
    pub recommended_memory: f64,
    /// Number of samples the recommendation was derived from.
    pub sample_count: usize,
    /// CPU percentile used.
    pub cpu_percentile: f64,
    /// Memory percentile used.
    pub memory_percentile: f64,
    /// Confidence score in `[0,100]`.
    pub confidence: f64,
    /// Sub-scores behind `confidence`.
    pub confidence_breakdown: ConfidenceBreakdown,
    /// Estimated monthly savings, in currency units (see cost kernel).
    pub estimated_savings: f64,
    /// Whether an OOM kill was observed for this container.
    pub oom_flag: bool,
    /// Number of OOM kills observed.
    pub oom_count: u32,
    /// Multiplicative boost applied to memory due to OOM history.
    pub oom_boost_factor: f64,
    /// Priority derived from OOM count.
    pub oom_priority: OomPriority,
}

/// Below this absolute percent change, on both dimensions, a recommendation
/// counts as [`ChangeType::NoChange`].
pub const NOCHANGE_THRESHOLD_PCT: f64 = 1.0;

impl ContainerRecommendation {
    /// Invariant: if `oom_flag` then `recommended_memory >= current_memory`.
    pub fn upholds_oom_floor(&self) -> bool {
        !self.oom_flag || self.recommended_memory >= self.current_memory
    }

    /// Percent change in recommended vs. current CPU. `0.0` when current is
    /// `0.0`.
    pub fn cpu_change_percent(&self) -> f64 {
        percent_change(self.current_cpu, self.recommended_cpu)
    }

    /// Percent change in recommended vs. current memory. `0.0` when current
    /// is `0.0`.
    pub fn memory_change_percent(&self) -> f64 {
        percent_change(self.current_memory, self.recommended_memory)
    }

    /// Classify the direction of this recommendation relative to current
    /// allocation, using [`NOCHANGE_THRESHOLD_PCT`] as the dead zone. The
    /// dimension with the larger absolute change decides the direction.
    pub fn change_type(&self) -> ChangeType {
        let cpu = self.cpu_change_percent();
        let memory = self.memory_change_percent();

        if cpu.abs() < NOCHANGE_THRESHOLD_PCT && memory.abs() < NOCHANGE_THRESHOLD_PCT {
            return ChangeType::NoChange;
        }

        let dominant = if cpu.abs() >= memory.abs() { cpu } else { memory };
        if dominant > 0.0 {
            ChangeType::ScaleUp
        } else {
            ChangeType::ScaleDown
        }
    }
}

fn percent_change(current: f64, recommended: f64) -> f64 {
    if current == 0.0 {
        0.0
    } else {
        (recommended - current) / current * 100.0
    }
}

/// Direction of change a recommendation represents relative to current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// Recommendation increases resources.
    ScaleUp,
    /// Recommendation decreases resources.
    ScaleDown,
    /// No meaningful change.
    NoChange,
}

/// Grouped recommendation for every container in a workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadRecommendation {
    /// Workload the recommendation targets.
    pub workload: WorkloadId,
    /// Per-container recommendations.
    pub containers: Vec<ContainerRecommendation>,
    /// When this recommendation was generated.
    pub generated_at: DateTime<Utc>,
    /// When this recommendation expires.
    pub expires_at: DateTime<Utc>,
    /// Aggregate estimated savings across all containers.
    pub aggregate_savings: f64,
    /// Highest-priority OOM signal across all containers.
    pub aggregate_oom_priority: OomPriority,
}

impl WorkloadRecommendation {
    /// Lowest confidence across all container recommendations.
    pub fn min_confidence(&self) -> f64 {
        self.containers
            .iter()
            .map(|c| c.confidence)
            .fold(f64::INFINITY, f64::min)
            .min(100.0)
    }

    /// Eligible to apply only if not expired and every container clears
    /// `policy_threshold`.
    pub fn should_apply(&self, now: DateTime<Utc>, policy_threshold: f64) -> bool {
        if now >= self.expires_at {
            return false;
        }
        if self.containers.is_empty() {
            return false;
        }
        self.min_confidence() >= policy_threshold
    }

    /// Total OOM count across all containers, for output ordering.
    pub fn total_oom_count(&self) -> u32 {
        self.containers.iter().map(|c| c.oom_count).sum()
    }

    /// True if any container carries an OOM history.
    pub fn has_oom_history(&self) -> bool {
        self.containers.iter().any(|c| c.oom_count > 0)
    }
}

/// Action a policy takes when its condition matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyAction {
    /// Final approval.
    Allow,
    /// Final block.
    Deny,
    /// Unconditional skip of the recommendation, regardless of direction.
    Skip,
    /// Block only when the change is a scale-down.
    SkipScaleDown,
    /// Block only when the change is a scale-up.
    SkipScaleUp,
    /// Clamp CPU to a minimum, in millicores.
    SetMinCpu(f64),
    /// Clamp CPU to a maximum, in millicores.
    SetMaxCpu(f64),
    /// Clamp memory to a minimum, in bytes.
    SetMinMemory(f64),
    /// Clamp memory to a maximum, in bytes.
    SetMaxMemory(f64),
    /// Pause pending external approval.
    RequireApproval,
}

/// A single autonomic policy: a condition and the action to take if it
/// matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Unique, non-empty name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Boolean condition expression (Rego), evaluated against the
    /// `workload`/`recommendation`/`time`/`cluster`/`custom` environment
    /// built in [`crate::policy::env`].
    pub condition_expression: String,
    /// Action to take when the condition matches.
    pub action: PolicyAction,
    /// Priority; higher evaluates first.
    pub priority: i32,
    /// Whether this policy is active.
    pub enabled: bool,
}

/// An ordered collection of policies plus a fallback action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySet {
    /// Policies, conceptually ordered by priority descending (actual
    /// ordering of equal priorities is unspecified).
    pub policies: Vec<Policy>,
    /// Action taken when no policy matches.
    pub default_action: PolicyAction,
}

impl PolicySet {
    /// Validate that every policy name is non-empty and unique.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for policy in &self.policies {
            if policy.name.is_empty() {
                return Err(crate::error::Error::Config(
                    "policy name must not be empty".into(),
                ));
            }
            if !seen.insert(policy.name.as_str()) {
                return Err(crate::error::Error::Config(format!(
                    "duplicate policy name: {}",
                    policy.name
                )));
            }
        }
        Ok(())
    }
}

/// State of the circuit breaker protecting the reconcile loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests allowed.
    Closed,
    /// Requests blocked.
    Open,
    /// Single probe allowed.
    HalfOpen,
}

/// A container's current resource configuration, as read from the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU request, in millicores.
    pub cpu_request: f64,
    /// Memory request, in bytes.
    pub memory_request: f64,
    /// CPU limit, in millicores (`0.0` = unset).
    pub cpu_limit: f64,
    /// Memory limit, in bytes (`0.0` = unset).
    pub memory_limit: f64,
}

/// A strategic-merge-style patch to a container's `resources.requests`
/// field (limits are policy-configurable).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePatch {
    /// New CPU request, in millicores.
    pub cpu_request: f64,
    /// New memory request, in bytes.
    pub memory_request: f64,
    /// New CPU limit, in millicores, when the policy configures limits.
    pub cpu_limit: Option<f64>,
    /// New memory limit, in bytes, when the policy configures limits.
    pub memory_limit: Option<f64>,
}

impl ResourcePatch {
    /// True if this patch is a no-op relative to `current` within
    /// `tolerance_pct` percent on both dimensions.
    pub fn is_noop(&self, current: &ResourceSpec, tolerance_pct: f64) -> bool {
        within_tolerance(self.cpu_request, current.cpu_request, tolerance_pct)
            && within_tolerance(self.memory_request, current.memory_request, tolerance_pct)
    }
}

fn within_tolerance(a: f64, b: f64, tolerance_pct: f64) -> bool {
    if b == 0.0 {
        return a == 0.0;
    }
    ((a - b) / b * 100.0).abs() <= tolerance_pct
}

/// A single rollback-history entry for one `(workload, container)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEntry {
    /// Workload the entry belongs to.
    pub workload: WorkloadId,
    /// Container name.
    pub container: String,
    /// CPU request at capture time, in millicores.
    pub cpu: f64,
    /// Memory request at capture time, in bytes.
    pub memory: f64,
    /// When the entry was captured.
    pub timestamp: DateTime<Utc>,
}

/// Trend direction for a time series (shared by the predictor and the
/// leak detector's narrative output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    /// Series is trending up.
    Increasing,
    /// Series is trending down.
    Decreasing,
    /// Series is flat.
    Stable,
}

/// Reason a reconciliation was skipped, recorded for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyVetoReason {
    /// Circuit breaker is open.
    CircuitOpen,
    /// Outside a configured maintenance window.
    Maintenance,
    /// Horizontal autoscaler attached and policy is not override.
    HpaConflict,
    /// Applying would violate a disruption budget.
    PdbViolation,
    /// Leak detector vetoed.
    LeakDetected,
    /// Active SLA violation.
    SlaViolation,
    /// Policy engine denied or required approval.
    Policy,
}

/// A map of arbitrary operator-supplied values, used as the `custom`
/// namespace in the policy expression environment.
pub type CustomValues = HashMap<String, serde_json::Value>;

/// A UUID newtype helper kept for parity with identifiers elsewhere.
pub type Id = Uuid;
