//! # Safety Gate (C9)
//!
//! Pre-apply veto checks, evaluated in a fixed order, short-circuiting on
//! the first failing gate. Grounded on `monitor::MonitoringComponent`'s
//! severity-threshold calculations for the gate predicates, and on
//! `controller.rs`'s use of atomics for cheap, lock-free counters for the
//! circuit breaker.

pub mod schedule;

use crate::config::{HpaConflictPolicy, MaintenanceWindow};
use crate::policy::PolicyDecision;
use crate::types::{CircuitState, SafetyVetoReason};
use chrono::{DateTime, Duration, Utc};
use schedule::CronSchedule;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::{info, instrument, warn};

struct BreakerState {
    state: CircuitState,
    cooldown_until: Option<DateTime<Utc>>,
}

/// Closed/Open/HalfOpen circuit breaker protecting the reconcile loop.
///
/// Counters use `AtomicU32` for lock-free increment; the state enum and
/// cooldown timestamp share one `Mutex`, since a transition must observe
/// and update both together.
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    consecutive_errors: AtomicU32,
    consecutive_successes: AtomicU32,
    error_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    /// Construct a breaker in the `Closed` state.
    pub fn new(error_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                cooldown_until: None,
            }),
            consecutive_errors: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            error_threshold,
            success_threshold,
            timeout,
        }
    }

    /// Current state, lazily transitioning `Open` to `HalfOpen` once the
    /// cooldown has elapsed.
    pub fn state(&self, now: DateTime<Utc>) -> CircuitState {
        let mut guard = self.inner.lock().expect("circuit breaker lock poisoned");
        if guard.state == CircuitState::Open {
            if let Some(cooldown) = guard.cooldown_until {
                if now >= cooldown {
                    guard.state = CircuitState::HalfOpen;
                    guard.cooldown_until = None;
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                }
            }
        }
        guard.state
    }

    /// Record a failed reconciliation.
    #[instrument(skip(self))]
    pub fn record_error(&self, now: DateTime<Utc>) {
        let current = self.state(now);
        match current {
            CircuitState::Closed => {
                let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                if errors >= self.error_threshold {
                    let mut guard = self.inner.lock().expect("circuit breaker lock poisoned");
                    guard.state = CircuitState::Open;
                    guard.cooldown_until = Some(now + self.timeout);
                    warn!("circuit breaker opened after {errors} consecutive errors");
                }
            }
            CircuitState::HalfOpen => {
                let mut guard = self.inner.lock().expect("circuit breaker lock poisoned");
                guard.state = CircuitState::Open;
                guard.cooldown_until = Some(now + self.timeout);
                self.consecutive_errors.store(0, Ordering::SeqCst);
                warn!("probe failed in half-open state, circuit breaker re-opened");
            }
            CircuitState::Open => {}
        }
    }

    /// Record a successful reconciliation.
    #[instrument(skip(self))]
    pub fn record_success(&self, now: DateTime<Utc>) {
        let current = self.state(now);
        match current {
            CircuitState::Closed => {
                self.consecutive_errors.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.success_threshold {
                    let mut guard = self.inner.lock().expect("circuit breaker lock poisoned");
                    guard.state = CircuitState::Closed;
                    guard.cooldown_until = None;
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                    info!("circuit breaker closed after {successes} consecutive successes");
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Everything the gate needs to evaluate one workload's apply decision.
pub struct GateInputs<'a> {
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// Configured maintenance windows; empty means "always in window".
    pub maintenance_windows: &'a [MaintenanceWindow],
    /// Whether a horizontal autoscaler is attached to this workload.
    pub hpa_attached: bool,
    /// Configured HPA conflict resolution policy.
    pub hpa_conflict_policy: HpaConflictPolicy,
    /// Whether applying would violate a disruption budget.
    pub pdb_would_violate: bool,
    /// Whether the leak detector vetoes scaling for this container.
    pub leak_blocks: bool,
    /// Whether an active SLA violation is reported.
    pub sla_violation_active: bool,
    /// The policy engine's decision for this recommendation.
    pub policy_decision: &'a PolicyDecision,
}

/// Evaluate the gate checks in order, returning the first veto reason, or
/// `Ok(())` if every gate passes.
#[instrument(skip(breaker, inputs))]
pub fn check(breaker: &CircuitBreaker, inputs: &GateInputs) -> Result<(), SafetyVetoReason> {
    if breaker.state(inputs.now) != CircuitState::Closed && breaker.state(inputs.now) != CircuitState::HalfOpen {
        return Err(SafetyVetoReason::CircuitOpen);
    }

    if !inputs.maintenance_windows.is_empty() && !in_any_window(inputs.maintenance_windows, inputs.now) {
        return Err(SafetyVetoReason::Maintenance);
    }

    if inputs.hpa_attached && inputs.hpa_conflict_policy != HpaConflictPolicy::Override {
        return Err(SafetyVetoReason::HpaConflict);
    }

    if inputs.pdb_would_violate {
        return Err(SafetyVetoReason::PdbViolation);
    }

    if inputs.leak_blocks {
        return Err(SafetyVetoReason::LeakDetected);
    }

    if inputs.sla_violation_active {
        return Err(SafetyVetoReason::SlaViolation);
    }

    match inputs.policy_decision {
        PolicyDecision::Deny | PolicyDecision::RequireApproval => Err(SafetyVetoReason::Policy),
        PolicyDecision::Allow | PolicyDecision::Modify { .. } => Ok(()),
    }
}

fn in_any_window(windows: &[MaintenanceWindow], now: DateTime<Utc>) -> bool {
    windows.iter().any(|window| {
        let Ok(schedule) = CronSchedule::parse(&window.schedule_cron) else {
            return false;
        };
        window_contains(&schedule, window.duration_minutes, now)
    })
}

/// A window is "in progress" if any minute in `[now - duration, now]`
/// matches the schedule's start trigger.
fn window_contains(schedule: &CronSchedule, duration_minutes: u32, now: DateTime<Utc>) -> bool {
    let mut cursor = now;
    let span = Duration::minutes(duration_minutes.max(1) as i64);
    let earliest = now - span;
    while cursor >= earliest {
        if schedule.matches(cursor) {
            return true;
        }
        cursor -= Duration::minutes(1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfidenceBreakdown;

    fn window(cron: &str, duration_minutes: u32) -> MaintenanceWindow {
        MaintenanceWindow {
            schedule_cron: cron.to_string(),
            duration_minutes,
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn breaker_opens_after_threshold_errors() {
        let breaker = CircuitBreaker::new(3, 2, Duration::seconds(60));
        let now = Utc::now();
        breaker.record_error(now);
        breaker.record_error(now);
        assert_eq!(breaker.state(now), CircuitState::Closed);
        breaker.record_error(now);
        assert_eq!(breaker.state(now), CircuitState::Open);
    }

    #[test]
    fn breaker_transitions_to_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, 1, Duration::seconds(60));
        let now = Utc::now();
        breaker.record_error(now);
        assert_eq!(breaker.state(now), CircuitState::Open);
        assert_eq!(breaker.state(now + Duration::seconds(61)), CircuitState::HalfOpen);
    }

    #[test]
    fn breaker_closes_after_half_open_success() {
        let breaker = CircuitBreaker::new(1, 1, Duration::seconds(60));
        let now = Utc::now();
        breaker.record_error(now);
        let later = now + Duration::seconds(61);
        assert_eq!(breaker.state(later), CircuitState::HalfOpen);
        breaker.record_success(later);
        assert_eq!(breaker.state(later), CircuitState::Closed);
    }

    #[test]
    fn breaker_reopens_on_half_open_failure() {
        let breaker = CircuitBreaker::new(1, 1, Duration::seconds(60));
        let now = Utc::now();
        breaker.record_error(now);
        let later = now + Duration::seconds(61);
        assert_eq!(breaker.state(later), CircuitState::HalfOpen);
        breaker.record_error(later);
        assert_eq!(breaker.state(later), CircuitState::Open);
    }

    fn allow_decision() -> PolicyDecision {
        PolicyDecision::Allow
    }

    #[test]
    fn gate_passes_when_everything_is_clear() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = allow_decision();
        let inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &[],
            hpa_attached: false,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Ok(()));
    }

    #[test]
    fn gate_vetoes_on_open_circuit_first() {
        let breaker = CircuitBreaker::new(1, 1, Duration::minutes(5));
        let now = Utc::now();
        breaker.record_error(now);
        let decision = allow_decision();
        let inputs = GateInputs {
            now,
            maintenance_windows: &[],
            hpa_attached: true,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: true,
            leak_blocks: true,
            sla_violation_active: true,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Err(SafetyVetoReason::CircuitOpen));
    }

    #[test]
    fn gate_vetoes_outside_maintenance_window() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = allow_decision();
        let windows = vec![window("0 3 * * *", 30)];
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 7, 30, 10, 0, 0).unwrap();
        let inputs = GateInputs {
            now,
            maintenance_windows: &windows,
            hpa_attached: false,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Err(SafetyVetoReason::Maintenance));
    }

    #[test]
    fn gate_vetoes_on_hpa_conflict() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = allow_decision();
        let inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &[],
            hpa_attached: true,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Err(SafetyVetoReason::HpaConflict));
    }

    #[test]
    fn gate_allows_hpa_override() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = allow_decision();
        let inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &[],
            hpa_attached: true,
            hpa_conflict_policy: HpaConflictPolicy::Override,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Ok(()));
    }

    #[test]
    fn gate_vetoes_on_policy_deny() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = PolicyDecision::Deny;
        let inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &[],
            hpa_attached: false,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Err(SafetyVetoReason::Policy));
    }

    #[test]
    fn gate_allows_modify_decision() {
        let breaker = CircuitBreaker::new(5, 3, Duration::minutes(5));
        let decision = PolicyDecision::Modify {
            adjusted: crate::types::ContainerRecommendation {
                container_name: "app".into(),
                current_cpu: 1000.0,
                current_memory: 1024.0,
                recommended_cpu: 500.0,
                recommended_memory: 512.0,
                sample_count: 50,
                cpu_percentile: 95.0,
                memory_percentile: 95.0,
                confidence: 70.0,
                confidence_breakdown: ConfidenceBreakdown {
                    duration: 70.0,
                    samples: 70.0,
                    consistency: 70.0,
                    recency: 70.0,
                    coverage: 70.0,
                },
                estimated_savings: 10.0,
                oom_flag: false,
                oom_count: 0,
                oom_boost_factor: 1.0,
                oom_priority: crate::types::OomPriority::None,
            },
            diffs: vec!["clamped".into()],
        };
        let inputs = GateInputs {
            now: Utc::now(),
            maintenance_windows: &[],
            hpa_attached: false,
            hpa_conflict_policy: HpaConflictPolicy::Skip,
            pdb_would_violate: false,
            leak_blocks: false,
            sla_violation_active: false,
            policy_decision: &decision,
        };
        assert_eq!(check(&breaker, &inputs), Ok(()));
    }
}
