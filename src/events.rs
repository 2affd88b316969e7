//! Orchestrator event reasons, emitted by the reconciler and safety gate
//! for operator visibility.

use std::fmt;

/// Reason code attached to an emitted orchestrator event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    /// A recommendation was applied.
    OptimizationApplied,
    /// Dry-run mode recorded an intended change without applying it.
    DryRunSimulated,
    /// A horizontal autoscaler conflict was detected.
    HPAConflictDetected,
    /// Applying would violate a disruption budget.
    PDBViolation,
    /// Reconciliation skipped because outside a maintenance window.
    MaintenanceWindowSkipped,
    /// The circuit breaker transitioned to `Open`.
    CircuitBreakerOpen,
    /// A scaling apply began.
    ScalingStarted,
    /// A scaling apply completed successfully.
    ScalingCompleted,
    /// A scaling apply failed.
    ScalingFailed,
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = match self {
            EventReason::OptimizationApplied => "OptimizationApplied",
            EventReason::DryRunSimulated => "DryRunSimulated",
            EventReason::HPAConflictDetected => "HPAConflictDetected",
            EventReason::PDBViolation => "PDBViolation",
            EventReason::MaintenanceWindowSkipped => "MaintenanceWindowSkipped",
            EventReason::CircuitBreakerOpen => "CircuitBreakerOpen",
            EventReason::ScalingStarted => "ScalingStarted",
            EventReason::ScalingCompleted => "ScalingCompleted",
            EventReason::ScalingFailed => "ScalingFailed",
        };
        f.write_str(wire)
    }
}

/// Event severity, following the orchestrator's `Normal`/`Warning`
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// Routine, expected condition.
    Normal,
    /// Anomalous or attention-worthy condition.
    Warning,
}

impl EventReason {
    /// The conventional severity for this reason.
    pub fn severity(self) -> EventSeverity {
        use EventReason::*;
        match self {
            OptimizationApplied | DryRunSimulated | ScalingStarted | ScalingCompleted => {
                EventSeverity::Normal
            }
            HPAConflictDetected | PDBViolation | MaintenanceWindowSkipped | CircuitBreakerOpen
            | ScalingFailed => EventSeverity::Warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(EventReason::OptimizationApplied.to_string(), "OptimizationApplied");
        assert_eq!(EventReason::ScalingFailed.to_string(), "ScalingFailed");
    }

    #[test]
    fn severity_matches_convention() {
        assert_eq!(EventReason::ScalingFailed.severity(), EventSeverity::Warning);
        assert_eq!(EventReason::ScalingCompleted.severity(), EventSeverity::Normal);
    }
}
