//! # Policy Engine (C7)
//!
//! A priority-ordered registry, first-match-wins evaluation, with a
//! `default_action` fallback when nothing matches. Condition matching is
//! delegated to `regorus`: each policy's condition compiles to a small Rego
//! module evaluated against a `regorus::Value` built from the workload,
//! recommendation, time, cluster, and custom-label context.

pub mod env;
pub mod quantity;

use crate::types::{ContainerRecommendation, Policy, PolicyAction, PolicySet, WorkloadId};
use env::{ClusterContext, WorkloadContext};
use regorus::{Engine, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::{instrument, warn};

/// Outcome of evaluating a [`PolicySet`] against one container recommendation.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    /// Apply the recommendation unchanged.
    Allow,
    /// Block the recommendation entirely.
    Deny,
    /// Apply a clamped recommendation, with a human-readable diff list.
    Modify {
        /// The recommendation after clamping.
        adjusted: ContainerRecommendation,
        /// Descriptions of each clamp applied, for telemetry.
        diffs: Vec<String>,
    },
    /// Pause pending external approval.
    RequireApproval,
}

impl PolicyDecision {
    /// True if this decision permits applying a (possibly adjusted)
    /// recommendation.
    pub fn permits_apply(&self) -> bool {
        matches!(self, PolicyDecision::Allow | PolicyDecision::Modify { .. })
    }
}

const MODULE_TEMPLATE_HEADER: &str = "package optimizer.policy\n\ndefault matches = false\n\nmatches {\n";
const MODULE_TEMPLATE_FOOTER: &str = "\n}\n";

/// Compiles and evaluates [`Policy`] conditions, caching compiled engines
/// keyed by the condition source string behind a dedicated `RwLock`, kept
/// as an owned field of the engine rather than any global cache.
pub struct PolicyEngine {
    cache: RwLock<HashMap<String, Engine>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    /// Construct an engine with an empty compiled-query cache.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluate every enabled policy in `set`, priority-descending, against
    /// one container's recommendation; return the first match, or
    /// `default_action` if nothing matches.
    #[instrument(skip(self, set, recommendation, cluster, custom))]
    pub fn evaluate(
        &self,
        set: &PolicySet,
        workload: &WorkloadId,
        workload_ctx: &WorkloadContext,
        recommendation: &ContainerRecommendation,
        now: chrono::DateTime<chrono::Utc>,
        cluster: &ClusterContext,
        custom: &BTreeMap<String, String>,
    ) -> PolicyDecision {
        let mut ordered: Vec<&Policy> = set.policies.iter().filter(|p| p.enabled).collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let env_value = env::build(workload, workload_ctx, recommendation, now, cluster, custom);

        for policy in ordered {
            match self.matches(policy, &env_value) {
                Ok(true) => return self.apply_action(policy, recommendation),
                Ok(false) => continue,
                Err(message) => {
                    warn!(policy = %policy.name, %message, "policy disabled for this evaluation");
                    continue;
                }
            }
        }

        self.apply_default(&set.default_action, recommendation)
    }

    fn matches(&self, policy: &Policy, env_value: &Value) -> Result<bool, String> {
        {
            let cache = self.cache.read().expect("policy cache lock poisoned");
            if let Some(engine) = cache.get(&policy.condition_expression) {
                return Self::eval_bool(engine, env_value);
            }
        }

        let mut engine = Engine::new();
        let source = format!(
            "{MODULE_TEMPLATE_HEADER}{}{MODULE_TEMPLATE_FOOTER}",
            policy.condition_expression
        );
        engine
            .add_policy(format!("{}.rego", policy.name), source)
            .map_err(|e| format!("compile error: {e}"))?;

        let result = Self::eval_bool(&engine, env_value);

        let mut cache = self.cache.write().expect("policy cache lock poisoned");
        cache.insert(policy.condition_expression.clone(), engine);
        result
    }

    fn eval_bool(engine: &Engine, env_value: &Value) -> Result<bool, String> {
        let result = engine
            .eval_query("data.optimizer.policy.matches".to_string(), env_value)
            .map_err(|e| format!("runtime error: {e}"))?;
        match result {
            Value::Bool(b) => Ok(b),
            other => Err(format!("condition did not evaluate to boolean: {other:?}")),
        }
    }

    fn apply_action(&self, policy: &Policy, recommendation: &ContainerRecommendation) -> PolicyDecision {
        use PolicyAction::*;
        match &policy.action {
            Allow => PolicyDecision::Allow,
            Deny => PolicyDecision::Deny,
            Skip => PolicyDecision::Deny,
            SkipScaleDown => {
                if recommendation.change_type() == crate::types::ChangeType::ScaleDown {
                    PolicyDecision::Deny
                } else {
                    PolicyDecision::Allow
                }
            }
            SkipScaleUp => {
                if recommendation.change_type() == crate::types::ChangeType::ScaleUp {
                    PolicyDecision::Deny
                } else {
                    PolicyDecision::Allow
                }
            }
            SetMinCpu(min) => clamp_min_cpu(recommendation, *min, &policy.name),
            SetMaxCpu(max) => clamp_max_cpu(recommendation, *max, &policy.name),
            SetMinMemory(min) => clamp_min_memory(recommendation, *min, &policy.name),
            SetMaxMemory(max) => clamp_max_memory(recommendation, *max, &policy.name),
            RequireApproval => PolicyDecision::RequireApproval,
        }
    }

    fn apply_default(&self, action: &PolicyAction, recommendation: &ContainerRecommendation) -> PolicyDecision {
        use PolicyAction::*;
        match action {
            Allow => PolicyDecision::Allow,
            Deny => PolicyDecision::Deny,
            Skip => PolicyDecision::Deny,
            SkipScaleDown | SkipScaleUp => PolicyDecision::Allow,
            SetMinCpu(min) => clamp_min_cpu(recommendation, *min, "default-action"),
            SetMaxCpu(max) => clamp_max_cpu(recommendation, *max, "default-action"),
            SetMinMemory(min) => clamp_min_memory(recommendation, *min, "default-action"),
            SetMaxMemory(max) => clamp_max_memory(recommendation, *max, "default-action"),
            RequireApproval => PolicyDecision::RequireApproval,
        }
    }
}

fn clamp_min_cpu(rec: &ContainerRecommendation, min: f64, source: &str) -> PolicyDecision {
    if rec.recommended_cpu >= min {
        return PolicyDecision::Allow;
    }
    let mut adjusted = rec.clone();
    adjusted.recommended_cpu = min;
    PolicyDecision::Modify {
        diffs: vec![format!(
            "Increased CPU from {}m to {}m (policy minimum, {source})",
            rec.recommended_cpu as i64, min as i64
        )],
        adjusted,
    }
}

fn clamp_max_cpu(rec: &ContainerRecommendation, max: f64, source: &str) -> PolicyDecision {
    if rec.recommended_cpu <= max {
        return PolicyDecision::Allow;
    }
    let mut adjusted = rec.clone();
    adjusted.recommended_cpu = max;
    PolicyDecision::Modify {
        diffs: vec![format!(
            "Decreased CPU from {}m to {}m (policy maximum, {source})",
            rec.recommended_cpu as i64, max as i64
        )],
        adjusted,
    }
}

fn clamp_min_memory(rec: &ContainerRecommendation, min: f64, source: &str) -> PolicyDecision {
    if rec.recommended_memory >= min {
        return PolicyDecision::Allow;
    }
    let mut adjusted = rec.clone();
    adjusted.recommended_memory = min;
    PolicyDecision::Modify {
        diffs: vec![format!(
            "Increased memory from {} to {} bytes (policy minimum, {source})",
            rec.recommended_memory as i64, min as i64
        )],
        adjusted,
    }
}

fn clamp_max_memory(rec: &ContainerRecommendation, max: f64, source: &str) -> PolicyDecision {
    if rec.recommended_memory <= max {
        return PolicyDecision::Allow;
    }
    let mut adjusted = rec.clone();
    adjusted.recommended_memory = max;
    PolicyDecision::Modify {
        diffs: vec![format!(
            "Decreased memory from {} to {} bytes (policy maximum, {source})",
            rec.recommended_memory as i64, max as i64
        )],
        adjusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceBreakdown, OomPriority, WorkloadKind};

    fn recommendation(cpu: f64) -> ContainerRecommendation {
        ContainerRecommendation {
            container_name: "app".into(),
            current_cpu: 1000.0,
            current_memory: 512.0 * 1024.0 * 1024.0,
            recommended_cpu: cpu,
            recommended_memory: 512.0 * 1024.0 * 1024.0,
            sample_count: 100,
            cpu_percentile: 95.0,
            memory_percentile: 95.0,
            confidence: 80.0,
            confidence_breakdown: ConfidenceBreakdown {
                duration: 80.0,
                samples: 80.0,
                consistency: 80.0,
                recency: 80.0,
                coverage: 80.0,
            },
            estimated_savings: 0.0,
            oom_flag: false,
            oom_count: 0,
            oom_boost_factor: 1.0,
            oom_priority: OomPriority::None,
        }
    }

    fn workload() -> WorkloadId {
        WorkloadId::new("test", WorkloadKind::Deployment, "api")
    }

    #[test]
    fn s5_policy_modify_clamps_max_cpu() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![Policy {
                name: "cap-cpu".into(),
                description: "cap cpu at 2 cores".into(),
                condition_expression: "true".into(),
                action: PolicyAction::SetMaxCpu(2000.0),
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        };

        let decision = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(3000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );

        match decision {
            PolicyDecision::Modify { adjusted, diffs } => {
                assert_eq!(adjusted.recommended_cpu, 2000.0);
                assert!(diffs[0].contains("Decreased CPU from 3000m to 2000m"));
            }
            other => panic!("expected Modify, got {other:?}"),
        }
    }

    #[test]
    fn no_match_falls_through_to_default_action() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![Policy {
                name: "never".into(),
                description: "never matches".into(),
                condition_expression: "false".into(),
                action: PolicyAction::Deny,
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        };

        let decision = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(1000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );

        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn priority_order_determines_winner() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![
                Policy {
                    name: "low".into(),
                    description: "low priority allow".into(),
                    condition_expression: "true".into(),
                    action: PolicyAction::Allow,
                    priority: 1,
                    enabled: true,
                },
                Policy {
                    name: "high".into(),
                    description: "high priority deny".into(),
                    condition_expression: "true".into(),
                    action: PolicyAction::Deny,
                    priority: 100,
                    enabled: true,
                },
            ],
            default_action: PolicyAction::Allow,
        };

        let decision = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(1000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );

        assert_eq!(decision, PolicyDecision::Deny);
    }

    #[test]
    fn compile_error_disables_policy_not_fatal() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![Policy {
                name: "broken".into(),
                description: "malformed condition".into(),
                condition_expression: "{{{ not rego".into(),
                action: PolicyAction::Deny,
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        };

        let decision = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(1000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );

        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn skip_scaledown_blocks_only_scaledown() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![Policy {
                name: "protect".into(),
                description: "never scale down".into(),
                condition_expression: "true".into(),
                action: PolicyAction::SkipScaleDown,
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        };

        let scaledown = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(500.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );
        assert_eq!(scaledown, PolicyDecision::Deny);

        let scaleup = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(5000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );
        assert_eq!(scaleup, PolicyDecision::Allow);
    }

    #[test]
    fn skip_blocks_regardless_of_scale_direction() {
        let engine = PolicyEngine::new();
        let set = PolicySet {
            policies: vec![Policy {
                name: "frozen".into(),
                description: "skip unconditionally".into(),
                condition_expression: "true".into(),
                action: PolicyAction::Skip,
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        };

        let scaledown = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(500.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );
        assert_eq!(scaledown, PolicyDecision::Deny);

        let scaleup = engine.evaluate(
            &set,
            &workload(),
            &WorkloadContext::default(),
            &recommendation(5000.0),
            chrono::Utc::now(),
            &ClusterContext::default(),
            &BTreeMap::new(),
        );
        assert_eq!(scaleup, PolicyDecision::Deny);
    }
}
