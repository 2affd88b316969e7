//! Expression environment builder.
//!
//! Translates crate types into the `regorus::Value` shape policies are
//! evaluated against, with namespaces `workload`, `recommendation`, `time`,
//! `cluster`, `custom`.

use crate::types::{ContainerRecommendation, WorkloadId};
use chrono::{DateTime, Datelike, Timelike, Utc};
use regorus::Value;
use std::collections::BTreeMap;

/// Extra workload context not carried by [`WorkloadId`] itself, supplied by
/// the caller at evaluation time.
#[derive(Debug, Clone, Default)]
pub struct WorkloadContext {
    /// Workload labels.
    pub labels: BTreeMap<String, String>,
    /// Workload annotations.
    pub annotations: BTreeMap<String, String>,
    /// Current replica count.
    pub replicas: u32,
}

/// Cluster-wide facts available to policies.
#[derive(Debug, Clone, Default)]
pub struct ClusterContext {
    /// Total node count.
    pub total_nodes: u32,
    /// Allocatable CPU across the cluster, in millicores.
    pub available_cpu: f64,
    /// Allocatable memory across the cluster, in bytes.
    pub available_memory: f64,
    /// Deployment environment label (`production`, `staging`, ...).
    pub environment: String,
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
            .collect(),
    )
}

fn obj(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (Value::String(k.to_string()), v))
            .collect(),
    )
}

/// Build the full evaluation environment for one container recommendation.
pub fn build(
    workload: &WorkloadId,
    workload_ctx: &WorkloadContext,
    recommendation: &ContainerRecommendation,
    now: DateTime<Utc>,
    cluster: &ClusterContext,
    custom: &BTreeMap<String, String>,
) -> Value {
    let change_type = match recommendation.change_type() {
        crate::types::ChangeType::ScaleUp => "scaleup",
        crate::types::ChangeType::ScaleDown => "scaledown",
        crate::types::ChangeType::NoChange => "nochange",
    };

    let weekday = now.weekday().num_days_from_sunday();
    let hour = now.hour();
    let is_weekend = weekday == 0 || weekday == 6;
    let is_business_hours = !is_weekend && (9..17).contains(&hour);

    let workload_value = obj(vec![
        ("namespace", Value::String(workload.namespace.clone())),
        ("name", Value::String(workload.name.clone())),
        ("kind", Value::String(format!("{:?}", workload.kind).to_lowercase())),
        ("labels", string_map(&workload_ctx.labels)),
        ("annotations", string_map(&workload_ctx.annotations)),
        ("replicas", Value::Number(workload_ctx.replicas as f64)),
        ("currentCPU", Value::Number(recommendation.current_cpu)),
        ("currentMemory", Value::Number(recommendation.current_memory)),
    ]);

    let recommendation_value = obj(vec![
        ("recommendedCPU", Value::Number(recommendation.recommended_cpu)),
        (
            "recommendedMemory",
            Value::Number(recommendation.recommended_memory),
        ),
        ("confidence", Value::Number(recommendation.confidence)),
        ("changeType", Value::String(change_type.to_string())),
        (
            "cpuChangePercent",
            Value::Number(recommendation.cpu_change_percent()),
        ),
        (
            "memoryChangePercent",
            Value::Number(recommendation.memory_change_percent()),
        ),
    ]);

    let time_value = obj(vec![
        ("now", Value::String(now.to_rfc3339())),
        ("hour", Value::Number(hour as f64)),
        ("weekday", Value::Number(weekday as f64)),
        ("isBusinessHours", Value::Bool(is_business_hours)),
        ("isWeekend", Value::Bool(is_weekend)),
    ]);

    let cluster_value = obj(vec![
        ("totalNodes", Value::Number(cluster.total_nodes as f64)),
        ("availableCPU", Value::Number(cluster.available_cpu)),
        ("availableMemory", Value::Number(cluster.available_memory)),
        ("environment", Value::String(cluster.environment.clone())),
    ]);

    obj(vec![
        ("workload", workload_value),
        ("recommendation", recommendation_value),
        ("time", time_value),
        ("cluster", cluster_value),
        ("custom", string_map(custom)),
    ])
}
