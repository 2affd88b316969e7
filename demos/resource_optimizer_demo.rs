//! # Resource Optimizer Demo
//!
//! This example demonstrates the closed-loop resource optimizer in action.
//! It creates a controller over an in-memory orchestrator double, then:
//! - Ingests three hours of stable, over-provisioned usage samples
//! - Runs one reconciliation cycle and observes a scale-down recommendation
//! - Registers a policy capping CPU and re-runs to show the policy clamp
//! - Injects a runaway memory growth pattern and shows the safety veto

use async_trait::async_trait;
use chrono::{Duration, Utc};
use resource_optimizer::config::OptimizerConfig;
use resource_optimizer::controller::OptimizerController;
use resource_optimizer::cost::Price;
use resource_optimizer::error::Result;
use resource_optimizer::events::EventReason;
use resource_optimizer::orchestrator::OrchestratorClient;
use resource_optimizer::types::{
    ContainerSample, Policy, PolicyAction, PolicySet, ResourcePatch, ResourceSpec, WorkloadId, WorkloadKind,
};
use std::sync::Mutex;
use std::sync::Arc;

/// A fixed-inventory orchestrator double with a mutable "current" resource
/// spec, so repeated cycles can observe the effect of prior applies.
struct DemoClient {
    workloads: Vec<WorkloadId>,
    current: Mutex<ResourceSpec>,
}

#[async_trait]
impl OrchestratorClient for DemoClient {
    async fn list_workloads(&self, namespace: &str, kind: WorkloadKind) -> Result<Vec<WorkloadId>> {
        Ok(self
            .workloads
            .iter()
            .filter(|w| w.namespace == namespace && w.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_resources(&self, _workload: &WorkloadId, _container: &str) -> Result<ResourceSpec> {
        Ok(*self.current.lock().unwrap())
    }

    async fn patch_resources(&self, _workload: &WorkloadId, _container: &str, patch: &ResourcePatch) -> Result<()> {
        let mut current = self.current.lock().unwrap();
        current.cpu_request = patch.cpu_request;
        current.memory_request = patch.memory_request;
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

    async fn emit_event(&self, workload: &WorkloadId, reason: EventReason, message: &str) -> Result<()> {
        println!("  [event] {}/{}: {reason} - {message}", workload.namespace, workload.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Resource Optimizer Demo ===\n");

    let api = WorkloadId::new("default", WorkloadKind::Deployment, "api");
    let client = Arc::new(DemoClient {
        workloads: vec![api.clone()],
        current: Mutex::new(ResourceSpec {
            cpu_request: 1000.0,
            memory_request: 512.0 * 1024.0 * 1024.0,
            cpu_limit: 0.0,
            memory_limit: 0.0,
        }),
    });

    let mut config = OptimizerConfig::default();
    config.target_namespaces.push("default".into());

    let controller = OptimizerController::new(config, client.clone(), Price {
        cpu_per_core_hour: 0.04,
        memory_per_gb_hour: 0.01,
    })?;

    println!("1. Ingesting three hours of stable, over-provisioned usage...\n");
    let now = Utc::now();
    for i in 0..360 {
        let ts = now - Duration::hours(3) + Duration::seconds(i * 30);
        controller
            .store()
            .add(ContainerSample {
                workload: api.clone(),
                container: "app".into(),
                timestamp: ts,
                usage_cpu_millicores: 200.0 + (i % 2) as f64 * 50.0,
                usage_memory_bytes: (120.0 + (i % 2) as f64 * 20.0) * 1024.0 * 1024.0,
                request_cpu_millicores: 1000.0,
                request_memory_bytes: 512.0 * 1024.0 * 1024.0,
                limit_cpu_millicores: 0.0,
                limit_memory_bytes: 0.0,
            })
            .await;
    }

    println!("2. Running first reconciliation cycle...\n");
    let summary = controller.execute_cycle().await?;
    println!(
        "   considered={} recommended={} applied={}",
        summary.workloads_considered, summary.containers_recommended, summary.applied
    );

    println!("\n3. Capping CPU at 300m via policy, re-running...\n");
    controller
        .set_policies(PolicySet {
            policies: vec![Policy {
                name: "cap-cpu".into(),
                description: "cap cpu at 300m".into(),
                condition_expression: "true".into(),
                action: PolicyAction::SetMaxCpu(300.0),
                priority: 10,
                enabled: true,
            }],
            default_action: PolicyAction::Allow,
        })
        .await?;

    // Refresh the ingested history so the next cycle has a fresh TTL window.
    for i in 0..360 {
        let ts = Utc::now() - Duration::hours(3) + Duration::seconds(i * 30);
        controller
            .store()
            .add(ContainerSample {
                workload: api.clone(),
                container: "app".into(),
                timestamp: ts,
                usage_cpu_millicores: 200.0 + (i % 2) as f64 * 50.0,
                usage_memory_bytes: (120.0 + (i % 2) as f64 * 20.0) * 1024.0 * 1024.0,
                request_cpu_millicores: 1000.0,
                request_memory_bytes: 512.0 * 1024.0 * 1024.0,
                limit_cpu_millicores: 0.0,
                limit_memory_bytes: 0.0,
            })
            .await;
    }
    let summary = controller.execute_cycle().await?;
    println!(
        "   considered={} recommended={} applied={}",
        summary.workloads_considered, summary.containers_recommended, summary.applied
    );

    println!("\n4. Injecting a memory leak on a second workload...\n");
    let leaking = WorkloadId::new("default", WorkloadKind::Deployment, "leaky");
    let leaking_client = Arc::new(DemoClient {
        workloads: vec![leaking.clone()],
        current: Mutex::new(ResourceSpec {
            cpu_request: 500.0,
            memory_request: 1024.0 * 1024.0 * 1024.0,
            cpu_limit: 0.0,
            memory_limit: 0.0,
        }),
    });
    let mut leak_config = OptimizerConfig::default();
    leak_config.target_namespaces.push("default".into());
    let leak_controller = OptimizerController::new(
        leak_config,
        leaking_client,
        Price {
            cpu_per_core_hour: 0.04,
            memory_per_gb_hour: 0.01,
        },
    )?;

    let now = Utc::now();
    for i in 0..180 {
        let ts = now - Duration::hours(3) + Duration::minutes(i);
        let frac = i as f64 / 179.0;
        let mib = 256.0 + frac * (1024.0 - 256.0);
        leak_controller
            .store()
            .add(ContainerSample {
                workload: leaking.clone(),
                container: "app".into(),
                timestamp: ts,
                usage_cpu_millicores: 300.0,
                usage_memory_bytes: mib * 1024.0 * 1024.0,
                request_cpu_millicores: 500.0,
                request_memory_bytes: 1024.0 * 1024.0 * 1024.0,
                limit_cpu_millicores: 0.0,
                limit_memory_bytes: 0.0,
            })
            .await;
    }
    let summary = leak_controller.execute_cycle().await?;
    println!(
        "   considered={} recommended={} applied={} vetoed={:?}",
        summary.workloads_considered, summary.containers_recommended, summary.applied, summary.safety_vetoed
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
