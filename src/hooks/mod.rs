//! # Hooks System - Integration Points
//!
//! Extension points called at fixed stages of one reconciliation cycle,
//! without modifying the control loop itself: closures are registered
//! against a named stage and run in registration order when that stage
//! fires, from sample ingestion through policy evaluation to apply and
//! rollback check.
//!
//! ## Example
//!
//! ```rust,no_run
//! use resource_optimizer::hooks::{HookRegistry, HookType, HookContext};
//! use resource_optimizer::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let mut registry = HookRegistry::new();
//!
//! registry.register(HookType::PostRecommend, |ctx| {
//!     async move {
//!         println!("recommendation ready: {:?}", ctx);
//!         Ok(())
//!     }
//! }).await;
//!
//! let ctx = HookContext::default();
//! registry.execute(HookType::PostRecommend, &ctx).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// A stage in one reconciliation cycle at which hooks may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Before reading samples from the store.
    PreIngest,
    /// After reading samples from the store.
    PostIngest,
    /// Before the recommender computes sizing.
    PreRecommend,
    /// After a `WorkloadRecommendation` is produced.
    PostRecommend,
    /// Before policy evaluation.
    PrePolicy,
    /// After policy evaluation.
    PostPolicy,
    /// Before the reconciler applies a patch.
    PreApply,
    /// After an apply attempt (success, dry-run, no-op, or rollback).
    PostApply,
    /// Before a rollback is evaluated.
    PreRollbackCheck,
    /// After a rollback decision is made.
    PostRollbackCheck,
}

/// Context passed to hook functions.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Arbitrary data for hooks.
    pub data: HashMap<String, serde_json::Value>,
}

impl HookContext {
    /// Create an empty hook context.
    pub fn new() -> Self {
        Self { data: HashMap::new() }
    }

    /// Set a value in the context.
    pub fn set(&mut self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Get a value from the context.
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(value) = self.data.get(key) {
            Ok(Some(serde_json::from_value(value.clone())?))
        } else {
            Ok(None)
        }
    }
}

/// Hook function type.
pub type HookFn = Arc<dyn Fn(HookContext) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry of hooks, keyed by stage, run in registration order.
#[derive(Clone)]
pub struct HookRegistry {
    hooks: Arc<RwLock<HashMap<HookType, Vec<HookFn>>>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            hooks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a hook for a stage.
    #[instrument(skip(self, hook))]
    pub async fn register<F, Fut>(&mut self, hook_type: HookType, hook: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let hook_fn: HookFn = Arc::new(move |ctx| Box::pin(hook(ctx)));

        let mut hooks = self.hooks.write().await;
        hooks.entry(hook_type).or_insert_with(Vec::new).push(hook_fn);

        debug!("registered hook for {:?}", hook_type);
    }

    /// Run every hook registered for a stage, in registration order.
    #[instrument(skip(self, context))]
    pub async fn execute(&self, hook_type: HookType, context: &HookContext) -> Result<()> {
        let hooks = self.hooks.read().await;

        if let Some(hook_fns) = hooks.get(&hook_type) {
            debug!("executing {} hooks for {:?}", hook_fns.len(), hook_type);
            for hook_fn in hook_fns {
                hook_fn(context.clone()).await?;
            }
        }

        Ok(())
    }

    /// Whether any hooks are registered for a stage.
    pub async fn has_hooks(&self, hook_type: HookType) -> bool {
        let hooks = self.hooks.read().await;
        hooks.get(&hook_type).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Count of hooks registered for a stage.
    pub async fn hook_count(&self, hook_type: HookType) -> usize {
        let hooks = self.hooks.read().await;
        hooks.get(&hook_type).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_execute_hook() {
        let mut registry = HookRegistry::new();

        registry.register(HookType::PostRecommend, |_ctx| async { Ok(()) }).await;

        assert!(registry.has_hooks(HookType::PostRecommend).await);
        assert_eq!(registry.hook_count(HookType::PostRecommend).await, 1);

        let ctx = HookContext::new();
        registry.execute(HookType::PostRecommend, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn unregistered_stage_executes_as_no_op() {
        let registry = HookRegistry::new();
        let ctx = HookContext::new();
        registry.execute(HookType::PreApply, &ctx).await.unwrap();
        assert!(!registry.has_hooks(HookType::PreApply).await);
    }

    #[test]
    fn hook_context_round_trips_values() {
        let mut ctx = HookContext::new();
        ctx.set("workload", "api").unwrap();
        let value: Option<String> = ctx.get("workload").unwrap();
        assert_eq!(value, Some("api".to_string()));
    }
}
