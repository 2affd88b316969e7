//! # resource-optimizer
//!
//! A closed-loop vertical resource optimizer for containerized workloads.
//!
//! Samples are ingested into a per-container [`store::SampleStore`], reduced
//! through a percentile/confidence kernel ([`stats`]) and a cost model
//! ([`cost`]), screened for memory leaks ([`leak`]) and daily usage patterns
//! ([`pattern`]), optionally forecast with Holt-Winters ([`predictor`]), and
//! turned into a sizing recommendation ([`recommender`]). A Rego policy
//! engine ([`policy`]) and a multi-gate safety check ([`safety`]) stand
//! between a recommendation and the cluster: nothing is applied unless both
//! agree, and every apply is recorded in a [`rollback::RollbackStore`] first
//! so it can be undone. [`controller::OptimizerController`] wires these
//! stages into one reconciliation cycle, run periodically against an
//! [`orchestrator::OrchestratorClient`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use resource_optimizer::config::OptimizerConfig;
//! use resource_optimizer::controller::OptimizerController;
//! use resource_optimizer::cost::Price;
//! use resource_optimizer::orchestrator::NullOrchestratorClient;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> resource_optimizer::error::Result<()> {
//!     let mut config = OptimizerConfig::default();
//!     config.target_namespaces.push("default".into());
//!
//!     let mut controller = OptimizerController::new(
//!         config,
//!         Arc::new(NullOrchestratorClient),
//!         Price::default(),
//!     )?;
//!
//!     controller.start(Duration::from_secs(60)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod controller;
pub mod cost;
pub mod error;
pub mod events;
pub mod hooks;
pub mod leak;
pub mod orchestrator;
pub mod pattern;
pub mod persistence;
pub mod policy;
pub mod predictor;
pub mod reconciler;
pub mod recommender;
pub mod rollback;
pub mod safety;
pub mod stats;
pub mod store;
pub mod types;

pub use config::OptimizerConfig;
pub use controller::{CycleSummary, OptimizerController};
pub use error::{Error, Result};
pub use types::{ContainerRecommendation, ContainerSample, WorkloadId, WorkloadRecommendation};

/// Crate version, aligned with `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
