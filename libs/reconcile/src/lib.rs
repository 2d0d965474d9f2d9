//! Plan execution engine.
//!
//! A deployment's status holds plans of [`keel_plan::ActionRecord`]s. Each
//! control-loop tick the [`PlanExecutor`] looks at the head of every plan,
//! builds the matching [`Action`] through the [`ActionRegistry`], and either
//! starts it or polls its progress. Whatever the tick changed is written
//! back with a single version-checked status update.
//!
//! # Invariants
//!
//! - At most one record per plan carries a start time, and it is the head
//! - Transient errors never remove a record; only completion, abort or a
//!   timeout does
//! - A tick either commits all of its changes or none of them
//! - Events and metrics are published only for committed ticks

use std::time::Duration;

pub mod action;
pub mod builder;
pub mod cluster;
pub mod context;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod registry;
pub mod scratch;
pub mod sink;
pub mod store;

pub use action::{Action, Progress};
pub use builder::{NoopPlanBuilder, PlanBuilder, PlanProposal};
pub use cluster::{ClusterClient, ClusterError, JobStatus};
pub use context::ActionContext;
pub use error::{ActionError, ExecutorError};
pub use executor::{AbortScope, ExecutorConfig, PlanExecutor, TickOutcome, TickReport, TickStats};
pub use metrics::{ActionCounters, ActionMetrics};
pub use registry::{
    factory, with_start_failure_grace_period, ActionFactory, ActionRegistry,
    ActionRegistryBuilder, DeprecatedAction, RegistryError,
};
pub use scratch::{ScratchStore, SCRATCH_EMPTY};
pub use sink::{EventSink, RecordingEventSink, TracingEventSink};
pub use store::{MemoryStatusStore, StatusStore, StoreError, Versioned};

/// Default interval between ticks of one deployment.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on a single external call made by an action.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Start errors within this window after record creation are expected races
/// and only logged at debug level.
pub const DEFAULT_START_FAILURE_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default cap on records completed inline by one plan in one tick.
pub const DEFAULT_MAX_ACTIONS_PER_TICK: usize = 16;
