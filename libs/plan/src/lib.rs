//! Data model for keel reconciliation plans.
//!
//! A deployment's status carries two ordered queues of [`ActionRecord`]s
//! (the high-priority plan and the normal plan), the accumulated
//! [`BackOff`] state, and the member list that actions read and write.
//! This crate only describes that state; executing it lives in
//! `keel-reconcile`.
//!
//! # Invariants
//!
//! - Only the head record of a plan may carry a start time
//! - A record's action type never changes after creation
//! - Scratch state (`locals`) is dropped together with its record

pub mod action_type;
pub mod backoff;
pub mod deployment;
pub mod error;
pub mod id;
pub mod member;
pub mod record;
pub mod timeouts;

pub use action_type::{ActionType, PlanKind, TimeoutPolicy};
pub use backoff::{BackOff, BackOffKey, BackOffState, BackoffPolicy};
pub use deployment::{Deployment, DeploymentMode, DeploymentSpec, DeploymentStatus};
pub use error::PlanError;
pub use id::{ActionId, EventId, TickId};
pub use member::{Condition, ConditionType, MemberPhase, MemberStatus, ServerGroup};
pub use record::{ActionRecord, Plan, MEMBER_ID_PREVIOUS_ACTION};
pub use timeouts::{is_action_timeout, ActionTimeouts, ACTIONS_DEFAULT_TIMEOUT};

/// Re-export ulid for id construction in tests and tooling.
pub use ulid::Ulid;
