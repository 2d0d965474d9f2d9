//! # keel-events
//!
//! Events emitted while a deployment's plans are executed.
//!
//! ## Design Principles
//!
//! - Events describe what already happened to a plan record; they are never
//!   commands
//! - Events are published only after the tick that produced them committed
//! - Every event belongs to exactly one deployment and one tick
//!
//! ## Event Types
//!
//! - Action lifecycle (`action.*`): started, completed, aborted, timed out,
//!   start failures and timeout retries
//! - Plan lifecycle (`plan.*`): whole-plan aborts and generated records
//! - Action-defined notices (`action.notice`) emitted from action bodies

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
