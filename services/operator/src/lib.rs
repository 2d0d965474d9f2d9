//! keel operator.
//!
//! Wires the plan executor to a file-backed status store and the database
//! cluster's admin API, and ticks every stored deployment on an interval.

pub mod actions;
pub mod cluster;
pub mod config;
pub mod store;
pub mod worker;
