//! Error types for the plan data model.

use thiserror::Error;

/// Errors produced while parsing plan model values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The id string is empty.
    #[error("id cannot be empty")]
    EmptyId,

    /// The id has the wrong prefix.
    #[error("invalid id prefix: expected '{expected}', got '{actual}'")]
    InvalidIdPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The id is not `<prefix>_<ulid>`.
    #[error("id missing underscore separator")]
    MissingIdSeparator,

    /// The ULID part of an id failed to parse.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// Unknown action type name.
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    /// Unknown server group name.
    #[error("unknown server group: {0}")]
    UnknownServerGroup(String),

    /// Unknown member phase name.
    #[error("unknown member phase: {0}")]
    UnknownMemberPhase(String),

    /// Unknown plan kind name.
    #[error("unknown plan kind: {0}")]
    UnknownPlanKind(String),
}
