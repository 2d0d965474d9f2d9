//! Prefixed ULID identifiers.
//!
//! Ids render as `<prefix>_<ulid>` so that a bare value in a log line or a
//! persisted status document still says what it identifies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

use crate::PlanError;

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Ulid);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generates a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            #[must_use]
            pub const fn ulid(&self) -> Ulid {
                self.0
            }

            /// Parses `<prefix>_<ulid>`.
            pub fn parse(s: &str) -> Result<Self, PlanError> {
                parse_prefixed(s, Self::PREFIX).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = PlanError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

prefixed_id!(
    /// Identifies one plan record for its whole lifetime.
    ActionId,
    "act"
);

prefixed_id!(
    /// Correlates the log lines and events of one executor tick.
    TickId,
    "tick"
);

prefixed_id!(
    /// Identifies one emitted plan event.
    EventId,
    "evt"
);

fn parse_prefixed(s: &str, expected: &'static str) -> Result<Ulid, PlanError> {
    if s.is_empty() {
        return Err(PlanError::EmptyId);
    }
    let (prefix, ulid) = s.split_once('_').ok_or(PlanError::MissingIdSeparator)?;
    if prefix != expected {
        return Err(PlanError::InvalidIdPrefix {
            expected,
            actual: prefix.to_string(),
        });
    }
    ulid.parse::<Ulid>()
        .map_err(|e| PlanError::InvalidUlid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_id_display_parse() {
        let id = ActionId::new();
        let rendered = id.to_string();
        assert!(rendered.starts_with("act_"));
        assert_eq!(rendered.parse::<ActionId>().unwrap(), id);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let tick = TickId::new().to_string();
        let err = ActionId::parse(&tick).unwrap_err();
        assert!(matches!(err, PlanError::InvalidIdPrefix { expected: "act", .. }));
    }

    #[test]
    fn test_malformed_ids() {
        assert_eq!(ActionId::parse(""), Err(PlanError::EmptyId));
        assert_eq!(
            ActionId::parse("act01HV4Z2WQXKJNM8GPQY6VBKC3D"),
            Err(PlanError::MissingIdSeparator)
        );
        assert!(matches!(
            ActionId::parse("act_not-a-ulid"),
            Err(PlanError::InvalidUlid(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let id = ActionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ActionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
