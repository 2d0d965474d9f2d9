//! Plan records and plans.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActionId, ActionType, ServerGroup};

/// Member id placeholder resolved to the member of the previously finished record.
pub const MEMBER_ID_PREVIOUS_ACTION: &str = "@previous";

/// One scheduled unit of work.
///
/// `params` holds the arguments the plan builder chose. `locals` is the
/// action's own scratch space; it only lives as long as the record does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub group: ServerGroup,
    #[serde(default, rename = "memberID")]
    pub member_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locals: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl ActionRecord {
    /// Creates a record with a fresh id, created now.
    pub fn new(action_type: ActionType, group: ServerGroup, member_id: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            action_type,
            group,
            member_id: member_id.into(),
            params: BTreeMap::new(),
            locals: BTreeMap::new(),
            reason: String::new(),
            image: None,
            creation_time: Utc::now(),
            start_time: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_locals(mut self, locals: BTreeMap<String, String>) -> Self {
        self.locals.extend(locals);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }
}

/// An ordered queue of records; only the head is ever active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(Vec<ActionRecord>);

impl Plan {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn head(&self) -> Option<&ActionRecord> {
        self.0.first()
    }

    pub fn head_mut(&mut self) -> Option<&mut ActionRecord> {
        self.0.first_mut()
    }

    /// Removes and returns the head record.
    pub fn pop_head(&mut self) -> Option<ActionRecord> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActionRecord> {
        self.0.iter()
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.0
    }

    /// Number of records that carry a start time.
    pub fn started_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_started()).count()
    }

    /// Drops every start time; used when records enter a plan from outside
    /// the executor.
    pub fn clear_start_times(&mut self) {
        for record in &mut self.0 {
            record.start_time = None;
        }
    }

    /// True when both plans hold the same records, start times aside.
    pub fn equal_ignoring_start(&self, other: &Plan) -> bool {
        let unstarted = |r: &ActionRecord| ActionRecord {
            start_time: None,
            ..r.clone()
        };
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| unstarted(a) == unstarted(b))
    }

    /// Appends records at the end.
    #[must_use]
    pub fn after(mut self, records: impl IntoIterator<Item = ActionRecord>) -> Self {
        self.0.extend(records);
        self
    }

    /// Prepends records at the front.
    #[must_use]
    pub fn before(self, records: impl IntoIterator<Item = ActionRecord>) -> Self {
        let mut out: Vec<ActionRecord> = records.into_iter().collect();
        out.extend(self.0);
        Self(out)
    }

    #[must_use]
    pub fn wrap(self, before: ActionRecord, after: ActionRecord) -> Self {
        self.before([before]).after([after])
    }

    #[must_use]
    pub fn filter(self, mut keep: impl FnMut(&ActionRecord) -> bool) -> Self {
        Self(self.0.into_iter().filter(|r| keep(r)).collect())
    }

    /// Inserts `records` in front of the first record that does not satisfy
    /// `skip`. When every record satisfies it, they go at the end.
    #[must_use]
    pub fn after_first(
        self,
        mut skip: impl FnMut(&ActionRecord) -> bool,
        records: impl IntoIterator<Item = ActionRecord>,
    ) -> Self {
        let at = self
            .0
            .iter()
            .position(|r| !skip(r))
            .unwrap_or(self.0.len());
        let mut out = self.0;
        let tail = out.split_off(at);
        out.extend(records);
        out.extend(tail);
        Self(out)
    }
}

impl From<Vec<ActionRecord>> for Plan {
    fn from(records: Vec<ActionRecord>) -> Self {
        Self(records)
    }
}

impl FromIterator<ActionRecord> for Plan {
    fn from_iter<I: IntoIterator<Item = ActionRecord>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Plan {
    type Item = ActionRecord;
    type IntoIter = std::vec::IntoIter<ActionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a ActionRecord;
    type IntoIter = std::slice::Iter<'a, ActionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: ActionType, member: &str) -> ActionRecord {
        ActionRecord::new(t, ServerGroup::DbServers, member)
    }

    fn types(plan: &Plan) -> Vec<ActionType> {
        plan.iter().map(|r| r.action_type).collect()
    }

    #[test]
    fn test_record_wire_format() {
        let record = rec(ActionType::CleanOutMember, "PRMR-1")
            .with_param("force", "true")
            .with_reason("scale down");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "CleanOutMember");
        assert_eq!(json["group"], "dbserver");
        assert_eq!(json["memberID"], "PRMR-1");
        assert_eq!(json["params"]["force"], "true");
        assert!(json.get("startTime").is_none());
        assert!(json.get("locals").is_none());

        let back: ActionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_pop_head_is_fifo() {
        let mut plan = Plan::from(vec![
            rec(ActionType::ResignLeadership, "a"),
            rec(ActionType::ShutdownMember, "a"),
        ]);
        assert_eq!(plan.pop_head().unwrap().action_type, ActionType::ResignLeadership);
        assert_eq!(plan.head().unwrap().action_type, ActionType::ShutdownMember);
        assert!(plan.pop_head().is_some());
        assert!(plan.pop_head().is_none());
    }

    #[test]
    fn test_before_after_wrap() {
        let plan = Plan::from(vec![rec(ActionType::RotateMember, "a")]);
        let plan = plan.wrap(
            rec(ActionType::EnableMaintenance, ""),
            rec(ActionType::DisableMaintenance, ""),
        );
        assert_eq!(
            types(&plan),
            vec![
                ActionType::EnableMaintenance,
                ActionType::RotateMember,
                ActionType::DisableMaintenance
            ]
        );
    }

    #[test]
    fn test_after_first_inserts_past_leading_matches() {
        let plan = Plan::from(vec![
            rec(ActionType::MemberPhaseUpdate, "a"),
            rec(ActionType::RotateMember, "a"),
        ]);
        let plan = plan.after_first(
            |r| r.action_type == ActionType::MemberPhaseUpdate,
            [rec(ActionType::Idle, "")],
        );
        assert_eq!(
            types(&plan),
            vec![
                ActionType::MemberPhaseUpdate,
                ActionType::Idle,
                ActionType::RotateMember
            ]
        );
    }

    #[test]
    fn test_after_first_appends_when_all_match() {
        let plan = Plan::from(vec![rec(ActionType::Idle, "")]);
        let plan = plan.after_first(|_| true, [rec(ActionType::RotateMember, "a")]);
        assert_eq!(types(&plan), vec![ActionType::Idle, ActionType::RotateMember]);
    }

    #[test]
    fn test_filter_keeps_order() {
        let plan: Plan = vec![
            rec(ActionType::RotateMember, "a"),
            rec(ActionType::RotateMember, "b"),
            rec(ActionType::RotateMember, "c"),
        ]
        .into();
        let plan = plan.filter(|r| r.member_id != "b");
        let members: Vec<_> = plan.iter().map(|r| r.member_id.as_str()).collect();
        assert_eq!(members, vec!["a", "c"]);
    }

    #[test]
    fn test_equal_ignoring_start() {
        let first = rec(ActionType::RotateMember, "a");
        let second = rec(ActionType::ShutdownMember, "b");
        let plan = Plan::from(vec![first.clone(), second.clone()]);

        let mut started = plan.clone();
        started.head_mut().unwrap().start_time = Some(Utc::now());
        assert_ne!(plan, started);
        assert!(plan.equal_ignoring_start(&started));

        let mut changed = started.clone();
        changed.head_mut().unwrap().locals.insert("k".to_string(), "v".to_string());
        assert!(!plan.equal_ignoring_start(&changed));

        assert!(!plan.equal_ignoring_start(&Plan::from(vec![first])));
        assert!(!plan.equal_ignoring_start(&Plan::from(vec![second, rec(ActionType::RotateMember, "a")])));
    }

    #[test]
    fn test_plan_serializes_as_array() {
        let plan = Plan::from(vec![rec(ActionType::Idle, "")]);
        let json = serde_json::to_value(&plan).unwrap();
        assert!(json.is_array());
        assert_eq!(Plan::new().started_count(), 0);
    }
}
