//! Action registry.
//!
//! Maps each [`ActionType`] to the factory that builds its [`Action`]. The
//! registry is assembled once at startup from an explicit table and shared
//! read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keel_plan::{ActionRecord, ActionType, Plan};
use thiserror::Error;
use tracing::debug;

use crate::{Action, ActionContext, ActionError, Progress};

/// Builds an action for one tick from its record.
pub type ActionFactory = Arc<dyn Fn(&ActionRecord) -> Box<dyn Action> + Send + Sync>;

/// Wraps a plain constructor into an [`ActionFactory`].
pub fn factory<A, F>(build: F) -> ActionFactory
where
    A: Action + 'static,
    F: Fn(&ActionRecord) -> A + Send + Sync + 'static,
{
    Arc::new(move |record: &ActionRecord| -> Box<dyn Action> { Box::new(build(record)) })
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action type {0} is already registered")]
    AlreadyRegistered(ActionType),

    #[error("action type {0} is not registered")]
    Unregistered(ActionType),
}

/// Immutable lookup from action type to factory.
pub struct ActionRegistry {
    factories: HashMap<ActionType, ActionFactory>,
}

impl ActionRegistry {
    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::default()
    }

    pub fn get(&self, action_type: ActionType) -> Option<&ActionFactory> {
        self.factories.get(&action_type)
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.factories.contains_key(&action_type)
    }

    /// Builds the action for a record.
    pub fn build_action(&self, record: &ActionRecord) -> Result<Box<dyn Action>, RegistryError> {
        self.factories
            .get(&record.action_type)
            .map(|f| f(record))
            .ok_or(RegistryError::Unregistered(record.action_type))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered types in declaration order.
    pub fn registered_types(&self) -> Vec<ActionType> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[derive(Default)]
pub struct ActionRegistryBuilder {
    factories: HashMap<ActionType, ActionFactory>,
}

impl ActionRegistryBuilder {
    pub fn register(
        mut self,
        action_type: ActionType,
        factory: ActionFactory,
    ) -> Result<Self, RegistryError> {
        if self.factories.contains_key(&action_type) {
            return Err(RegistryError::AlreadyRegistered(action_type));
        }
        self.factories.insert(action_type, factory);
        Ok(self)
    }

    /// Registers a type whose records only need to drain.
    pub fn register_deprecated(self, action_type: ActionType) -> Result<Self, RegistryError> {
        self.register(action_type, factory(DeprecatedAction::new))
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            factories: self.factories,
        }
    }
}

// =============================================================================
// Deprecated types
// =============================================================================

/// No-op stand-in for retired types; completes on start.
#[derive(Debug)]
pub struct DeprecatedAction {
    member_id: String,
}

impl DeprecatedAction {
    pub fn new(record: &ActionRecord) -> Self {
        Self {
            member_id: record.member_id.clone(),
        }
    }
}

#[async_trait]
impl Action for DeprecatedAction {
    async fn start(&mut self, _ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        Ok(true)
    }

    async fn check_progress(
        &mut self,
        _ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        Ok(Progress::Ready)
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }
}

// =============================================================================
// Start failure grace period
// =============================================================================

/// Wraps a factory so that progress errors shortly after start read as
/// "not ready yet".
pub fn with_start_failure_grace_period(inner: ActionFactory, grace: Duration) -> ActionFactory {
    Arc::new(move |record: &ActionRecord| -> Box<dyn Action> {
        Box::new(StartFailureGracePeriod {
            inner: inner(record),
            grace,
        })
    })
}

struct StartFailureGracePeriod {
    inner: Box<dyn Action>,
    grace: Duration,
}

#[async_trait]
impl Action for StartFailureGracePeriod {
    async fn start(&mut self, ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
        self.inner.start(ctx).await
    }

    async fn check_progress(
        &mut self,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Progress, ActionError> {
        match self.inner.check_progress(ctx).await {
            Ok(progress) => Ok(progress),
            Err(err) => match ctx.elapsed_since_start() {
                Some(elapsed) if elapsed < self.grace => {
                    debug!(
                        error = %err,
                        elapsed_secs = elapsed.as_secs(),
                        grace_secs = self.grace.as_secs(),
                        "Ignoring progress error within start grace period"
                    );
                    Ok(Progress::Pending)
                }
                _ => Err(err),
            },
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.inner.timeout()
    }

    fn member_id(&self) -> &str {
        self.inner.member_id()
    }

    async fn post(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self.inner.post(ctx).await
    }

    fn append_plan(&self, remaining: &Plan) -> Option<Plan> {
        self.inner.append_plan(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterClient;
    use chrono::{Duration as ChronoDuration, Utc};
    use keel_plan::{DeploymentSpec, ServerGroup};

    struct NoCluster;
    impl ClusterClient for NoCluster {}

    /// Always fails to report progress.
    struct Flaky {
        member_id: String,
    }

    #[async_trait]
    impl Action for Flaky {
        async fn start(&mut self, _ctx: &mut ActionContext<'_>) -> Result<bool, ActionError> {
            Ok(false)
        }

        async fn check_progress(
            &mut self,
            _ctx: &mut ActionContext<'_>,
        ) -> Result<Progress, ActionError> {
            Err(ActionError::failed("connection refused"))
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(42))
        }

        fn member_id(&self) -> &str {
            &self.member_id
        }
    }

    fn flaky_factory() -> ActionFactory {
        factory(|record: &ActionRecord| Flaky {
            member_id: record.member_id.clone(),
        })
    }

    async fn poll_after(factory: &ActionFactory, secs: i64) -> Result<Progress, ActionError> {
        let now = Utc::now();
        let mut record = ActionRecord::new(ActionType::RotateMember, ServerGroup::DbServers, "PRMR-1");
        record.start_time = Some(now - ChronoDuration::seconds(secs));
        let mut action = factory(&record);

        let spec = DeploymentSpec::default();
        let mut members = Vec::new();
        let mut notices = Vec::new();
        let mut ctx = ActionContext::new(
            "db",
            &spec,
            &mut members,
            &mut record,
            &NoCluster,
            &mut notices,
            Duration::from_secs(1),
            now,
        );
        action.check_progress(&mut ctx).await
    }

    #[tokio::test]
    async fn test_grace_period_swallows_early_errors() {
        let wrapped = with_start_failure_grace_period(flaky_factory(), Duration::from_secs(60));
        assert_eq!(poll_after(&wrapped, 10).await.unwrap(), Progress::Pending);
    }

    #[tokio::test]
    async fn test_grace_period_propagates_late_errors() {
        let wrapped = with_start_failure_grace_period(flaky_factory(), Duration::from_secs(60));
        assert!(poll_after(&wrapped, 70).await.is_err());
    }

    #[tokio::test]
    async fn test_unwrapped_factory_propagates_immediately() {
        assert!(poll_after(&flaky_factory(), 1).await.is_err());
    }

    #[test]
    fn test_wrapper_delegates_metadata() {
        let wrapped = with_start_failure_grace_period(flaky_factory(), Duration::from_secs(60));
        let record = ActionRecord::new(ActionType::RotateMember, ServerGroup::DbServers, "PRMR-7");
        let action = wrapped(&record);
        assert_eq!(action.member_id(), "PRMR-7");
        assert_eq!(action.timeout(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = ActionRegistry::builder()
            .register(ActionType::Idle, flaky_factory())
            .unwrap()
            .register(ActionType::Idle, flaky_factory())
            .err();
        assert_eq!(err, Some(RegistryError::AlreadyRegistered(ActionType::Idle)));
    }

    #[test]
    fn test_unregistered_lookup_fails() {
        let registry = ActionRegistry::builder()
            .register_deprecated(ActionType::SetCondition)
            .unwrap()
            .build();
        let record = ActionRecord::new(ActionType::CleanOutMember, ServerGroup::DbServers, "a");
        assert_eq!(
            registry.build_action(&record).err(),
            Some(RegistryError::Unregistered(ActionType::CleanOutMember))
        );
        assert!(registry.contains(ActionType::SetCondition));
        assert_eq!(registry.registered_types(), vec![ActionType::SetCondition]);
    }

    #[tokio::test]
    async fn test_deprecated_action_completes_without_side_effects() {
        let registry = ActionRegistry::builder()
            .register_deprecated(ActionType::SetMemberCondition)
            .unwrap()
            .build();
        let mut record = ActionRecord::new(ActionType::SetMemberCondition, ServerGroup::DbServers, "a");
        let mut action = registry.build_action(&record).unwrap();

        let spec = DeploymentSpec::default();
        let mut members = Vec::new();
        let mut notices = Vec::new();
        let mut ctx = ActionContext::new(
            "db",
            &spec,
            &mut members,
            &mut record,
            &NoCluster,
            &mut notices,
            Duration::from_secs(1),
            Utc::now(),
        );
        assert!(action.start(&mut ctx).await.unwrap());
        assert!(members.is_empty());
    }
}
