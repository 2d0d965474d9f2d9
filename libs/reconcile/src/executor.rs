//! Plan executor.
//!
//! One call to [`PlanExecutor::tick`] reads a deployment, advances the head
//! of its high-priority plan and then of its normal plan, asks the plan
//! builder to refill empty plans, and commits the result with a single
//! conditional status write.
//!
//! Per plan, the head record goes through:
//!
//! ```text
//!   no start time ── start ──► done ─────────────► removed, next record
//!                          ├─► not done ─────────► start time recorded
//!                          └─► error ────────────► unchanged
//!   start time ───── timed out? ── policy ───────► aborted / restarted once
//!                └── check_progress ─► ready ────► removed, next record
//!                                   ├─► abort ───► removed (or plan cleared)
//!                                   ├─► pending ─► unchanged
//!                                   └─► error ───► unchanged
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keel_events::{Outcome, PlanEvent, PlanEventBuilder, PlanEventKind};
use keel_plan::{
    is_action_timeout, ActionRecord, ActionType, Deployment, Plan, PlanKind, TickId,
    TimeoutPolicy, MEMBER_ID_PREVIOUS_ACTION,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    Action, ActionContext, ActionMetrics, ActionRegistry, ClusterClient, EventSink,
    ExecutorError, NoopPlanBuilder, PlanBuilder, Progress, StatusStore, TracingEventSink,
    Versioned, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_ACTIONS_PER_TICK,
    DEFAULT_START_FAILURE_GRACE_PERIOD,
};

/// Scratch key marking a record whose timeout was already retried.
const TIMEOUT_RETRIED_KEY: &str = "keel.timeoutRetried";

// =============================================================================
// Configuration
// =============================================================================

/// What an abort (or an aborting timeout) removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortScope {
    /// Only the failed record.
    Action,
    /// The failed record and everything queued behind it.
    #[default]
    Plan,
}

impl AbortScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for AbortScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbortScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "action" => Ok(Self::Action),
            "plan" => Ok(Self::Plan),
            other => Err(format!("invalid abort scope '{other}', expected 'action' or 'plan'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on each external call an action makes.
    pub call_timeout: Duration,

    /// Start errors younger than this (since record creation) are quiet.
    pub start_failure_grace_period: Duration,

    pub abort_scope: AbortScope,

    /// Records one plan may complete inline in a single tick.
    pub max_actions_per_tick: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            start_failure_grace_period: DEFAULT_START_FAILURE_GRACE_PERIOD,
            abort_scope: AbortScope::default(),
            max_actions_per_tick: DEFAULT_MAX_ACTIONS_PER_TICK,
        }
    }
}

// =============================================================================
// Tick results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changed; no write was made.
    Unchanged,
    Committed { version: u64 },
    /// The status moved underneath the tick; all of its changes were dropped.
    Conflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub started: usize,
    pub completed: usize,
    pub aborted: usize,
    pub timed_out: usize,
    pub start_failures: usize,
    pub generated: usize,
}

impl TickStats {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: TickId,
    pub outcome: TickOutcome,
    pub stats: TickStats,
}

enum Step {
    /// The head left the plan; look at the next one.
    Continue,
    /// Done with this plan for the tick.
    Stop,
}

/// Working state of one tick; nothing here escapes unless the write commits.
struct TickRun {
    tick_id: TickId,
    now: DateTime<Utc>,
    deployment: Deployment,
    notices: Vec<String>,
    events: Vec<PlanEventBuilder>,
    outcomes: Vec<(ActionType, PlanKind, Outcome)>,
    generated: Vec<(ActionType, PlanKind)>,
    stats: TickStats,
}

impl TickRun {
    fn new(now: DateTime<Utc>, deployment: Deployment) -> Self {
        Self {
            tick_id: TickId::new(),
            now,
            deployment,
            notices: Vec::new(),
            events: Vec::new(),
            outcomes: Vec::new(),
            generated: Vec::new(),
            stats: TickStats::default(),
        }
    }

    fn event(&self, kind: PlanEventKind, plan: PlanKind) -> PlanEventBuilder {
        PlanEvent::builder()
            .deployment(&self.deployment.name)
            .tick(self.tick_id)
            .occurred_at(self.now)
            .event_type(kind)
            .plan(plan)
    }

    fn record_event(
        &mut self,
        kind: PlanEventKind,
        plan: PlanKind,
        record: &ActionRecord,
        message: impl Into<String>,
    ) {
        let event = self.event(kind, plan).record(record).message(message);
        self.events.push(event);
    }

    fn outcome(&mut self, plan: PlanKind, record: &ActionRecord, outcome: Outcome, message: String) {
        let kind = match outcome {
            Outcome::Succeeded => PlanEventKind::ActionCompleted,
            Outcome::Aborted => PlanEventKind::ActionAborted,
            Outcome::TimedOut => PlanEventKind::ActionTimedOut,
            Outcome::StartFailed => PlanEventKind::ActionStartFailed,
        };
        let event = self
            .event(kind, plan)
            .record(record)
            .outcome(outcome)
            .message(message);
        self.events.push(event);
        self.outcomes.push((record.action_type, plan, outcome));
        match outcome {
            Outcome::Succeeded => self.stats.completed += 1,
            Outcome::Aborted => self.stats.aborted += 1,
            Outcome::TimedOut => self.stats.timed_out += 1,
            Outcome::StartFailed => self.stats.start_failures += 1,
        }
    }

    fn flush_notices(&mut self, plan: PlanKind, record: &ActionRecord) {
        for notice in std::mem::take(&mut self.notices) {
            self.record_event(PlanEventKind::ActionNotice, plan, record, notice);
        }
    }
}

// =============================================================================
// Executor
// =============================================================================

pub struct PlanExecutor {
    registry: Arc<ActionRegistry>,
    store: Arc<dyn StatusStore>,
    cluster: Arc<dyn ClusterClient>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<ActionMetrics>,
    builder: Arc<dyn PlanBuilder>,
    config: ExecutorConfig,
}

impl PlanExecutor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        store: Arc<dyn StatusStore>,
        cluster: Arc<dyn ClusterClient>,
    ) -> Self {
        Self {
            registry,
            store,
            cluster,
            sink: Arc::new(TracingEventSink),
            metrics: Arc::new(ActionMetrics::new()),
            builder: Arc::new(NoopPlanBuilder),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ActionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_plan_builder(mut self, builder: Arc<dyn PlanBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(&self) -> &Arc<ActionMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs one tick for a deployment.
    ///
    /// Only configuration problems and store failures are returned as
    /// errors; everything an action reports stays inside the tick.
    #[instrument(skip(self), fields(tick_id = tracing::field::Empty))]
    pub async fn tick(&self, deployment: &str) -> Result<TickReport, ExecutorError> {
        let Versioned {
            version,
            value: original,
        } = self.store.get(deployment).await?;

        let mut run = TickRun::new(Utc::now(), original.clone());
        tracing::Span::current().record("tick_id", tracing::field::display(run.tick_id));

        for kind in PlanKind::ORDERED {
            self.execute_plan(&mut run, kind).await?;
        }
        self.generate(&mut run).await;

        let outcome = if run.deployment.status == original.status {
            TickOutcome::Unchanged
        } else {
            match self
                .store
                .update_status(deployment, version, run.deployment.status.clone())
                .await
            {
                Ok(version) => TickOutcome::Committed { version },
                Err(err) if err.is_conflict() => {
                    info!(error = %err, "Status changed during tick, discarding changes");
                    return Ok(TickReport {
                        tick_id: run.tick_id,
                        outcome: TickOutcome::Conflict,
                        stats: TickStats::default(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        let report = TickReport {
            tick_id: run.tick_id,
            outcome,
            stats: run.stats,
        };
        self.publish(run);
        Ok(report)
    }

    async fn execute_plan(&self, run: &mut TickRun, kind: PlanKind) -> Result<(), ExecutorError> {
        let mut plan = std::mem::take(run.deployment.status.plan_mut(kind));
        let result = self.drain(run, kind, &mut plan).await;
        *run.deployment.status.plan_mut(kind) = plan;
        result
    }

    async fn drain(
        &self,
        run: &mut TickRun,
        kind: PlanKind,
        plan: &mut Plan,
    ) -> Result<(), ExecutorError> {
        for _ in 0..self.config.max_actions_per_tick.max(1) {
            let Some(head) = plan.head() else {
                return Ok(());
            };
            let action = self.registry.build_action(head).map_err(|_| {
                ExecutorError::UnregisteredAction {
                    deployment: run.deployment.name.clone(),
                    action_type: head.action_type,
                }
            })?;

            let step = if head.is_started() {
                self.poll(run, kind, plan, action).await
            } else {
                self.start(run, kind, plan, action).await
            };
            if let Step::Stop = step {
                return Ok(());
            }
        }
        debug!(plan = %kind, "Reached per-tick action limit");
        Ok(())
    }

    fn context<'a>(&'a self, run: &'a mut TickRun, record: &'a mut ActionRecord) -> ActionContext<'a> {
        ActionContext::new(
            &run.deployment.name,
            &run.deployment.spec,
            &mut run.deployment.status.members,
            record,
            self.cluster.as_ref(),
            &mut run.notices,
            self.config.call_timeout,
            run.now,
        )
    }

    async fn start(
        &self,
        run: &mut TickRun,
        kind: PlanKind,
        plan: &mut Plan,
        mut action: Box<dyn Action>,
    ) -> Step {
        let Some(record) = plan.head_mut() else {
            return Step::Stop;
        };
        let result = {
            let mut ctx = self.context(run, record);
            action.start(&mut ctx).await
        };
        let snapshot = record.clone();
        run.flush_notices(kind, &snapshot);

        match result {
            Err(err) => {
                let age = (run.now - snapshot.creation_time)
                    .to_std()
                    .unwrap_or_default();
                if age < self.config.start_failure_grace_period {
                    debug!(
                        action_id = %snapshot.id,
                        action_type = %snapshot.action_type,
                        member_id = %snapshot.member_id,
                        error = %err,
                        "Action failed to start within grace period, will retry"
                    );
                } else {
                    warn!(
                        action_id = %snapshot.id,
                        action_type = %snapshot.action_type,
                        member_id = %snapshot.member_id,
                        error = %err,
                        "Action failed to start, will retry"
                    );
                    run.outcome(kind, &snapshot, Outcome::StartFailed, err.to_string());
                }
                Step::Stop
            }
            Ok(true) => self.complete(run, kind, plan, action).await,
            Ok(false) => {
                if let Some(head) = plan.head_mut() {
                    head.start_time = Some(run.now);
                }
                info!(
                    action_id = %snapshot.id,
                    action_type = %snapshot.action_type,
                    member_id = %snapshot.member_id,
                    plan = %kind,
                    "Action started"
                );
                run.record_event(PlanEventKind::ActionStarted, kind, &snapshot, "");
                run.stats.started += 1;
                Step::Stop
            }
        }
    }

    async fn poll(
        &self,
        run: &mut TickRun,
        kind: PlanKind,
        plan: &mut Plan,
        mut action: Box<dyn Action>,
    ) -> Step {
        let Some(record) = plan.head_mut() else {
            return Step::Stop;
        };

        let timeout = action
            .timeout()
            .unwrap_or_else(|| run.deployment.spec.timeouts.resolve(record.action_type));
        if is_action_timeout(timeout, record, run.now) {
            let retry = record.action_type.timeout_policy() == TimeoutPolicy::RetryOnce
                && !record.locals.contains_key(TIMEOUT_RETRIED_KEY);
            if retry {
                record.start_time = None;
                record
                    .locals
                    .insert(TIMEOUT_RETRIED_KEY.to_string(), "true".to_string());
                let snapshot = record.clone();
                warn!(
                    action_id = %snapshot.id,
                    action_type = %snapshot.action_type,
                    member_id = %snapshot.member_id,
                    timeout_secs = timeout.as_secs(),
                    "Action timed out, restarting once"
                );
                run.record_event(
                    PlanEventKind::ActionTimeoutRetried,
                    kind,
                    &snapshot,
                    format!("timed out after {}s, restarting", timeout.as_secs()),
                );
                return Step::Stop;
            }

            let snapshot = record.clone();
            warn!(
                action_id = %snapshot.id,
                action_type = %snapshot.action_type,
                member_id = %snapshot.member_id,
                timeout_secs = timeout.as_secs(),
                "Action timed out"
            );
            run.outcome(
                kind,
                &snapshot,
                Outcome::TimedOut,
                format!("timed out after {}s", timeout.as_secs()),
            );
            self.remove_failed(run, kind, plan, &snapshot);
            return Step::Stop;
        }

        let result = {
            let mut ctx = self.context(run, record);
            action.check_progress(&mut ctx).await
        };
        let snapshot = record.clone();
        run.flush_notices(kind, &snapshot);

        match result {
            Err(err) => {
                warn!(
                    action_id = %snapshot.id,
                    action_type = %snapshot.action_type,
                    member_id = %snapshot.member_id,
                    error = %err,
                    "Action progress check failed, will retry"
                );
                Step::Stop
            }
            Ok(Progress::Pending) => Step::Stop,
            Ok(Progress::Abort) => {
                warn!(
                    action_id = %snapshot.id,
                    action_type = %snapshot.action_type,
                    member_id = %snapshot.member_id,
                    scope = %self.config.abort_scope,
                    "Action aborted"
                );
                run.outcome(kind, &snapshot, Outcome::Aborted, String::new());
                self.remove_failed(run, kind, plan, &snapshot);
                Step::Stop
            }
            Ok(Progress::Ready) => self.complete(run, kind, plan, action).await,
        }
    }

    /// Removes the finished head and prepares its successor.
    async fn complete(
        &self,
        run: &mut TickRun,
        kind: PlanKind,
        plan: &mut Plan,
        mut action: Box<dyn Action>,
    ) -> Step {
        let Some(record) = plan.head_mut() else {
            return Step::Stop;
        };
        let post = {
            let mut ctx = self.context(run, record);
            action.post(&mut ctx).await
        };
        let snapshot = record.clone();
        run.flush_notices(kind, &snapshot);
        if let Err(err) = post {
            warn!(
                action_id = %snapshot.id,
                action_type = %snapshot.action_type,
                error = %err,
                "Action post hook failed, will retry"
            );
            return Step::Stop;
        }

        plan.pop_head();
        if let Some(mut replaced) = action.append_plan(plan) {
            if !replaced.equal_ignoring_start(plan) {
                debug!(
                    action_id = %snapshot.id,
                    before = plan.len(),
                    after = replaced.len(),
                    "Completed action rewrote the remaining plan"
                );
            }
            replaced.clear_start_times();
            *plan = replaced;
        }
        if let Some(next) = plan.head_mut() {
            if next.member_id == MEMBER_ID_PREVIOUS_ACTION {
                next.member_id = action.member_id().to_string();
            }
        }

        info!(
            action_id = %snapshot.id,
            action_type = %snapshot.action_type,
            member_id = %snapshot.member_id,
            plan = %kind,
            "Action completed"
        );
        run.outcome(kind, &snapshot, Outcome::Succeeded, String::new());
        Step::Continue
    }

    fn remove_failed(&self, run: &mut TickRun, kind: PlanKind, plan: &mut Plan, failed: &ActionRecord) {
        match self.config.abort_scope {
            AbortScope::Action => {
                plan.pop_head();
            }
            AbortScope::Plan => {
                let dropped = plan.len().saturating_sub(1);
                *plan = Plan::new();
                if dropped > 0 {
                    run.record_event(
                        PlanEventKind::PlanAborted,
                        kind,
                        failed,
                        format!("dropped {dropped} queued records"),
                    );
                }
            }
        }
    }

    async fn generate(&self, run: &mut TickRun) {
        for kind in PlanKind::ORDERED {
            if !run.deployment.status.plan(kind).is_empty() {
                continue;
            }
            let proposal = self.builder.propose(&run.deployment, kind, run.now).await;
            run.deployment.status.backoff.merge(&proposal.backoff);
            if proposal.actions.is_empty() {
                continue;
            }

            let mut plan: Plan = proposal
                .actions
                .into_iter()
                .filter(|record| {
                    let routable = record.action_type.priority() == kind
                        && !record.action_type.is_deprecated();
                    if !routable {
                        warn!(
                            plan = %kind,
                            action_type = %record.action_type,
                            member_id = %record.member_id,
                            "Dropping proposed record that does not belong on this plan"
                        );
                    }
                    routable
                })
                .collect();
            if plan.is_empty() {
                continue;
            }
            plan.clear_start_times();
            for record in &plan {
                run.generated.push((record.action_type, kind));
            }
            run.stats.generated += plan.len();
            info!(plan = %kind, records = plan.len(), "Plan generated");
            let event = run
                .event(PlanEventKind::PlanGenerated, kind)
                .message(format!("{} records", plan.len()));
            run.events.push(event);
            *run.deployment.status.plan_mut(kind) = plan;
        }
    }

    fn publish(&self, run: TickRun) {
        let name = run.deployment.name.as_str();
        for builder in run.events {
            match builder.build() {
                Ok(event) => self.sink.publish(&event),
                Err(err) => warn!(error = %err, "Dropping malformed plan event"),
            }
        }
        for (action_type, kind, outcome) in run.outcomes {
            self.metrics.record_outcome(name, action_type, kind, outcome);
        }
        for (action_type, kind) in run.generated {
            self.metrics.record_generated(name, action_type, kind);
        }
        for kind in PlanKind::ORDERED {
            let current = run
                .deployment
                .status
                .plan(kind)
                .head()
                .filter(|r| r.is_started())
                .map(|r| r.action_type);
            self.metrics.set_current(name, kind, current);
        }
    }
}
