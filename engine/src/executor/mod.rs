//! Executor
//!
//! Drives one session from a goal to its outcome:
//!
//! ```text
//! Planning -> Running -> Completed
//!                     -> Suspended -> (resume) -> Running
//!                     -> Failed
//! ```
//!
//! Each step gathers its inputs from the session's world, runs the action
//! body and writes the result back under the action's output type. An
//! action that produces nothing is dropped for the rest of the session and
//! the planner is asked for a new route from the current world. An action
//! that needs outside input parks the session in the suspension store.

use crate::message_bus::{Event, MessageBus};
use crate::planner::{Plan, Planner};
use crate::registry::RegisteredAction;
use crate::suspension::{now_secs, SuspensionStore, SuspensionToken, DEFAULT_SUSPENSION_TTL_SECS};
use crate::world::{WorldSnapshot, WorldState};
use sdk::errors::EngineError;
use sdk::types::{ActionError, ActionInputs, ActionOutcome, ActionSpec, ExternalValue, InputRequest, TypeKey};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Retry, step and suspension limits for sessions
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Total attempts for an action failing recoverably
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    /// Executed steps allowed per session, across re-plans and resumes
    pub max_steps: usize,
    pub suspension_ttl: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            max_steps: 64,
            suspension_ttl: Duration::from_secs(DEFAULT_SUSPENSION_TTL_SECS),
        }
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Planning,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// A session that materialized its goal
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub session_id: String,
    pub goal: TypeKey,
    /// The goal-typed value
    pub value: Value,
    pub world: WorldSnapshot,
    pub steps_executed: usize,
}

impl CompletedSession {
    /// Decode the goal value
    pub fn goal_as<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// A session that stopped after making progress
#[derive(Debug)]
pub struct FailedSession {
    pub session_id: String,
    pub error: EngineError,
    /// Session-wide index of the failed step
    pub step: usize,
    pub action: Option<String>,
    /// World as left by the steps that did run
    pub world: WorldSnapshot,
}

/// Result of running or resuming a session
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(CompletedSession),
    Suspended(SuspensionToken),
    Failed(FailedSession),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed(_) => SessionState::Completed,
            SessionOutcome::Suspended(_) => SessionState::Suspended,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            SessionOutcome::Completed(done) => &done.session_id,
            SessionOutcome::Suspended(token) => &token.session_id,
            SessionOutcome::Failed(failed) => &failed.session_id,
        }
    }

    pub fn completed(self) -> Option<CompletedSession> {
        match self {
            SessionOutcome::Completed(done) => Some(done),
            _ => None,
        }
    }

    pub fn suspended(self) -> Option<SuspensionToken> {
        match self {
            SessionOutcome::Suspended(token) => Some(token),
            _ => None,
        }
    }

    pub fn failed(self) -> Option<FailedSession> {
        match self {
            SessionOutcome::Failed(failed) => Some(failed),
            _ => None,
        }
    }
}

/// Mutable state of one session
struct Session {
    id: String,
    goal: TypeKey,
    world: WorldState,
    excluded: BTreeSet<String>,
    steps_executed: usize,
    state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// How one pass over a plan ended
enum PlanRun {
    /// Every step ran, or a step produced nothing and a new plan is needed
    Continue,
    Suspended(SuspensionToken),
    Failed(FailedSession),
}

/// Runs and resumes sessions against a shared planner and store
pub struct Executor {
    planner: Planner,
    store: Arc<dyn SuspensionStore>,
    bus: Option<Arc<MessageBus>>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(planner: Planner, store: Arc<dyn SuspensionStore>) -> Self {
        Self {
            planner,
            store,
            bus: None,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_message_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn store(&self) -> &Arc<dyn SuspensionStore> {
        &self.store
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run a new session until it completes, suspends or fails
    ///
    /// # Errors
    ///
    /// Planning errors for the initial plan are returned directly; nothing
    /// has run yet so there is no partial state to report.
    pub async fn run(&self, goal: TypeKey, world: WorldState) -> Result<SessionOutcome, EngineError> {
        let mut session = Session {
            id: Uuid::new_v4().to_string(),
            goal,
            world,
            excluded: BTreeSet::new(),
            steps_executed: 0,
            state: SessionState::Planning,
        };

        info!("Session {} started for goal {}", session.id, session.goal);
        self.emit(Event::SessionStarted {
            session_id: session.id.clone(),
            goal: session.goal.to_string(),
        })
        .await;

        let plan = match self.plan(&session) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Session {} could not plan: {}", session.id, e);
                self.emit(Event::SessionFailed {
                    session_id: session.id.clone(),
                    error: e.to_string(),
                })
                .await;
                return Err(e);
            }
        };

        self.drive(session, plan).await
    }

    /// Continue a suspended session with the value it was waiting for
    ///
    /// # Errors
    ///
    /// - `UnknownSuspension`, `AlreadyResumed` or `SuspensionExpired` from
    ///   the store
    /// - `TypeMismatch` if the value is not of the requested type; the token
    ///   stays pending so the caller can retry
    pub async fn resume(
        &self,
        correlation_id: &str,
        value: ExternalValue,
    ) -> Result<SessionOutcome, EngineError> {
        let token = match self.store.take_as(correlation_id, &value.type_key).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Rejected resume of {}: {}", correlation_id, e);
                return Err(e);
            }
        };

        let mut session = Session {
            id: token.session_id,
            goal: token.goal,
            world: WorldState::from_snapshot(token.world),
            excluded: token.excluded,
            steps_executed: token.steps_executed,
            state: SessionState::Suspended,
        };
        session.world.put(value.type_key, value.value);

        info!("Session {} resumed via {}", session.id, correlation_id);
        self.emit(Event::SessionResumed {
            session_id: session.id.clone(),
            correlation_id: correlation_id.to_string(),
        })
        .await;

        session.transition(SessionState::Planning);
        match self.plan(&session) {
            Ok(plan) => self.drive(session, plan).await,
            Err(e) => Ok(self.fail(&mut session, e, None).await),
        }
    }

    fn plan(&self, session: &Session) -> Result<Plan, EngineError> {
        self.planner
            .plan_excluding(&session.goal, &session.world.snapshot(), &session.excluded)
    }

    /// Run plans until the goal exists or the session stops
    async fn drive(&self, mut session: Session, mut plan: Plan) -> Result<SessionOutcome, EngineError> {
        loop {
            if let Some(value) = session.world.get(&session.goal).cloned() {
                return Ok(self.complete(&mut session, value).await);
            }

            if plan.is_empty() {
                let err = EngineError::UnreachableGoal(session.goal.to_string());
                return Ok(self.fail(&mut session, err, None).await);
            }

            self.emit(Event::PlanComputed {
                session_id: session.id.clone(),
                actions: plan.action_names(),
                cost: plan.total_cost(),
            })
            .await;

            session.transition(SessionState::Running);
            match self.run_plan(&mut session, &plan).await? {
                PlanRun::Continue => {}
                PlanRun::Suspended(token) => return Ok(SessionOutcome::Suspended(token)),
                PlanRun::Failed(failed) => return Ok(SessionOutcome::Failed(failed)),
            }

            if session.world.contains(&session.goal) {
                continue;
            }

            session.transition(SessionState::Planning);
            plan = match self.plan(&session) {
                Ok(plan) => plan,
                Err(e) => return Ok(self.fail(&mut session, e, None).await),
            };
        }
    }

    async fn run_plan(&self, session: &mut Session, plan: &Plan) -> Result<PlanRun, EngineError> {
        let registry = self.planner.registry();

        for (position, spec) in plan.steps().iter().enumerate() {
            let step = session.steps_executed;

            if step >= self.settings.max_steps {
                let err = EngineError::StepLimitExceeded(self.settings.max_steps);
                let failed = self.failure(session, err, Some(spec.name.clone())).await;
                return Ok(PlanRun::Failed(failed));
            }

            let Some(action) = registry.get(&spec.name) else {
                let err = step_error(spec, step, 0, "action is no longer registered");
                let failed = self.failure(session, err, Some(spec.name.clone())).await;
                return Ok(PlanRun::Failed(failed));
            };

            let missing = self.planner.capabilities().missing(spec);
            if !missing.is_empty() {
                let reason = format!("capabilities unavailable: {}", missing.join(", "));
                let err = step_error(spec, step, 0, &reason);
                let failed = self.failure(session, err, Some(spec.name.clone())).await;
                return Ok(PlanRun::Failed(failed));
            }

            let inputs = match gather_inputs(spec, &session.world) {
                Ok(inputs) => inputs,
                Err(missing) => {
                    let reason = format!("input {} not in world", missing);
                    let err = step_error(spec, step, 0, &reason);
                    let failed = self.failure(session, err, Some(spec.name.clone())).await;
                    return Ok(PlanRun::Failed(failed));
                }
            };

            debug!(
                "Session {} step {}: running {}",
                session.id, step, spec.name
            );
            let outcome = match self.execute_with_retry(session, step, action, &inputs).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let failed = self.failure(session, e, Some(spec.name.clone())).await;
                    return Ok(PlanRun::Failed(failed));
                }
            };
            session.steps_executed += 1;

            match outcome {
                ActionOutcome::Produced(value) => {
                    session.world.put(spec.output_type.clone(), value);
                    self.emit(Event::StepCompleted {
                        session_id: session.id.clone(),
                        step,
                        action: spec.name.clone(),
                        output_type: spec.output_type.to_string(),
                    })
                    .await;
                }
                ActionOutcome::Nothing => {
                    info!(
                        "Session {}: {} produced nothing, re-planning without it",
                        session.id, spec.name
                    );
                    session.excluded.insert(spec.name.clone());
                    self.emit(Event::ActionExcluded {
                        session_id: session.id.clone(),
                        action: spec.name.clone(),
                    })
                    .await;
                    return Ok(PlanRun::Continue);
                }
                ActionOutcome::AwaitInput(request) => {
                    let remaining = plan.steps()[position + 1..]
                        .iter()
                        .map(|s| s.name.clone())
                        .collect();
                    return match self.suspend(session, spec, request, remaining).await {
                        Ok(token) => Ok(PlanRun::Suspended(token)),
                        Err(e) => {
                            let failed = self.failure(session, e, Some(spec.name.clone())).await;
                            Ok(PlanRun::Failed(failed))
                        }
                    };
                }
            }
        }

        Ok(PlanRun::Continue)
    }

    /// Run an action, retrying recoverable failures with a fixed backoff
    async fn execute_with_retry(
        &self,
        session: &Session,
        step: usize,
        action: &RegisteredAction,
        inputs: &ActionInputs,
    ) -> Result<ActionOutcome, EngineError> {
        let body = action.body();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match body.execute(inputs).await {
                Ok(outcome) => return Ok(outcome),
                Err(ActionError::Recoverable(reason)) if attempt < max_attempts => {
                    warn!(
                        "Session {}: {} attempt {}/{} failed: {}",
                        session.id,
                        action.name(),
                        attempt,
                        max_attempts,
                        reason
                    );
                    self.emit(Event::ActionRetried {
                        session_id: session.id.clone(),
                        action: action.name().to_string(),
                        attempt,
                        error: reason,
                    })
                    .await;
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                Err(e) => return Err(step_error(action.spec(), step, attempt, &e.to_string())),
            }
        }
    }

    async fn suspend(
        &self,
        session: &mut Session,
        spec: &ActionSpec,
        request: InputRequest,
        remaining_plan: Vec<String>,
    ) -> Result<SuspensionToken, EngineError> {
        let created_at = now_secs();
        let ttl = i64::try_from(self.settings.suspension_ttl.as_secs()).unwrap_or(i64::MAX);
        let token = SuspensionToken {
            correlation_id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            goal: session.goal.clone(),
            remaining_plan,
            world: session.world.snapshot(),
            awaiting_action: spec.name.clone(),
            request,
            excluded: session.excluded.clone(),
            steps_executed: session.steps_executed,
            created_at,
            expires_at: created_at.saturating_add(ttl),
        };

        self.store.save(token.clone()).await?;
        session.transition(SessionState::Suspended);

        info!(
            "Session {} suspended at {} awaiting {} ({})",
            session.id,
            spec.name,
            token.expected_type(),
            token.correlation_id
        );
        self.emit(Event::SessionSuspended {
            session_id: session.id.clone(),
            correlation_id: token.correlation_id.clone(),
            action: spec.name.clone(),
            expected_type: token.expected_type().to_string(),
        })
        .await;

        Ok(token)
    }

    async fn complete(&self, session: &mut Session, value: Value) -> SessionOutcome {
        session.transition(SessionState::Completed);
        info!(
            "Session {} completed {} in {} step(s)",
            session.id, session.goal, session.steps_executed
        );
        self.emit(Event::SessionCompleted {
            session_id: session.id.clone(),
            goal: session.goal.to_string(),
            steps: session.steps_executed,
        })
        .await;

        SessionOutcome::Completed(CompletedSession {
            session_id: session.id.clone(),
            goal: session.goal.clone(),
            value,
            world: session.world.snapshot(),
            steps_executed: session.steps_executed,
        })
    }

    async fn fail(&self, session: &mut Session, error: EngineError, action: Option<String>) -> SessionOutcome {
        SessionOutcome::Failed(self.failure(session, error, action).await)
    }

    async fn failure(
        &self,
        session: &mut Session,
        error: EngineError,
        action: Option<String>,
    ) -> FailedSession {
        session.transition(SessionState::Failed);
        warn!("Session {} failed: {}", session.id, error);
        self.emit(Event::SessionFailed {
            session_id: session.id.clone(),
            error: error.to_string(),
        })
        .await;

        FailedSession {
            session_id: session.id.clone(),
            error,
            step: session.steps_executed,
            action,
            world: session.world.snapshot(),
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}

fn step_error(spec: &ActionSpec, step: usize, attempts: u32, reason: &str) -> EngineError {
    EngineError::ActionExecution {
        action: spec.name.clone(),
        step,
        attempts,
        reason: reason.to_string(),
    }
}

/// Collect the action's inputs from the world; `Err` names the first gap
fn gather_inputs(spec: &ActionSpec, world: &WorldState) -> Result<ActionInputs, TypeKey> {
    let mut inputs = ActionInputs::new();
    for input in &spec.input_types {
        let value = world.get(input).ok_or_else(|| input.clone())?;
        inputs.insert(input.clone(), value.clone());
    }
    Ok(inputs)
}
