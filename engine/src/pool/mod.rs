//! Session Pool
//!
//! Runs many sessions in parallel on the tokio runtime. A semaphore caps how
//! many sessions execute at once; further submissions wait for a permit.
//! Sessions share only the executor (read-only registry, planner and
//! suspension store); each owns its world.

use crate::executor::{Executor, SessionOutcome};
use crate::world::WorldState;
use sdk::errors::EngineError;
use sdk::types::{ExternalValue, TypeKey};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a session running on the pool
pub type SessionHandle = JoinHandle<Result<SessionOutcome, EngineError>>;

/// Work the pool can run
#[derive(Debug, Clone)]
pub enum SessionRequest {
    Start { goal: TypeKey, world: WorldState },
    Resume {
        correlation_id: String,
        value: ExternalValue,
    },
}

/// Bounded pool of concurrently running sessions
pub struct SessionPool {
    executor: Arc<Executor>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl SessionPool {
    pub fn new(executor: Arc<Executor>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held by running sessions
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Start a new session in the background
    pub fn submit(&self, goal: TypeKey, world: WorldState) -> SessionHandle {
        self.spawn(SessionRequest::Start { goal, world })
    }

    /// Resume a suspended session in the background
    pub fn submit_resume(&self, correlation_id: impl Into<String>, value: ExternalValue) -> SessionHandle {
        self.spawn(SessionRequest::Resume {
            correlation_id: correlation_id.into(),
            value,
        })
    }

    /// Run every request and collect the outcomes in submission order
    pub async fn run_all(
        &self,
        requests: Vec<SessionRequest>,
    ) -> Vec<Result<SessionOutcome, EngineError>> {
        let handles: Vec<SessionHandle> = requests
            .into_iter()
            .map(|request| self.spawn(request))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(join(handle).await);
        }
        outcomes
    }

    fn spawn(&self, request: SessionRequest) -> SessionHandle {
        let executor = Arc::clone(&self.executor);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| EngineError::SessionAborted(e.to_string()))?;

            match request {
                SessionRequest::Start { goal, world } => {
                    debug!("Pool starting session for {}", goal);
                    executor.run(goal, world).await
                }
                SessionRequest::Resume {
                    correlation_id,
                    value,
                } => {
                    debug!("Pool resuming {}", correlation_id);
                    executor.resume(&correlation_id, value).await
                }
            }
        })
    }
}

/// Await a session handle, folding task panics into the session result
pub async fn join(handle: SessionHandle) -> Result<SessionOutcome, EngineError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(EngineError::SessionAborted(e.to_string())),
    }
}
