//! Suspended sessions
//!
//! A session that needs a value from outside parks everything it needs to
//! continue in a [`SuspensionToken`]. Tokens live in a [`SuspensionStore`]
//! keyed by correlation id and can be consumed exactly once.

use crate::world::WorldSnapshot;
use async_trait::async_trait;
use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{InputRequest, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::debug;

/// Default lifetime of a parked session
pub const DEFAULT_SUSPENSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Everything needed to continue a suspended session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionToken {
    pub correlation_id: String,
    pub session_id: String,
    pub goal: TypeKey,
    /// Names of the plan steps that had not run yet
    pub remaining_plan: Vec<String>,
    pub world: WorldSnapshot,
    /// The action that asked for input
    pub awaiting_action: String,
    pub request: InputRequest,
    /// Actions dropped for the session before it suspended
    #[serde(default)]
    pub excluded: BTreeSet<String>,
    /// Steps run before suspending, including the awaiting action
    #[serde(default)]
    pub steps_executed: usize,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds
    pub expires_at: i64,
}

impl SuspensionToken {
    /// Type the resume value must carry
    pub fn expected_type(&self) -> &TypeKey {
        &self.request.expected_type
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }
}

/// Current time in Unix seconds
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Storage for parked sessions
#[async_trait]
pub trait SuspensionStore: Send + Sync {
    /// Park a token as pending
    async fn save(&self, token: SuspensionToken) -> Result<(), EngineError>;

    /// Atomically consume a pending token
    ///
    /// # Errors
    ///
    /// - `UnknownSuspension` if no token was ever saved under the id
    /// - `AlreadyResumed` if the token was consumed before
    /// - `SuspensionExpired` if the token timed out or was abandoned
    async fn take(&self, correlation_id: &str) -> Result<SuspensionToken, EngineError>;

    /// Atomically consume a pending token that awaits `expected`
    ///
    /// Same errors as [`take`](Self::take), plus `TypeMismatch` when the
    /// token is waiting for another type. A mismatch leaves it pending.
    async fn take_as(
        &self,
        correlation_id: &str,
        expected: &TypeKey,
    ) -> Result<SuspensionToken, EngineError>;

    /// Re-park a consumed token, e.g. after a rejected resume value
    async fn restore(&self, token: SuspensionToken) -> Result<(), EngineError>;

    /// Tokens still waiting for input, oldest first
    async fn pending(&self) -> Result<Vec<SuspensionToken>, EngineError>;

    /// Abandon every pending token past its expiry; returns how many
    async fn purge_expired(&self) -> Result<usize, EngineError>;
}

#[derive(Debug)]
enum Slot {
    Pending(SuspensionToken),
    Resumed,
    Abandoned,
}

/// Process-local store; tokens do not survive a restart
#[derive(Debug, Default)]
pub struct InMemorySuspensionStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InMemorySuspensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn claim(
        &self,
        correlation_id: &str,
        expected: Option<&TypeKey>,
    ) -> Result<SuspensionToken, EngineError> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(correlation_id)
            .ok_or_else(|| EngineError::UnknownSuspension(correlation_id.to_string()))?;

        match std::mem::replace(slot, Slot::Resumed) {
            Slot::Pending(token) if token.is_expired() => {
                *slot = Slot::Abandoned;
                Err(EngineError::SuspensionExpired(correlation_id.to_string()))
            }
            Slot::Pending(token) => match expected {
                Some(expected) if expected != token.expected_type() => {
                    let err = EngineError::TypeMismatch {
                        expected: token.expected_type().to_string(),
                        actual: expected.to_string(),
                    };
                    *slot = Slot::Pending(token);
                    Err(err)
                }
                _ => Ok(token),
            },
            Slot::Resumed => Err(EngineError::AlreadyResumed(correlation_id.to_string())),
            Slot::Abandoned => {
                *slot = Slot::Abandoned;
                Err(EngineError::SuspensionExpired(correlation_id.to_string()))
            }
        }
    }
}

#[async_trait]
impl SuspensionStore for InMemorySuspensionStore {
    async fn save(&self, token: SuspensionToken) -> Result<(), EngineError> {
        debug!(
            "Parking session {} as {}",
            token.session_id, token.correlation_id
        );
        let mut slots = self.slots.lock().await;
        slots.insert(token.correlation_id.clone(), Slot::Pending(token));
        Ok(())
    }

    async fn take(&self, correlation_id: &str) -> Result<SuspensionToken, EngineError> {
        self.claim(correlation_id, None).await
    }

    async fn take_as(
        &self,
        correlation_id: &str,
        expected: &TypeKey,
    ) -> Result<SuspensionToken, EngineError> {
        self.claim(correlation_id, Some(expected)).await
    }

    async fn restore(&self, token: SuspensionToken) -> Result<(), EngineError> {
        self.save(token).await
    }

    async fn pending(&self) -> Result<Vec<SuspensionToken>, EngineError> {
        let slots = self.slots.lock().await;
        let mut tokens: Vec<SuspensionToken> = slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Pending(token) => Some(token.clone()),
                _ => None,
            })
            .collect();
        tokens.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.correlation_id.cmp(&b.correlation_id))
        });
        Ok(tokens)
    }

    async fn purge_expired(&self) -> Result<usize, EngineError> {
        let now = now_secs();
        let mut slots = self.slots.lock().await;
        let mut purged = 0;
        for slot in slots.values_mut() {
            if matches!(slot, Slot::Pending(token) if token.is_expired_at(now)) {
                *slot = Slot::Abandoned;
                purged += 1;
            }
        }
        if purged > 0 {
            debug!("Abandoned {} expired suspension(s)", purged);
        }
        Ok(purged)
    }
}

/// Token builder shared by tests across the crate
#[cfg(test)]
pub(crate) fn test_token(correlation_id: &str, expires_in: i64) -> SuspensionToken {
    let now = now_secs();
    SuspensionToken {
        correlation_id: correlation_id.to_string(),
        session_id: "session-1".to_string(),
        goal: TypeKey::new("Writeup"),
        remaining_plan: vec!["assemble_star_person".to_string()],
        world: WorldSnapshot::default(),
        awaiting_action: "make_starry".to_string(),
        request: InputRequest::new("Star sign please", "Starry").with_field("sign", "Star sign"),
        excluded: BTreeSet::new(),
        steps_executed: 2,
        created_at: now,
        expires_at: now + expires_in,
    }
}
