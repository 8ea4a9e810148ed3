//! Message Bus for session lifecycle events
//!
//! Executors publish what their sessions are doing; observers (UIs, audit
//! logs, tests) subscribe to the event types they care about or to `All`.
//! Every subscriber gets a bounded channel. Publishing never waits: when a
//! subscriber's buffer is full the event is dropped for that subscriber
//! only, so a slow observer cannot stall a session.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    SessionStarted,
    PlanComputed,
    StepCompleted,
    ActionRetried,
    ActionExcluded,
    SessionSuspended,
    SessionResumed,
    SessionCompleted,
    SessionFailed,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionStarted {
        session_id: String,
        goal: String,
    },
    PlanComputed {
        session_id: String,
        actions: Vec<String>,
        cost: f64,
    },
    StepCompleted {
        session_id: String,
        step: usize,
        action: String,
        output_type: String,
    },
    /// A recoverable action failure that will be retried
    ActionRetried {
        session_id: String,
        action: String,
        attempt: u32,
        error: String,
    },
    /// An action produced nothing and is dropped for the session
    ActionExcluded {
        session_id: String,
        action: String,
    },
    SessionSuspended {
        session_id: String,
        correlation_id: String,
        action: String,
        expected_type: String,
    },
    SessionResumed {
        session_id: String,
        correlation_id: String,
    },
    SessionCompleted {
        session_id: String,
        goal: String,
        steps: usize,
    },
    SessionFailed {
        session_id: String,
        error: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::SessionStarted { .. } => EventType::SessionStarted,
            Event::PlanComputed { .. } => EventType::PlanComputed,
            Event::StepCompleted { .. } => EventType::StepCompleted,
            Event::ActionRetried { .. } => EventType::ActionRetried,
            Event::ActionExcluded { .. } => EventType::ActionExcluded,
            Event::SessionSuspended { .. } => EventType::SessionSuspended,
            Event::SessionResumed { .. } => EventType::SessionResumed,
            Event::SessionCompleted { .. } => EventType::SessionCompleted,
            Event::SessionFailed { .. } => EventType::SessionFailed,
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            Event::SessionStarted { session_id, .. }
            | Event::PlanComputed { session_id, .. }
            | Event::StepCompleted { session_id, .. }
            | Event::ActionRetried { session_id, .. }
            | Event::ActionExcluded { session_id, .. }
            | Event::SessionSuspended { session_id, .. }
            | Event::SessionResumed { session_id, .. }
            | Event::SessionCompleted { session_id, .. }
            | Event::SessionFailed { session_id, .. } => session_id,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Subscribers per event type, each with a bounded channel
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to its type's subscribers and to `All` subscribers
    ///
    /// Closed subscribers are pruned.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Subscriber buffer full, dropping {:?}", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels
            .values()
            .flat_map(|subscribers| subscribers.iter())
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
