//! Flow controller
//!
//! Drives one user-triggered action with single-flight protection:
//!
//! ```text
//! CONFIRMED ──trigger──▶ IN_PROGRESS ──ok──────────────▶ COMPLETED
//!                                    └─not ok / error──▶ NEEDS_ATTENTION
//! ```
//!
//! While an invocation is in flight every further trigger is reported as a
//! repeat and otherwise ignored. Errors never reach the state; they are
//! logged and folded into `NEEDS_ATTENTION`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use shared_types::{FlowEvent, FlowEventKind, FlowState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::action::FlowAction;
use crate::emitter::{EventQueue, FlowEmitter};

/// Time allowed for one action invocation before the flow gives up on it.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Correlation id attached to every emitted event
    pub flow_id: Option<String>,
    pub user_id: Option<String>,
    /// `None` waits for the action indefinitely
    pub run_timeout: Option<Duration>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_id: None,
            user_id: None,
            run_timeout: Some(DEFAULT_RUN_TIMEOUT),
        }
    }
}

impl FlowConfig {
    pub fn new(flow_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            flow_id: Some(flow_id.into()),
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }
}

/// What a call to [`FlowController::trigger_action`] did.
#[derive(Debug)]
pub enum Trigger {
    /// A new invocation is running; the handle yields its terminal state.
    Started(JoinHandle<FlowState>),
    /// Another invocation was already in flight.
    Repeated,
}

impl Trigger {
    pub fn is_repeated(&self) -> bool {
        matches!(self, Trigger::Repeated)
    }

    /// Wait for the started invocation. `None` for a repeat.
    pub async fn finished(self) -> Option<FlowState> {
        match self {
            Trigger::Started(handle) => handle.await.ok(),
            Trigger::Repeated => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttentionReason {
    NotOk,
    Failed,
    Panicked,
    TimedOut,
}

impl AttentionReason {
    fn as_str(&self) -> &'static str {
        match self {
            AttentionReason::NotOk => "not_ok",
            AttentionReason::Failed => "action_failed",
            AttentionReason::Panicked => "action_panicked",
            AttentionReason::TimedOut => "timed_out",
        }
    }
}

struct Inner {
    config: FlowConfig,
    action: Arc<dyn FlowAction>,
    events: EventQueue,
    locked: AtomicBool,
    state: watch::Sender<FlowState>,
    last_trigger: Mutex<Option<Instant>>,
}

impl Inner {
    fn set_state(&self, state: FlowState) {
        self.state.send_replace(state);
    }

    fn emit(&self, kind: FlowEventKind, metadata: Map<String, Value>) {
        self.events.push(FlowEvent {
            kind,
            flow_id: self.config.flow_id.clone(),
            user_id: self.config.user_id.clone(),
            metadata,
            timestamp: Utc::now(),
        });
    }

    fn last_trigger(&self) -> Option<Instant> {
        *self
            .last_trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_last_trigger(&self, at: Option<Instant>) {
        *self
            .last_trigger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
    }
}

/// Releases the single-flight lock however the invocation ends.
struct FlightGuard(Arc<Inner>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.locked.store(false, Ordering::Release);
    }
}

/// One per user-observed flow. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FlowController {
    inner: Arc<Inner>,
}

impl FlowController {
    /// Must be called inside a tokio runtime; event delivery runs on it.
    pub fn new(
        config: FlowConfig,
        action: Arc<dyn FlowAction>,
        emitter: Arc<dyn FlowEmitter>,
    ) -> Self {
        let (state, _) = watch::channel(FlowState::Confirmed);
        Self {
            inner: Arc::new(Inner {
                config,
                action,
                events: EventQueue::spawn(emitter),
                locked: AtomicBool::new(false),
                state,
                last_trigger: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> FlowState {
        *self.inner.state.borrow()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Receiver of state changes. Only the latest state is retained.
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.inner.state.subscribe()
    }

    /// Start the action unless one is already in flight. The lock is taken
    /// before this returns; the invocation itself runs on the tokio runtime.
    pub fn trigger_action(&self) -> Trigger {
        match self.acquire() {
            Some(guard) => self.start_flight(guard),
            None => Trigger::Repeated,
        }
    }

    /// Run the action's recovery step, then retry the whole flow. The lock is
    /// held from the recovery step through the retry, so anything issued in
    /// between is a repeat.
    pub async fn resolve_attention(&self) -> Trigger {
        let Some(guard) = self.acquire() else {
            return Trigger::Repeated;
        };

        if let Err(e) = self.inner.action.resolve_attention().await {
            warn!(flow_id = ?self.inner.config.flow_id, error = %e, "resolve step failed");
        }
        self.inner.emit(FlowEventKind::Resolved, Map::new());
        self.start_flight(guard)
    }

    /// Back to `CONFIRMED` for a new focus. Refused while in flight.
    pub fn reset(&self) -> bool {
        if self.is_locked() {
            return false;
        }
        self.inner.set_last_trigger(None);
        self.inner.set_state(FlowState::Confirmed);
        true
    }

    /// Take the single-flight lock, or report a repeat.
    fn acquire(&self) -> Option<FlightGuard> {
        if self
            .inner
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Some(FlightGuard(Arc::clone(&self.inner)));
        }

        let mut metadata = Map::new();
        if let Some(at) = self.inner.last_trigger() {
            metadata.insert("since_trigger_ms".into(), duration_ms(at.elapsed()));
        }
        self.inner.emit(FlowEventKind::Repeat, metadata);
        debug!(flow_id = ?self.inner.config.flow_id, "repeated trigger ignored");
        None
    }

    fn start_flight(&self, guard: FlightGuard) -> Trigger {
        let started = Instant::now();
        self.inner.set_last_trigger(Some(started));
        self.inner.set_state(FlowState::Confirmed);
        self.inner.emit(FlowEventKind::Trigger, Map::new());

        let inner = Arc::clone(&self.inner);
        Trigger::Started(tokio::spawn(async move {
            let _guard = guard;
            run_flight(&inner, started).await
        }))
    }
}

async fn run_flight(inner: &Arc<Inner>, started: Instant) -> FlowState {
    inner.set_state(FlowState::InProgress);

    let action = Arc::clone(&inner.action);
    let mut handle = tokio::spawn(async move { action.run().await });

    let joined = match inner.config.run_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                handle.abort();
                None
            }
        },
        None => Some((&mut handle).await),
    };

    let outcome = match joined {
        Some(Ok(Ok(outcome))) if outcome.ok => Ok(()),
        Some(Ok(Ok(_))) => Err(AttentionReason::NotOk),
        Some(Ok(Err(e))) => {
            warn!(flow_id = ?inner.config.flow_id, error = %e, "flow action failed");
            Err(AttentionReason::Failed)
        }
        Some(Err(e)) => {
            warn!(flow_id = ?inner.config.flow_id, error = %e, "flow action panicked");
            Err(AttentionReason::Panicked)
        }
        None => {
            warn!(flow_id = ?inner.config.flow_id, "flow action timed out");
            Err(AttentionReason::TimedOut)
        }
    };

    let mut metadata = Map::new();
    metadata.insert("duration_ms".into(), duration_ms(started.elapsed()));

    match outcome {
        Ok(()) => {
            inner.set_state(FlowState::Completed);
            inner.emit(FlowEventKind::Completed, metadata);
            FlowState::Completed
        }
        Err(reason) => {
            metadata.insert("reason".into(), Value::from(reason.as_str()));
            inner.set_state(FlowState::NeedsAttention);
            inner.emit(FlowEventKind::EnteredAttention, metadata);
            FlowState::NeedsAttention
        }
    }
}

fn duration_ms(elapsed: Duration) -> Value {
    Value::from(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
