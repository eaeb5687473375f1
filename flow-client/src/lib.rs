//! Client side of the run ledger.
//!
//! [`FlowController`] drives one user-triggered action through the ledger
//! with single-flight protection and optimistic state, reporting lifecycle
//! events to a fire-and-forget [`FlowEmitter`].

pub mod action;
pub mod api;
pub mod controller;
pub mod emitter;
pub mod error;

pub use action::{ActionOutcome, FlowAction, RunLedgerAction};
pub use api::LedgerClient;
pub use controller::{FlowConfig, FlowController, Trigger, DEFAULT_RUN_TIMEOUT};
pub use emitter::{FlowEmitter, NoopEmitter, TracingEmitter};
pub use error::{ClientError, FlowError};
pub use shared_types::{FlowEvent, FlowEventKind, FlowState};
