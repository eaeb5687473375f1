//! Idempotent task-run ledger.
//!
//! A run for `(scope, task, run key)` executes at most once: it sanitizes
//! the task thread, produces an artifact, posts a comment, resolves the
//! task status and audits all of it inside one unit of work.

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod sanitizer;
pub mod state;
pub mod status;
pub mod store;
pub mod tasks;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{LedgerError, StoreError};
pub use ledger::{RunCommand, RunLedger, RunOutcome};
pub use state::{AppState, RunDefaults};

/// Build the application router with tracing attached.
pub fn app(state: Arc<AppState>) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
