/// Failure talking to the run ledger over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error: {status} ({message})")]
    Http { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Decode(String),
}

/// Failure of a flow action or emitter. Never stored in flow state.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("action failed: {0}")]
    Action(String),

    #[error("emit failed: {0}")]
    Emit(String),
}
