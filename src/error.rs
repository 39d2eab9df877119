// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Crate-wide error type. Every variant is local to the operation that
/// raised it; nothing here is fatal to the process — a backend failure
/// degrades the client to stale/display-only state.
#[derive(Debug, Error)]
pub enum HubError {
    // Auth collaborator errors (bad credentials, unconfirmed account, ...)
    // surfaced verbatim to the user.
    #[error("{0}")]
    Auth(String),

    #[error("please sign in first")]
    NotSignedIn,

    // Authorization: refused before any side effect.
    #[error("admin privileges required")]
    NotAuthorized,

    // Persistence collaborator failures. Logged, surfaced, abandoned —
    // no automatic retry.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("no recipients matched the selected audience")]
    EmptyAudience,

    #[error("cannot change your own admin role")]
    SelfToggle,

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("invalid notification: {0}")]
    InvalidNotification(String),

    #[error("invalid signup: {0}")]
    InvalidSignup(String),

    #[error("row not found: {0}")]
    NotFound(String),

    // Transport-level wrappers for the REST adapter.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HubError {
    /// Empty-audience is a caller mistake, not a backend fault; the admin
    /// broadcast path downgrades it to a warning instead of failing.
    pub fn is_empty_audience(&self) -> bool {
        matches!(self, HubError::EmptyAudience)
    }
}
