use thiserror::Error;

/// Unified error type for the entire market-board-core library.
/// Every fallible public function returns `Result<T, CoreError>`.
///
/// At the component boundary every variant collapses into
/// `FetchStatus::Failed(reason)` where `reason` is the `Display` text.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── API / Network ───────────────────────────────────────────────
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // ── Input / Configuration ───────────────────────────────────────
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// True for failures that a later retry may resolve (transport and
    /// upstream status errors), false for payload or input problems.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Network(_) | CoreError::Api { .. })
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::MalformedResponse(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Strip query parameters from URLs embedded in reqwest messages.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
