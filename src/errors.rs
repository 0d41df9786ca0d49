use thiserror::Error;

/// Top-level error for the chat client core.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Remote service errors ────────────────────────────────────────────────
    #[error("Chat service unavailable during {operation}: {reason}")]
    RemoteUnavailable { operation: String, reason: String },

    // ── Local state errors ───────────────────────────────────────────────────
    #[error("Stored chat state is malformed: {0}")]
    MalformedLocalState(#[source] serde_json::Error),

    #[error("Storage failure for key '{key}'")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    // ── Caller errors ────────────────────────────────────────────────────────
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    pub fn remote(operation: impl Into<String>, reason: impl ToString) -> Self {
        AppError::RemoteUnavailable { operation: operation.into(), reason: reason.to_string() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidOperation { message: message.into() }
    }

    pub fn storage(key: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Storage { key: key.into(), source }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AppError::RemoteUnavailable { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, AppError::InvalidOperation { .. })
    }
}
