//! Error taxonomy shared by every Nudge crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NudgeError>;

#[derive(Debug, Error)]
pub enum NudgeError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("event not found: {0}")]
    EventNotFound(i64),

    #[error("not authorized to access this event")]
    UnauthorizedAccess,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("credential error: {0}")]
    Token(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transient notifier failure. Skipped at event granularity, never propagated.
    #[error("recoverable notification error: {0}")]
    RecoverableNotification(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("store error: {0}")]
    Store(String),

    /// Bulk persist of a notified batch failed after the notifications fired.
    #[error("failed to persist {notified} notified event(s): {reason}")]
    Persist { notified: usize, reason: String },

    #[error("scheduler cycle failed: {0}")]
    CycleFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NudgeError {
    /// Whether a notifier error is expected-transient.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NudgeError::RecoverableNotification(_))
    }
}
