//! Notifier: delivers one event's reminder.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Event;

/// Pluggable side effect that delivers a single notification.
///
/// Implementations report transient failures as
/// [`NudgeError::RecoverableNotification`](crate::error::NudgeError::RecoverableNotification);
/// any other error is treated as unexpected. Neither aborts a batch.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &Event) -> Result<()>;
}
