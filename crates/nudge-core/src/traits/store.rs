//! Event Store: durable collection of event records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Event, EventId, UserId};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events owned by `owner`.
    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Event>>;

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>>;

    /// Events with `notified == false` and `scheduled_for < now`.
    /// When `since` is set, only those scheduled at or after it.
    async fn find_due_unnotified(
        &self,
        now: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>>;

    /// Insert (assigning an id) or update one event.
    async fn save(&self, event: Event) -> Result<Event>;

    /// Update many events atomically: either all are written or none.
    async fn save_all(&self, events: Vec<Event>) -> Result<Vec<Event>>;

    /// Set `notified` on the given events and nothing else, atomically.
    ///
    /// Ids with no row, or already notified, are left alone. Returns the
    /// number of rows that changed.
    async fn mark_notified(&self, ids: &[EventId], at: DateTime<Utc>) -> Result<usize>;

    async fn delete(&self, event: &Event) -> Result<()>;
}
