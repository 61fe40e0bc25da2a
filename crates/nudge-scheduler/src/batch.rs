//! Batch Notification Engine: fan out one notifier call per due event,
//! then persist the notified flag for exactly the successes.
//!
//! Each event runs in its own task and produces `Result<Event, SkipReason>`.
//! A failure of any kind (recoverable error, unexpected error, timeout,
//! panic) only removes that event from the success set. Outcomes are
//! gathered after every task has finished, and only then is the notified
//! flag of the successes set in one `mark_notified` call. Nothing else on
//! the stored record is written, so an owner's edit made while the
//! notification was in flight survives.

use chrono::Utc;
use futures::future::join_all;
use nudge_core::error::{NudgeError, Result};
use nudge_core::model::{Event, EventId};
use nudge_core::traits::{EventStore, Notifier};
use std::sync::Arc;
use std::time::Duration;

/// Why an event left this batch without being marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Record has no identity; it cannot be persisted.
    MissingId,
    /// Record has no scheduled instant.
    MissingSchedule,
    /// Notifier reported a transient failure.
    Recoverable(String),
    /// Notifier exceeded the per-event deadline.
    TimedOut,
    /// Notifier failed unexpectedly.
    Failed(String),
    /// The notification task panicked.
    Panicked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub event_id: Option<EventId>,
    pub reason: SkipReason,
}

/// Outcome of one batch: notified events and skip reasons.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub notified: Vec<Event>,
    pub skipped: Vec<Skipped>,
    /// Rows whose flag actually changed. Lower than `notified.len()` when an
    /// event was deleted or marked elsewhere while in flight.
    pub marked: usize,
}

impl BatchReport {
    /// Number of events notified and marked.
    pub fn count(&self) -> usize {
        self.notified.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn skip(&mut self, event_id: Option<EventId>, reason: SkipReason) {
        self.skipped.push(Skipped { event_id, reason });
    }
}

/// Notifies a batch of due events concurrently and marks the successes.
#[derive(Clone)]
pub struct BatchNotifier {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn EventStore>,
    timeout: Duration,
}

impl BatchNotifier {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn EventStore>) -> Self {
        Self {
            notifier,
            store,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound every single notifier call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Notify every event, persist the successes, report what happened.
    ///
    /// An empty batch returns an empty report without touching the store.
    /// A failed bulk persist returns [`NudgeError::Persist`] carrying the
    /// number of notifications that already went out.
    pub async fn notify_and_mark(&self, events: Vec<Event>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if events.is_empty() {
            tracing::debug!("No pending events to notify");
            return Ok(report);
        }

        let mut attempts = Vec::with_capacity(events.len());
        for event in events {
            if let Some(reason) = structural_defect(&event) {
                tracing::warn!(
                    "⚠️ Inconsistent event skipped ({:?}): id={:?} title='{}'",
                    reason,
                    event.id,
                    event.title
                );
                report.skip(event.id, reason);
                continue;
            }
            let id = event.id;
            let handle = tokio::spawn(attempt(self.notifier.clone(), event, self.timeout));
            attempts.push(async move { (id, handle.await) });
        }

        // Barrier: every attempt has finished before anything is persisted.
        for (id, joined) in join_all(attempts).await {
            match joined {
                Ok(Ok(event)) => report.notified.push(event),
                Ok(Err(reason)) => report.skip(id, reason),
                Err(e) => {
                    tracing::error!("❌ Notification task for event {:?} aborted: {e}", id);
                    report.skip(id, SkipReason::Panicked);
                }
            }
        }

        if report.notified.is_empty() {
            tracing::debug!("No event was notified, nothing to save");
            return Ok(report);
        }

        let notified = report.count();
        let ids: Vec<EventId> = report.notified.iter().filter_map(|e| e.id).collect();
        match self.store.mark_notified(&ids, Utc::now()).await {
            Ok(marked) => {
                if marked < notified {
                    tracing::debug!(
                        "{} notified event(s) were deleted or already marked",
                        notified - marked
                    );
                }
                tracing::info!("💾 Notified events marked: {marked}");
                report.marked = marked;
                Ok(report)
            }
            Err(e) => {
                tracing::error!("❌ Failed to mark {notified} notified event(s): {e}");
                Err(NudgeError::Persist {
                    notified,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn structural_defect(event: &Event) -> Option<SkipReason> {
    if event.id.is_none() {
        Some(SkipReason::MissingId)
    } else if event.scheduled_for.is_none() {
        Some(SkipReason::MissingSchedule)
    } else {
        None
    }
}

/// One notifier call, bounded by `timeout`. Marks the event on success.
async fn attempt(
    notifier: Arc<dyn Notifier>,
    mut event: Event,
    timeout: Duration,
) -> std::result::Result<Event, SkipReason> {
    let outcome = tokio::time::timeout(timeout, notifier.notify(&event)).await;
    match outcome {
        Ok(Ok(())) => {
            event.mark_notified();
            tracing::debug!("Event [{:?}] notified via {}", event.id, notifier.name());
            Ok(event)
        }
        Ok(Err(e)) if e.is_recoverable() => {
            tracing::warn!("⚠️ Recoverable error notifying event [{:?}]: {e}", event.id);
            Err(SkipReason::Recoverable(e.to_string()))
        }
        Ok(Err(e)) => {
            tracing::error!("❌ Error notifying event [{:?}]: {e}", event.id);
            Err(SkipReason::Failed(e.to_string()))
        }
        Err(_) => {
            tracing::warn!(
                "⚠️ Notifier timed out after {:?} for event [{:?}]",
                timeout,
                event.id
            );
            Err(SkipReason::TimedOut)
        }
    }
}
