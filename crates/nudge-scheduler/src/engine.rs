//! Scheduler Engine: the periodic scan-notify-mark cycle.
//! Sleeps until the next cron instant, then fires the cycle in its own task
//! so a slow cycle never shifts the cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nudge_core::config::SchedulerConfig;
use nudge_core::error::{NudgeError, Result};
use nudge_core::traits::{EventStore, Notifier};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::batch::BatchNotifier;
use crate::cron::CronSchedule;

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Toggle is off; nothing was queried.
    Disabled,
    /// Another cycle was still running; this one was skipped.
    Overlapping,
    Completed {
        found: usize,
        notified: usize,
        skipped: usize,
    },
}

/// Runs scan-notify-mark cycles against one store.
pub struct ReminderScheduler {
    store: Arc<dyn EventStore>,
    batch: BatchNotifier,
    enabled: AtomicBool,
    lookback: Option<chrono::Duration>,
    in_flight: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        config: &SchedulerConfig,
    ) -> Self {
        let batch = BatchNotifier::new(notifier, store.clone())
            .with_timeout(Duration::from_secs(config.notify_timeout_secs));
        Self {
            store,
            batch,
            enabled: AtomicBool::new(config.enabled),
            lookback: config
                .lookback_minutes
                .map(|m| chrono::Duration::minutes(i64::from(m))),
            in_flight: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the live toggle. Takes effect at the start of the next cycle.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(
            "⏰ Reminder scheduler {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    /// One cycle as of `now`.
    ///
    /// Any failure of the due query or the batch (including a failed bulk
    /// persist) is logged and returned as [`NudgeError::CycleFailed`]; the
    /// next cycle is unaffected.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        if !self.is_enabled() {
            tracing::debug!("Scheduler disabled by configuration");
            return Ok(CycleOutcome::Disabled);
        }

        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!("⏭️ Previous cycle still running, skipping this one");
            return Ok(CycleOutcome::Overlapping);
        };

        match self.scan_notify_mark(now).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("❌ Scheduler cycle at {} failed: {e:?}", now.to_rfc3339());
                Err(NudgeError::CycleFailed(e.to_string()))
            }
        }
    }

    async fn scan_notify_mark(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let since = self.lookback.map(|window| now - window);
        let due = self.store.find_due_unnotified(now, since).await?;
        let found = due.len();
        tracing::info!("🔍 Checking events scheduled before {}: found {found}", now.to_rfc3339());

        let report = self.batch.notify_and_mark(due).await?;
        tracing::info!(
            "📣 Events notified this cycle: {} (skipped {})",
            report.count(),
            report.skipped_count()
        );

        Ok(CycleOutcome::Completed {
            found,
            notified: report.count(),
            skipped: report.skipped_count(),
        })
    }
}

/// Spawn the scheduler harness as a background tokio task.
///
/// Each cycle runs in its own task; a failed cycle is logged and the next
/// one fires on schedule.
pub fn spawn_scheduler(scheduler: Arc<ReminderScheduler>, schedule: CronSchedule) -> JoinHandle<()> {
    tracing::info!("⏰ Reminder scheduler started (cron '{}')", schedule.expression());

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_after(now) else {
                tracing::error!(
                    "❌ Cron '{}' has no upcoming run, scheduler stopping",
                    schedule.expression()
                );
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.run_cycle().await {
                    tracing::warn!("⚠️ {e}; next cycle will run on schedule");
                }
            });
        }
    })
}
