//! # Nudge Scheduler
//!
//! Periodic scan-notify-mark cycle for due events.
//!
//! ## Architecture
//! ```text
//! spawn_scheduler (cron cadence, one task per cycle)
//!   └── ReminderScheduler::run_cycle
//!         ├── toggle off → no-op
//!         ├── EventStore::find_due_unnotified
//!         └── BatchNotifier::notify_and_mark
//!               ├── Notifier::notify  (one task per event, bounded by timeout)
//!               └── EventStore::mark_notified (flag only, successes only, one transaction)
//! ```
//!
//! Only one scheduler instance per database is supported; a second instance
//! without external locking will send duplicate notifications.

pub mod batch;
pub mod cron;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod store;

pub use batch::{BatchNotifier, BatchReport, SkipReason, Skipped};
pub use cron::CronSchedule;
pub use engine::{CycleOutcome, ReminderScheduler, spawn_scheduler};
pub use notify::{LogNotifier, WebhookNotifier, notifier_from_config};
pub use persistence::NudgeDb;
pub use store::MemoryStore;
