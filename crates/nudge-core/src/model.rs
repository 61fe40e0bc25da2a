//! Event and user records: the data the reminder service moves around.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NudgeError, Result};

/// Store-assigned event identity.
pub type EventId = i64;
/// Store-assigned user identity.
pub type UserId = i64;

/// Closed set of event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Meeting,
    Reminder,
    Birthday,
    Appointment,
    Task,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Meeting => "MEETING",
            EventKind::Reminder => "REMINDER",
            EventKind::Birthday => "BIRTHDAY",
            EventKind::Appointment => "APPOINTMENT",
            EventKind::Task => "TASK",
            EventKind::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = NudgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MEETING" => Ok(EventKind::Meeting),
            "REMINDER" => Ok(EventKind::Reminder),
            "BIRTHDAY" => Ok(EventKind::Birthday),
            "APPOINTMENT" => Ok(EventKind::Appointment),
            "TASK" => Ok(EventKind::Task),
            "OTHER" => Ok(EventKind::Other),
            other => Err(NudgeError::Validation(format!("unknown event type '{other}'"))),
        }
    }
}

/// A scheduled event owned by exactly one user.
///
/// `id` is `None` until the store assigns one. `scheduled_for` is optional
/// only because stored rows can predate validation; the notification cycle
/// skips records missing either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<EventId>,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub kind: EventKind,
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Flips to true once, after a successful notification. Never reset.
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Build an unsaved, unnotified event for `owner_id`.
    pub fn new(owner_id: UserId, fields: EventFields) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            owner_id,
            title: fields.title,
            description: fields.description,
            kind: fields.kind,
            scheduled_for: fields.scheduled_for,
            notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the user-editable fields. The notified flag is untouched.
    pub fn apply(&mut self, fields: EventFields) {
        self.title = fields.title;
        self.description = fields.description;
        self.kind = fields.kind;
        self.scheduled_for = fields.scheduled_for;
        self.updated_at = Utc::now();
    }

    pub fn mark_notified(&mut self) {
        if !self.notified {
            self.notified = true;
            self.updated_at = Utc::now();
        }
    }

    /// Scheduled strictly before `now` and not yet notified.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.notified && self.scheduled_for.is_some_and(|at| at < now)
    }

    /// Like [`Event::is_due`], restricted to a lookback window when one is set.
    pub fn is_due_within(&self, now: DateTime<Utc>, lookback: Option<Duration>) -> bool {
        if !self.is_due(now) {
            return false;
        }
        match (lookback, self.scheduled_for) {
            (Some(window), Some(at)) => at >= now - window,
            _ => true,
        }
    }
}

/// User-editable event fields, as carried by create and update requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl EventFields {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(NudgeError::Validation("title must not be blank".into()));
        }
        if self.scheduled_for.is_none() {
            return Err(NudgeError::Validation("scheduledFor is required".into()));
        }
        Ok(())
    }
}

/// A registered account. The email is the login and authorization key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<UserId>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: Utc::now(),
        }
    }
}
