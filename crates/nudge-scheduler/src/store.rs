//! In-memory store: events and users held in process memory.
//! Used by tests and by `nudge --memory`. Nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nudge_core::error::{NudgeError, Result};
use nudge_core::model::{Event, EventId, User, UserId};
use nudge_core::traits::{EventStore, UserDirectory};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    users: BTreeMap<UserId, User>,
    next_event_id: EventId,
    next_user_id: UserId,
}

/// In-memory implementation of [`EventStore`] and [`UserDirectory`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| NudgeError::Store(format!("Lock: {e}")))
    }

    pub fn event_count(&self) -> usize {
        self.lock().map(|t| t.events.len()).unwrap_or(0)
    }
}

impl Tables {
    fn upsert_event(&mut self, mut event: Event) -> Result<Event> {
        match event.id {
            Some(id) if !self.events.contains_key(&id) => {
                return Err(NudgeError::Store(format!("event {id} does not exist")));
            }
            Some(_) => {}
            None => {
                self.next_event_id += 1;
                event.id = Some(self.next_event_id);
            }
        }
        if let Some(id) = event.id {
            self.events.insert(id, event.clone());
        }
        Ok(event)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Event>> {
        let tables = self.lock()?;
        Ok(tables
            .events
            .values()
            .filter(|e| e.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn find_due_unnotified(
        &self,
        now: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let lookback = since.map(|s| now - s);
        let tables = self.lock()?;
        Ok(tables
            .events
            .values()
            .filter(|e| e.is_due_within(now, lookback))
            .cloned()
            .collect())
    }

    async fn save(&self, event: Event) -> Result<Event> {
        self.lock()?.upsert_event(event)
    }

    async fn save_all(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        let mut tables = self.lock()?;
        // Validate first so a bad record leaves the table untouched.
        if let Some(id) = events
            .iter()
            .filter_map(|e| e.id)
            .find(|id| !tables.events.contains_key(id))
        {
            return Err(NudgeError::Store(format!("event {id} does not exist")));
        }
        events
            .into_iter()
            .map(|e| tables.upsert_event(e))
            .collect()
    }

    async fn mark_notified(&self, ids: &[EventId], at: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.lock()?;
        let mut changed = 0;
        for id in ids {
            if let Some(event) = tables.events.get_mut(id)
                && !event.notified
            {
                event.notified = true;
                event.updated_at = at;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, event: &Event) -> Result<()> {
        if let Some(id) = event.id {
            self.lock()?.events.remove(&id);
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.lock()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.lock()?.users.values().any(|u| u.email == email))
    }

    async fn save(&self, mut user: User) -> Result<User> {
        let mut tables = self.lock()?;
        let taken = tables
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id);
        if taken {
            return Err(NudgeError::Validation("email already registered".into()));
        }
        let id = match user.id {
            Some(id) => id,
            None => {
                tables.next_user_id += 1;
                tables.next_user_id
            }
        };
        user.id = Some(id);
        tables.users.insert(id, user.clone());
        Ok(user)
    }
}
