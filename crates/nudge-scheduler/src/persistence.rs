//! SQLite-backed persistence for users and events.
//! One connection behind a mutex; bulk updates run in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nudge_core::error::{NudgeError, Result};
use nudge_core::model::{Event, EventId, EventKind, User, UserId};
use nudge_core::traits::{EventStore, UserDirectory};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const EVENT_COLUMNS: &str = "id, owner_id, title, description, kind, scheduled_for, notified, created_at, updated_at";

/// SQLite store for the reminder service.
pub struct NudgeDb {
    conn: Mutex<Connection>,
}

impl NudgeDb {
    /// Open or create the database. `:memory:` gives a private in-memory DB.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && path != Path::new(":memory:")
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| NudgeError::Store(format!("DB open: {e}")))?;

        // WAL for concurrent readers; harmless no-op for :memory:
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| NudgeError::Store(format!("Pragma: {e}")))?;

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,              -- MEETING, REMINDER, ...
                scheduled_for TEXT,              -- RFC 3339, UTC, fixed width
                notified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_owner ON events(owner_id);
            CREATE INDEX IF NOT EXISTS idx_events_due ON events(notified, scheduled_for);
         ",
            )
            .map_err(|e| NudgeError::Store(format!("Migration: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NudgeError::Store(format!("Lock: {e}")))
    }

    fn query_events(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Event>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| NudgeError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params, row_to_event)
            .map_err(|e| NudgeError::Store(format!("Query events: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| NudgeError::Store(format!("Read event: {e}")))
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(4)?;
    let scheduled_for: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(Event {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        kind: kind.parse().unwrap_or(EventKind::Other),
        // Unparseable schedule reads as missing; the cycle skips such rows.
        scheduled_for: scheduled_for.as_deref().and_then(parse_ts),
        notified: row.get::<_, i32>(6)? != 0,
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_ts(&updated_at).unwrap_or_else(Utc::now),
    })
}

/// The UNIQUE index on `users.email` is the last word on duplicates.
fn user_write_error(e: rusqlite::Error) -> NudgeError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            NudgeError::Validation("email already registered".into())
        }
        e => NudgeError::Store(format!("Write user: {e}")),
    }
}

fn upsert_event(conn: &Connection, mut event: Event) -> Result<Event> {
    match event.id {
        None => {
            conn.execute(
                "INSERT INTO events (owner_id, title, description, kind, scheduled_for, notified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.owner_id,
                    event.title,
                    event.description,
                    event.kind.as_str(),
                    event.scheduled_for.map(ts),
                    event.notified as i32,
                    ts(event.created_at),
                    ts(event.updated_at),
                ],
            )
            .map_err(|e| NudgeError::Store(format!("Insert event: {e}")))?;
            event.id = Some(conn.last_insert_rowid());
        }
        Some(id) => {
            let changed = conn
                .execute(
                    "UPDATE events SET title = ?2, description = ?3, kind = ?4, scheduled_for = ?5,
                     notified = ?6, updated_at = ?7 WHERE id = ?1",
                    params![
                        id,
                        event.title,
                        event.description,
                        event.kind.as_str(),
                        event.scheduled_for.map(ts),
                        event.notified as i32,
                        ts(event.updated_at),
                    ],
                )
                .map_err(|e| NudgeError::Store(format!("Update event: {e}")))?;
            if changed == 0 {
                return Err(NudgeError::Store(format!("event {id} does not exist")));
            }
        }
    }
    Ok(event)
}

#[async_trait]
impl EventStore for NudgeDb {
    async fn find_by_owner(&self, owner: UserId) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        Self::query_events(
            &conn,
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = ?1 ORDER BY scheduled_for, id"),
            [owner],
        )
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            [id],
            row_to_event,
        )
        .optional()
        .map_err(|e| NudgeError::Store(format!("Find event: {e}")))
    }

    async fn find_due_unnotified(
        &self,
        now: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        Self::query_events(
            &conn,
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE notified = 0 AND scheduled_for < ?1 AND (?2 IS NULL OR scheduled_for >= ?2)
                 ORDER BY scheduled_for"
            ),
            params![ts(now), since.map(ts)],
        )
    }

    async fn save(&self, event: Event) -> Result<Event> {
        let conn = self.lock()?;
        upsert_event(&conn, event)
    }

    async fn save_all(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| NudgeError::Store(format!("Begin: {e}")))?;
        let saved = events
            .into_iter()
            .map(|e| upsert_event(&tx, e))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()
            .map_err(|e| NudgeError::Store(format!("Commit: {e}")))?;
        tracing::debug!("💾 Saved {} event(s) in one transaction", saved.len());
        Ok(saved)
    }

    async fn mark_notified(&self, ids: &[EventId], at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| NudgeError::Store(format!("Begin: {e}")))?;
        let mut changed = 0;
        {
            let mut stmt = tx
                .prepare("UPDATE events SET notified = 1, updated_at = ?2 WHERE id = ?1 AND notified = 0")
                .map_err(|e| NudgeError::Store(format!("Prepare: {e}")))?;
            let at = ts(at);
            for id in ids {
                changed += stmt
                    .execute(params![id, at])
                    .map_err(|e| NudgeError::Store(format!("Mark notified: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| NudgeError::Store(format!("Commit: {e}")))?;
        tracing::debug!("💾 Marked {changed} of {} event(s) notified in one transaction", ids.len());
        Ok(changed)
    }

    async fn delete(&self, event: &Event) -> Result<()> {
        let Some(id) = event.id else {
            return Ok(());
        };
        self.lock()?
            .execute("DELETE FROM events WHERE id = ?1", [id])
            .map_err(|e| NudgeError::Store(format!("Delete event: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for NudgeDb {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?1",
            [email],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    password_hash: row.get(3)?,
                    created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
                })
            },
        )
        .optional()
        .map_err(|e| NudgeError::Store(format!("Find user: {e}")))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            [email],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| NudgeError::Store(format!("User exists: {e}")))
    }

    async fn save(&self, mut user: User) -> Result<User> {
        let conn = self.lock()?;
        match user.id {
            None => {
                conn.execute(
                    "INSERT INTO users (name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![user.name, user.email, user.password_hash, ts(user.created_at)],
                )
                .map_err(user_write_error)?;
                user.id = Some(conn.last_insert_rowid());
            }
            Some(id) => {
                conn.execute(
                    "UPDATE users SET name = ?2, email = ?3, password_hash = ?4 WHERE id = ?1",
                    params![id, user.name, user.email, user.password_hash],
                )
                .map_err(user_write_error)?;
            }
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nudge_core::model::EventFields;

    async fn db_with_user() -> (NudgeDb, UserId) {
        let db = NudgeDb::open_in_memory().unwrap();
        let user = UserDirectory::save(&db, User::new("Ana", "ana@example.com", "hash".into()))
            .await
            .unwrap();
        (db, user.id.unwrap())
    }

    fn event(owner: UserId, at: DateTime<Utc>) -> Event {
        Event::new(
            owner,
            EventFields {
                title: "Call mom".into(),
                description: "weekly".into(),
                kind: EventKind::Reminder,
                scheduled_for: Some(at),
            },
        )
    }

    #[tokio::test]
    async fn test_open_and_migrate() {
        let db = NudgeDb::open_in_memory().unwrap();
        assert!(db.find_by_owner(1).await.unwrap().is_empty());
        assert!(db.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_event() {
        let (db, owner) = db_with_user().await;
        let at = Utc::now() + Duration::hours(1);
        let saved = EventStore::save(&db, event(owner, at)).await.unwrap();
        let id = saved.id.unwrap();

        let loaded = db.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Call mom");
        assert_eq!(loaded.kind, EventKind::Reminder);
        assert_eq!(loaded.owner_id, owner);
        assert!(!loaded.notified);
        assert_eq!(
            loaded.scheduled_for.map(|t| t.timestamp_micros()),
            Some(at.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_due_unnotified_query() {
        let (db, owner) = db_with_user().await;
        let now = Utc::now();
        EventStore::save(&db, event(owner, now - Duration::minutes(1))).await.unwrap();
        EventStore::save(&db, event(owner, now - Duration::hours(3))).await.unwrap();
        EventStore::save(&db, event(owner, now + Duration::minutes(1))).await.unwrap();
        let mut done = event(owner, now - Duration::minutes(2));
        done.mark_notified();
        EventStore::save(&db, done).await.unwrap();

        assert_eq!(db.find_due_unnotified(now, None).await.unwrap().len(), 2);
        let recent = db
            .find_due_unnotified(now, Some(now - Duration::minutes(5)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_save_all_rolls_back_on_missing_row() {
        let (db, owner) = db_with_user().await;
        let mut first = EventStore::save(&db, event(owner, Utc::now())).await.unwrap();
        first.mark_notified();
        let mut ghost = event(owner, Utc::now());
        ghost.id = Some(4242);
        ghost.mark_notified();

        assert!(db.save_all(vec![first.clone(), ghost]).await.is_err());
        let stored = db.find_by_id(first.id.unwrap()).await.unwrap().unwrap();
        assert!(!stored.notified);
    }

    #[tokio::test]
    async fn test_mark_notified_sets_only_the_flag() {
        let (db, owner) = db_with_user().await;
        let stale = EventStore::save(&db, event(owner, Utc::now() - Duration::minutes(1)))
            .await
            .unwrap();
        let id = stale.id.unwrap();

        let mut edited = stale.clone();
        edited.title = "Call mom (moved)".into();
        edited.scheduled_for = Some(Utc::now() + Duration::days(1));
        EventStore::save(&db, edited).await.unwrap();

        assert_eq!(db.mark_notified(&[id], Utc::now()).await.unwrap(), 1);
        let stored = db.find_by_id(id).await.unwrap().unwrap();
        assert!(stored.notified);
        assert_eq!(stored.title, "Call mom (moved)");
        assert!(stored.scheduled_for.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_mark_notified_skips_missing_and_already_notified_rows() {
        let (db, owner) = db_with_user().await;
        let a = EventStore::save(&db, event(owner, Utc::now())).await.unwrap();
        let b = EventStore::save(&db, event(owner, Utc::now())).await.unwrap();
        db.delete(&a).await.unwrap();

        let ids = [a.id.unwrap(), b.id.unwrap(), 4242];
        assert_eq!(db.mark_notified(&ids, Utc::now()).await.unwrap(), 1);
        assert!(db.find_by_id(b.id.unwrap()).await.unwrap().unwrap().notified);
        assert_eq!(db.mark_notified(&ids, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_schedule_reads_as_missing() {
        let (db, owner) = db_with_user().await;
        let saved = EventStore::save(&db, event(owner, Utc::now())).await.unwrap();
        db.lock()
            .unwrap()
            .execute(
                "UPDATE events SET scheduled_for = 'not-a-date' WHERE id = ?1",
                [saved.id.unwrap()],
            )
            .unwrap();
        let loaded = db.find_by_id(saved.id.unwrap()).await.unwrap().unwrap();
        assert!(loaded.scheduled_for.is_none());
    }

    #[tokio::test]
    async fn test_delete_event() {
        let (db, owner) = db_with_user().await;
        let saved = EventStore::save(&db, event(owner, Utc::now())).await.unwrap();
        db.delete(&saved).await.unwrap();
        assert!(db.find_by_id(saved.id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (db, _) = db_with_user().await;
        assert!(db.exists_by_email("ana@example.com").await.unwrap());
        let dup = UserDirectory::save(&db, User::new("Other", "ana@example.com", "h".into())).await;
        match dup {
            Err(NudgeError::Validation(msg)) => assert_eq!(msg, "email already registered"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
