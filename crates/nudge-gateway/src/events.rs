//! Event CRUD scoped to the calling user.
//!
//! Every mutation resolves the caller and the target event, then checks
//! ownership before touching any field. A non-owner gets
//! [`NudgeError::UnauthorizedAccess`] and the stored event is unchanged.

use std::sync::Arc;

use nudge_core::error::{NudgeError, Result};
use nudge_core::model::{Event, EventFields, EventId, User, UserId};
use nudge_core::traits::{EventStore, UserDirectory};

#[derive(Clone)]
pub struct EventService {
    users: Arc<dyn UserDirectory>,
    events: Arc<dyn EventStore>,
}

impl EventService {
    pub fn new(users: Arc<dyn UserDirectory>, events: Arc<dyn EventStore>) -> Self {
        Self { users, events }
    }

    async fn resolve_caller(&self, email: &str) -> Result<UserId> {
        let user: User = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| NudgeError::UserNotFound(email.to_string()))?;
        user.id
            .ok_or_else(|| NudgeError::Store(format!("user {email} has no id")))
    }

    async fn owned_event(&self, id: EventId, caller: UserId) -> Result<Event> {
        let event = self
            .events
            .find_by_id(id)
            .await?
            .ok_or(NudgeError::EventNotFound(id))?;
        if event.owner_id != caller {
            tracing::warn!("User {caller} denied access to event {id}");
            return Err(NudgeError::UnauthorizedAccess);
        }
        Ok(event)
    }

    pub async fn list(&self, caller_email: &str) -> Result<Vec<Event>> {
        let owner = self.resolve_caller(caller_email).await?;
        self.events.find_by_owner(owner).await
    }

    pub async fn create(&self, caller_email: &str, fields: EventFields) -> Result<Event> {
        fields.validate()?;
        let owner = self.resolve_caller(caller_email).await?;
        let event = self.events.save(Event::new(owner, fields)).await?;
        tracing::debug!("Created event {:?} for user {owner}", event.id);
        Ok(event)
    }

    pub async fn update(&self, id: EventId, caller_email: &str, fields: EventFields) -> Result<Event> {
        let caller = self.resolve_caller(caller_email).await?;
        let mut event = self.owned_event(id, caller).await?;
        fields.validate()?;
        event.apply(fields);
        self.events.save(event).await
    }

    pub async fn delete(&self, id: EventId, caller_email: &str) -> Result<()> {
        let caller = self.resolve_caller(caller_email).await?;
        let event = self.owned_event(id, caller).await?;
        self.events.delete(&event).await?;
        tracing::debug!("Deleted event {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use nudge_core::model::EventKind;
    use nudge_scheduler::MemoryStore;

    struct Fixture {
        service: EventService,
        events: Arc<dyn EventStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let users: Arc<dyn UserDirectory> = store.clone();
        let events: Arc<dyn EventStore> = store;
        for (name, email) in [("Ana", "ana@example.com"), ("Bo", "bo@example.com")] {
            users
                .save(User::new(name, email, "hash".into()))
                .await
                .unwrap();
        }
        Fixture {
            service: EventService::new(users, events.clone()),
            events,
        }
    }

    fn fields(title: &str) -> EventFields {
        EventFields {
            title: title.into(),
            description: String::new(),
            kind: EventKind::Appointment,
            scheduled_for: Some(Utc::now() + Duration::hours(2)),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_are_scoped() {
        let f = fixture().await;
        f.service.create("ana@example.com", fields("Dentist")).await.unwrap();
        f.service.create("bo@example.com", fields("Gym")).await.unwrap();

        let mine = f.service.list("ana@example.com").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Dentist");
        assert!(!mine[0].notified);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_fields() {
        let f = fixture().await;
        let mut missing_time = fields("Dentist");
        missing_time.scheduled_for = None;
        assert!(matches!(
            f.service.create("ana@example.com", missing_time).await,
            Err(NudgeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_caller() {
        let f = fixture().await;
        assert!(matches!(
            f.service.list("ghost@example.com").await,
            Err(NudgeError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_by_owner() {
        let f = fixture().await;
        let created = f.service.create("ana@example.com", fields("Dentist")).await.unwrap();
        let id = created.id.unwrap();

        let updated = f
            .service
            .update(id, "ana@example.com", fields("Dentist (moved)"))
            .await
            .unwrap();
        assert_eq!(updated.id, Some(id));
        assert_eq!(updated.title, "Dentist (moved)");
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_non_owner_update_leaves_event_unchanged() {
        let f = fixture().await;
        let created = f.service.create("ana@example.com", fields("Dentist")).await.unwrap();
        let id = created.id.unwrap();

        let err = f
            .service
            .update(id, "bo@example.com", fields("Hijacked"))
            .await
            .unwrap_err();
        assert!(matches!(err, NudgeError::UnauthorizedAccess));

        let stored = f.events.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_non_owner_delete_keeps_event() {
        let f = fixture().await;
        let id = f
            .service
            .create("ana@example.com", fields("Dentist"))
            .await
            .unwrap()
            .id
            .unwrap();

        assert!(matches!(
            f.service.delete(id, "bo@example.com").await,
            Err(NudgeError::UnauthorizedAccess)
        ));
        assert!(f.events.find_by_id(id).await.unwrap().is_some());

        f.service.delete(id, "ana@example.com").await.unwrap();
        assert!(f.events.find_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_event() {
        let f = fixture().await;
        assert!(matches!(
            f.service.update(404, "ana@example.com", fields("x")).await,
            Err(NudgeError::EventNotFound(404))
        ));
        assert!(matches!(
            f.service.delete(404, "ana@example.com").await,
            Err(NudgeError::EventNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_notified_flag() {
        let f = fixture().await;
        let mut created = f.service.create("ana@example.com", fields("Dentist")).await.unwrap();
        created.mark_notified();
        let id = f.events.save(created).await.unwrap().id.unwrap();

        let updated = f.service.update(id, "ana@example.com", fields("Dentist")).await.unwrap();
        assert!(updated.notified);
    }
}
