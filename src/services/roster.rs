use crate::error::{AppError, Result};
use crate::models::{Event, EventChanges, EventId, EventState, EventUpdate, NewEvent, UserId};
use crate::services::notifications::NotificationService;
use crate::store::{Collection, Conflict, Outcome, SharedStore};
use crate::timestamps::{self, Timestamps};

/// Event lifecycle and the user/event participation relation.
///
/// Every mutation that touches both an event and a user record goes through
/// a single store call, so the capacity check and the roster append cannot
/// interleave with another join.
#[derive(Clone)]
pub struct RosterManager {
    store: SharedStore,
    notifications: NotificationService,
}

impl RosterManager {
    pub fn new(store: SharedStore, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn create_event(&self, creator: UserId, data: NewEvent) -> Result<Event> {
        let state = match data.state.as_deref() {
            Some(raw) => parse_state(raw)?,
            None => EventState::default(),
        };

        let id = self.store.next_sequence(Collection::Event).await?;
        let stamps = Timestamps::now();
        let event = Event {
            id,
            title: data.title,
            description: data.description,
            category: data.category,
            date: data.date,
            location: data.location,
            image_url: data.image_url,
            creator,
            participants: Vec::new(),
            max_participants: data.max_participants,
            is_public: data.is_public.unwrap_or(true),
            state,
            created_at: stamps.created_at,
            updated_at: stamps.updated_at,
        };

        let event = match self.store.insert_event(&event).await? {
            Outcome::Applied(event) => event,
            Outcome::Missing | Outcome::Conflict(Conflict::UserMissing) => {
                return Err(AppError::NotFound("User"))
            }
            Outcome::Conflict(other) => return Err(unexpected(other)),
        };

        tracing::info!(event_id = id, user_id = creator, "Event created");
        Ok(event)
    }

    pub async fn update_event(
        &self,
        event_id: EventId,
        requester: UserId,
        update: EventUpdate,
    ) -> Result<Event> {
        self.load_owned(event_id, requester).await?;
        let changes = validate_update(update)?;

        match self
            .store
            .update_event_fields(event_id, &changes, timestamps::touch())
            .await?
        {
            Outcome::Applied(event) => {
                tracing::info!(event_id, user_id = requester, "Event updated");
                Ok(event)
            }
            Outcome::Missing => Err(AppError::NotFound("Event")),
            Outcome::Conflict(Conflict::CapacityBelowRoster) => Err(AppError::Validation(
                "maxParticipants cannot be lower than the current number of participants"
                    .to_string(),
            )),
            Outcome::Conflict(other) => Err(unexpected(other)),
        }
    }

    pub async fn delete_event(&self, event_id: EventId, requester: UserId) -> Result<()> {
        self.load_owned(event_id, requester).await?;

        if !self.store.delete_event(event_id).await? {
            return Err(AppError::NotFound("Event"));
        }

        tracing::info!(event_id, user_id = requester, "Event deleted");
        Ok(())
    }

    pub async fn join(&self, event_id: EventId, user_id: UserId) -> Result<Event> {
        let event = match self
            .store
            .push_participant(event_id, user_id, timestamps::touch())
            .await?
        {
            Outcome::Applied(event) => event,
            Outcome::Missing => return Err(AppError::NotFound("Event")),
            Outcome::Conflict(Conflict::AlreadyMember) => return Err(AppError::AlreadyJoined),
            Outcome::Conflict(Conflict::AtCapacity) => return Err(AppError::EventFull),
            Outcome::Conflict(Conflict::UserMissing) => return Err(AppError::NotFound("User")),
            Outcome::Conflict(other) => return Err(unexpected(other)),
        };

        tracing::info!(
            event_id,
            user_id,
            participants = event.participants.len(),
            "Joined event"
        );

        self.notify_creator(&event, user_id).await;
        Ok(event)
    }

    pub async fn leave(&self, event_id: EventId, user_id: UserId) -> Result<Event> {
        let event = match self
            .store
            .pull_participant(event_id, user_id, timestamps::touch())
            .await?
        {
            Outcome::Applied(event) => event,
            Outcome::Missing => return Err(AppError::NotFound("Event")),
            Outcome::Conflict(Conflict::NotMember) => return Err(AppError::NotJoined),
            Outcome::Conflict(Conflict::UserMissing) => return Err(AppError::NotFound("User")),
            Outcome::Conflict(other) => return Err(unexpected(other)),
        };

        tracing::info!(event_id, user_id, "Left event");
        Ok(event)
    }

    async fn load_owned(&self, event_id: EventId, requester: UserId) -> Result<Event> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(AppError::NotFound("Event"))?;

        if event.creator != requester {
            tracing::warn!(event_id, user_id = requester, "Rejected mutation by non-creator");
            return Err(AppError::Forbidden);
        }
        Ok(event)
    }

    // Failures are logged only; the join itself already committed.
    async fn notify_creator(&self, event: &Event, participant: UserId) {
        if event.creator == participant {
            return;
        }

        let name = match self.store.find_user(participant).await {
            Ok(Some(user)) => user.name,
            _ => "Someone".to_string(),
        };
        let title = event.title.as_deref().unwrap_or("your event");
        let message = format!("{} joined \"{}\"", name, title);

        if let Err(e) = self
            .notifications
            .notify(event.creator, Some(event.id), message)
            .await
        {
            tracing::warn!(event_id = event.id, error = %e, "Failed to notify event creator");
        }
    }
}

fn parse_state(raw: &str) -> Result<EventState> {
    raw.parse::<EventState>()
        .map_err(|e| AppError::InvalidState(e.to_string()))
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

fn validate_update(update: EventUpdate) -> Result<EventChanges> {
    let title = required(update.title, "title")?;
    let description = required(update.description, "description")?;
    let category = required(update.category, "category")?;
    let date = update
        .date
        .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
    let location = required(update.location, "location")?;
    let state = update.state.as_deref().map(parse_state).transpose()?;

    Ok(EventChanges {
        title: Some(title),
        description: Some(description),
        category: Some(category),
        date: Some(date),
        location: Some(location),
        image_url: update.image_url,
        max_participants: update.max_participants,
        is_public: update.is_public,
        state,
    })
}

fn unexpected(conflict: Conflict) -> AppError {
    AppError::Internal(anyhow::anyhow!("unexpected store conflict: {:?}", conflict))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::services::test_support::Fixture;
    use crate::store::DocumentStore;

    fn full_update() -> EventUpdate {
        EventUpdate {
            title: Some("Rust meetup".into()),
            description: Some("Talks and pizza".into()),
            category: Some("Tech".into()),
            date: Some(Utc.with_ymd_and_hms(2030, 3, 1, 18, 0, 0).unwrap()),
            location: Some("Milano, Via Roma 1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_links_event_to_creator() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;

        let event = fx.roster.create_event(ada, NewEvent::default()).await.unwrap();
        assert_eq!(event.creator, ada);
        assert!(event.participants.is_empty());
        assert!(event.is_public);
        assert_eq!(event.state, EventState::Draft);

        let user = fx.store.find_user(ada).await.unwrap().unwrap();
        assert_eq!(user.created_events, vec![event.id]);
    }

    #[tokio::test]
    async fn test_create_accepts_legacy_state_and_rejects_unknown() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;

        let event = fx
            .roster
            .create_event(
                ada,
                NewEvent {
                    state: Some("pubblicato".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(event.state, EventState::Published);

        let err = fx
            .roster
            .create_event(
                ada,
                NewEvent {
                    state: Some("archived".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_capacity_scenario() {
        let fx = Fixture::new();
        let a = fx.user("A", "a@example.com").await;
        let b = fx.user("B", "b@example.com").await;
        let c = fx.user("C", "c@example.com").await;
        let event = fx.event(a, Some(1)).await;

        let joined = tokio_test::assert_ok!(fx.roster.join(event, b).await);
        assert_eq!(joined.participants, vec![b]);

        let err = tokio_test::assert_err!(fx.roster.join(event, c).await);
        assert!(matches!(err, AppError::EventFull));
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(fx.participants(event).await, vec![b]);

        let left = fx.roster.leave(event, b).await.unwrap();
        assert!(left.participants.is_empty());

        let joined = fx.roster.join(event, c).await.unwrap();
        assert_eq!(joined.participants, vec![c]);
    }

    #[tokio::test]
    async fn test_join_at_capacity_minus_one_fills_event() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let u1 = fx.user("One", "one@example.com").await;
        let u2 = fx.user("Two", "two@example.com").await;
        let event = fx.event(owner, Some(2)).await;

        fx.roster.join(event, u1).await.unwrap();
        let full = fx.roster.join(event, u2).await.unwrap();
        assert_eq!(full.participants.len(), 2);
        assert!(full.is_full());
    }

    #[tokio::test]
    async fn test_duplicate_join_is_conflict() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let ada = fx.user("Ada", "ada@example.com").await;
        let event = fx.event(owner, None).await;

        fx.roster.join(event, ada).await.unwrap();
        let err = fx.roster.join(event, ada).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyJoined));
        assert_eq!(fx.participants(event).await, vec![ada]);
    }

    #[tokio::test]
    async fn test_join_then_leave_restores_both_lists() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let ada = fx.user("Ada", "ada@example.com").await;
        let bob = fx.user("Bob", "bob@example.com").await;
        let event = fx.event(owner, Some(10)).await;
        fx.roster.join(event, bob).await.unwrap();

        fx.roster.join(event, ada).await.unwrap();
        let user = fx.store.find_user(ada).await.unwrap().unwrap();
        assert_eq!(user.subscribed_events, vec![event]);

        fx.roster.leave(event, ada).await.unwrap();
        assert_eq!(fx.participants(event).await, vec![bob]);
        let user = fx.store.find_user(ada).await.unwrap().unwrap();
        assert!(user.subscribed_events.is_empty());
    }

    #[tokio::test]
    async fn test_leave_without_joining() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let ada = fx.user("Ada", "ada@example.com").await;
        let event = fx.event(owner, None).await;

        let err = fx.roster.leave(event, ada).await.unwrap_err();
        assert!(matches!(err, AppError::NotJoined));
    }

    #[tokio::test]
    async fn test_leave_keeps_join_order() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let u1 = fx.user("One", "one@example.com").await;
        let u2 = fx.user("Two", "two@example.com").await;
        let u3 = fx.user("Three", "three@example.com").await;
        let event = fx.event(owner, None).await;

        for user in [u1, u2, u3] {
            fx.roster.join(event, user).await.unwrap();
        }
        fx.roster.leave(event, u2).await.unwrap();
        assert_eq!(fx.participants(event).await, vec![u1, u3]);
    }

    #[tokio::test]
    async fn test_missing_event() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;

        assert!(matches!(
            fx.roster.join(404, ada).await,
            Err(AppError::NotFound("Event"))
        ));
        assert!(matches!(
            fx.roster.leave(404, ada).await,
            Err(AppError::NotFound("Event"))
        ));
        assert!(matches!(
            fx.roster.delete_event(404, ada).await,
            Err(AppError::NotFound("Event"))
        ));
        assert!(matches!(
            fx.roster.update_event(404, ada, full_update()).await,
            Err(AppError::NotFound("Event"))
        ));
    }

    #[tokio::test]
    async fn test_non_creator_cannot_mutate() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let mallory = fx.user("Mallory", "mallory@example.com").await;
        let event = fx.event(owner, Some(3)).await;
        let before = fx.store.find_event(event).await.unwrap().unwrap();

        let err = fx
            .roster
            .update_event(event, mallory, full_update())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let err = fx.roster.delete_event(event, mallory).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let after = fx.store.find_event(event).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_update_requires_core_fields() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let event = fx.event(owner, None).await;

        let err = fx
            .roster
            .update_event(
                event,
                owner,
                EventUpdate {
                    title: Some("   ".into()),
                    ..full_update()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = fx
            .roster
            .update_event(
                event,
                owner,
                EventUpdate {
                    date: None,
                    ..full_update()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_state() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let event = fx.event(owner, None).await;

        let err = fx
            .roster
            .update_event(
                event,
                owner,
                EventUpdate {
                    state: Some("archived".into()),
                    ..full_update()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_update_merges_fields_and_keeps_state() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let event = fx
            .roster
            .create_event(
                owner,
                NewEvent {
                    image_url: Some("https://img.example.com/e.png".into()),
                    max_participants: Some(4),
                    state: Some("published".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = fx
            .roster
            .update_event(event.id, owner, full_update())
            .await
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Rust meetup"));
        assert_eq!(updated.image_url.as_deref(), Some("https://img.example.com/e.png"));
        assert_eq!(updated.max_participants, Some(4));
        assert_eq!(updated.state, EventState::Published);
        assert_eq!(updated.creator, owner);
        assert!(updated.updated_at >= event.updated_at);
        assert_eq!(updated.created_at, event.created_at);
    }

    #[tokio::test]
    async fn test_update_capacity_below_roster() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let u1 = fx.user("One", "one@example.com").await;
        let u2 = fx.user("Two", "two@example.com").await;
        let event = fx.event(owner, Some(5)).await;
        fx.roster.join(event, u1).await.unwrap();
        fx.roster.join(event, u2).await.unwrap();

        let err = fx
            .roster
            .update_event(
                event,
                owner,
                EventUpdate {
                    max_participants: Some(1),
                    ..full_update()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            fx.store.find_event(event).await.unwrap().unwrap().max_participants,
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_delete_unlinks_event_from_users() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let ada = fx.user("Ada", "ada@example.com").await;
        let event = fx.event(owner, None).await;
        fx.roster.join(event, ada).await.unwrap();

        fx.roster.delete_event(event, owner).await.unwrap();

        assert!(fx.store.find_event(event).await.unwrap().is_none());
        let owner = fx.store.find_user(owner).await.unwrap().unwrap();
        assert!(owner.created_events.is_empty());
        let ada = fx.store.find_user(ada).await.unwrap().unwrap();
        assert!(ada.subscribed_events.is_empty());
    }

    #[tokio::test]
    async fn test_join_notifies_creator() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let ada = fx.user("Ada", "ada@example.com").await;
        let event = fx.event(owner, None).await;

        fx.roster.join(event, ada).await.unwrap();

        let inbox = fx.notifications.list_for(owner).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].event_id, Some(event));
        assert!(inbox[0].message.starts_with("Ada joined"));
        assert!(!inbox[0].read);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_admit_one() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let event = fx.event(owner, Some(1)).await;

        let mut users = Vec::new();
        for i in 0..8 {
            users.push(fx.user(&format!("User {}", i), &format!("user{}@example.com", i)).await);
        }

        let roster = Arc::new(fx.roster.clone());
        let handles: Vec<_> = users
            .iter()
            .map(|&user| {
                let roster = roster.clone();
                tokio::spawn(async move { roster.join(event, user).await })
            })
            .collect();

        let mut admitted = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AppError::EventFull) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(full, 7);
        assert_eq!(fx.participants(event).await.len(), 1);
    }
}
