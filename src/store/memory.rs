use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CascadeReport, Collection, Conflict, DateOrder, DistinctField, DocumentStore, EventQuery,
    Outcome, StoreError, StoreResult,
};
use crate::models::{Event, EventChanges, EventId, Notification, ProfileUpdate, User, UserId};

#[derive(Default)]
struct Collections {
    users: BTreeMap<UserId, User>,
    events: BTreeMap<EventId, Event>,
    notifications: BTreeMap<i64, Notification>,
    sequences: HashMap<Collection, i64>,
}

/// In-process store. Every operation runs under one lock acquisition, which
/// makes multi-record mutations atomic with respect to other callers.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

fn compare_dates(a: &Event, b: &Event, order: DateOrder) -> Ordering {
    // Undated events sort last in either direction.
    let by_date = match (a.date, b.date) {
        (Some(x), Some(y)) => match order {
            DateOrder::Ascending => x.cmp(&y),
            DateOrder::Descending => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then(a.id.cmp(&b.id))
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn next_sequence(&self, collection: Collection) -> StoreResult<i64> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let seq = inner.sequences.entry(collection).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.check_online()?;
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[UserId]) -> StoreResult<Vec<User>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.users.get(id).cloned()).collect())
    }

    async fn update_user_fields(
        &self,
        id: UserId,
        update: &ProfileUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if let Some(email) = &update.email {
            if inner.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(user);
        user.updated_at = updated_at;
        Ok(Some(user.clone()))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<Outcome<Event>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let Some(creator) = inner.users.get_mut(&event.creator) else {
            return Ok(Outcome::Conflict(Conflict::UserMissing));
        };
        creator.created_events.push(event.id);
        inner.events.insert(event.id, event.clone());
        Ok(Outcome::Applied(event.clone()))
    }

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        self.check_online()?;
        Ok(self.inner.read().await.events.get(&id).cloned())
    }

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| compare_dates(a, b, query.order));
        Ok(events)
    }

    async fn update_event_fields(
        &self,
        id: EventId,
        changes: &EventChanges,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let Some(event) = inner.events.get_mut(&id) else {
            return Ok(Outcome::Missing);
        };
        if let Some(max) = changes.max_participants {
            if (max as usize) < event.participants.len() {
                return Ok(Outcome::Conflict(Conflict::CapacityBelowRoster));
            }
        }
        changes.apply(event);
        event.updated_at = updated_at;
        Ok(Outcome::Applied(event.clone()))
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if inner.events.remove(&id).is_none() {
            return Ok(false);
        }
        for user in inner.users.values_mut() {
            user.created_events.retain(|e| *e != id);
            user.subscribed_events.retain(|e| *e != id);
        }
        Ok(true)
    }

    async fn push_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let Collections { users, events, .. } = &mut *inner;

        let Some(event) = events.get_mut(&event_id) else {
            return Ok(Outcome::Missing);
        };
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(Outcome::Conflict(Conflict::UserMissing));
        };
        if event.has_participant(user_id) {
            return Ok(Outcome::Conflict(Conflict::AlreadyMember));
        }
        if event.is_full() {
            return Ok(Outcome::Conflict(Conflict::AtCapacity));
        }

        event.participants.push(user_id);
        event.updated_at = updated_at;
        if !user.subscribed_events.contains(&event_id) {
            user.subscribed_events.push(event_id);
        }
        Ok(Outcome::Applied(event.clone()))
    }

    async fn pull_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let Collections { users, events, .. } = &mut *inner;

        let Some(event) = events.get_mut(&event_id) else {
            return Ok(Outcome::Missing);
        };
        if !event.has_participant(user_id) {
            return Ok(Outcome::Conflict(Conflict::NotMember));
        }

        event.participants.retain(|p| *p != user_id);
        event.updated_at = updated_at;
        if let Some(user) = users.get_mut(&user_id) {
            user.subscribed_events.retain(|e| *e != event_id);
        }
        Ok(Outcome::Applied(event.clone()))
    }

    async fn distinct_event_values(&self, field: DistinctField) -> StoreResult<Vec<String>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let values: BTreeSet<String> = inner
            .events
            .values()
            .filter_map(|e| match field {
                DistinctField::Category => e.category.clone(),
                DistinctField::Location => e.location.clone(),
            })
            .filter(|v| !v.is_empty())
            .collect();
        Ok(values.into_iter().collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut found: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn delete_user_cascade(&self, user_id: UserId) -> StoreResult<Option<CascadeReport>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user_id) {
            return Ok(None);
        }
        let mut report = CascadeReport::default();

        let owned: Vec<EventId> = inner
            .events
            .values()
            .filter(|e| e.creator == user_id)
            .map(|e| e.id)
            .collect();
        for id in &owned {
            inner.events.remove(id);
        }
        report.events_deleted = owned.len() as u64;
        for user in inner.users.values_mut() {
            user.subscribed_events.retain(|e| !owned.contains(e));
        }

        for event in inner.events.values_mut() {
            if event.has_participant(user_id) {
                event.participants.retain(|p| *p != user_id);
                report.rosters_left += 1;
            }
        }

        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.user_id != user_id);
        report.notifications_deleted = (before - inner.notifications.len()) as u64;

        inner.users.remove(&user_id);
        Ok(Some(report))
    }
}
