//! Persistence layer.
//!
//! The store exposes the `User`, `Event` and `Notification` collections.
//! Every operation that touches both sides of the user/event relationship
//! (event insertion, roster push/pull, event deletion, account cascade)
//! executes as one unit inside the backend, so readers never observe a
//! half-applied roster change.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{Event, EventChanges, EventId, Notification, ProfileUpdate, User, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("constraint violated: {0}")]
    Constraint(String),
}

/// Unique index on `users.email`.
const USERS_EMAIL_KEY: &str = "users_email_key";

impl StoreError {
    fn unique_violation(constraint: Option<&str>, message: &str) -> Self {
        match constraint {
            Some(USERS_EMAIL_KEY) => StoreError::DuplicateEmail,
            Some(other) => StoreError::Constraint(format!("{other}: {message}")),
            None => StoreError::Constraint(message.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::unique_violation(db.constraint(), db.message())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type SharedStore = Arc<dyn DocumentStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    User,
    Event,
    Notification,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::User => "User",
            Collection::Event => "Event",
            Collection::Notification => "Notification",
        }
    }
}

/// Result of a conditional mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    /// The target record does not exist.
    Missing,
    Conflict(Conflict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    AlreadyMember,
    NotMember,
    AtCapacity,
    /// A capacity change would drop below the current roster size.
    CapacityBelowRoster,
    /// The referenced user does not exist.
    UserMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub public_only: bool,
    pub creator: Option<UserId>,
    pub ids: Option<Vec<EventId>>,
    pub category: Option<String>,
    pub order: DateOrder,
}

impl EventQuery {
    pub fn public() -> Self {
        Self {
            public_only: true,
            ..Default::default()
        }
    }

    pub fn by_creator(creator: UserId) -> Self {
        Self {
            creator: Some(creator),
            order: DateOrder::Descending,
            ..Default::default()
        }
    }

    pub fn public_in_category(category: impl Into<String>) -> Self {
        Self {
            public_only: true,
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<EventId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.public_only && !event.is_public {
            return false;
        }
        if let Some(creator) = self.creator {
            if event.creator != creator {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if event.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctField {
    Category,
    Location,
}

/// What an account cascade removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub events_deleted: u64,
    pub rosters_left: u64,
    pub notifications_deleted: u64,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Next identifier for a collection, starting at 1.
    async fn next_sequence(&self, collection: Collection) -> StoreResult<i64>;

    /// Insert a user. Fails with `DuplicateEmail` if the email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Users with the given ids, in unspecified order. Unknown ids are skipped.
    async fn find_users(&self, ids: &[UserId]) -> StoreResult<Vec<User>>;

    /// `$set` the present fields of `update`. Returns `None` if the user is absent
    /// and `DuplicateEmail` if the new email belongs to another user.
    async fn update_user_fields(
        &self,
        id: UserId,
        update: &ProfileUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    /// Insert an event and push its id onto the creator's created list.
    /// `Conflict(UserMissing)` if the creator does not exist.
    async fn insert_event(&self, event: &Event) -> StoreResult<Outcome<Event>>;

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<Event>>;

    /// `$set` the present fields of `changes`.
    /// `Conflict(CapacityBelowRoster)` if a new capacity is below the roster size.
    async fn update_event_fields(
        &self,
        id: EventId,
        changes: &EventChanges,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>>;

    /// Delete an event and pull its id from every user's created and
    /// subscribed lists. Returns `false` if the event was absent.
    async fn delete_event(&self, id: EventId) -> StoreResult<bool>;

    /// Append `user_id` to the roster and `event_id` to the user's subscribed
    /// list, only if the user is not a member and the event is below capacity.
    async fn push_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>>;

    /// Remove `user_id` from the roster and `event_id` from the user's
    /// subscribed list, keeping the order of the remaining participants.
    async fn pull_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>>;

    /// Sorted distinct non-empty values of an event field.
    async fn distinct_event_values(&self, field: DistinctField) -> StoreResult<Vec<String>>;

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;

    /// Notifications addressed to a user, newest first.
    async fn find_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>>;

    /// Delete the user's events, unlink the user from every roster, delete
    /// their notifications and finally the user. `None` if the user is absent.
    async fn delete_user_cascade(&self, user_id: UserId) -> StoreResult<Option<CascadeReport>>;
}
