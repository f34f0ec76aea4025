use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{
    CascadeReport, Collection, Conflict, DateOrder, DistinctField, DocumentStore, EventQuery,
    Outcome, StoreError, StoreResult,
};
use crate::models::{
    Event, EventChanges, EventId, EventState, Notification, ProfileUpdate, User, UserId, UserRole,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, profile_image_url, bio, \
    created_events, subscribed_events, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, title, description, category, date, location, image_url, \
    creator, participants, max_participants, is_public, state, created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    profile_image_url: Option<String>,
    bio: Option<String>,
    created_events: Vec<i64>,
    subscribed_events: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::parse(&row.role),
            profile_image_url: row.profile_image_url,
            bio: row.bio,
            created_events: row.created_events,
            subscribed_events: row.subscribed_events,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: i64,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    date: Option<DateTime<Utc>>,
    location: Option<String>,
    image_url: Option<String>,
    creator: i64,
    participants: Vec<i64>,
    max_participants: Option<i32>,
    is_public: bool,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> StoreResult<Self> {
        let state: EventState = row
            .state
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("event {}: {}", row.id, e)))?;
        let max_participants = row
            .max_participants
            .map(u32::try_from)
            .transpose()
            .map_err(|_| StoreError::Corrupt(format!("event {}: negative capacity", row.id)))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            date: row.date,
            location: row.location,
            image_url: row.image_url,
            creator: row.creator,
            participants: row.participants,
            max_participants,
            is_public: row.is_public,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    event_id: Option<i64>,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            message: row.message,
            read: row.read,
            created_at: row.created_at,
        }
    }
}

fn capacity_column(max: Option<u32>) -> StoreResult<Option<i32>> {
    max.map(i32::try_from)
        .transpose()
        .map_err(|_| StoreError::Corrupt("capacity out of range".to_string()))
}

/// PostgreSQL-backed store. Array fields live in `BIGINT[]` columns and every
/// cross-record mutation runs in one transaction with row locks.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgStore {
    async fn next_sequence(&self, collection: Collection) -> StoreResult<i64> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (collection, seq) VALUES ($1, 1)
            ON CONFLICT (collection) DO UPDATE SET seq = counters.seq + 1
            RETURNING seq
            "#,
        )
        .bind(collection.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, profile_image_url, bio,
                               created_events, subscribed_events, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.profile_image_url)
        .bind(&user.bio)
        .bind(&user.created_events)
        .bind(&user.subscribed_events)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    async fn find_users(&self, ids: &[UserId]) -> StoreResult<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update_user_fields(
        &self,
        id: UserId,
        update: &ProfileUpdate,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                profile_image_url = COALESCE($4, profile_image_url),
                bio = COALESCE($5, bio),
                updated_at = $6
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.profile_image_url)
        .bind(&update.bio)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<Outcome<Event>> {
        let mut tx = self.pool.begin().await?;

        let linked = sqlx::query(
            "UPDATE users SET created_events = array_append(created_events, $1) WHERE id = $2",
        )
        .bind(event.id)
        .bind(event.creator)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() == 0 {
            return Ok(Outcome::Conflict(Conflict::UserMissing));
        }

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO events (id, title, description, category, date, location, image_url,
                                creator, participants, max_participants, is_public, state,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.category)
        .bind(event.date)
        .bind(&event.location)
        .bind(&event.image_url)
        .bind(event.creator)
        .bind(&event.participants)
        .bind(capacity_column(event.max_participants)?)
        .bind(event.is_public)
        .bind(event.state.as_str())
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Outcome::Applied(Event::try_from(row)?))
    }

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Event::try_from).transpose()
    }

    async fn find_events(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE TRUE"));

        if query.public_only {
            qb.push(" AND is_public");
        }
        if let Some(creator) = query.creator {
            qb.push(" AND creator = ").push_bind(creator);
        }
        if let Some(ids) = &query.ids {
            qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
        }
        if let Some(category) = &query.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        qb.push(match query.order {
            DateOrder::Ascending => " ORDER BY date ASC NULLS LAST, id ASC",
            DateOrder::Descending => " ORDER BY date DESC NULLS LAST, id ASC",
        });

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn update_event_fields(
        &self,
        id: EventId,
        changes: &EventChanges,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        let mut tx = self.pool.begin().await?;

        let roster: Option<Vec<i64>> =
            sqlx::query_scalar("SELECT participants FROM events WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(roster) = roster else {
            return Ok(Outcome::Missing);
        };
        if let Some(max) = changes.max_participants {
            if (max as usize) < roster.len() {
                return Ok(Outcome::Conflict(Conflict::CapacityBelowRoster));
            }
        }

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            UPDATE events SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                date = COALESCE($5, date),
                location = COALESCE($6, location),
                image_url = COALESCE($7, image_url),
                max_participants = COALESCE($8, max_participants),
                is_public = COALESCE($9, is_public),
                state = COALESCE($10, state),
                updated_at = $11
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.category)
        .bind(changes.date)
        .bind(&changes.location)
        .bind(&changes.image_url)
        .bind(capacity_column(changes.max_participants)?)
        .bind(changes.is_public)
        .bind(changes.state.map(|s| s.as_str()))
        .bind(updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Outcome::Applied(Event::try_from(row)?))
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE users SET
                created_events = array_remove(created_events, $1),
                subscribed_events = array_remove(subscribed_events, $1)
            WHERE $1 = ANY(created_events) OR $1 = ANY(subscribed_events)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn push_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        let mut tx = self.pool.begin().await?;

        // Lock order: event row, then user row.
        let current: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(Outcome::Missing);
        };
        let current = Event::try_from(current)?;

        let user_exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        if user_exists.is_none() {
            return Ok(Outcome::Conflict(Conflict::UserMissing));
        }
        if current.has_participant(user_id) {
            return Ok(Outcome::Conflict(Conflict::AlreadyMember));
        }
        if current.is_full() {
            return Ok(Outcome::Conflict(Conflict::AtCapacity));
        }

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            UPDATE events SET participants = array_append(participants, $2), updated_at = $3
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(user_id)
        .bind(updated_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE users SET subscribed_events = array_append(subscribed_events, $1)
            WHERE id = $2 AND NOT ($1 = ANY(subscribed_events))
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Outcome::Applied(Event::try_from(row)?))
    }

    async fn pull_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Outcome<Event>> {
        let mut tx = self.pool.begin().await?;

        let roster: Option<Vec<i64>> =
            sqlx::query_scalar("SELECT participants FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(roster) = roster else {
            return Ok(Outcome::Missing);
        };
        if !roster.contains(&user_id) {
            return Ok(Outcome::Conflict(Conflict::NotMember));
        }

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            UPDATE events SET participants = array_remove(participants, $2), updated_at = $3
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(user_id)
        .bind(updated_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE users SET subscribed_events = array_remove(subscribed_events, $1) WHERE id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Outcome::Applied(Event::try_from(row)?))
    }

    async fn distinct_event_values(&self, field: DistinctField) -> StoreResult<Vec<String>> {
        let column = match field {
            DistinctField::Category => "category",
            DistinctField::Location => "location",
        };

        let values: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT {column} FROM events \
             WHERE {column} IS NOT NULL AND {column} <> '' ORDER BY 1"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(values)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, event_id, message, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.event_id)
        .bind(&notification.message)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, event_id, message, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn delete_user_cascade(&self, user_id: UserId) -> StoreResult<Option<CascadeReport>> {
        let mut tx = self.pool.begin().await?;

        // Same lock order as push_participant: event rows, then user rows.
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM events WHERE creator = $1 OR $1 = ANY(participants) ORDER BY id FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let owned: Vec<i64> = sqlx::query_scalar("DELETE FROM events WHERE creator = $1 RETURNING id")
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;

        if !owned.is_empty() {
            sqlx::query(
                r#"
                UPDATE users SET subscribed_events = (
                    SELECT COALESCE(array_agg(e ORDER BY ord), '{}')
                    FROM unnest(subscribed_events) WITH ORDINALITY AS t(e, ord)
                    WHERE NOT (e = ANY($1))
                )
                WHERE subscribed_events && $1
                "#,
            )
            .bind(&owned)
            .execute(&mut *tx)
            .await?;
        }

        let rosters = sqlx::query(
            "UPDATE events SET participants = array_remove(participants, $1) WHERE $1 = ANY(participants)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let notifications = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(CascadeReport {
            events_deleted: owned.len() as u64,
            rosters_left: rosters.rows_affected(),
            notifications_deleted: notifications.rows_affected(),
        }))
    }
}
