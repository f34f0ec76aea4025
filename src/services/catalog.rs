//! Read-only event views for browsing and organizer pages.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Event, EventId, EventState, User, UserId, UserSummary};
use crate::store::{DistinctField, EventQuery, SharedStore};

/// One event in a listing, with its creator resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListing {
    pub id: EventId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub creator: Option<UserSummary>,
    pub participant_count: usize,
    pub max_participants: Option<u32>,
    pub is_public: bool,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventListing {
    fn new(event: Event, creator: Option<UserSummary>) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            category: event.category,
            date: event.date,
            location: event.location,
            image_url: event.image_url,
            creator,
            participant_count: event.participants.len(),
            max_participants: event.max_participants,
            is_public: event.is_public,
            state: event.state,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub listing: EventListing,
    /// In join order.
    pub participants: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvents {
    pub created_events: Vec<EventListing>,
    pub subscribed_events: Vec<EventListing>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerProfile {
    pub id: UserId,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub bio: Option<String>,
    pub email: String,
    pub events: Vec<EventListing>,
}

#[derive(Clone)]
pub struct EventCatalog {
    store: SharedStore,
}

impl EventCatalog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Public events, soonest first.
    pub async fn list_public(&self) -> Result<Vec<EventListing>> {
        let events = self.store.find_events(&EventQuery::public()).await?;
        self.with_creators(events).await
    }

    /// Public events of one category, soonest first. The match is exact.
    pub async fn by_category(&self, category: &str) -> Result<Vec<EventListing>> {
        let events = self
            .store
            .find_events(&EventQuery::public_in_category(category))
            .await?;
        self.with_creators(events).await
    }

    pub async fn event_detail(&self, event_id: EventId) -> Result<EventDetail> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(AppError::NotFound("Event"))?;

        let mut ids = event.participants.clone();
        ids.push(event.creator);
        let users = self.users_by_id(&ids).await?;

        let participants = event
            .participants
            .iter()
            .filter_map(|id| users.get(id).map(UserSummary::from))
            .collect();
        let creator = users.get(&event.creator).map(UserSummary::from);

        Ok(EventDetail {
            listing: EventListing::new(event, creator),
            participants,
        })
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .distinct_event_values(DistinctField::Category)
            .await?)
    }

    /// Cities are the first comma-separated segment of an event location.
    pub async fn cities(&self) -> Result<Vec<String>> {
        let locations = self
            .store
            .distinct_event_values(DistinctField::Location)
            .await?;

        let cities: BTreeSet<String> = locations
            .iter()
            .filter_map(|location| location.split(',').next())
            .map(|city| city.trim().to_string())
            .filter(|city| !city.is_empty())
            .collect();

        Ok(cities.into_iter().collect())
    }

    pub async fn user_events(&self, user_id: UserId) -> Result<UserEvents> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        let created = self
            .store
            .find_events(&EventQuery::by_ids(user.created_events.clone()))
            .await?;
        let subscribed = self
            .store
            .find_events(&EventQuery::by_ids(user.subscribed_events.clone()))
            .await?;

        Ok(UserEvents {
            created_events: self.with_creators(created).await?,
            subscribed_events: self.with_creators(subscribed).await?,
        })
    }

    /// Organizer card and their public events, latest first.
    pub async fn organizer_profile(&self, organizer_id: UserId) -> Result<OrganizerProfile> {
        let organizer = self
            .store
            .find_user(organizer_id)
            .await?
            .ok_or(AppError::NotFound("Organizer"))?;

        let query = EventQuery {
            public_only: true,
            ..EventQuery::by_creator(organizer_id)
        };
        let summary = UserSummary::from(&organizer);
        let events = self
            .store
            .find_events(&query)
            .await?
            .into_iter()
            .map(|event| EventListing::new(event, Some(summary.clone())))
            .collect();

        Ok(OrganizerProfile {
            id: organizer.id,
            name: organizer.name,
            profile_image_url: organizer.profile_image_url,
            bio: organizer.bio,
            email: organizer.email,
            events,
        })
    }

    async fn with_creators(&self, events: Vec<Event>) -> Result<Vec<EventListing>> {
        let creator_ids: Vec<UserId> = events
            .iter()
            .map(|e| e.creator)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let creators = self.users_by_id(&creator_ids).await?;

        Ok(events
            .into_iter()
            .map(|event| {
                let creator = creators.get(&event.creator).map(UserSummary::from);
                EventListing::new(event, creator)
            })
            .collect())
    }

    async fn users_by_id(&self, ids: &[UserId]) -> Result<HashMap<UserId, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = self.store.find_users(ids).await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::NewEvent;
    use crate::services::test_support::Fixture;

    fn dated(day: u32, location: &str, category: &str, public: bool) -> NewEvent {
        NewEvent {
            title: Some(format!("Event on day {}", day)),
            date: Some(Utc.with_ymd_and_hms(2030, 5, day, 20, 0, 0).unwrap()),
            location: Some(location.to_string()),
            category: Some(category.to_string()),
            is_public: Some(public),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_public_sorted_by_date_with_creator() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;
        let bob = fx.user("Bob", "bob@example.com").await;
        let late = fx
            .roster
            .create_event(ada, dated(20, "Roma", "Music", true))
            .await
            .unwrap();
        let early = fx
            .roster
            .create_event(ada, dated(3, "Torino", "Tech", true))
            .await
            .unwrap();
        fx.roster
            .create_event(ada, dated(10, "Napoli", "Food", false))
            .await
            .unwrap();
        fx.roster.join(early.id, bob).await.unwrap();

        let listing = fx.catalog.list_public().await.unwrap();
        let ids: Vec<_> = listing.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert_eq!(listing[0].participant_count, 1);
        assert_eq!(listing[0].creator.as_ref().map(|c| c.name.as_str()), Some("Ada"));
    }

    #[tokio::test]
    async fn test_by_category_lists_public_matches_soonest_first() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;
        let later = fx
            .roster
            .create_event(ada, dated(18, "Roma", "Music", true))
            .await
            .unwrap();
        let sooner = fx
            .roster
            .create_event(ada, dated(4, "Torino", "Music", true))
            .await
            .unwrap();
        fx.roster
            .create_event(ada, dated(8, "Roma", "Music", false))
            .await
            .unwrap();
        fx.roster
            .create_event(ada, dated(2, "Roma", "Tech", true))
            .await
            .unwrap();

        let music = fx.catalog.by_category("Music").await.unwrap();
        let ids: Vec<_> = music.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
        assert_eq!(music[0].creator.as_ref().map(|c| c.id), Some(ada));

        assert!(fx.catalog.by_category("music").await.unwrap().is_empty());
        assert!(fx.catalog.by_category("Sport").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detail_keeps_join_order() {
        let fx = Fixture::new();
        let owner = fx.user("Owner", "owner@example.com").await;
        let zed = fx.user("Zed", "zed@example.com").await;
        let amy = fx.user("Amy", "amy@example.com").await;
        let event = fx.event(owner, None).await;
        fx.roster.join(event, zed).await.unwrap();
        fx.roster.join(event, amy).await.unwrap();

        let detail = fx.catalog.event_detail(event).await.unwrap();
        let names: Vec<_> = detail.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy"]);
        assert_eq!(detail.listing.creator.map(|c| c.id), Some(owner));

        assert!(matches!(
            fx.catalog.event_detail(999).await,
            Err(AppError::NotFound("Event"))
        ));
    }

    #[tokio::test]
    async fn test_categories_and_cities_are_distinct() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;
        for (day, location, category) in [
            (1, "Milano, Via Roma 1", "Tech"),
            (2, "Milano, Piazza Duomo", "Music"),
            (3, "Bologna", "Tech"),
        ] {
            fx.roster
                .create_event(ada, dated(day, location, category, true))
                .await
                .unwrap();
        }

        assert_eq!(fx.catalog.categories().await.unwrap(), vec!["Music", "Tech"]);
        assert_eq!(fx.catalog.cities().await.unwrap(), vec!["Bologna", "Milano"]);
    }

    #[tokio::test]
    async fn test_user_events_splits_created_and_subscribed() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;
        let bob = fx.user("Bob", "bob@example.com").await;
        let own = fx.event(ada, None).await;
        let other = fx.event(bob, None).await;
        fx.roster.join(other, ada).await.unwrap();

        let events = fx.catalog.user_events(ada).await.unwrap();
        assert_eq!(events.created_events.len(), 1);
        assert_eq!(events.created_events[0].id, own);
        assert_eq!(events.subscribed_events.len(), 1);
        assert_eq!(events.subscribed_events[0].id, other);
    }

    #[tokio::test]
    async fn test_organizer_profile_lists_public_events_latest_first() {
        let fx = Fixture::new();
        let ada = fx.user("Ada", "ada@example.com").await;
        let first = fx
            .roster
            .create_event(ada, dated(1, "Roma", "Tech", true))
            .await
            .unwrap();
        let second = fx
            .roster
            .create_event(ada, dated(9, "Roma", "Tech", true))
            .await
            .unwrap();
        fx.roster
            .create_event(ada, dated(5, "Roma", "Tech", false))
            .await
            .unwrap();

        let profile = fx.catalog.organizer_profile(ada).await.unwrap();
        assert_eq!(profile.email, "ada@example.com");
        let ids: Vec<_> = profile.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert!(matches!(
            fx.catalog.organizer_profile(999).await,
            Err(AppError::NotFound("Organizer"))
        ));
    }
}
