use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, UserId};

/// Event lifecycle. Any state may move to any other.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    #[default]
    Draft,
    Published,
    Concluded,
    Cancelled,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Draft => "draft",
            EventState::Published => "published",
            EventState::Concluded => "concluded",
            EventState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for EventState {
    type Err = UnknownState;

    /// Accepts the English labels and the legacy Italian ones.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" | "bozza" => Ok(EventState::Draft),
            "published" | "pubblicato" => Ok(EventState::Published),
            "concluded" | "concluso" => Ok(EventState::Concluded),
            "cancelled" | "annullato" => Ok(EventState::Cancelled),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub creator: UserId,
    pub participants: Vec<UserId>,
    /// `None` means unlimited.
    pub max_participants: Option<u32>,
    pub is_public: bool,
    pub state: EventState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_full(&self) -> bool {
        match self.max_participants {
            Some(max) => self.participants.len() >= max as usize,
            None => false,
        }
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Request body for event creation. Nothing is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub max_participants: Option<u32>,
    pub is_public: Option<bool>,
    pub state: Option<String>,
}

/// Request body for event updates, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub max_participants: Option<u32>,
    pub is_public: Option<bool>,
    pub state: Option<String>,
}

/// Validated field-level changes applied by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub max_participants: Option<u32>,
    pub is_public: Option<bool>,
    pub state: Option<EventState>,
}

impl EventChanges {
    pub fn apply(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = Some(title.clone());
        }
        if let Some(description) = &self.description {
            event.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            event.category = Some(category.clone());
        }
        if let Some(date) = self.date {
            event.date = Some(date);
        }
        if let Some(location) = &self.location {
            event.location = Some(location.clone());
        }
        if let Some(url) = &self.image_url {
            event.image_url = Some(url.clone());
        }
        if let Some(max) = self.max_participants {
            event.max_participants = Some(max);
        }
        if let Some(is_public) = self.is_public {
            event.is_public = is_public;
        }
        if let Some(state) = self.state {
            event.state = state;
        }
    }
}
