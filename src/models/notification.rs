use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventId, UserId};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub event_id: Option<EventId>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
