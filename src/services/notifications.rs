use crate::error::Result;
use crate::models::{EventId, Notification, UserId};
use crate::store::{Collection, SharedStore};
use crate::timestamps::Timestamps;

#[derive(Clone)]
pub struct NotificationService {
    store: SharedStore,
}

impl NotificationService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn notify(
        &self,
        user_id: UserId,
        event_id: Option<EventId>,
        message: impl Into<String>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: self.store.next_sequence(Collection::Notification).await?,
            user_id,
            event_id,
            message: message.into(),
            read: false,
            created_at: Timestamps::now().created_at,
        };

        self.store.insert_notification(&notification).await?;
        Ok(notification)
    }

    pub async fn list_for(&self, user_id: UserId) -> Result<Vec<Notification>> {
        Ok(self.store.find_notifications(user_id).await?)
    }
}
