use crate::error::{AppError, Result};
use crate::models::UserId;
use crate::store::{CascadeReport, SharedStore};

/// Removes an account together with everything that references it.
#[derive(Clone)]
pub struct CascadeCoordinator {
    store: SharedStore,
}

impl CascadeCoordinator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn delete_account(&self, user_id: UserId) -> Result<CascadeReport> {
        let report = self
            .store
            .delete_user_cascade(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        tracing::info!(
            user_id,
            events_deleted = report.events_deleted,
            rosters_left = report.rosters_left,
            notifications_deleted = report.notifications_deleted,
            "Account deleted"
        );

        Ok(report)
    }
}
