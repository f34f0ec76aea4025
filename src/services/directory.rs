use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{ProfileUpdate, UserId, UserProfile};
use crate::services::cascade::CascadeCoordinator;
use crate::services::credentials::normalize_email;
use crate::store::{CascadeReport, SharedStore};
use crate::timestamps;

/// Profile reads and partial updates over the `User` collection.
#[derive(Clone)]
pub struct UserDirectory {
    store: SharedStore,
    cascade: CascadeCoordinator,
}

impl UserDirectory {
    pub fn new(store: SharedStore, cascade: CascadeCoordinator) -> Self {
        Self { store, cascade }
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<UserProfile> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;

        Ok(UserProfile::from(&user))
    }

    /// Apply the present fields of `update`. An empty update writes nothing.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        mut update: ProfileUpdate,
    ) -> Result<UserProfile> {
        if let Some(email) = update.email.take() {
            let email = normalize_email(&email);
            if email.is_empty() {
                return Err(AppError::Validation("Email cannot be empty".to_string()));
            }
            update.email = Some(email);
        }
        update
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        if let Some(email) = &update.email {
            if let Some(owner) = self.store.find_user_by_email(email).await? {
                if owner.id != user_id {
                    return Err(AppError::EmailInUse);
                }
            }
        }
        if matches!(update.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }

        if update.is_empty() {
            return self.get_profile(user_id).await;
        }

        let user = self
            .store
            .update_user_fields(user_id, &update, timestamps::touch())
            .await?
            .ok_or(AppError::NotFound("User"))?;

        tracing::info!(user_id, "Profile updated");
        Ok(UserProfile::from(&user))
    }

    pub async fn delete_account(&self, user_id: UserId) -> Result<CascadeReport> {
        self.cascade.delete_account(user_id).await
    }
}
