use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::SecurityConfig;
use crate::error::{AppError, Result};
use crate::models::{User, UserId, UserRole};
use crate::store::{Collection, SharedStore, StoreError};
use crate::timestamps::Timestamps;

/// Registers users and verifies their passwords with Argon2id.
pub struct CredentialStore {
    store: SharedStore,
    hasher: Argon2<'static>,
    // Checked against when the email is unknown so both failure paths cost one verification.
    dummy_hash: String,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl CredentialStore {
    pub fn new(store: SharedStore, security: &SecurityConfig) -> anyhow::Result<Self> {
        let params = Params::new(
            security.argon2_memory_kib,
            security.argon2_iterations,
            security.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {}", e))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&hasher, "dummy-password-for-timing")
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?;

        Ok(Self {
            store,
            hasher,
            dummy_hash,
        })
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserId> {
        let email = normalize_email(email);

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = self.hash_password(password).await?;
        let id = self.store.next_sequence(Collection::User).await?;
        let stamps = Timestamps::now();

        let user = User {
            id,
            name: name.trim().to_string(),
            email,
            password_hash,
            role: UserRole::User,
            profile_image_url: None,
            bio: None,
            created_events: Vec::new(),
            subscribed_events: Vec::new(),
            created_at: stamps.created_at,
            updated_at: stamps.updated_at,
        };

        // The store enforces uniqueness too; a concurrent registration loses here.
        self.store.insert_user(&user).await.map_err(|e| match e {
            StoreError::DuplicateEmail => AppError::DuplicateEmail,
            other => other.into(),
        })?;

        tracing::info!(user_id = id, "User registered");
        Ok(id)
    }

    pub async fn verify(&self, email: &str, password: &str) -> Result<UserId> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            let _ = self.verify_password(password, &self.dummy_hash).await;
            return Err(AppError::InvalidCredentials);
        };

        self.verify_password(password, &user.password_hash).await?;
        tracing::debug!(user_id = user.id, "Credentials verified");
        Ok(user.id)
    }

    async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_with(&hasher, &password))
            .await
            .map_err(|e| AppError::Internal(anyhow!("Hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(anyhow!("Password hashing failed: {}", e)))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<()> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AppError::Internal(anyhow!("Invalid password hash: {}", e)))?;
            hasher
                .verify_password(password.as_bytes(), &parsed)
                .map_err(|_| AppError::InvalidCredentials)
        })
        .await
        .map_err(|e| AppError::Internal(anyhow!("Verification task failed: {}", e)))?
    }
}

fn hash_with(hasher: &Argon2<'_>, password: &str) -> std::result::Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(hasher.hash_password(password.as_bytes(), &salt)?.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::services::test_support::fast_security;
    use crate::store::{DocumentStore, MemoryStore};

    fn credentials() -> (Arc<MemoryStore>, CredentialStore) {
        let store = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new(store.clone(), &fast_security()).unwrap();
        (store, credentials)
    }

    #[tokio::test]
    async fn test_register_assigns_monotonic_ids() {
        let (_, credentials) = credentials();
        let first = credentials.register("Ada", "ada@example.com", "secret1").await.unwrap();
        let second = credentials.register("Bob", "bob@example.com", "secret2").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_register_creates_empty_lists_and_hashes_password() {
        let (store, credentials) = credentials();
        let id = credentials.register("Ada", "ada@example.com", "secret1").await.unwrap();

        let user = store.find_user(id).await.unwrap().unwrap();
        assert!(user.created_events.is_empty());
        assert!(user.subscribed_events.is_empty());
        assert_eq!(user.role, UserRole::User);
        assert_ne!(user.password_hash, "secret1");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let (store, credentials) = credentials();
        credentials.register("Ada", "ada@example.com", "secret1").await.unwrap();

        let err = credentials
            .register("Other Ada", "ADA@example.com ", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // No second record was written.
        assert!(store.find_user(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_accepts_correct_password() {
        let (_, credentials) = credentials();
        let id = credentials.register("Ada", "ada@example.com", "secret1").await.unwrap();
        let verified = tokio_test::assert_ok!(credentials.verify(" Ada@Example.com", "secret1").await);
        assert_eq!(verified, id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_fail_identically() {
        let (_, credentials) = credentials();
        credentials.register("Ada", "ada@example.com", "secret1").await.unwrap();

        let wrong_password = credentials.verify("ada@example.com", "nope").await.unwrap_err();
        let unknown_email = credentials.verify("ghost@example.com", "secret1").await.unwrap_err();

        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }
}
