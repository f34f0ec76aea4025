//! Event Hub API: account registration and login, bearer-token sessions,
//! user profiles, and the participation relation between users and events.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod timestamps;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::services::{
    CascadeCoordinator, CredentialStore, EventCatalog, NotificationService, RosterManager,
    TokenIssuer, UserDirectory,
};
use crate::store::SharedStore;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenIssuer>,
    pub directory: Arc<UserDirectory>,
    pub roster: Arc<RosterManager>,
    pub catalog: Arc<EventCatalog>,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    pub fn new(store: SharedStore, config: &Config) -> anyhow::Result<Self> {
        let tokens = TokenIssuer::from_config(config)?;
        let credentials = CredentialStore::new(store.clone(), &config.security)?;
        let notifications = NotificationService::new(store.clone());
        let cascade = CascadeCoordinator::new(store.clone());

        Ok(Self {
            credentials: Arc::new(credentials),
            tokens: Arc::new(tokens),
            directory: Arc::new(UserDirectory::new(store.clone(), cascade)),
            roster: Arc::new(RosterManager::new(store.clone(), notifications.clone())),
            catalog: Arc::new(EventCatalog::new(store)),
            notifications: Arc::new(notifications),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
