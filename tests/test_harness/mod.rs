//! Shared helpers: an in-process router over the memory store and a small
//! request client built on `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use event_hub::config::Config;
use event_hub::store::MemoryStore;
use event_hub::{router, AppState};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn error_code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.security.argon2_memory_kib = 8;
        config.security.argon2_iterations = 1;
        config.security.argon2_parallelism = 1;

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), &config).expect("Failed to build app state");

        Self {
            router: router(state),
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router call failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Reply { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Reply {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register a user and return `(token, user_id)`.
    pub async fn register(&self, name: &str, email: &str) -> (String, i64) {
        let reply = self
            .post(
                "/api/auth/register",
                None,
                json!({ "name": name, "email": email, "password": "password1" }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.body);

        let token = reply.body["token"].as_str().expect("token").to_string();
        let user_id = reply.body["userId"].as_i64().expect("userId");
        (token, user_id)
    }

    /// Create an event and return its id.
    pub async fn create_event(&self, token: &str, title: &str, capacity: Option<u32>) -> i64 {
        let reply = self
            .post(
                "/api/events",
                Some(token),
                json!({
                    "title": title,
                    "description": "An evening of talks",
                    "category": "Tech",
                    "date": "2030-06-01T18:00:00Z",
                    "location": "Milano, Via Roma 1",
                    "maxParticipants": capacity,
                }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "create failed: {}", reply.body);
        reply.body["id"].as_i64().expect("event id")
    }

    pub async fn participants(&self, event_id: i64) -> Vec<i64> {
        let reply = self.get(&format!("/api/events/{}", event_id), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["participants"]
            .as_array()
            .expect("participants")
            .iter()
            .map(|p| p["id"].as_i64().expect("participant id"))
            .collect()
    }
}
