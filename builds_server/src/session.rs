//! Publisher sessions and flash messages.
//!
//! The login flow lives elsewhere and writes sessions into a [`SessionStore`];
//! this service only reads them, keyed by the `session` cookie, and queues
//! flash messages on them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Positive,
    Negative,
    Caution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub message: String,
    pub category: FlashCategory,
}

/// Data held for a logged-in publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Dashboard root macaroon.
    pub macaroon_root: String,
    /// Dashboard discharge macaroon.
    pub macaroon_discharge: String,
    /// GitHub OAuth token, once the publisher connected GitHub.
    #[serde(default)]
    pub github_auth_secret: Option<String>,
    #[serde(default)]
    pub flashes: Vec<Flash>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Option<Session>;
    async fn save(&self, id: &str, session: Session);
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn save(&self, id: &str, session: Session) {
        self.sessions.write().await.insert(id.to_string(), session);
    }
}

/// Session of the request's publisher; requests without one are sent to login.
pub struct AuthSession {
    pub id: String,
    pub data: Session,
    store: Arc<dyn SessionStore>,
}

impl AuthSession {
    pub fn github_token(&self) -> Option<&str> {
        self.data
            .github_auth_secret
            .as_deref()
            .filter(|token| !token.is_empty())
    }

    pub async fn flash(&mut self, message: impl Into<String>, category: FlashCategory) {
        self.data.flashes.push(Flash {
            message: message.into(),
            category,
        });
        self.store.save(&self.id, self.data.clone()).await;
    }

    /// Drain queued flash messages for rendering.
    pub async fn take_flashes(&mut self) -> Vec<Flash> {
        if self.data.flashes.is_empty() {
            return Vec::new();
        }
        let flashes = std::mem::take(&mut self.data.flashes);
        self.store.save(&self.id, self.data.clone()).await;
        flashes
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let login = || Redirect::to(&format!("/login?next={next}")).into_response();

        let Some(id) = session_id(parts) else {
            return Err(login());
        };

        match state.sessions.load(&id).await {
            Some(data) => Ok(Self {
                id,
                data,
                store: state.sessions.clone(),
            }),
            None => {
                tracing::debug!("Unknown session, redirecting to login");
                Err(login())
            }
        }
    }
}

fn session_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
