//! Builds HTTP routes: dashboard pages, their JSON endpoints and GitHub webhooks.

pub mod builds;
pub mod repository;
pub mod webhook;


use std::sync::Arc;

use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::config::BuildsConfig;
use crate::error::{BuildsError, BuildsResult};
use crate::models::snap::SnapDetails;
use crate::services::dashboard_service::Dashboard;
use crate::services::github_service::SourceHostFactory;
use crate::services::launchpad_service::BuildFarm;
use crate::session::{AuthSession, Flash, SessionStore};

/// Shared state for builds route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BuildsConfig>,
    pub dashboard: Arc<dyn Dashboard>,
    pub launchpad: Arc<dyn BuildFarm>,
    pub github: Arc<dyn SourceHostFactory>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Build the builds service router.
pub fn builds_router(state: AppState) -> Router {
    Router::new()
        .route("/_status/check", get(health_check))
        // Dashboard pages and JSON
        .route(
            "/{snap_name}/builds",
            get(builds::get_snap_builds).post(repository::post_snap_builds),
        )
        .route("/{snap_name}/builds.json", get(builds::get_snap_builds_json))
        .route(
            "/{snap_name}/builds/validate-repo",
            get(repository::get_validate_repo),
        )
        .route("/{snap_name}/builds/trigger-build", post(builds::post_build))
        .route(
            "/{snap_name}/builds/disconnect",
            post(repository::post_disconnect_repo),
        )
        .route(
            "/{snap_name}/builds/update-webhook",
            post(repository::post_update_gh_webhooks),
        )
        .route("/{snap_name}/builds/{build_id}", get(builds::get_snap_build))
        // Webhooks
        .route("/{snap_name}/webhook/notify", post(webhook::post_snap_webhook))
        // Legacy hooks: the first segment is the GitHub owner
        .route(
            "/{snap_name}/{github_repo}/webhook/notify",
            post(webhook::post_repository_webhook),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

/// View model for a dashboard template.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub template: &'static str,
    pub flashes: Vec<Flash>,
    pub context: T,
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn builds_url(snap_name: &str) -> String {
    format!("/{snap_name}/builds")
}

/// Fetch the dashboard's view of a snap for the session's publisher.
pub async fn snap_details(
    state: &AppState,
    session: &AuthSession,
    snap_name: &str,
) -> BuildsResult<SnapDetails> {
    state
        .dashboard
        .get_snap_info(&session.data, snap_name)
        .await
        .map_err(|e| BuildsError::from_snap_lookup(snap_name, e))
}
