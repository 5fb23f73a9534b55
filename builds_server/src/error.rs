//! Error taxonomy of the builds service and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;

use crate::services::dashboard_service::{ApiErrorEntry, DashboardError};
use crate::services::github_service::GitHubError;
use crate::services::launchpad_service::LaunchpadError;

#[derive(Debug, thiserror::Error)]
pub enum BuildsError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error(transparent)]
    Launchpad(#[from] LaunchpadError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

pub type BuildsResult<T> = Result<T, BuildsError>;

#[derive(Serialize)]
struct ErrorBody {
    error: bool,
    message: String,
}

#[derive(Serialize)]
struct ErrorListBody {
    error: bool,
    errors: Vec<ApiErrorEntry>,
}

impl BuildsError {
    /// Turn a dashboard 404 into a snap-specific not found.
    pub fn from_snap_lookup(snap_name: &str, err: DashboardError) -> Self {
        if err.status() == Some(StatusCode::NOT_FOUND) {
            BuildsError::NotFound(format!("No snap named {snap_name}"))
        } else {
            BuildsError::Dashboard(err)
        }
    }
}

impl IntoResponse for BuildsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            BuildsError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            BuildsError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            BuildsError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            BuildsError::Dashboard(err) if err.needs_login() => {
                tracing::info!("Dashboard session expired: {}", err);
                return Redirect::to("/login").into_response();
            }
            BuildsError::Dashboard(DashboardError::ErrorList { status, errors }) => {
                tracing::warn!("Dashboard returned {} with errors {:?}", status, errors);
                let body = ErrorListBody {
                    error: true,
                    errors,
                };
                return (StatusCode::BAD_GATEWAY, Json(body)).into_response();
            }
            BuildsError::Dashboard(err) => {
                tracing::error!("Dashboard error: {}", err);
                (StatusCode::BAD_GATEWAY, "Dashboard API error".to_string())
            }
            BuildsError::Launchpad(err) => {
                tracing::error!("Launchpad error: {}", err);
                (StatusCode::BAD_GATEWAY, "Launchpad API error".to_string())
            }
            BuildsError::GitHub(err) => {
                tracing::error!("GitHub error: {}", err);
                (StatusCode::BAD_GATEWAY, "GitHub API error".to_string())
            }
        };

        let body = Json(ErrorBody {
            error: true,
            message,
        });

        (status, body).into_response()
    }
}
