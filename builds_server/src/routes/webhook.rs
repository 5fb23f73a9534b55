//! GitHub push webhook: rebuilds a snap when its default branch moves.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::AppState;
use crate::error::BuildsResult;
use crate::models::snap::GithubRepo;
use crate::services::github_service::validate_signature;
use crate::services::launchpad_service::launchpad_snap_name;
use crate::services::{build_service, repository_service};

#[derive(Debug, Deserialize)]
pub struct PushOwner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct PushRepository {
    pub html_url: String,
    pub name: String,
    pub default_branch: String,
    pub owner: PushOwner,
}

#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
}

impl PushEvent {
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

/// Push webhook registered for a snap.
pub async fn post_snap_webhook(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> BuildsResult<Response> {
    handle_push(&state, Some(&snap_name), &headers, &body).await
}

/// Push webhook registered per repository by the legacy build host.
pub async fn post_repository_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> BuildsResult<Response> {
    handle_push(&state, None, &headers, &body).await
}

fn reply(status: StatusCode, message: impl Into<String>, outcome: &str) -> BuildsResult<Response> {
    crate::metrics::webhook_received(outcome);
    Ok((status, message.into()).into_response())
}

async fn handle_push(
    state: &AppState,
    snap_name: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> BuildsResult<Response> {
    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");
    if event_type == "ping" {
        tracing::info!("Received GitHub ping webhook");
        return reply(StatusCode::OK, "", "ping");
    }

    let event: PushEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                format!("Invalid push payload: {e}"),
                "invalid_payload",
            );
        }
    };
    let repo_url = event.repository.html_url.as_str();

    if event.repository.default_branch != event.branch() {
        tracing::debug!(repo = repo_url, branch = event.branch(), "Ignoring push outside default branch");
        return reply(
            StatusCode::OK,
            "The push event is not for the default branch",
            "ignored_branch",
        );
    }

    let lp_snap = match snap_name {
        Some(name) => state.launchpad.get_snap_by_store_name(name).await?,
        None => state.launchpad.get_snap(&launchpad_snap_name(repo_url)).await?,
    };
    let Some(lp_snap) = lp_snap else {
        return reply(
            StatusCode::NOT_FOUND,
            "No snap is built from this repository",
            "unknown_snap",
        );
    };

    if !lp_snap.is_linked_to(repo_url) {
        return reply(
            StatusCode::FORBIDDEN,
            "The repository does not match the one used by this Snap",
            "repository_mismatch",
        );
    }

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !validate_signature(&state.config.github_webhook_secret, body, signature) {
        tracing::warn!(repo = repo_url, "Webhook signature validation failed");
        return reply(StatusCode::FORBIDDEN, "Invalid secret", "invalid_signature");
    }

    let Some(store_name) = lp_snap.store_name.as_deref().filter(|name| !name.is_empty()) else {
        return reply(
            StatusCode::NOT_FOUND,
            "No snap is built from this repository",
            "unknown_snap",
        );
    };

    let github = state
        .github
        .with_token(Some(state.config.github_snapcraft_user_token.as_str()));
    let repo = GithubRepo::new(
        event.repository.owner.login.as_str(),
        event.repository.name.as_str(),
    );
    let validation = repository_service::validate_repo(github.as_ref(), store_name, &repo).await?;
    if let Some(message) = validation.error_message() {
        return reply(StatusCode::BAD_REQUEST, message, "invalid_repository");
    }

    build_service::request_build(state.launchpad.as_ref(), store_name, "webhook").await?;

    crate::metrics::webhook_received("build_requested");
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_strips_ref_prefix() {
        let event: PushEvent = serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/main",
            "repository": {
                "html_url": "https://github.com/canonical/toto",
                "name": "toto",
                "default_branch": "main",
                "owner": { "login": "canonical" },
            },
        }))
        .unwrap();
        assert_eq!(event.branch(), "main");
    }
}
