//! Build listing pages and manual build triggers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use super::{snap_details, AppState, Page};
use crate::error::{BuildsError, BuildsResult};
use crate::models::build::{BuildWindow, SnapBuild};
use crate::models::snap::{GithubRepo, SnapDetails};
use crate::services::build_service;
use crate::services::github_service::{GitHubOrg, GitHubUser};
use crate::session::{AuthSession, FlashCategory};

pub const BUILDS_PER_PAGE: usize = 15;

#[derive(Debug, Serialize)]
pub struct BuildsContext {
    pub snap_id: String,
    pub snap_name: String,
    pub snap_title: String,
    pub snap_builds_enabled: bool,
    pub snap_builds: Vec<SnapBuild>,
    pub total_builds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repository: Option<GithubRepo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaml_file_exists: Option<bool>,
    pub github_user: Option<GitHubUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_orgs: Option<Vec<GitHubOrg>>,
}

impl BuildsContext {
    fn new(details: SnapDetails) -> Self {
        Self {
            snap_id: details.snap_id,
            snap_name: details.snap_name,
            snap_title: details.title,
            snap_builds_enabled: false,
            snap_builds: Vec::new(),
            total_builds: 0,
            github_repository: None,
            yaml_file_exists: None,
            github_user: None,
            github_orgs: None,
        }
    }
}

/// Builds page: the build table when a repository is linked, the GitHub
/// connection form otherwise.
pub async fn get_snap_builds(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    mut session: AuthSession,
) -> BuildsResult<Page<BuildsContext>> {
    let details = snap_details(&state, &session, &snap_name).await?;

    // Sessions without package_upload_request fail here and get refreshed
    state
        .dashboard
        .get_package_upload_macaroon(&session.data, &snap_name, &["edge"])
        .await
        .map_err(|e| BuildsError::from_snap_lookup(&snap_name, e))?;

    let mut context = BuildsContext::new(details);

    match state.launchpad.get_snap_by_store_name(&context.snap_name).await? {
        Some(lp_snap) => {
            let token = session
                .github_token()
                .unwrap_or(state.config.github_snapcraft_user_token.as_str());
            let github = state.github.with_token(Some(token));

            if let Some(repo) = lp_snap.github_repository() {
                let yaml_location = github.get_snapcraft_yaml_location(&repo).await?;
                if yaml_location.is_none() {
                    session
                        .flash(
                            "This repository doesn't contain a snapcraft.yaml",
                            FlashCategory::Negative,
                        )
                        .await;
                }
                context.yaml_file_exists = Some(yaml_location.is_some());
                context.github_repository = Some(repo);
            }

            let page = build_service::get_builds(
                state.launchpad.as_ref(),
                &lp_snap,
                BuildWindow::first(BUILDS_PER_PAGE),
            )
            .await?;
            context.snap_builds_enabled = !page.snap_builds.is_empty();
            context.total_builds = page.total_builds;
            context.snap_builds = page.snap_builds;
        }
        None => {
            let github = state.github.with_token(session.github_token());
            context.github_user = github.get_user().await?;
            if context.github_user.is_some() {
                context.github_orgs = Some(github.get_orgs().await?);
            }
        }
    }

    Ok(Page {
        template: "publisher/builds.html",
        flashes: session.take_flashes().await,
        context,
    })
}

#[derive(Debug, Serialize)]
pub struct BuildContext {
    pub snap_id: String,
    pub snap_name: String,
    pub snap_title: String,
    pub snap_build: Option<SnapBuild>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_logs: Option<String>,
}

/// Single build page with its raw log.
pub async fn get_snap_build(
    State(state): State<AppState>,
    Path((snap_name, build_id)): Path<(String, String)>,
    mut session: AuthSession,
) -> BuildsResult<Page<BuildContext>> {
    let details = snap_details(&state, &session, &snap_name).await?;

    let mut context = BuildContext {
        snap_id: details.snap_id,
        snap_name: details.snap_name,
        snap_title: details.title,
        snap_build: None,
        raw_logs: None,
    };

    if let Some(build) = state
        .launchpad
        .get_snap_build(&context.snap_name, &build_id)
        .await?
    {
        context.raw_logs = state.launchpad.get_build_log(&build).await?;
        context.snap_build = Some(SnapBuild::from(&build));
    }

    Ok(Page {
        template: "publisher/build.html",
        flashes: session.take_flashes().await,
        context,
    })
}

#[derive(Debug, Deserialize)]
pub struct BuildsQuery {
    pub start: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct BuildsJson {
    pub snap_builds: Vec<SnapBuild>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_builds: Option<usize>,
}

/// Window of builds as JSON, for the page's "show more" control.
pub async fn get_snap_builds_json(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    Query(query): Query<BuildsQuery>,
    session: AuthSession,
) -> BuildsResult<Json<BuildsJson>> {
    let details = snap_details(&state, &session, &snap_name).await?;

    let window = match query.size {
        Some(size) => BuildWindow::from_start_size(query.start.unwrap_or(0), size),
        None => BuildWindow {
            start: query.start.unwrap_or(0),
            ..BuildWindow::first(BUILDS_PER_PAGE)
        },
    };

    let Some(lp_snap) = state.launchpad.get_snap_by_store_name(&details.snap_name).await? else {
        return Ok(Json(BuildsJson::default()));
    };

    let page = build_service::get_builds(state.launchpad.as_ref(), &lp_snap, window).await?;

    Ok(Json(BuildsJson {
        snap_builds: page.snap_builds,
        total_builds: Some(page.total_builds),
    }))
}

#[derive(Debug, Serialize)]
pub struct TriggerError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TriggerError>,
}

/// Request a new build, replacing any pending one.
pub async fn post_build(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    session: AuthSession,
) -> BuildsResult<Json<TriggerResponse>> {
    let account_snaps = state.dashboard.get_account_snaps(&session.data).await?;

    if !account_snaps.contains(&snap_name) {
        return Ok(Json(TriggerResponse {
            success: false,
            error: Some(TriggerError {
                kind: "FORBIDDEN",
                message: "You are not allowed to request builds for this snap",
            }),
        }));
    }

    match build_service::request_build(state.launchpad.as_ref(), &snap_name, "manual").await {
        Ok(()) => Ok(Json(TriggerResponse {
            success: true,
            error: None,
        })),
        Err(e) if e.is_timeout_or_not_found() => {
            tracing::warn!(snap_name = %snap_name, "Build request not accepted: {}", e);
            Ok(Json(TriggerResponse {
                success: false,
                error: None,
            }))
        }
        Err(e) => Err(e.into()),
    }
}
