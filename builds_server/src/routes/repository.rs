//! Linking, validating and unlinking a snap's GitHub repository.

use axum::extract::{Path, Query, State};
use axum::response::{Json, Redirect};
use axum::Form;
use serde::Deserialize;

use super::{builds_url, snap_details, AppState};
use crate::error::{BuildsError, BuildsResult};
use crate::models::snap::{GithubRepo, InvalidRepo};
use crate::models::validation::RepoValidation;
use crate::services::github_service::{GitHubError, SourceHost};
use crate::services::launchpad_service::launchpad_snap_name;
use crate::services::repository_service::validate_repo;
use crate::session::{AuthSession, FlashCategory};

fn parse_repo(value: &str) -> BuildsResult<GithubRepo> {
    value
        .parse()
        .map_err(|e: InvalidRepo| BuildsError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ValidateRepoQuery {
    pub repo: String,
}

/// Check a candidate repository's snapcraft.yaml before linking it.
pub async fn get_validate_repo(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    Query(query): Query<ValidateRepoQuery>,
    session: AuthSession,
) -> BuildsResult<Json<RepoValidation>> {
    let details = snap_details(&state, &session, &snap_name).await?;
    let repo = parse_repo(&query.repo)?;

    let github = state.github.with_token(session.github_token());
    let validation = validate_repo(github.as_ref(), &details.snap_name, &repo).await?;

    Ok(Json(validation))
}

#[derive(Debug, Deserialize)]
pub struct ConnectRepoForm {
    pub github_repository: String,
}

/// Link a GitHub repository to the snap and register its push webhook.
pub async fn post_snap_builds(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    mut session: AuthSession,
    Form(form): Form<ConnectRepoForm>,
) -> BuildsResult<Redirect> {
    let details = snap_details(&state, &session, &snap_name).await?;
    let redirect = Redirect::to(&builds_url(&snap_name));

    // Admins that are not collaborators may not change the snap
    let account_snaps = state.dashboard.get_account_snaps(&session.data).await?;
    if !account_snaps.contains(&snap_name) {
        session
            .flash(
                "You do not have permissions to modify this Snap",
                FlashCategory::Negative,
            )
            .await;
        return Ok(redirect);
    }

    let repo = parse_repo(&form.github_repository)?;
    let github = state.github.with_token(session.github_token());

    if !github.check_permissions_over_repo(&repo).await? {
        session
            .flash(
                "Your GitHub account doesn't have permissions in the repository",
                FlashCategory::Negative,
            )
            .await;
        return Ok(redirect);
    }

    let validation = validate_repo(github.as_ref(), &snap_name, &repo).await?;
    if let Some(message) = validation.error_message() {
        session.flash(message, FlashCategory::Negative).await;
        return Ok(redirect);
    }

    let git_url = repo.git_url();

    match state.launchpad.get_snap_by_store_name(&details.snap_name).await? {
        None => link_repository(&state, &mut session, github.as_ref(), &snap_name, &repo).await?,
        Some(lp_snap) if !lp_snap.is_linked_to(&git_url) => {
            return Err(BuildsError::Conflict(format!(
                "Snap {snap_name} already has a build repository associated"
            )));
        }
        Some(_) => {}
    }

    Ok(redirect)
}

async fn link_repository(
    state: &AppState,
    session: &mut AuthSession,
    github: &dyn SourceHost,
    snap_name: &str,
    repo: &GithubRepo,
) -> BuildsResult<()> {
    let git_url = repo.git_url();
    let lp_name = launchpad_snap_name(&git_url);

    if let Some(existing) = state.launchpad.get_snap(&lp_name).await? {
        if existing.has_store_name() {
            session
                .flash(
                    format!(
                        "The specified repository is being used by another snap: {}",
                        existing.store_name.as_deref().unwrap_or_default()
                    ),
                    FlashCategory::Negative,
                )
                .await;
            return Ok(());
        }

        // TODO: drop once Launchpad no longer holds recipes without a store name
        tracing::warn!(lp_name = %lp_name, git_url = %git_url, "Replacing Launchpad snap without store name");
        state.launchpad.delete_resource(&existing.self_link).await?;
    }

    let macaroon = state
        .dashboard
        .get_package_upload_macaroon(&session.data, snap_name, &["edge"])
        .await?;
    state
        .launchpad
        .create_snap(snap_name, &git_url, &macaroon)
        .await?;

    session
        .flash(
            "The GitHub repository was linked correctly.",
            FlashCategory::Positive,
        )
        .await;

    // The webhook also triggers the first build
    let hook_url = state.config.webhook_url(snap_name);
    if let Err(e) = ensure_hook(github, repo, &hook_url).await {
        tracing::warn!(repo = %repo, "Could not create GitHub webhook: {}", e);
        session
            .flash(
                "The GitHub Webhook could not be created. Please trigger a new build manually.",
                FlashCategory::Caution,
            )
            .await;
    }

    Ok(())
}

async fn ensure_hook(github: &dyn SourceHost, repo: &GithubRepo, url: &str) -> Result<(), GitHubError> {
    if github.get_hook_by_url(repo, url).await?.is_none() {
        github.create_hook(repo, url).await?;
    }
    Ok(())
}

/// Unlink the repository: delete the Launchpad recipe and, when possible,
/// the GitHub webhook.
pub async fn post_disconnect_repo(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    session: AuthSession,
) -> BuildsResult<Redirect> {
    let details = snap_details(&state, &session, &snap_name).await?;

    let Some(lp_snap) = state.launchpad.get_snap_by_store_name(&snap_name).await? else {
        return Err(BuildsError::NotFound(format!(
            "Snap {snap_name} has no linked repository"
        )));
    };
    state.launchpad.delete_snap(&details.snap_name).await?;

    if let (Some(token), Some(repo)) = (session.github_token(), lp_snap.github_repository()) {
        let github = state.github.with_token(Some(token));
        let hook_url = state.config.webhook_url(&snap_name);

        if let Err(e) = remove_hook(github.as_ref(), &repo, &hook_url).await {
            tracing::debug!(repo = %repo, "GitHub webhook not removed: {}", e);
        }
    }

    Ok(Redirect::to(&builds_url(&snap_name)))
}

async fn remove_hook(github: &dyn SourceHost, repo: &GithubRepo, url: &str) -> Result<(), GitHubError> {
    if let Some(hook) = github.get_hook_by_url(repo, url).await? {
        github.remove_hook(repo, hook.id).await?;
    }
    Ok(())
}

/// Repoint a webhook registered against the legacy build host.
pub async fn post_update_gh_webhooks(
    State(state): State<AppState>,
    Path(snap_name): Path<String>,
    session: AuthSession,
) -> BuildsResult<Redirect> {
    let details = snap_details(&state, &session, &snap_name).await?;

    let repo = state
        .launchpad
        .get_snap_by_store_name(&details.snap_name)
        .await?
        .and_then(|lp_snap| lp_snap.github_repository())
        .ok_or_else(|| {
            BuildsError::NotFound(format!("Snap {snap_name} has no linked GitHub repository"))
        })?;

    let github = state.github.with_token(session.github_token());
    let old_url = state.config.legacy_webhook_url(&repo.owner, &repo.name);

    if let Some(hook) = github.get_hook_by_url(&repo, &old_url).await? {
        github
            .update_hook_url(&repo, hook.id, &state.config.webhook_url(&snap_name))
            .await?;
    }

    Ok(Redirect::to(&builds_url(&snap_name)))
}
