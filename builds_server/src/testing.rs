//! In-memory fakes of the upstream services for unit and router tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::models::build::{BuilderQueue, BuildersStatus, LaunchpadBuild};
use crate::models::snap::{GithubRepo, LaunchpadSnap, SnapDetails};
use crate::services::dashboard_service::{ApiErrorEntry, Dashboard, DashboardError};
use crate::services::github_service::{
    parse_snapcraft_name, GitHubError, GitHubOrg, GitHubUser, Hook, HookConfig, SourceHost,
    SourceHostFactory, SNAPCRAFT_YAML_LOCATIONS,
};
use crate::services::launchpad_service::{launchpad_snap_name, BuildFarm, LaunchpadError};
use crate::session::Session;

/// Serves `router` on an ephemeral local port and returns its base URL,
/// ending in a slash.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}/")
}

/// Launchpad recipe for `store_name`, linked to `canonical/<store_name>`.
pub fn lp_snap(store_name: &str) -> LaunchpadSnap {
    let git_url = GithubRepo::new("canonical", store_name).git_url();
    let name = launchpad_snap_name(&git_url);
    let self_link = format!("https://lp.test/~build-bot/+snap/{name}");

    LaunchpadSnap {
        name,
        store_name: Some(store_name.to_string()),
        git_repository_url: Some(git_url),
        builds_collection_link: format!("{self_link}/builds"),
        pending_builds_collection_link: format!("{self_link}/pending_builds"),
        self_link,
    }
}

pub fn lp_build(id: &str, arch: &str, state: &str, upload: Option<&str>) -> LaunchpadBuild {
    serde_json::from_value(serde_json::json!({
        "self_link": format!("https://lp.test/~build-bot/+snap/toto/+build/{id}"),
        "arch_tag": arch,
        "datebuilt": null,
        "duration": null,
        "build_log_url": format!("https://lp.test/builds/{id}/buildlog.txt.gz"),
        "revision_id": "9f2c1e0",
        "title": format!("{arch} build of toto snap package"),
        "buildstate": state,
        "store_upload_status": upload,
        "can_be_cancelled": state == "Needs building",
    }))
    .unwrap()
}

#[derive(Default)]
struct FarmState {
    snaps: Vec<LaunchpadSnap>,
    builds: Vec<LaunchpadBuild>,
    building: bool,
    build_failure: Option<StatusCode>,
    calls: Vec<String>,
    builders_status_calls: usize,
}

#[derive(Default)]
pub struct FakeBuildFarm {
    state: Mutex<FarmState>,
}

impl FakeBuildFarm {
    pub fn with_snap(self, snap: LaunchpadSnap) -> Self {
        self.state.lock().unwrap().snaps.push(snap);
        self
    }

    pub fn set_builds(&self, builds: Vec<LaunchpadBuild>) {
        self.state.lock().unwrap().builds = builds;
    }

    pub fn set_building(&self, building: bool) {
        self.state.lock().unwrap().building = building;
    }

    /// Make `build_snap` fail with the given upstream status.
    pub fn fail_builds_with(&self, status: StatusCode) {
        self.state.lock().unwrap().build_failure = Some(status);
    }

    pub fn snaps(&self) -> Vec<LaunchpadSnap> {
        self.state.lock().unwrap().snaps.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn builders_status_calls(&self) -> usize {
        self.state.lock().unwrap().builders_status_calls
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BuildFarm for FakeBuildFarm {
    async fn get_snap_by_store_name(
        &self,
        store_name: &str,
    ) -> Result<Option<LaunchpadSnap>, LaunchpadError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .snaps
            .iter()
            .find(|snap| snap.store_name.as_deref() == Some(store_name))
            .cloned())
    }

    async fn get_snap(&self, name: &str) -> Result<Option<LaunchpadSnap>, LaunchpadError> {
        let state = self.state.lock().unwrap();
        Ok(state.snaps.iter().find(|snap| snap.name == name).cloned())
    }

    async fn create_snap(
        &self,
        store_name: &str,
        git_url: &str,
        _macaroon: &str,
    ) -> Result<(), LaunchpadError> {
        self.record(format!("create_snap:{store_name}:{git_url}"));
        let name = launchpad_snap_name(git_url);
        let self_link = format!("https://lp.test/~build-bot/+snap/{name}");

        self.state.lock().unwrap().snaps.push(LaunchpadSnap {
            name,
            store_name: Some(store_name.to_string()),
            git_repository_url: Some(git_url.to_string()),
            builds_collection_link: format!("{self_link}/builds"),
            pending_builds_collection_link: format!("{self_link}/pending_builds"),
            self_link,
        });
        Ok(())
    }

    async fn delete_snap(&self, store_name: &str) -> Result<(), LaunchpadError> {
        self.record(format!("delete_snap:{store_name}"));
        let mut state = self.state.lock().unwrap();
        let before = state.snaps.len();
        state
            .snaps
            .retain(|snap| snap.store_name.as_deref() != Some(store_name));
        if state.snaps.len() == before {
            return Err(LaunchpadError::SnapNotFound(store_name.to_string()));
        }
        Ok(())
    }

    async fn delete_resource(&self, link: &str) -> Result<(), LaunchpadError> {
        self.record(format!("delete_resource:{link}"));
        self.state
            .lock()
            .unwrap()
            .snaps
            .retain(|snap| snap.self_link != link);
        Ok(())
    }

    async fn get_snap_builds(
        &self,
        _snap: &LaunchpadSnap,
    ) -> Result<Vec<LaunchpadBuild>, LaunchpadError> {
        Ok(self.state.lock().unwrap().builds.clone())
    }

    async fn get_snap_build(
        &self,
        _store_name: &str,
        build_id: &str,
    ) -> Result<Option<LaunchpadBuild>, LaunchpadError> {
        let state = self.state.lock().unwrap();
        Ok(state.builds.iter().find(|b| b.id() == build_id).cloned())
    }

    async fn get_build_log(&self, build: &LaunchpadBuild) -> Result<Option<String>, LaunchpadError> {
        Ok(build.build_log_url.as_ref().map(|_| "build log".to_string()))
    }

    async fn get_builders_status(&self) -> Result<BuildersStatus, LaunchpadError> {
        self.state.lock().unwrap().builders_status_calls += 1;
        Ok(HashMap::from([(
            "amd64".to_string(),
            BuilderQueue {
                pending_jobs: 1,
                estimated_duration: "0:10:00".to_string(),
            },
        )]))
    }

    async fn is_snap_building(&self, store_name: &str) -> Result<bool, LaunchpadError> {
        self.record(format!("is_snap_building:{store_name}"));
        Ok(self.state.lock().unwrap().building)
    }

    async fn cancel_snap_builds(&self, store_name: &str) -> Result<(), LaunchpadError> {
        self.record(format!("cancel:{store_name}"));
        self.state.lock().unwrap().building = false;
        Ok(())
    }

    async fn build_snap(&self, store_name: &str) -> Result<(), LaunchpadError> {
        self.record(format!("build:{store_name}"));
        match self.state.lock().unwrap().build_failure {
            Some(status) => Err(LaunchpadError::Status {
                status,
                url: format!("https://lp.test/{store_name}"),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeGitHub {
    yaml: Vec<(String, String)>,
    push_access: bool,
    user: Option<GitHubUser>,
    failing_hooks: bool,
    hooks: Mutex<Vec<Hook>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGitHub {
    pub fn with_yaml(mut self, location: &str, content: &str) -> Self {
        self.yaml.push((location.to_string(), content.to_string()));
        self
    }

    pub fn with_push_access(mut self) -> Self {
        self.push_access = true;
        self
    }

    pub fn with_user(mut self, login: &str) -> Self {
        self.user = Some(GitHubUser {
            login: login.to_string(),
            name: None,
            avatar_url: None,
        });
        self
    }

    pub fn with_hook(self, id: u64, url: &str) -> Self {
        self.hooks.lock().unwrap().push(Hook {
            id,
            config: HookConfig {
                url: Some(url.to_string()),
            },
        });
        self
    }

    /// Make every hook mutation fail.
    pub fn failing_hooks(mut self) -> Self {
        self.failing_hooks = true;
        self
    }

    pub fn hooks(&self) -> Vec<Hook> {
        self.hooks.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn mutate_hooks(&self, call: String) -> Result<(), GitHubError> {
        self.calls.lock().unwrap().push(call.clone());
        if self.failing_hooks {
            return Err(GitHubError::Status {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                path: call,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceHost for FakeGitHub {
    async fn get_user(&self) -> Result<Option<GitHubUser>, GitHubError> {
        Ok(self.user.clone())
    }

    async fn get_orgs(&self) -> Result<Vec<GitHubOrg>, GitHubError> {
        Ok(vec![GitHubOrg {
            login: "canonical".to_string(),
            avatar_url: None,
        }])
    }

    async fn check_permissions_over_repo(&self, _repo: &GithubRepo) -> Result<bool, GitHubError> {
        Ok(self.push_access)
    }

    async fn get_snapcraft_yaml_location(
        &self,
        _repo: &GithubRepo,
    ) -> Result<Option<String>, GitHubError> {
        Ok(SNAPCRAFT_YAML_LOCATIONS
            .iter()
            .find(|location| self.yaml.iter().any(|(path, _)| path == *location))
            .map(|location| location.to_string()))
    }

    async fn get_snapcraft_yaml_name(
        &self,
        repo: &GithubRepo,
        location: &str,
    ) -> Result<String, GitHubError> {
        let (_, content) = self
            .yaml
            .iter()
            .find(|(path, _)| path == location)
            .ok_or_else(|| GitHubError::Status {
                status: StatusCode::NOT_FOUND,
                path: format!("repos/{repo}/contents/{location}"),
            })?;
        parse_snapcraft_name(content)
    }

    async fn get_hook_by_url(&self, _repo: &GithubRepo, url: &str) -> Result<Option<Hook>, GitHubError> {
        Ok(self
            .hooks
            .lock()
            .unwrap()
            .iter()
            .find(|hook| hook.config.url.as_deref() == Some(url))
            .cloned())
    }

    async fn create_hook(&self, repo: &GithubRepo, url: &str) -> Result<(), GitHubError> {
        self.mutate_hooks(format!("create_hook:{repo}:{url}"))?;
        let mut hooks = self.hooks.lock().unwrap();
        let id = hooks.iter().map(|hook| hook.id).max().unwrap_or(0) + 1;
        hooks.push(Hook {
            id,
            config: HookConfig {
                url: Some(url.to_string()),
            },
        });
        Ok(())
    }

    async fn update_hook_url(
        &self,
        _repo: &GithubRepo,
        hook_id: u64,
        url: &str,
    ) -> Result<(), GitHubError> {
        self.mutate_hooks(format!("update_hook:{hook_id}:{url}"))?;
        for hook in self.hooks.lock().unwrap().iter_mut() {
            if hook.id == hook_id {
                hook.config.url = Some(url.to_string());
            }
        }
        Ok(())
    }

    async fn remove_hook(&self, _repo: &GithubRepo, hook_id: u64) -> Result<(), GitHubError> {
        self.mutate_hooks(format!("remove_hook:{hook_id}"))?;
        self.hooks.lock().unwrap().retain(|hook| hook.id != hook_id);
        Ok(())
    }
}

/// Hands out the same [`FakeGitHub`] for every token, remembering the tokens.
pub struct FakeGitHubFactory {
    github: Arc<FakeGitHub>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl FakeGitHubFactory {
    pub fn new(github: Arc<FakeGitHub>) -> Self {
        Self {
            github,
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }
}

impl SourceHostFactory for FakeGitHubFactory {
    fn with_token(&self, token: Option<&str>) -> Arc<dyn SourceHost> {
        self.tokens.lock().unwrap().push(token.map(str::to_string));
        self.github.clone()
    }
}

#[derive(Default)]
pub struct FakeDashboard {
    snaps: HashMap<String, SnapDetails>,
    account_snaps: HashSet<String>,
    expired: bool,
}

impl FakeDashboard {
    /// A snap the publisher collaborates on.
    pub fn with_snap(mut self, snap_name: &str) -> Self {
        self = self.with_foreign_snap(snap_name);
        self.account_snaps.insert(snap_name.to_string());
        self
    }

    /// A snap visible to the publisher without being a collaborator.
    pub fn with_foreign_snap(mut self, snap_name: &str) -> Self {
        self.snaps.insert(
            snap_name.to_string(),
            SnapDetails {
                snap_id: format!("{snap_name}-id"),
                snap_name: snap_name.to_string(),
                title: format!("The {snap_name} snap"),
            },
        );
        self
    }

    /// Every call fails asking for a macaroon refresh.
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    fn check_session(&self) -> Result<(), DashboardError> {
        if self.expired {
            return Err(DashboardError::ErrorList {
                status: StatusCode::UNAUTHORIZED,
                errors: vec![ApiErrorEntry {
                    code: "macaroon-needs-refresh".to_string(),
                    message: "Expired macaroon".to_string(),
                }],
            });
        }
        Ok(())
    }

    fn snap(&self, snap_name: &str) -> Result<&SnapDetails, DashboardError> {
        self.snaps.get(snap_name).ok_or_else(|| DashboardError::ErrorList {
            status: StatusCode::NOT_FOUND,
            errors: vec![ApiErrorEntry {
                code: "resource-not-found".to_string(),
                message: format!("Snap not found for name={snap_name}"),
            }],
        })
    }
}

#[async_trait]
impl Dashboard for FakeDashboard {
    async fn get_snap_info(
        &self,
        _session: &Session,
        snap_name: &str,
    ) -> Result<SnapDetails, DashboardError> {
        self.check_session()?;
        self.snap(snap_name).cloned()
    }

    async fn get_account_snaps(&self, _session: &Session) -> Result<HashSet<String>, DashboardError> {
        self.check_session()?;
        Ok(self.account_snaps.clone())
    }

    async fn get_package_upload_macaroon(
        &self,
        _session: &Session,
        snap_name: &str,
        _channels: &[&str],
    ) -> Result<String, DashboardError> {
        self.check_session()?;
        self.snap(snap_name)?;
        Ok(format!("upload-macaroon-{snap_name}"))
    }
}
