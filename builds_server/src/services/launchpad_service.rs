//! Launchpad API client: snap recipes, their builds and the builder queues.

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::build::{BuilderQueue, BuildersStatus, LaunchpadBuild};
use crate::models::snap::LaunchpadSnap;

const PRIMARY_ARCHIVE: &str = "ubuntu/+archive/primary";
const SNAPPY_SERIES: &str = "+snappy-series/16";
const BUILDS_PAGE_SIZE: &str = "300";

#[derive(Debug, thiserror::Error)]
pub enum LaunchpadError {
    #[error("launchpad request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("launchpad returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("no launchpad snap with store name {0}")]
    SnapNotFound(String),
}

impl LaunchpadError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) if e.is_timeout() => Some(StatusCode::REQUEST_TIMEOUT),
            Self::Http(e) => e.status(),
            Self::Status { status, .. } => Some(*status),
            Self::SnapNotFound(_) => Some(StatusCode::NOT_FOUND),
        }
    }

    /// Launchpad timed out or no longer knows the resource.
    pub fn is_timeout_or_not_found(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::REQUEST_TIMEOUT | StatusCode::NOT_FOUND)
        )
    }
}

#[async_trait]
pub trait BuildFarm: Send + Sync {
    async fn get_snap_by_store_name(
        &self,
        store_name: &str,
    ) -> Result<Option<LaunchpadSnap>, LaunchpadError>;

    /// Look up a recipe by its Launchpad name.
    async fn get_snap(&self, name: &str) -> Result<Option<LaunchpadSnap>, LaunchpadError>;

    /// Register a recipe building `git_url` and uploading to `store_name`.
    async fn create_snap(
        &self,
        store_name: &str,
        git_url: &str,
        macaroon: &str,
    ) -> Result<(), LaunchpadError>;

    async fn delete_snap(&self, store_name: &str) -> Result<(), LaunchpadError>;

    /// Delete any Launchpad resource by its link.
    async fn delete_resource(&self, link: &str) -> Result<(), LaunchpadError>;

    /// All builds of a recipe, newest first.
    async fn get_snap_builds(
        &self,
        snap: &LaunchpadSnap,
    ) -> Result<Vec<LaunchpadBuild>, LaunchpadError>;

    async fn get_snap_build(
        &self,
        store_name: &str,
        build_id: &str,
    ) -> Result<Option<LaunchpadBuild>, LaunchpadError>;

    async fn get_build_log(&self, build: &LaunchpadBuild) -> Result<Option<String>, LaunchpadError>;

    async fn get_builders_status(&self) -> Result<BuildersStatus, LaunchpadError>;

    async fn is_snap_building(&self, store_name: &str) -> Result<bool, LaunchpadError>;

    async fn cancel_snap_builds(&self, store_name: &str) -> Result<(), LaunchpadError>;

    async fn build_snap(&self, store_name: &str) -> Result<(), LaunchpadError>;
}

/// Launchpad recipe name for a repository: hex md5 of its URL.
pub fn launchpad_snap_name(git_url: &str) -> String {
    hex::encode(Md5::digest(git_url.as_bytes()))
}

/// OAuth 1.0 PLAINTEXT `Authorization` header value.
pub fn oauth_plaintext_header(
    consumer_key: &str,
    token: &str,
    token_secret: &str,
    timestamp: i64,
    nonce: &str,
) -> String {
    format!(
        "OAuth realm=\"https://api.launchpad.net/\", \
         oauth_consumer_key=\"{consumer_key}\", \
         oauth_token=\"{token}\", \
         oauth_signature_method=\"PLAINTEXT\", \
         oauth_signature=\"&{token_secret}\", \
         oauth_timestamp=\"{timestamp}\", \
         oauth_nonce=\"{nonce}\", \
         oauth_version=\"1.0\""
    )
}

/// Parse the `virt` section of `getBuildQueueSizes`: `{arch: [jobs, duration]}`.
pub fn parse_queue_sizes(body: &serde_json::Value) -> BuildersStatus {
    body["virt"]
        .as_object()
        .map(|archs| {
            archs
                .iter()
                .filter_map(|(arch, queue)| {
                    Some((
                        arch.clone(),
                        BuilderQueue {
                            pending_jobs: queue.get(0)?.as_u64().unwrap_or(0),
                            estimated_duration: queue.get(1)?.as_str()?.to_string(),
                        },
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    entries: Vec<T>,
    #[serde(default)]
    next_collection_link: Option<String>,
}

/// HTTP client for the Launchpad API, signed with the service account.
pub struct LaunchpadClient {
    client: Client,
    base_url: String,
    username: String,
    token: String,
    token_secret: String,
}

impl LaunchpadClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }

    fn url(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.base_url, link.trim_start_matches('/'))
        }
    }

    fn owner_link(&self) -> String {
        self.url(&format!("~{}", self.username))
    }

    fn authorization(&self) -> String {
        oauth_plaintext_header(
            &self.username,
            &self.token,
            &self.token_secret,
            chrono::Utc::now().timestamp(),
            &uuid::Uuid::new_v4().simple().to_string(),
        )
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, LaunchpadError> {
        let resp = request
            .header(AUTHORIZATION, self.authorization())
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(resp)
        } else {
            crate::metrics::upstream_error("launchpad");
            Err(LaunchpadError::Status {
                status: resp.status(),
                url: resp.url().to_string(),
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        link: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LaunchpadError> {
        let resp = self.execute(self.client.get(self.url(link)).query(query)).await?;
        Ok(resp.json().await?)
    }

    async fn get_optional<T: DeserializeOwned>(&self, link: &str) -> Result<Option<T>, LaunchpadError> {
        match self.get_json(link, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn named_op(&self, link: &str, form: &[(&str, String)]) -> Result<Response, LaunchpadError> {
        self.execute(self.client.post(self.url(link)).form(form)).await
    }

    async fn find_snap(&self, store_name: &str) -> Result<LaunchpadSnap, LaunchpadError> {
        self.get_snap_by_store_name(store_name)
            .await?
            .ok_or_else(|| LaunchpadError::SnapNotFound(store_name.to_string()))
    }

    async fn pending_builds(&self, store_name: &str) -> Result<Vec<LaunchpadBuild>, LaunchpadError> {
        let snap = self.find_snap(store_name).await?;
        let pending: Collection<LaunchpadBuild> =
            self.get_json(&snap.pending_builds_collection_link, &[]).await?;
        Ok(pending.entries)
    }
}

#[async_trait]
impl BuildFarm for LaunchpadClient {
    async fn get_snap_by_store_name(
        &self,
        store_name: &str,
    ) -> Result<Option<LaunchpadSnap>, LaunchpadError> {
        let owner = self.owner_link();
        let snaps: Collection<LaunchpadSnap> = self
            .get_json(
                "+snaps",
                &[
                    ("ws.op", "findByStoreName"),
                    ("owner", owner.as_str()),
                    ("store_name", store_name),
                ],
            )
            .await?;

        Ok(snaps
            .entries
            .into_iter()
            .find(|snap| snap.store_name.as_deref() == Some(store_name)))
    }

    async fn get_snap(&self, name: &str) -> Result<Option<LaunchpadSnap>, LaunchpadError> {
        self.get_optional(&format!("~{}/+snap/{name}", self.username))
            .await
    }

    async fn create_snap(
        &self,
        store_name: &str,
        git_url: &str,
        macaroon: &str,
    ) -> Result<(), LaunchpadError> {
        let name = launchpad_snap_name(git_url);
        let form = [
            ("ws.op", "new".to_string()),
            ("owner", self.owner_link()),
            ("name", name.clone()),
            ("store_name", store_name.to_string()),
            ("git_repository_url", git_url.to_string()),
            ("git_path", "HEAD".to_string()),
            ("auto_build", "false".to_string()),
            ("auto_build_archive", self.url(PRIMARY_ARCHIVE)),
            ("auto_build_pocket", "Updates".to_string()),
            ("store_upload", "true".to_string()),
            ("store_series", self.url(SNAPPY_SERIES)),
            ("store_channels", "[\"edge\"]".to_string()),
        ];
        let resp = self.named_op("+snaps", &form).await?;

        let snap_link = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| self.url(&format!("~{}/+snap/{name}", self.username)));

        self.named_op(
            &snap_link,
            &[
                ("ws.op", "completeAuthorization".to_string()),
                ("root_macaroon", macaroon.to_string()),
            ],
        )
        .await?;

        tracing::info!(store_name, git_url, lp_name = %name, "Launchpad snap created");
        Ok(())
    }

    async fn delete_snap(&self, store_name: &str) -> Result<(), LaunchpadError> {
        let snap = self.find_snap(store_name).await?;
        self.delete_resource(&snap.self_link).await?;
        tracing::info!(store_name, "Launchpad snap deleted");
        Ok(())
    }

    async fn delete_resource(&self, link: &str) -> Result<(), LaunchpadError> {
        self.execute(self.client.delete(self.url(link))).await?;
        Ok(())
    }

    async fn get_snap_builds(
        &self,
        snap: &LaunchpadSnap,
    ) -> Result<Vec<LaunchpadBuild>, LaunchpadError> {
        let mut builds = Vec::new();
        let mut page: Collection<LaunchpadBuild> = self
            .get_json(&snap.builds_collection_link, &[("ws.size", BUILDS_PAGE_SIZE)])
            .await?;

        loop {
            builds.append(&mut page.entries);
            match page.next_collection_link.take() {
                Some(next) => page = self.get_json(&next, &[]).await?,
                None => break,
            }
        }

        Ok(builds)
    }

    async fn get_snap_build(
        &self,
        store_name: &str,
        build_id: &str,
    ) -> Result<Option<LaunchpadBuild>, LaunchpadError> {
        let Some(snap) = self.get_snap_by_store_name(store_name).await? else {
            return Ok(None);
        };

        let link = format!("{}/+build/{build_id}", snap.self_link.trim_end_matches('/'));
        self.get_optional(&link).await
    }

    async fn get_build_log(&self, build: &LaunchpadBuild) -> Result<Option<String>, LaunchpadError> {
        let Some(log_url) = build.build_log_url.as_deref() else {
            return Ok(None);
        };

        let resp = self.client.get(log_url).send().await?;
        if !resp.status().is_success() {
            crate::metrics::upstream_error("launchpad");
            return Err(LaunchpadError::Status {
                status: resp.status(),
                url: log_url.to_string(),
            });
        }

        Ok(Some(resp.text().await?))
    }

    async fn get_builders_status(&self) -> Result<BuildersStatus, LaunchpadError> {
        let body: serde_json::Value = self
            .get_json("builders", &[("ws.op", "getBuildQueueSizes")])
            .await?;
        Ok(parse_queue_sizes(&body))
    }

    async fn is_snap_building(&self, store_name: &str) -> Result<bool, LaunchpadError> {
        Ok(!self.pending_builds(store_name).await?.is_empty())
    }

    async fn cancel_snap_builds(&self, store_name: &str) -> Result<(), LaunchpadError> {
        for build in self.pending_builds(store_name).await? {
            if !build.can_be_cancelled {
                continue;
            }
            self.named_op(&build.self_link, &[("ws.op", "cancel".to_string())])
                .await?;
            tracing::info!(store_name, build_id = build.id(), "Launchpad build cancelled");
        }
        Ok(())
    }

    async fn build_snap(&self, store_name: &str) -> Result<(), LaunchpadError> {
        let snap = self.find_snap(store_name).await?;
        self.named_op(
            &snap.self_link,
            &[
                ("ws.op", "requestBuilds".to_string()),
                ("archive", self.url(PRIMARY_ARCHIVE)),
                ("pocket", "Updates".to_string()),
            ],
        )
        .await?;

        tracing::info!(store_name, "Launchpad builds requested");
        Ok(())
    }
}
