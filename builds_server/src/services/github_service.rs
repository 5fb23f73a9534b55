//! GitHub integration: webhook signatures, snapcraft.yaml lookups and push hooks.

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::snap::GithubRepo;

type HmacSha256 = Hmac<Sha256>;

/// Paths checked for a snapcraft.yaml, in order.
pub const SNAPCRAFT_YAML_LOCATIONS: [&str; 4] = [
    "snapcraft.yaml",
    ".snapcraft.yaml",
    "snap/snapcraft.yaml",
    "build-aux/snap/snapcraft.yaml",
];

/// Validate a GitHub webhook signature (X-Hub-Signature-256).
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("Webhook secret not configured, refusing signature");
        return false;
    }

    let Some(sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Read the snap `name` out of a snapcraft.yaml document.
pub fn parse_snapcraft_name(content: &str) -> Result<String, GitHubError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| GitHubError::InvalidYaml(e.to_string()))?;

    yaml.get("name")
        .and_then(|name| name.as_str())
        .map(str::to_string)
        .ok_or_else(|| GitHubError::InvalidYaml("snapcraft.yaml has no name".to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("invalid snapcraft.yaml: {0}")]
    InvalidYaml(String),
}

impl GitHubError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            Self::Status { status, .. } => Some(*status),
            Self::InvalidYaml(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GitHubUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GitHubOrg {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hook {
    pub id: u64,
    pub config: HookConfig,
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// The authenticated user, or `None` when GitHub rejects the token.
    async fn get_user(&self) -> Result<Option<GitHubUser>, GitHubError>;

    async fn get_orgs(&self) -> Result<Vec<GitHubOrg>, GitHubError>;

    /// Whether the user may push to the repository.
    async fn check_permissions_over_repo(&self, repo: &GithubRepo) -> Result<bool, GitHubError>;

    async fn get_snapcraft_yaml_location(
        &self,
        repo: &GithubRepo,
    ) -> Result<Option<String>, GitHubError>;

    async fn get_snapcraft_yaml_name(
        &self,
        repo: &GithubRepo,
        location: &str,
    ) -> Result<String, GitHubError>;

    async fn get_hook_by_url(&self, repo: &GithubRepo, url: &str) -> Result<Option<Hook>, GitHubError>;

    async fn create_hook(&self, repo: &GithubRepo, url: &str) -> Result<(), GitHubError>;

    async fn update_hook_url(
        &self,
        repo: &GithubRepo,
        hook_id: u64,
        url: &str,
    ) -> Result<(), GitHubError>;

    async fn remove_hook(&self, repo: &GithubRepo, hook_id: u64) -> Result<(), GitHubError>;
}

/// Hands out GitHub clients bound to a user or service token.
pub trait SourceHostFactory: Send + Sync {
    fn with_token(&self, token: Option<&str>) -> Arc<dyn SourceHost>;
}

pub struct GitHubConnector {
    client: Client,
    api_url: String,
    webhook_secret: String,
}

impl GitHubConnector {
    pub fn new(client: Client, api_url: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            webhook_secret: webhook_secret.into(),
        }
    }
}

impl SourceHostFactory for GitHubConnector {
    fn with_token(&self, token: Option<&str>) -> Arc<dyn SourceHost> {
        Arc::new(GitHubClient {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            webhook_secret: self.webhook_secret.clone(),
        })
    }
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    webhook_secret: String,
}

impl GitHubClient {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_url, path.trim_start_matches('/'));
        let request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "snap-builds");

        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, GitHubError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status != StatusCode::NOT_FOUND {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!("GitHub request {} failed: {} {}", path, status, text);
            crate::metrics::upstream_error("github");
        }
        Err(GitHubError::Status {
            status,
            path: path.to_string(),
        })
    }

    fn hook_payload(&self, url: &str) -> serde_json::Value {
        serde_json::json!({
            "url": url,
            "content_type": "json",
            "secret": self.webhook_secret,
            "insecure_ssl": "0",
        })
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn get_user(&self) -> Result<Option<GitHubUser>, GitHubError> {
        if self.token.is_none() {
            return Ok(None);
        }

        match self.send(self.request(Method::GET, "user"), "user").await {
            Ok(resp) => Ok(Some(resp.json().await?)),
            Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_orgs(&self) -> Result<Vec<GitHubOrg>, GitHubError> {
        let resp = self
            .send(self.request(Method::GET, "user/orgs"), "user/orgs")
            .await?;
        Ok(resp.json().await?)
    }

    async fn check_permissions_over_repo(&self, repo: &GithubRepo) -> Result<bool, GitHubError> {
        #[derive(Deserialize, Default)]
        struct Permissions {
            #[serde(default)]
            admin: bool,
            #[serde(default)]
            push: bool,
        }
        #[derive(Deserialize)]
        struct RepoBody {
            #[serde(default)]
            permissions: Permissions,
        }

        let path = format!("repos/{}/{}", repo.owner, repo.name);
        match self.send(self.request(Method::GET, &path), &path).await {
            Ok(resp) => {
                let body: RepoBody = resp.json().await?;
                Ok(body.permissions.push || body.permissions.admin)
            }
            Err(e) if matches!(e.status(), Some(StatusCode::NOT_FOUND | StatusCode::FORBIDDEN)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_snapcraft_yaml_location(
        &self,
        repo: &GithubRepo,
    ) -> Result<Option<String>, GitHubError> {
        for location in SNAPCRAFT_YAML_LOCATIONS {
            let path = format!("repos/{}/{}/contents/{location}", repo.owner, repo.name);
            match self.send(self.request(Method::GET, &path), &path).await {
                Ok(_) => return Ok(Some(location.to_string())),
                Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn get_snapcraft_yaml_name(
        &self,
        repo: &GithubRepo,
        location: &str,
    ) -> Result<String, GitHubError> {
        let path = format!("repos/{}/{}/contents/{location}", repo.owner, repo.name);
        let request = self
            .request(Method::GET, &path)
            .header("Accept", "application/vnd.github.raw+json");
        let content = self.send(request, &path).await?.text().await?;
        parse_snapcraft_name(&content)
    }

    async fn get_hook_by_url(&self, repo: &GithubRepo, url: &str) -> Result<Option<Hook>, GitHubError> {
        let path = format!("repos/{}/{}/hooks", repo.owner, repo.name);
        let request = self.request(Method::GET, &path).query(&[("per_page", "100")]);
        let hooks: Vec<Hook> = self.send(request, &path).await?.json().await?;

        Ok(hooks
            .into_iter()
            .find(|hook| hook.config.url.as_deref() == Some(url)))
    }

    async fn create_hook(&self, repo: &GithubRepo, url: &str) -> Result<(), GitHubError> {
        let path = format!("repos/{}/{}/hooks", repo.owner, repo.name);
        let body = serde_json::json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": self.hook_payload(url),
        });

        self.send(self.request(Method::POST, &path).json(&body), &path)
            .await?;
        tracing::info!(repo = %repo, url, "GitHub webhook created");
        Ok(())
    }

    async fn update_hook_url(
        &self,
        repo: &GithubRepo,
        hook_id: u64,
        url: &str,
    ) -> Result<(), GitHubError> {
        let path = format!("repos/{}/{}/hooks/{hook_id}", repo.owner, repo.name);
        let body = serde_json::json!({ "config": self.hook_payload(url) });

        self.send(self.request(Method::PATCH, &path).json(&body), &path)
            .await?;
        tracing::info!(repo = %repo, hook_id, url, "GitHub webhook updated");
        Ok(())
    }

    async fn remove_hook(&self, repo: &GithubRepo, hook_id: u64) -> Result<(), GitHubError> {
        let path = format!("repos/{}/{}/hooks/{hook_id}", repo.owner, repo.name);
        self.send(self.request(Method::DELETE, &path), &path).await?;
        tracing::info!(repo = %repo, hook_id, "GitHub webhook removed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
