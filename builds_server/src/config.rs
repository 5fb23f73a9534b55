//! Builds service configuration, loaded from environment variables.

#[derive(Clone, Debug)]
pub struct BuildsConfig {
    /// Dashboard (package metadata) API base URL, with trailing slash.
    pub dashboard_api_url: String,
    /// Launchpad API base URL, with trailing slash.
    pub launchpad_api_url: String,
    /// Launchpad account that owns the snap recipes.
    pub launchpad_username: String,
    /// Launchpad OAuth access token.
    pub launchpad_token: String,
    /// Launchpad OAuth access token secret.
    pub launchpad_token_secret: String,
    /// GitHub API base URL, with trailing slash.
    pub github_api_url: String,
    /// Service-wide GitHub token used when the session has none.
    pub github_snapcraft_user_token: String,
    /// Shared secret for GitHub webhook HMAC signatures.
    pub github_webhook_secret: String,
    /// Host that push webhooks are registered against.
    pub webhook_base_url: String,
    /// Host that older webhooks were registered against.
    pub legacy_webhook_base_url: String,
    /// Timeout in seconds for outbound API calls.
    pub http_timeout_secs: u64,
}

impl BuildsConfig {
    pub fn from_env() -> Self {
        let dashboard_api_url = base_url_var(
            "DASHBOARD_API_URL",
            "https://dashboard.snapcraft.io/dev/api/",
        );
        let launchpad_api_url = base_url_var("LP_API_URL", "https://api.launchpad.net/devel/");
        let launchpad_username = std::env::var("LP_API_USERNAME").unwrap_or_default();
        let launchpad_token = std::env::var("LP_API_TOKEN").unwrap_or_default();
        let launchpad_token_secret = std::env::var("LP_API_TOKEN_SECRET").unwrap_or_default();
        let github_api_url = base_url_var("GITHUB_API_URL", "https://api.github.com/");
        let github_snapcraft_user_token =
            std::env::var("GITHUB_SNAPCRAFT_USER_TOKEN").unwrap_or_default();
        let github_webhook_secret = std::env::var("GITHUB_WEBHOOK_SECRET").unwrap_or_default();
        let webhook_base_url = std::env::var("WEBHOOK_BASE_URL")
            .unwrap_or_else(|_| "https://snapcraft.io".to_string())
            .trim_end_matches('/')
            .to_string();
        let legacy_webhook_base_url = std::env::var("LEGACY_WEBHOOK_BASE_URL")
            .unwrap_or_else(|_| "https://build.snapcraft.io".to_string())
            .trim_end_matches('/')
            .to_string();
        let http_timeout_secs = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        if launchpad_username.is_empty() || launchpad_token.is_empty() {
            tracing::warn!("LP_API_USERNAME/LP_API_TOKEN not set -- Launchpad calls will be rejected");
        }
        if github_webhook_secret.is_empty() {
            tracing::warn!("GITHUB_WEBHOOK_SECRET not set -- every push webhook will be refused");
        }
        if github_snapcraft_user_token.is_empty() {
            tracing::warn!("GITHUB_SNAPCRAFT_USER_TOKEN not set -- webhook repo validation is anonymous");
        }

        Self {
            dashboard_api_url,
            launchpad_api_url,
            launchpad_username,
            launchpad_token,
            launchpad_token_secret,
            github_api_url,
            github_snapcraft_user_token,
            github_webhook_secret,
            webhook_base_url,
            legacy_webhook_base_url,
            http_timeout_secs,
        }
    }

    /// Webhook URL registered on GitHub for a snap.
    pub fn webhook_url(&self, snap_name: &str) -> String {
        format!("{}/{snap_name}/webhook/notify", self.webhook_base_url)
    }

    /// Webhook URL used by the retired build service for a repository.
    pub fn legacy_webhook_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{owner}/{repo}/webhook/notify", self.legacy_webhook_base_url)
    }
}

fn base_url_var(name: &str, default: &str) -> String {
    let mut url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
impl BuildsConfig {
    pub fn for_tests() -> Self {
        Self {
            dashboard_api_url: "http://dashboard.test/".to_string(),
            launchpad_api_url: "http://launchpad.test/devel/".to_string(),
            launchpad_username: "build-bot".to_string(),
            launchpad_token: "token".to_string(),
            launchpad_token_secret: "secret".to_string(),
            github_api_url: "http://github.test/".to_string(),
            github_snapcraft_user_token: "snapcraft-token".to_string(),
            github_webhook_secret: "hook-secret".to_string(),
            webhook_base_url: "https://snapcraft.io".to_string(),
            legacy_webhook_base_url: "https://build.snapcraft.io".to_string(),
            http_timeout_secs: 5,
        }
    }
}
