//! Dashboard API client for snap metadata and upload macaroons.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::snap::SnapDetails;
use crate::session::Session;

/// One entry of the dashboard's `error_list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiErrorEntry {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("dashboard returned {status} with {} error(s)", errors.len())]
    ErrorList {
        status: StatusCode,
        errors: Vec<ApiErrorEntry>,
    },
    #[error("dashboard returned {0}")]
    Status(StatusCode),
    #[error("dashboard request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl DashboardError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ErrorList { status, .. } | Self::Status(status) => Some(*status),
            Self::Http(e) => e.status(),
        }
    }

    /// The session's macaroons must be refreshed through a new login.
    pub fn needs_login(&self) -> bool {
        const REFRESH_CODES: [&str; 3] = [
            "macaroon-needs-refresh",
            "macaroon-authorization-required",
            "macaroon-permission-required",
        ];

        match self {
            Self::ErrorList { status, errors } => {
                *status == StatusCode::UNAUTHORIZED
                    || errors.iter().any(|e| REFRESH_CODES.contains(&e.code.as_str()))
            }
            Self::Status(status) => *status == StatusCode::UNAUTHORIZED,
            Self::Http(_) => false,
        }
    }
}

#[async_trait]
pub trait Dashboard: Send + Sync {
    async fn get_snap_info(
        &self,
        session: &Session,
        snap_name: &str,
    ) -> Result<SnapDetails, DashboardError>;

    /// Names of the snaps the publisher is a collaborator of.
    async fn get_account_snaps(&self, session: &Session) -> Result<HashSet<String>, DashboardError>;

    async fn get_package_upload_macaroon(
        &self,
        session: &Session,
        snap_name: &str,
        channels: &[&str],
    ) -> Result<String, DashboardError>;
}

/// HTTP client for the dashboard API.
pub struct DashboardClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorListBody {
    #[serde(default)]
    error_list: Vec<ApiErrorEntry>,
}

#[derive(Deserialize)]
struct AccountBody {
    #[serde(default)]
    snaps: HashMap<String, HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct MacaroonBody {
    macaroon: String,
}

impl DashboardClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        session: &Session,
    ) -> Result<T, DashboardError> {
        let resp = request
            .header("Authorization", authorization_header(session))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        crate::metrics::upstream_error("dashboard");
        match resp.json::<ErrorListBody>().await {
            Ok(body) if !body.error_list.is_empty() => Err(DashboardError::ErrorList {
                status,
                errors: body.error_list,
            }),
            _ => Err(DashboardError::Status(status)),
        }
    }
}

#[async_trait]
impl Dashboard for DashboardClient {
    async fn get_snap_info(
        &self,
        session: &Session,
        snap_name: &str,
    ) -> Result<SnapDetails, DashboardError> {
        let url = format!("{}snaps/info/{snap_name}", self.base_url);
        self.send(self.client.get(&url), session).await
    }

    async fn get_account_snaps(&self, session: &Session) -> Result<HashSet<String>, DashboardError> {
        let url = format!("{}account", self.base_url);
        let account: AccountBody = self.send(self.client.get(&url), session).await?;

        Ok(account
            .snaps
            .get("16")
            .map(|snaps| {
                snaps
                    .iter()
                    .filter(|(_, snap)| snap["status"].as_str() != Some("Revoked"))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_package_upload_macaroon(
        &self,
        session: &Session,
        snap_name: &str,
        channels: &[&str],
    ) -> Result<String, DashboardError> {
        let url = format!("{}acl/", self.base_url);
        let body = serde_json::json!({
            "permissions": ["package_upload"],
            "packages": [{ "name": snap_name, "series": "16" }],
            "channels": channels,
        });

        let resp: MacaroonBody = self.send(self.client.post(&url).json(&body), session).await?;
        Ok(resp.macaroon)
    }
}

fn authorization_header(session: &Session) -> String {
    format!(
        "Macaroon root=\"{}\", discharge=\"{}\"",
        session.macaroon_root, session.macaroon_discharge
    )
}
