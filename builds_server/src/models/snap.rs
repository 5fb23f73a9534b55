//! Snaps as seen by the dashboard and by Launchpad.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const GITHUB_URL_PREFIX: &str = "https://github.com/";

/// Snap metadata from the dashboard API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SnapDetails {
    pub snap_id: String,
    pub snap_name: String,
    #[serde(default)]
    pub title: String,
}

/// Snap recipe registered in Launchpad.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LaunchpadSnap {
    pub name: String,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub git_repository_url: Option<String>,
    pub self_link: String,
    #[serde(default)]
    pub builds_collection_link: String,
    #[serde(default)]
    pub pending_builds_collection_link: String,
}

impl LaunchpadSnap {
    /// The linked GitHub repository, if the recipe points at one.
    pub fn github_repository(&self) -> Option<GithubRepo> {
        self.git_repository_url
            .as_deref()?
            .strip_prefix(GITHUB_URL_PREFIX)?
            .parse()
            .ok()
    }

    pub fn is_linked_to(&self, git_url: &str) -> bool {
        self.git_repository_url.as_deref() == Some(git_url)
    }

    /// Recipes created before a store name was registered carry none.
    pub fn has_store_name(&self) -> bool {
        self.store_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GithubRepo {
    pub owner: String,
    pub name: String,
}

impl GithubRepo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn git_url(&self) -> String {
        format!("{GITHUB_URL_PREFIX}{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for GithubRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid repository {0:?}, expected owner/name")]
pub struct InvalidRepo(pub String);

impl FromStr for GithubRepo {
    type Err = InvalidRepo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(*owner, *name))
            }
            _ => Err(InvalidRepo(s.to_string())),
        }
    }
}

impl Serialize for GithubRepo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
