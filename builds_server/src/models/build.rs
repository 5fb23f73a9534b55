//! Launchpad snap builds and their dashboard view.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::status::{reconcile, BuildFarmState, CombinedStatus, UploadState};

/// A snap build as returned by the Launchpad API.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchpadBuild {
    pub self_link: String,
    pub arch_tag: String,
    #[serde(default)]
    pub datebuilt: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub build_log_url: Option<String>,
    #[serde(default)]
    pub revision_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub buildstate: BuildFarmState,
    #[serde(default)]
    pub store_upload_status: Option<UploadState>,
    #[serde(default)]
    pub can_be_cancelled: bool,
}

impl LaunchpadBuild {
    /// Build id: the trailing segment of the resource link.
    pub fn id(&self) -> &str {
        self.self_link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn status(&self) -> CombinedStatus {
        reconcile(&self.buildstate, self.store_upload_status.as_ref())
    }
}

/// Build row rendered by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapBuild {
    pub id: String,
    pub arch_tag: String,
    pub datebuilt: Option<String>,
    pub duration: Option<String>,
    pub logs: Option<String>,
    pub revision_id: Option<String>,
    pub status: CombinedStatus,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_time: Option<String>,
}

impl From<&LaunchpadBuild> for SnapBuild {
    fn from(build: &LaunchpadBuild) -> Self {
        let status = build.status();
        crate::metrics::build_status_reconciled(status.as_str());

        Self {
            id: build.id().to_string(),
            arch_tag: build.arch_tag.clone(),
            datebuilt: build.datebuilt.clone(),
            duration: build.duration.clone(),
            logs: build.build_log_url.clone(),
            revision_id: build.revision_id.clone(),
            status,
            title: build.title.clone(),
            queue_time: None,
        }
    }
}

/// One page of builds plus the count of all builds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildsPage {
    pub total_builds: usize,
    pub snap_builds: Vec<SnapBuild>,
}

/// Queue of one builder architecture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuilderQueue {
    pub pending_jobs: u64,
    pub estimated_duration: String,
}

/// Builder queues keyed by architecture tag.
pub type BuildersStatus = HashMap<String, BuilderQueue>;

/// Window of builds selected by `start`/`size` query parameters.
///
/// `size` is the exclusive end index, not a length. Negative bounds count
/// back from the end of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildWindow {
    pub start: i64,
    pub end: i64,
}

impl BuildWindow {
    pub fn first(count: usize) -> Self {
        Self {
            start: 0,
            end: i64::try_from(count).unwrap_or(i64::MAX),
        }
    }

    pub fn from_start_size(start: i64, size: i64) -> Self {
        Self { start, end: size }
    }

    pub fn apply<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len();
        let end = resolve_bound(self.end, len);
        let start = resolve_bound(self.start, len).min(end);
        &items[start..end]
    }
}

fn resolve_bound(bound: i64, len: usize) -> usize {
    if bound < 0 {
        let back = usize::try_from(bound.unsigned_abs()).unwrap_or(usize::MAX);
        len.saturating_sub(back)
    } else {
        usize::try_from(bound).unwrap_or(usize::MAX).min(len)
    }
}
