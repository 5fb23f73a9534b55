//! Build status reconciliation.
//!
//! Launchpad reports two independent states for a snap build: the build
//! farm lifecycle (`buildstate`) and the store upload (`store_upload_status`).
//! The dashboard shows a single label, computed here at read time.

use serde::{Deserialize, Serialize};

/// Launchpad `buildstate` value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum BuildFarmState {
    NeedsBuilding,
    CurrentlyBuilding,
    GatheringBuildOutput,
    UploadingBuild,
    SuccessfullyBuilt,
    FailedToBuild,
    DependencyWait,
    ChrootProblem,
    SupersededSource,
    FailedToUpload,
    CancellingBuild,
    CancelledBuild,
    Unknown(String),
}

impl BuildFarmState {
    pub fn parse(value: &str) -> Self {
        match value {
            "Needs building" => Self::NeedsBuilding,
            "Currently building" => Self::CurrentlyBuilding,
            "Gathering build output" => Self::GatheringBuildOutput,
            "Uploading build" => Self::UploadingBuild,
            "Successfully built" => Self::SuccessfullyBuilt,
            "Failed to build" => Self::FailedToBuild,
            "Dependency wait" => Self::DependencyWait,
            "Chroot problem" => Self::ChrootProblem,
            "Build for superseded Source" => Self::SupersededSource,
            "Failed to upload" => Self::FailedToUpload,
            "Cancelling build" => Self::CancellingBuild,
            "Cancelled build" => Self::CancelledBuild,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Waiting for a builder.
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::NeedsBuilding)
    }
}

impl From<String> for BuildFarmState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// Launchpad `store_upload_status` value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum UploadState {
    Unscheduled,
    Pending,
    FailedToUpload,
    FailedToRelease,
    Uploaded,
    Unknown(String),
}

impl UploadState {
    pub fn parse(value: &str) -> Self {
        match value {
            "Unscheduled" => Self::Unscheduled,
            "Pending" => Self::Pending,
            "Failed to upload" => Self::FailedToUpload,
            "Failed to release to channels" => Self::FailedToRelease,
            "Uploaded" => Self::Uploaded,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for UploadState {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// Label shown by the dashboard for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedStatus {
    BuildingSoon,
    InProgress,
    FailedToBuild,
    Cancelled,
    WontRelease,
    ReleasingSoon,
    Released,
    ReleaseFailed,
    Unknown,
}

impl CombinedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildingSoon => "building_soon",
            Self::InProgress => "in_progress",
            Self::FailedToBuild => "failed_to_build",
            Self::Cancelled => "cancelled",
            Self::WontRelease => "wont_release",
            Self::ReleasingSoon => "releasing_soon",
            Self::Released => "released",
            Self::ReleaseFailed => "release_failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Combine a build farm state and an optional upload state into one label.
///
/// Build failures dominate, then cancellation, then the in-flight states.
/// Only a successful build looks at the upload state; a missing upload
/// state there means no upload was scheduled.
pub fn reconcile(farm: &BuildFarmState, upload: Option<&UploadState>) -> CombinedStatus {
    use BuildFarmState as F;

    match farm {
        F::FailedToBuild
        | F::DependencyWait
        | F::ChrootProblem
        | F::SupersededSource
        | F::FailedToUpload => CombinedStatus::FailedToBuild,
        F::CancellingBuild | F::CancelledBuild => CombinedStatus::Cancelled,
        F::NeedsBuilding => CombinedStatus::BuildingSoon,
        F::CurrentlyBuilding | F::GatheringBuildOutput | F::UploadingBuild => {
            CombinedStatus::InProgress
        }
        F::SuccessfullyBuilt => match upload {
            None | Some(UploadState::Unscheduled) => CombinedStatus::WontRelease,
            Some(UploadState::Pending) => CombinedStatus::ReleasingSoon,
            Some(UploadState::Uploaded) => CombinedStatus::Released,
            Some(UploadState::FailedToUpload | UploadState::FailedToRelease) => {
                CombinedStatus::ReleaseFailed
            }
            Some(UploadState::Unknown(value)) => {
                tracing::warn!(upload_state = %value, "Unrecognised store upload state");
                CombinedStatus::Unknown
            }
        },
        F::Unknown(value) => {
            tracing::warn!(build_state = %value, "Unrecognised Launchpad build state");
            CombinedStatus::Unknown
        }
    }
}
