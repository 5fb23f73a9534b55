//! Build listing and build requests against the build farm.

use crate::models::build::{BuildWindow, BuildersStatus, BuildsPage, SnapBuild};
use crate::models::snap::LaunchpadSnap;
use crate::services::launchpad_service::{BuildFarm, LaunchpadError};

/// Queue estimate used when Launchpad reports no queue for an architecture.
const EMPTY_QUEUE_ESTIMATE: &str = "0:00:00";

/// Fetch a window of builds for a recipe, with queue estimates for queued builds.
pub async fn get_builds(
    farm: &dyn BuildFarm,
    lp_snap: &LaunchpadSnap,
    window: BuildWindow,
) -> Result<BuildsPage, LaunchpadError> {
    let builds = farm.get_snap_builds(lp_snap).await?;
    let total_builds = builds.len();

    let mut builders_status: Option<BuildersStatus> = None;
    let mut snap_builds = Vec::new();

    for build in window.apply(&builds) {
        let mut snap_build = SnapBuild::from(build);

        if build.buildstate.is_queued() {
            if builders_status.is_none() {
                builders_status = Some(farm.get_builders_status().await?);
            }

            let estimate = builders_status
                .as_ref()
                .and_then(|status| status.get(&build.arch_tag))
                .map(|queue| queue.estimated_duration.clone());
            if estimate.is_none() {
                tracing::debug!(arch = %build.arch_tag, "No builder queue for architecture");
            }
            snap_build.queue_time = Some(estimate.unwrap_or_else(|| EMPTY_QUEUE_ESTIMATE.to_string()));
        }

        snap_builds.push(snap_build);
    }

    Ok(BuildsPage {
        total_builds,
        snap_builds,
    })
}

/// Request a fresh build, cancelling builds still pending for the snap.
pub async fn request_build(
    farm: &dyn BuildFarm,
    store_name: &str,
    origin: &str,
) -> Result<(), LaunchpadError> {
    if farm.is_snap_building(store_name).await? {
        tracing::info!(store_name, "Cancelling pending builds before rebuild");
        farm.cancel_snap_builds(store_name).await?;
    }

    farm.build_snap(store_name).await?;

    crate::metrics::build_requested(origin);
    tracing::info!(store_name, origin, "Build requested");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::CombinedStatus;
    use crate::testing::{lp_build, lp_snap, FakeBuildFarm};

    #[tokio::test]
    async fn queued_builds_get_a_queue_time() {
        let farm = FakeBuildFarm::default();
        farm.set_builds(vec![
            lp_build("1", "amd64", "Needs building", None),
            lp_build("2", "riscv64", "Needs building", None),
            lp_build("3", "amd64", "Successfully built", Some("Uploaded")),
        ]);

        let page = get_builds(&farm, &lp_snap("toto"), BuildWindow::first(15))
            .await
            .unwrap();

        assert_eq!(page.total_builds, 3);
        assert_eq!(page.snap_builds[0].queue_time.as_deref(), Some("0:10:00"));
        assert_eq!(page.snap_builds[0].status, CombinedStatus::BuildingSoon);
        assert_eq!(page.snap_builds[1].queue_time.as_deref(), Some("0:00:00"));
        assert_eq!(page.snap_builds[2].queue_time, None);
        assert_eq!(page.snap_builds[2].status, CombinedStatus::Released);
        assert_eq!(farm.builders_status_calls(), 1);
    }

    #[tokio::test]
    async fn builder_queues_are_not_fetched_without_queued_builds() {
        let farm = FakeBuildFarm::default();
        farm.set_builds(vec![lp_build("9", "amd64", "Currently building", None)]);

        let page = get_builds(&farm, &lp_snap("toto"), BuildWindow::first(15))
            .await
            .unwrap();

        assert_eq!(page.snap_builds[0].queue_time, None);
        assert_eq!(farm.builders_status_calls(), 0);
    }

    #[tokio::test]
    async fn window_limits_rows_but_not_total() {
        let farm = FakeBuildFarm::default();
        farm.set_builds(
            (0..20)
                .map(|i| lp_build(&i.to_string(), "amd64", "Failed to build", None))
                .collect(),
        );

        let page = get_builds(&farm, &lp_snap("toto"), BuildWindow::from_start_size(15, 30))
            .await
            .unwrap();

        assert_eq!(page.total_builds, 20);
        let ids: Vec<_> = page.snap_builds.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["15", "16", "17", "18", "19"]);
    }

    #[tokio::test]
    async fn rebuild_cancels_pending_builds() {
        let farm = FakeBuildFarm::default();
        farm.set_building(true);

        request_build(&farm, "toto", "manual").await.unwrap();

        assert_eq!(farm.calls(), ["is_snap_building:toto", "cancel:toto", "build:toto"]);
    }

    #[tokio::test]
    async fn build_without_pending_builds() {
        let farm = FakeBuildFarm::default();

        request_build(&farm, "toto", "webhook").await.unwrap();

        assert_eq!(farm.calls(), ["is_snap_building:toto", "build:toto"]);
    }
}
