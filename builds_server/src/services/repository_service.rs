//! Repository checks run before linking or building a snap.

use crate::models::snap::GithubRepo;
use crate::models::validation::RepoValidation;
use crate::services::github_service::{GitHubError, SourceHost};

/// Check that the repository carries a snapcraft.yaml naming `snap_name`.
pub async fn validate_repo(
    github: &dyn SourceHost,
    snap_name: &str,
    repo: &GithubRepo,
) -> Result<RepoValidation, GitHubError> {
    let Some(location) = github.get_snapcraft_yaml_location(repo).await? else {
        return Ok(RepoValidation::missing_yaml());
    };

    match github.get_snapcraft_yaml_name(repo, &location).await {
        Ok(gh_snap_name) if gh_snap_name == snap_name => Ok(RepoValidation::ok()),
        Ok(gh_snap_name) => Ok(RepoValidation::name_mismatch(
            snap_name,
            &gh_snap_name,
            &location,
        )),
        Err(GitHubError::InvalidYaml(reason)) => {
            tracing::debug!(repo = %repo, %reason, "Unparsable snapcraft.yaml");
            Ok(RepoValidation::invalid_yaml(snap_name))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validation::ValidationErrorKind;
    use crate::testing::FakeGitHub;

    fn repo() -> GithubRepo {
        GithubRepo::new("canonical", "toto")
    }

    #[tokio::test]
    async fn matching_manifest_is_valid() {
        let github = FakeGitHub::default().with_yaml("snap/snapcraft.yaml", "name: toto\n");
        let result = validate_repo(&github, "toto", &repo()).await.unwrap();
        assert_eq!(result, RepoValidation::ok());
    }

    #[tokio::test]
    async fn missing_manifest() {
        let github = FakeGitHub::default();
        let result = validate_repo(&github, "toto", &repo()).await.unwrap();
        assert_eq!(
            result.error.unwrap().kind,
            ValidationErrorKind::MissingYamlFile
        );
    }

    #[tokio::test]
    async fn name_mismatch_reports_both_names() {
        let github = FakeGitHub::default().with_yaml("snapcraft.yaml", "name: tata\n");
        let result = validate_repo(&github, "toto", &repo()).await.unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ValidationErrorKind::SnapNameDoesNotMatch);
        assert_eq!(error.gh_snap_name.as_deref(), Some("tata"));
        assert_eq!(error.yaml_location.as_deref(), Some("snapcraft.yaml"));
        assert!(error.message.contains("\"toto\""));
    }

    #[tokio::test]
    async fn unparsable_manifest() {
        let github = FakeGitHub::default().with_yaml("snapcraft.yaml", "name: [oops");
        let result = validate_repo(&github, "toto", &repo()).await.unwrap();
        assert_eq!(
            result.error.unwrap().kind,
            ValidationErrorKind::InvalidYamlFile
        );
    }
}
