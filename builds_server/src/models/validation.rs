//! Outcome of checking a repository's snapcraft.yaml against a snap.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    MissingYamlFile,
    SnapNameDoesNotMatch,
    InvalidYamlFile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaml_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gh_snap_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoValidation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationError>,
}

impl RepoValidation {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn missing_yaml() -> Self {
        Self::failed(ValidationError {
            kind: ValidationErrorKind::MissingYamlFile,
            message: "Missing snapcraft.yaml: this repo needs a snapcraft.yaml file, \
                      so that Snapcraft can make it buildable, installable and runnable."
                .to_string(),
            yaml_location: None,
            gh_snap_name: None,
        })
    }

    pub fn name_mismatch(snap_name: &str, gh_snap_name: &str, yaml_location: &str) -> Self {
        Self::failed(ValidationError {
            kind: ValidationErrorKind::SnapNameDoesNotMatch,
            message: format!(
                "Name mismatch: the snapcraft.yaml uses the snap name \"{gh_snap_name}\", \
                 but you've registered the name \"{snap_name}\". \
                 Update your snapcraft.yaml to continue."
            ),
            yaml_location: Some(yaml_location.to_string()),
            gh_snap_name: Some(gh_snap_name.to_string()),
        })
    }

    pub fn invalid_yaml(snap_name: &str) -> Self {
        Self::failed(ValidationError {
            kind: ValidationErrorKind::InvalidYamlFile,
            message: format!(
                "Invalid snapcraft.yaml: there was an issue parsing the snapcraft.yaml for {snap_name}."
            ),
            yaml_location: None,
            gh_snap_name: None,
        })
    }

    fn failed(error: ValidationError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    /// Message of the failure, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_like_the_dashboard_expects() {
        assert_eq!(
            serde_json::to_value(RepoValidation::ok()).unwrap(),
            serde_json::json!({ "success": true })
        );

        let value = serde_json::to_value(RepoValidation::name_mismatch(
            "toto",
            "tata",
            "snap/snapcraft.yaml",
        ))
        .unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["type"], "SNAP_NAME_DOES_NOT_MATCH");
        assert_eq!(value["error"]["gh_snap_name"], "tata");
        assert_eq!(value["error"]["yaml_location"], "snap/snapcraft.yaml");

        let value = serde_json::to_value(RepoValidation::missing_yaml()).unwrap();
        assert_eq!(value["error"]["type"], "MISSING_YAML_FILE");
        assert!(value["error"].get("yaml_location").is_none());
    }
}
