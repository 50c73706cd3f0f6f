//! Source-control version identity.

use serde::{Deserialize, Serialize};

/// Immutable snapshot of the repository's version identity.
///
/// Produced once per invocation by the version detector and read by the
/// template resolver and plan assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionInfo {
    /// Full version, including any prerelease or `-dev+<sha>` suffix.
    pub version: String,
    /// Bare `major.minor.patch`.
    pub base: String,
    pub major: String,
    pub minor: String,
    pub patch: String,
    /// Prerelease label from the tag (empty when absent).
    pub prerelease: String,
    /// Short commit id.
    pub sha: String,
    /// Full commit id.
    pub commit: String,
    pub branch: String,
    /// Tag pointing exactly at HEAD, if any.
    pub tag: Option<String>,
    /// HEAD is exactly at a tag.
    pub is_release: bool,
    pub is_prerelease: bool,
}

impl VersionInfo {
    /// Branch name with `/` and spaces replaced by `-`.
    pub fn sanitized_branch(&self) -> String {
        self.branch.replace(['/', ' '], "-")
    }

    /// Version usable as an image tag (`+` is not a legal tag character).
    pub fn tag_safe_version(&self) -> String {
        self.version.replace('+', "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_branch() {
        let info = VersionInfo {
            branch: "feature/new thing".to_string(),
            ..Default::default()
        };
        assert_eq!(info.sanitized_branch(), "feature-new-thing");
    }

    #[test]
    fn test_tag_safe_version() {
        let info = VersionInfo {
            version: "0.0.0-dev+abc1234".to_string(),
            ..Default::default()
        };
        assert_eq!(info.tag_safe_version(), "0.0.0-dev-abc1234");
    }
}
