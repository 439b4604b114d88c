//! `maven-metadata.xml` parsing and cross-repository merging.

use serde::{Deserialize, Serialize};

use refract_core::tree::XmlDocument;

use crate::version::MavenVersion;

/// Artifact-level repository metadata: the versions a repository advertises
/// for one `group:artifact`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MavenMetadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
    pub snapshot_timestamp: Option<String>,
}

impl MavenMetadata {
    /// Parse an artifact-level `maven-metadata.xml`.
    pub fn parse(xml: &str) -> miette::Result<Self> {
        let doc = XmlDocument::parse(xml)?;
        let metadata = &doc.root;
        let mut parsed = MavenMetadata {
            group_id: metadata.child_value("groupId").map(str::to_string),
            artifact_id: metadata.child_value("artifactId").map(str::to_string),
            ..Default::default()
        };

        if let Some(versioning) = metadata.child("versioning") {
            parsed.latest = versioning.child_value("latest").map(str::to_string);
            parsed.release = versioning.child_value("release").map(str::to_string);
            if let Some(versions) = versioning.child("versions") {
                parsed.versions = versions
                    .children_named("version")
                    .filter_map(|v| v.value.clone())
                    .collect();
            }
            parsed.snapshot_timestamp = versioning
                .child("snapshot")
                .and_then(|s| s.child_value("timestamp"))
                .map(str::to_string);
        }

        Ok(parsed)
    }

    /// Merge metadata fetched from another repository: union of version
    /// lists (declaration order, first occurrence wins), newest
    /// latest/release markers.
    pub fn merge(mut self, other: MavenMetadata) -> MavenMetadata {
        for version in other.versions {
            if !self.versions.contains(&version) {
                self.versions.push(version);
            }
        }
        self.latest = newest(self.latest, other.latest);
        self.release = newest(self.release, other.release);
        self.group_id = self.group_id.or(other.group_id);
        self.artifact_id = self.artifact_id.or(other.artifact_id);
        self.snapshot_timestamp = self.snapshot_timestamp.or(other.snapshot_timestamp);
        self
    }
}

fn newest(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if MavenVersion::parse(&a) >= MavenVersion::parse(&b) {
                Some(a)
            } else {
                Some(b)
            }
        }
        (a, b) => a.or(b),
    }
}
