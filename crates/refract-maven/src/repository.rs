//! Repository descriptors: identity, policy flags, URL layout, and URI
//! normalization.

use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, GroupArtifact};

/// Maven Central base URL.
pub const MAVEN_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2";

/// A configured Maven repository.
///
/// Two repositories are equal iff their normalized URI, id, and policy
/// flags match; `Hash` agrees with that equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub uri: String,
    /// Whether release artifacts may be fetched from here.
    pub releases: bool,
    /// Whether snapshot artifacts may be fetched from here.
    pub snapshots: bool,
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.releases == other.releases
            && self.snapshots == other.snapshots
            && normalize_uri(&self.uri) == normalize_uri(&other.uri)
    }
}

impl Eq for Repository {}

impl std::hash::Hash for Repository {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.releases.hash(state);
        self.snapshots.hash(state);
        normalize_uri(&self.uri).hash(state);
    }
}

impl Repository {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            releases: true,
            snapshots: true,
        }
    }

    /// The default Maven Central repository (releases only).
    pub fn maven_central() -> Self {
        Self {
            id: "central".to_string(),
            uri: MAVEN_CENTRAL_URL.to_string(),
            releases: true,
            snapshots: false,
        }
    }

    /// Return this repository with its URI in normalized form.
    ///
    /// Normalization collapses trailing slashes and upgrades `http://` to
    /// `https://` except for loopback hosts. It is idempotent; the
    /// normalized form is otherwise opaque.
    pub fn normalize(&self) -> Self {
        Self {
            id: self.id.clone(),
            uri: normalize_uri(&self.uri),
            releases: self.releases,
            snapshots: self.snapshots,
        }
    }

    /// Standard repository-layout path for a coordinate:
    /// `org.example:lib:1.0` becomes `org/example/lib/1.0`.
    pub fn coordinate_path(coordinate: &Coordinate) -> String {
        format!(
            "{}/{}/{}",
            coordinate.group_id.replace('.', "/"),
            coordinate.artifact_id,
            coordinate.version
        )
    }

    /// Full URL of a file belonging to a coordinate.
    pub fn file_url(&self, coordinate: &Coordinate, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            self.uri.trim_end_matches('/'),
            Self::coordinate_path(coordinate),
            filename
        )
    }

    /// URL of the POM for a coordinate.
    pub fn pom_url(&self, coordinate: &Coordinate) -> String {
        let filename = format!(
            "{}-{}.pom",
            coordinate.artifact_id, coordinate.version
        );
        self.file_url(coordinate, &filename)
    }

    /// URL of the artifact file for a coordinate, honoring classifier and
    /// packaging extension.
    pub fn artifact_url(
        &self,
        coordinate: &Coordinate,
        classifier: Option<&str>,
        extension: &str,
    ) -> String {
        let filename = match classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                coordinate.artifact_id, coordinate.version, c, extension
            ),
            None => format!(
                "{}-{}.{}",
                coordinate.artifact_id, coordinate.version, extension
            ),
        };
        self.file_url(coordinate, &filename)
    }

    /// URL of the artifact-level `maven-metadata.xml` (version listing).
    pub fn metadata_url(&self, ga: &GroupArtifact) -> String {
        format!(
            "{}/{}/{}/maven-metadata.xml",
            self.uri.trim_end_matches('/'),
            ga.group_id.replace('.', "/"),
            ga.artifact_id
        )
    }
}

fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.trim().trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("http://") {
        let host = rest.split(['/', ':']).next().unwrap_or("");
        if host != "localhost" && host != "127.0.0.1" && host != "[::1]" {
            return format!("https://{rest}");
        }
    }
    trimmed.to_string()
}
