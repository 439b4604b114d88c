//! The raw POM model: a manifest as declared, before parent inheritance
//! and property interpolation.

use serde::{Deserialize, Serialize};

use refract_core::tree::{XmlDocument, XmlTag};

use crate::coordinate::{Coordinate, Exclusion, GroupArtifact};
use crate::repository::Repository;

/// A parsed POM before inheritance. Immutable after parse; the resolver
/// produces a `ResolvedPom` from it without touching the original.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,

    pub parent: Option<ParentRef>,
    /// Properties in declaration order.
    pub properties: Vec<(String, String)>,
    pub dependency_management: Vec<RawDependency>,
    pub dependencies: Vec<RawDependency>,
    pub repositories: Vec<Repository>,
    pub modules: Vec<String>,
}

/// Reference to a parent POM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub relative_path: Option<String>,
}

impl ParentRef {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(
            self.group_id.clone(),
            self.artifact_id.clone(),
            self.version.clone(),
        )
    }
}

/// A dependency as declared, version and scope still optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    pub classifier: Option<String>,
    pub type_: Option<String>,
    pub exclusions: Vec<Exclusion>,
}

impl RawDependency {
    pub fn group_artifact(&self) -> GroupArtifact {
        GroupArtifact::new(self.group_id.clone(), self.artifact_id.clone())
    }

    /// Whether this managed entry is an import-scope BOM.
    pub fn is_bom_import(&self) -> bool {
        self.scope.as_deref() == Some("import")
            && self.type_.as_deref().unwrap_or("jar") == "pom"
    }
}

impl RawPom {
    /// Parse a POM XML string.
    pub fn parse(xml: &str) -> miette::Result<Self> {
        let doc = XmlDocument::parse(xml)?;
        Ok(Self::from_document(&doc))
    }

    /// Extract the POM model from an already parsed tag tree. Used by
    /// recipes that hold the tree for rewriting.
    pub fn from_document(doc: &XmlDocument) -> Self {
        let project = &doc.root;
        let mut pom = RawPom {
            group_id: text(project, "groupId"),
            artifact_id: text(project, "artifactId"),
            version: text(project, "version"),
            packaging: text(project, "packaging"),
            parent: project.child("parent").map(parse_parent),
            ..Default::default()
        };

        if let Some(props) = project.child("properties") {
            for prop in &props.children {
                pom.properties
                    .push((prop.name.clone(), prop.value.clone().unwrap_or_default()));
            }
        }

        if let Some(deps) = project.child("dependencies") {
            pom.dependencies = deps.children_named("dependency").map(parse_dependency).collect();
        }

        if let Some(managed) = project
            .child("dependencyManagement")
            .and_then(|dm| dm.child("dependencies"))
        {
            pom.dependency_management = managed
                .children_named("dependency")
                .map(parse_dependency)
                .collect();
        }

        if let Some(repos) = project.child("repositories") {
            pom.repositories = repos
                .children_named("repository")
                .filter_map(parse_repository)
                .collect();
        }

        if let Some(modules) = project.child("modules") {
            pom.modules = modules
                .children_named("module")
                .filter_map(|m| m.value.clone())
                .collect();
        }

        pom
    }

    /// Effective group ID (falls back to parent).
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    /// Effective version (falls back to parent).
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.version.as_str()))
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(
            self.effective_group_id()?,
            self.artifact_id.as_deref()?,
            self.effective_version()?,
        ))
    }
}

fn text(tag: &XmlTag, name: &str) -> Option<String> {
    tag.child_value(name).map(|s| s.to_string())
}

fn parse_parent(tag: &XmlTag) -> ParentRef {
    ParentRef {
        group_id: text(tag, "groupId").unwrap_or_default(),
        artifact_id: text(tag, "artifactId").unwrap_or_default(),
        version: text(tag, "version").unwrap_or_default(),
        relative_path: text(tag, "relativePath"),
    }
}

fn parse_dependency(tag: &XmlTag) -> RawDependency {
    let exclusions = tag
        .child("exclusions")
        .map(|excl| {
            excl.children_named("exclusion")
                .map(|e| {
                    Exclusion::new(
                        text(e, "groupId").unwrap_or_else(|| "*".to_string()),
                        text(e, "artifactId").unwrap_or_else(|| "*".to_string()),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    RawDependency {
        group_id: text(tag, "groupId").unwrap_or_default(),
        artifact_id: text(tag, "artifactId").unwrap_or_default(),
        version: text(tag, "version"),
        scope: text(tag, "scope"),
        optional: tag.child_value("optional").map(str::trim) == Some("true"),
        classifier: text(tag, "classifier"),
        type_: text(tag, "type"),
        exclusions,
    }
}

fn parse_repository(tag: &XmlTag) -> Option<Repository> {
    let url = text(tag, "url")?;
    let id = text(tag, "id").unwrap_or_else(|| url.clone());
    let releases = tag
        .child("releases")
        .and_then(|r| r.child_value("enabled"))
        .map_or(true, |v| v.trim() == "true");
    let snapshots = tag
        .child("snapshots")
        .and_then(|s| s.child_value("enabled"))
        .map_or(true, |v| v.trim() == "true");
    Some(Repository {
        id,
        uri: url,
        releases,
        snapshots,
    })
}
