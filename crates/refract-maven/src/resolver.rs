//! POM resolution: parent expansion, property interpolation, dependency
//! management merging (including BOM imports), and construction of the
//! transitive dependency tree with Maven's nearest-wins rule.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use refract_core::execution::ExecutionContext;
use refract_util::errors::RefractError;

use crate::coordinate::{Coordinate, Exclusion};
use crate::download::MavenDownloader;
use crate::pom::{RawDependency, RawPom};
use crate::repository::Repository;
use crate::scope::Scope;
use crate::selector::VersionRange;
use crate::version::MavenVersion;

const MAX_PARENT_DEPTH: usize = 16;
const MAX_INTERPOLATION_PASSES: usize = 10;

/// A `RawPom` after parent merging and property interpolation. Every
/// effective dependency carries a concrete version.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPom {
    pub raw: RawPom,
    pub effective_properties: BTreeMap<String, String>,
    pub effective_managed: Vec<RawDependency>,
    pub effective_dependencies: Vec<EffectiveDependency>,
}

/// A declared dependency with its version narrowed to a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveDependency {
    pub dependency: RawDependency,
    /// The version expression as declared (literal, range, or empty when
    /// it came from dependency management).
    pub requested_version: String,
}

/// A node in the resolved dependency tree. Children are in declaration
/// order; each artifact line appears once, at its nearest position.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub coordinate: Coordinate,
    pub requested_version: String,
    pub scope: Scope,
    pub classifier: Option<String>,
    pub type_: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
    pub children: Vec<Dependency>,
    /// The repository the POM was fetched from; `None` for system-scope
    /// leaves.
    pub repository: Option<Repository>,
}

/// Resolves POMs through a downloader against an ordered repository list.
///
/// Lives for one refactoring session; effective POMs are memoized by
/// coordinate for that long, so a dependency shared across subtrees is
/// only expanded once.
pub struct MavenResolver<'a> {
    downloader: &'a MavenDownloader,
    repos: Vec<Repository>,
    session: Mutex<HashMap<Coordinate, ResolvedPom>>,
}

impl<'a> MavenResolver<'a> {
    /// An empty repository list falls back to Maven Central.
    pub fn new(downloader: &'a MavenDownloader, mut repos: Vec<Repository>) -> Self {
        if repos.is_empty() {
            repos.push(Repository::maven_central());
        }
        Self {
            downloader,
            repos,
            session: Mutex::new(HashMap::new()),
        }
    }

    /// Repositories consulted for a POM: the ones it declares, then the
    /// configured list.
    fn repositories_for(&self, raw: &RawPom) -> Vec<Repository> {
        let mut repos = raw.repositories.clone();
        for repo in &self.repos {
            if !repos.contains(repo) {
                repos.push(repo.clone());
            }
        }
        repos
    }

    /// Produce the effective view of a raw POM.
    ///
    /// Resolving the same `RawPom` twice yields equal results; nothing in
    /// here mutates the input.
    pub fn resolve(&self, raw: &RawPom, ctx: &ExecutionContext) -> miette::Result<ResolvedPom> {
        let Some(coordinate) = raw.coordinate() else {
            return self.resolve_bounded(raw, ctx, 0);
        };
        if let Some(hit) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&coordinate)
        {
            return Ok(hit.clone());
        }
        let resolved = self.resolve_bounded(raw, ctx, 0)?;
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(coordinate, resolved.clone());
        Ok(resolved)
    }

    fn resolve_bounded(
        &self,
        raw: &RawPom,
        ctx: &ExecutionContext,
        bom_depth: usize,
    ) -> miette::Result<ResolvedPom> {
        if bom_depth > MAX_PARENT_DEPTH {
            return Err(RefractError::CycleDetected {
                coordinate: raw
                    .coordinate()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "<unnamed pom>".to_string()),
            }
            .into());
        }

        let repos = self.repositories_for(raw);
        let chain = self.parent_chain(raw, &repos, ctx)?;
        let effective_properties = merge_properties(&chain)?;
        let effective_managed =
            self.merge_managed(&chain, &effective_properties, &repos, ctx, bom_depth)?;
        let effective_dependencies = self.merge_dependencies(
            &chain,
            &effective_properties,
            &effective_managed,
            &repos,
            ctx,
        )?;

        Ok(ResolvedPom {
            raw: raw.clone(),
            effective_properties,
            effective_managed,
            effective_dependencies,
        })
    }

    /// The POM and its ancestors, child first. Bounded, and a repeated
    /// coordinate anywhere in the chain is a cycle.
    fn parent_chain(
        &self,
        raw: &RawPom,
        repos: &[Repository],
        ctx: &ExecutionContext,
    ) -> miette::Result<Vec<RawPom>> {
        let mut chain = vec![raw.clone()];
        let mut visited: HashSet<Coordinate> = raw.coordinate().into_iter().collect();
        let mut current = raw.clone();

        while let Some(parent_ref) = current.parent.clone() {
            if chain.len() > MAX_PARENT_DEPTH {
                return Err(RefractError::CycleDetected {
                    coordinate: parent_ref.coordinate().to_string(),
                }
                .into());
            }
            let coordinate = parent_ref.coordinate();
            if !visited.insert(coordinate.clone()) {
                return Err(RefractError::CycleDetected {
                    coordinate: coordinate.to_string(),
                }
                .into());
            }
            let parent = self.downloader.download_pom(&coordinate, repos, ctx)?;
            chain.push(parent.clone());
            current = parent;
        }

        Ok(chain)
    }

    /// Merge `dependencyManagement` across the chain (child overrides
    /// parent by `(group, artifact, classifier, type)`) and expand
    /// import-scope BOMs into their managed entries.
    fn merge_managed(
        &self,
        chain: &[RawPom],
        properties: &BTreeMap<String, String>,
        repos: &[Repository],
        ctx: &ExecutionContext,
        bom_depth: usize,
    ) -> miette::Result<Vec<RawDependency>> {
        let project = &chain[0];
        let mut managed: Vec<RawDependency> = Vec::new();
        let mut index: HashMap<DependencyKey, usize> = HashMap::new();

        for pom in chain.iter().rev() {
            for entry in &pom.dependency_management {
                let mut entry = entry.clone();
                entry.group_id = interpolate(&entry.group_id, properties, project);
                entry.artifact_id = interpolate(&entry.artifact_id, properties, project);
                if let Some(version) = &entry.version {
                    entry.version = Some(interpolate(version, properties, project));
                }
                let key = DependencyKey::of(&entry);
                match index.get(&key) {
                    Some(&at) => managed[at] = entry,
                    None => {
                        index.insert(key, managed.len());
                        managed.push(entry);
                    }
                }
            }
        }

        // Import-scope BOMs contribute their managed section only; the
        // dependencies they declare are ignored.
        let (imports, mut merged): (Vec<_>, Vec<_>) =
            managed.into_iter().partition(|entry| entry.is_bom_import());
        for import in imports {
            let version = import.version.clone().ok_or_else(|| {
                RefractError::UnresolvedVersion {
                    dependency: import.group_artifact().to_string(),
                    message: "BOM import has no version".to_string(),
                }
            })?;
            let coordinate =
                Coordinate::new(import.group_id.clone(), import.artifact_id.clone(), version);
            let bom_raw = self.downloader.download_pom(&coordinate, repos, ctx)?;
            let bom = self.resolve_bounded(&bom_raw, ctx, bom_depth + 1)?;
            for entry in bom.effective_managed {
                let key = DependencyKey::of(&entry);
                if !merged.iter().any(|m| DependencyKey::of(m) == key) {
                    merged.push(entry);
                }
            }
        }

        Ok(merged)
    }

    /// Merge declared dependencies across the chain (child overrides
    /// parent) and narrow every version to a literal.
    fn merge_dependencies(
        &self,
        chain: &[RawPom],
        properties: &BTreeMap<String, String>,
        managed: &[RawDependency],
        repos: &[Repository],
        ctx: &ExecutionContext,
    ) -> miette::Result<Vec<EffectiveDependency>> {
        let project = &chain[0];
        let mut seen: HashSet<DependencyKey> = HashSet::new();
        let mut effective = Vec::new();

        for pom in chain {
            for declared in &pom.dependencies {
                let mut dep = declared.clone();
                dep.group_id = interpolate(&dep.group_id, properties, project);
                dep.artifact_id = interpolate(&dep.artifact_id, properties, project);
                if let Some(version) = &dep.version {
                    dep.version = Some(interpolate(version, properties, project));
                }
                if !seen.insert(DependencyKey::of(&dep)) {
                    continue;
                }

                let management = managed
                    .iter()
                    .find(|m| DependencyKey::of(m) == DependencyKey::of(&dep));
                if dep.scope.is_none() {
                    dep.scope = management.and_then(|m| m.scope.clone());
                }
                if let Some(management) = management {
                    for exclusion in &management.exclusions {
                        if !dep.exclusions.contains(exclusion) {
                            dep.exclusions.push(exclusion.clone());
                        }
                    }
                }

                let requested = dep
                    .version
                    .clone()
                    .or_else(|| management.and_then(|m| m.version.clone()))
                    .unwrap_or_default();
                let concrete = self.concretize_version(&dep, &requested, repos, ctx)?;
                dep.version = Some(concrete);
                effective.push(EffectiveDependency {
                    dependency: dep,
                    requested_version: requested,
                });
            }
        }

        Ok(effective)
    }

    /// Narrow a requested version expression to a literal: placeholders
    /// must already be gone, and ranges pick the newest matching version
    /// from merged repository metadata.
    fn concretize_version(
        &self,
        dep: &RawDependency,
        requested: &str,
        repos: &[Repository],
        ctx: &ExecutionContext,
    ) -> miette::Result<String> {
        let ga = dep.group_artifact();
        if requested.is_empty() {
            return Err(RefractError::UnresolvedVersion {
                dependency: ga.to_string(),
                message: "no version declared, managed, or imported".to_string(),
            }
            .into());
        }
        if requested.contains("${") {
            return Err(RefractError::UnresolvedVersion {
                dependency: ga.to_string(),
                message: format!("version '{requested}' is still a placeholder after interpolation"),
            }
            .into());
        }
        if !requested.starts_with('[') && !requested.starts_with('(') {
            return Ok(requested.to_string());
        }

        let range = VersionRange::parse(requested)?;
        let metadata = self.downloader.download_metadata(&ga, repos, ctx)?;
        metadata
            .versions
            .iter()
            .filter(|v| range.contains(&MavenVersion::parse(v)))
            .max_by_key(|v| MavenVersion::parse(v))
            .cloned()
            .ok_or_else(|| {
                RefractError::UnresolvedVersion {
                    dependency: ga.to_string(),
                    message: format!("no published version satisfies {requested}"),
                }
                .into()
            })
    }

    /// Build the resolved dependency tree visible on the `scope`
    /// classpath.
    ///
    /// Breadth-first with nearest-wins deduplication: the shallowest
    /// request for an artifact line wins, ties going to the first
    /// declaration. Optional dependencies do not propagate; system-scope
    /// dependencies are leaves.
    pub fn resolve_dependencies(
        &self,
        pom: &ResolvedPom,
        scope: Scope,
        ctx: &ExecutionContext,
    ) -> miette::Result<Vec<Dependency>> {
        let repos = self.repositories_for(&pom.raw);

        struct Node {
            dep: Dependency,
            children: Vec<usize>,
        }
        struct QueueEntry {
            dep: RawDependency,
            requested: String,
            effective_scope: Scope,
            exclusions: Vec<Exclusion>,
            depth: usize,
            parent: Option<usize>,
        }

        let mut nodes: Vec<Node> = Vec::new();
        let mut roots: Vec<usize> = Vec::new();
        let mut resolved: HashMap<DependencyKey, String> = HashMap::new();
        let mut queue: VecDeque<QueueEntry> = VecDeque::new();

        for effective in &pom.effective_dependencies {
            let dep = &effective.dependency;
            let declared = dep
                .scope
                .as_deref()
                .map_or(Scope::Compile, Scope::from_name);
            if declared == Scope::Invalid {
                tracing::warn!(
                    "skipping {} with invalid scope {:?}",
                    dep.group_artifact(),
                    dep.scope
                );
                continue;
            }
            // System-scope project dependencies stay on the classpath as
            // leaves even though they are never transitive.
            if declared != Scope::System && !declared.is_in_classpath_of(scope) {
                continue;
            }
            queue.push_back(QueueEntry {
                dep: dep.clone(),
                requested: effective.requested_version.clone(),
                effective_scope: declared,
                exclusions: dep.exclusions.clone(),
                depth: 1,
                parent: None,
            });
        }

        while let Some(entry) = queue.pop_front() {
            ctx.check_cancelled()?;
            let key = DependencyKey::of(&entry.dep);
            let version = entry.dep.version.clone().unwrap_or_default();

            if let Some(winner) = resolved.get(&key) {
                if *winner != version {
                    tracing::debug!(
                        "nearest wins for {}: keeping {winner}, dropping {version}",
                        entry.dep.group_artifact()
                    );
                }
                continue;
            }
            resolved.insert(key, version.clone());

            let coordinate = Coordinate::new(
                entry.dep.group_id.clone(),
                entry.dep.artifact_id.clone(),
                version,
            );

            // System-scope dependencies resolve no further.
            let (repository, child_pom) = if entry.effective_scope == Scope::System {
                (None, None)
            } else {
                let raw = self.downloader.download_pom(&coordinate, &repos, ctx)?;
                let source = raw
                    .repositories
                    .first()
                    .cloned()
                    .or_else(|| repos.first().cloned());
                (source, Some(self.resolve(&raw, ctx)?))
            };

            let node_index = nodes.len();
            nodes.push(Node {
                dep: Dependency {
                    coordinate,
                    requested_version: entry.requested.clone(),
                    scope: entry.effective_scope,
                    classifier: entry.dep.classifier.clone(),
                    type_: entry.dep.type_.clone(),
                    optional: entry.dep.optional,
                    exclusions: entry.exclusions.clone(),
                    children: Vec::new(),
                    repository,
                },
                children: Vec::new(),
            });
            match entry.parent {
                Some(parent) => nodes[parent].children.push(node_index),
                None => roots.push(node_index),
            }

            let Some(child_pom) = child_pom else {
                continue;
            };
            for child in &child_pom.effective_dependencies {
                let dep = &child.dependency;
                if dep.optional {
                    continue;
                }
                let declared = dep
                    .scope
                    .as_deref()
                    .map_or(Scope::Compile, Scope::from_name);
                let Some(transitive) = Scope::transitive_of(entry.effective_scope, declared)
                else {
                    continue;
                };
                let child_ga = dep.group_artifact();
                if entry.exclusions.iter().any(|e| e.matches(&child_ga)) {
                    continue;
                }
                let mut exclusions = entry.exclusions.clone();
                for exclusion in &dep.exclusions {
                    if !exclusions.contains(exclusion) {
                        exclusions.push(exclusion.clone());
                    }
                }
                queue.push_back(QueueEntry {
                    dep: dep.clone(),
                    requested: child.requested_version.clone(),
                    effective_scope: transitive,
                    exclusions,
                    depth: entry.depth + 1,
                    parent: Some(node_index),
                });
            }
        }

        fn assemble(nodes: &[Node], index: usize) -> Dependency {
            let mut dep = nodes[index].dep.clone();
            dep.children = nodes[index]
                .children
                .iter()
                .map(|&child| assemble(nodes, child))
                .collect();
            dep
        }

        Ok(roots.iter().map(|&root| assemble(&nodes, root)).collect())
    }
}

/// Identity of a dependency line for management and deduplication:
/// `(group, artifact, classifier, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DependencyKey {
    group_id: String,
    artifact_id: String,
    classifier: Option<String>,
    type_: String,
}

impl DependencyKey {
    fn of(dep: &RawDependency) -> Self {
        Self {
            group_id: dep.group_id.clone(),
            artifact_id: dep.artifact_id.clone(),
            classifier: dep.classifier.clone(),
            type_: dep.type_.clone().unwrap_or_else(|| "jar".to_string()),
        }
    }
}

/// Merge properties across the chain (child overrides parent) and run
/// `${…}` substitution to a fixpoint. A map still changing after the
/// bounded number of passes is self-referential and surfaces as an error.
fn merge_properties(chain: &[RawPom]) -> miette::Result<BTreeMap<String, String>> {
    let project = &chain[0];
    let mut properties = BTreeMap::new();
    for pom in chain.iter().rev() {
        for (key, value) in &pom.properties {
            properties.insert(key.clone(), value.clone());
        }
    }

    for _ in 0..MAX_INTERPOLATION_PASSES {
        let snapshot = properties.clone();
        let mut changed = false;
        for value in properties.values_mut() {
            let substituted = interpolate(value, &snapshot, project);
            if substituted != *value {
                *value = substituted;
                changed = true;
            }
        }
        if !changed {
            return Ok(properties);
        }
    }

    Err(RefractError::Generic {
        message: format!(
            "property interpolation did not converge after {MAX_INTERPOLATION_PASSES} passes"
        ),
    }
    .into())
}

/// Substitute `${key}` references from the property map and the built-in
/// `project.*` values. Unknown keys are left in place.
fn interpolate(input: &str, properties: &BTreeMap<String, String>, project: &RawPom) -> String {
    let mut result = input.to_string();
    let mut search = 0;
    while let Some(found) = result[search..].find("${") {
        let start = search + found;
        let Some(close) = result[start..].find('}') else {
            break;
        };
        let end = start + close;
        let key = result[start + 2..end].to_string();
        let replacement = properties
            .get(&key)
            .cloned()
            .or_else(|| project_property(project, &key));
        match replacement {
            Some(value) => {
                result.replace_range(start..=end, &value);
                search = start + value.len();
            }
            None => search = end + 1,
        }
    }
    result
}

fn project_property(project: &RawPom, key: &str) -> Option<String> {
    match key {
        "project.groupId" | "pom.groupId" => {
            project.effective_group_id().map(|s| s.to_string())
        }
        "project.artifactId" | "pom.artifactId" => project.artifact_id.clone(),
        "project.version" | "pom.version" => {
            project.effective_version().map(|s| s.to_string())
        }
        "project.packaging" | "pom.packaging" => project.packaging.clone(),
        "project.parent.groupId" => project.parent.as_ref().map(|p| p.group_id.clone()),
        "project.parent.version" => project.parent.as_ref().map(|p| p.version.clone()),
        _ => None,
    }
}
