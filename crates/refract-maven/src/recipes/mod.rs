//! Built-in Maven recipes and their registry.

pub mod upgrade_parent;

pub use upgrade_parent::upgrade_parent_version;

use std::sync::Arc;

use refract_core::loader::RegistryRecipeLoader;
use refract_util::errors::RefractError;
use serde::Deserialize;

use crate::cache::InMemoryPomCache;
use crate::download::{HttpTransport, MavenDownloader};
use crate::repository::Repository;

/// Options accepted by `refract.maven.UpgradeParentVersion` in declarative
/// YAML.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpgradeParentOptions {
    group_id: String,
    artifact_id: String,
    new_version: String,
    #[serde(default)]
    version_pattern: Option<String>,
}

/// The registry of Maven recipes, the programmatic source an environment
/// aggregates. Recipes requiring options are reachable from declarative
/// `recipeList` entries.
pub fn registry(downloader: Arc<MavenDownloader>, repos: Vec<Repository>) -> RegistryRecipeLoader {
    let mut registry = RegistryRecipeLoader::new();
    registry.register("refract.maven.UpgradeParentVersion", move |options| {
        let Some(options) = options else {
            return Err(RefractError::RecipeValidation {
                message: "refract.maven.UpgradeParentVersion requires groupId, artifactId, and newVersion".to_string(),
            }
            .into());
        };
        let options: UpgradeParentOptions =
            serde_yaml::from_value(options.clone()).map_err(|e| RefractError::Yaml {
                message: format!("invalid UpgradeParentVersion options: {e}"),
            })?;
        upgrade_parent_version(
            &options.group_id,
            &options.artifact_id,
            &options.new_version,
            options.version_pattern.as_deref(),
            downloader.clone(),
            repos.clone(),
        )
    });
    registry
}

/// Registry wired to Maven Central over HTTP with an in-memory cache.
pub fn default_registry() -> miette::Result<RegistryRecipeLoader> {
    let downloader = MavenDownloader::new(
        Arc::new(InMemoryPomCache::new()),
        Arc::new(HttpTransport::new()?),
    );
    Ok(registry(
        Arc::new(downloader),
        vec![Repository::maven_central()],
    ))
}
