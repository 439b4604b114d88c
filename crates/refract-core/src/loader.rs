//! Recipe and style sources aggregated by the environment.
//!
//! A loader enumerates ready-made recipes, declarative recipes awaiting
//! name resolution, and styles. The registry loader is the programmatic
//! source: crates register named constructors, and configured references
//! from declarative YAML are instantiated through it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_yaml::Value;

use refract_util::errors::RefractError;

use crate::declarative::{self, DeclarativeRecipe};
use crate::recipe::Recipe;
use crate::style::NamedStyle;

/// A source of recipes and styles.
pub trait ResourceLoader: Send + Sync {
    /// Ready-made recipe instances this loader provides.
    fn recipes(&self) -> Vec<Recipe>;

    /// Declarative recipes that still need their name references resolved.
    fn declarative_recipes(&self) -> Vec<DeclarativeRecipe> {
        Vec::new()
    }

    fn styles(&self) -> Vec<NamedStyle> {
        Vec::new()
    }

    /// Construct a configured instance of a named recipe, if this loader
    /// knows how. `None` means the name is not recognized here.
    fn instantiate(&self, _name: &str, _options: &Value) -> Option<miette::Result<Recipe>> {
        None
    }
}

/// Constructor for a registered recipe. Called with `None` to produce the
/// default instance, or with options from a declarative `recipeList` entry.
pub type RecipeFactory = Arc<dyn Fn(Option<&Value>) -> miette::Result<Recipe> + Send + Sync>;

/// The programmatic recipe source: named constructors registered by crates.
#[derive(Default, Clone)]
pub struct RegistryRecipeLoader {
    entries: Vec<(String, RecipeFactory)>,
}

impl RegistryRecipeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(Option<&Value>) -> miette::Result<Recipe> + Send + Sync + 'static,
    ) {
        self.entries.push((name.into(), Arc::new(factory)));
    }
}

impl ResourceLoader for RegistryRecipeLoader {
    fn recipes(&self) -> Vec<Recipe> {
        // Constructors that require options contribute no default instance;
        // they are still reachable through `instantiate`.
        self.entries
            .iter()
            .filter_map(|(_, factory)| factory(None).ok())
            .collect()
    }

    fn instantiate(&self, name: &str, options: &Value) -> Option<miette::Result<Recipe>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory(Some(options)))
    }
}

/// Declarative recipes and styles parsed from a YAML source.
pub struct YamlResourceLoader {
    recipes: Vec<DeclarativeRecipe>,
    styles: Vec<NamedStyle>,
}

impl YamlResourceLoader {
    /// Parse a YAML source, substituting `${key}` placeholders from
    /// `properties` first.
    pub fn new(source: &str, properties: &BTreeMap<String, String>) -> miette::Result<Self> {
        let substituted = declarative::substitute_properties(source, properties);
        let (recipes, styles) = declarative::parse_documents(&substituted)?;
        Ok(Self { recipes, styles })
    }

    /// Load from a file on disk.
    pub fn from_path(path: &Path, properties: &BTreeMap<String, String>) -> miette::Result<Self> {
        let source = std::fs::read_to_string(path).map_err(RefractError::Io)?;
        Self::new(&source, properties)
    }

    /// Load `~/.rewrite/rewrite.yml` if it exists.
    pub fn from_user_home() -> miette::Result<Option<Self>> {
        let path = refract_util::fs::home_dir().join(".rewrite").join("rewrite.yml");
        if !path.is_file() {
            return Ok(None);
        }
        tracing::debug!("loading user-home recipes from {}", path.display());
        Self::from_path(&path, &BTreeMap::new()).map(Some)
    }
}

impl ResourceLoader for YamlResourceLoader {
    fn recipes(&self) -> Vec<Recipe> {
        Vec::new()
    }

    fn declarative_recipes(&self) -> Vec<DeclarativeRecipe> {
        self.recipes.clone()
    }

    fn styles(&self) -> Vec<NamedStyle> {
        self.styles.clone()
    }
}
