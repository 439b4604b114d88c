//! The environment: aggregates resource loaders, resolves declarative
//! recipe references, and activates recipes and styles by name.

use std::collections::{HashMap, HashSet};

use serde_yaml::Value;

use refract_util::errors::RefractError;

use crate::declarative::DeclarativeRecipe;
use crate::loader::ResourceLoader;
use crate::recipe::Recipe;
use crate::style::NamedStyle;

/// Aggregated recipes and styles from every registered loader.
pub struct Environment {
    recipes: Vec<Recipe>,
    styles: Vec<NamedStyle>,
}

/// Builder over a list of loaders; recipes are materialized in `build`.
#[derive(Default)]
pub struct EnvironmentBuilder {
    loaders: Vec<Box<dyn ResourceLoader>>,
}

impl EnvironmentBuilder {
    pub fn register(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Register `~/.rewrite/rewrite.yml` when present; absence is not an
    /// error.
    pub fn load_user_home(mut self) -> Self {
        match crate::loader::YamlResourceLoader::from_user_home() {
            Ok(Some(loader)) => self.loaders.push(Box::new(loader)),
            Ok(None) => {}
            Err(e) => tracing::warn!("ignoring unreadable user-home recipe file: {e}"),
        }
        self
    }

    /// Collect recipes and styles from all loaders and resolve declarative
    /// recipe references against the full list.
    ///
    /// A declarative recipe whose `recipeList` names cannot all be resolved
    /// is kept, but carries a validation failure naming the unknown
    /// references; activating it surfaces the failure.
    pub fn build(self) -> Environment {
        let mut recipes: Vec<Recipe> = Vec::new();
        let mut declaratives: Vec<DeclarativeRecipe> = Vec::new();
        let mut styles: Vec<NamedStyle> = Vec::new();

        for loader in &self.loaders {
            recipes.extend(loader.recipes());
            declaratives.extend(loader.declarative_recipes());
            styles.extend(loader.styles());
        }

        let mut initializer = DeclarativeInitializer {
            loaders: &self.loaders,
            concrete: &recipes,
            declaratives: &declaratives,
            built: HashMap::new(),
        };
        let mut initialized: Vec<Recipe> = declaratives
            .iter()
            .map(|decl| initializer.initialize(decl, &mut HashSet::new()))
            .collect();
        recipes.append(&mut initialized);

        Environment { recipes, styles }
    }
}

/// Resolves declarative `recipeList` references, memoizing recipes that
/// have already been assembled and detecting reference cycles.
struct DeclarativeInitializer<'a> {
    loaders: &'a [Box<dyn ResourceLoader>],
    concrete: &'a [Recipe],
    declaratives: &'a [DeclarativeRecipe],
    built: HashMap<String, Recipe>,
}

impl DeclarativeInitializer<'_> {
    fn initialize(&mut self, decl: &DeclarativeRecipe, visiting: &mut HashSet<String>) -> Recipe {
        if let Some(done) = self.built.get(&decl.name) {
            return done.clone();
        }
        if !visiting.insert(decl.name.clone()) {
            return Recipe::invalid(
                decl.name.clone(),
                "declarative recipe references itself, directly or indirectly",
            );
        }

        let mut resolved = Vec::new();
        let mut unknown = Vec::new();

        for reference in &decl.recipe_list {
            if let Some(options) = &reference.options {
                match self.instantiate(&reference.name, options) {
                    Some(Ok(recipe)) => resolved.push(recipe),
                    Some(Err(e)) => {
                        let recipe = Recipe::invalid(
                            decl.name.clone(),
                            format!("failed to configure '{}': {e}", reference.name),
                        );
                        visiting.remove(&decl.name);
                        return recipe;
                    }
                    None => unknown.push(reference.name.clone()),
                }
                continue;
            }

            if let Some(found) = self.concrete.iter().find(|r| r.name() == reference.name) {
                resolved.push(found.clone());
            } else if let Some(nested) = self
                .declaratives
                .iter()
                .find(|d| d.name == reference.name)
                .cloned()
            {
                resolved.push(self.initialize(&nested, visiting));
            } else if let Some(instantiated) = self.instantiate(&reference.name, &Value::Null) {
                match instantiated {
                    Ok(recipe) => resolved.push(recipe),
                    Err(_) => unknown.push(reference.name.clone()),
                }
            } else {
                unknown.push(reference.name.clone());
            }
        }

        visiting.remove(&decl.name);

        let recipe = if unknown.is_empty() {
            Recipe::composite(
                decl.name.clone(),
                decl.display_name.clone(),
                decl.description.clone(),
                resolved,
            )
        } else {
            Recipe::invalid(
                decl.name.clone(),
                format!("recipeList references unknown recipes: {}", unknown.join(", ")),
            )
        };
        self.built.insert(decl.name.clone(), recipe.clone());
        recipe
    }

    fn instantiate(&self, name: &str, options: &Value) -> Option<miette::Result<Recipe>> {
        self.loaders
            .iter()
            .find_map(|loader| loader.instantiate(name, options))
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Every loaded recipe, declarative ones already initialized.
    pub fn list_recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.name() == name)
    }

    /// Compose a root recipe chaining the named recipes in input order.
    ///
    /// Names that match no loaded recipe are skipped with a warning; a
    /// matched recipe that failed validation surfaces its failure here.
    pub fn activate_recipes<I, S>(&self, names: I) -> miette::Result<Recipe>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.activate(names, false)
    }

    /// Like [`Environment::activate_recipes`], but unmatched names are an
    /// error instead of being skipped.
    pub fn activate_recipes_strict<I, S>(&self, names: I) -> miette::Result<Recipe>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.activate(names, true)
    }

    fn activate<I, S>(&self, names: I, strict: bool) -> miette::Result<Recipe>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut activated = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.recipe(name) {
                Some(recipe) => {
                    recipe.validate()?;
                    activated.push(recipe.clone());
                }
                None if strict => {
                    return Err(RefractError::RecipeValidation {
                        message: format!("no recipe named '{name}' is loaded"),
                    }
                    .into());
                }
                None => tracing::warn!("skipping unknown recipe '{name}'"),
            }
        }
        Ok(Recipe::composite(
            "root",
            "Root recipe",
            "Activated recipes, in activation order.",
            activated,
        ))
    }

    pub fn list_styles(&self) -> &[NamedStyle] {
        &self.styles
    }

    /// Named styles in input order; unmatched names are skipped with a
    /// warning.
    pub fn activate_styles<I, S>(&self, names: I) -> Vec<NamedStyle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut activated = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.styles.iter().find(|s| s.name == name) {
                Some(style) => activated.push(style.clone()),
                None => tracing::warn!("skipping unknown style '{name}'"),
            }
        }
        activated
    }
}
