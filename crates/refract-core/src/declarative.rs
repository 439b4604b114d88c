//! Declarative recipes and styles parsed from YAML documents.
//!
//! A declarative recipe references other recipes by name:
//!
//! ```yaml
//! type: specs.openrewrite.org/v1beta/recipe
//! name: com.example.UpgradeEverything
//! displayName: Upgrade everything
//! recipeList:
//!   - com.example.First
//!   - com.example.Second:
//!       someOption: value
//! ```
//!
//! Parsing only collects the references; resolving them against the full
//! recipe list happens when the environment is built.

use serde::Deserialize;
use serde_yaml::Value;

use refract_util::errors::RefractError;

use crate::style::NamedStyle;

pub const RECIPE_DOC_TYPE: &str = "specs.openrewrite.org/v1beta/recipe";
pub const STYLE_DOC_TYPE: &str = "specs.openrewrite.org/v1beta/style";

/// A by-name reference from a declarative recipe's `recipeList`.
#[derive(Debug, Clone)]
pub struct RecipeRef {
    pub name: String,
    /// Options for configured references (`- name: {key: value}`).
    pub options: Option<Value>,
}

/// A recipe assembled from other recipes, before name resolution.
#[derive(Debug, Clone)]
pub struct DeclarativeRecipe {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub recipe_list: Vec<RecipeRef>,
}

#[derive(Debug, Deserialize)]
struct RawDoc {
    #[serde(rename = "type")]
    doc_type: String,
    name: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "recipeList", default)]
    recipe_list: Vec<Value>,
    #[serde(rename = "styleConfigs", default)]
    style_configs: Option<Value>,
}

/// Parse a (possibly multi-document) YAML source into declarative recipes
/// and styles. Documents of unrecognized type are skipped with a warning.
pub fn parse_documents(
    source: &str,
) -> miette::Result<(Vec<DeclarativeRecipe>, Vec<NamedStyle>)> {
    let mut recipes = Vec::new();
    let mut styles = Vec::new();

    for document in serde_yaml::Deserializer::from_str(source) {
        let raw = RawDoc::deserialize(document).map_err(|e| RefractError::Yaml {
            message: format!("{e}"),
        })?;
        match raw.doc_type.as_str() {
            RECIPE_DOC_TYPE => {
                let recipe_list = raw
                    .recipe_list
                    .iter()
                    .map(parse_recipe_ref)
                    .collect::<miette::Result<Vec<_>>>()?;
                recipes.push(DeclarativeRecipe {
                    display_name: raw.display_name.unwrap_or_else(|| raw.name.clone()),
                    description: raw.description.unwrap_or_default(),
                    name: raw.name,
                    recipe_list,
                });
            }
            STYLE_DOC_TYPE => {
                styles.push(NamedStyle::new(
                    raw.name.clone(),
                    raw.display_name.unwrap_or(raw.name),
                    raw.style_configs.unwrap_or(Value::Null),
                ));
            }
            other => {
                tracing::warn!("skipping YAML document of unknown type '{other}'");
            }
        }
    }

    Ok((recipes, styles))
}

/// A `recipeList` entry is either a bare name or a single-key mapping of
/// name to options.
fn parse_recipe_ref(value: &Value) -> miette::Result<RecipeRef> {
    match value {
        Value::String(name) => Ok(RecipeRef {
            name: name.clone(),
            options: None,
        }),
        Value::Mapping(map) => {
            let mut entries = map.iter();
            let (Some((key, options)), None) = (entries.next(), entries.next()) else {
                return Err(RefractError::Yaml {
                    message: "recipeList mappings must have exactly one key".to_string(),
                }
                .into());
            };
            match key {
                Value::String(name) => Ok(RecipeRef {
                    name: name.clone(),
                    options: Some(options.clone()),
                }),
                other => Err(RefractError::Yaml {
                    message: format!("recipeList key must be a string, got {other:?}"),
                }
                .into()),
            }
        }
        other => Err(RefractError::Yaml {
            message: format!("recipeList entries must be a name or name-to-options mapping, got {other:?}"),
        }
        .into()),
    }
}

/// Substitute `${key}` placeholders from a properties map, used before
/// parsing user-supplied YAML sources.
pub fn substitute_properties(
    source: &str,
    properties: &std::collections::BTreeMap<String, String>,
) -> String {
    let mut result = source.to_string();
    for (key, value) in properties {
        result = result.replace(&format!("${{{key}}}"), value);
    }
    result
}
