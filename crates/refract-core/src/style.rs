//! Named style descriptors loaded alongside recipes.

use serde_yaml::Value;

/// A named formatting/style definition from a declarative source.
///
/// Styles are opaque to the engine; the configuration block is handed as-is
/// to whichever visitor consumes it.
#[derive(Debug, Clone)]
pub struct NamedStyle {
    pub name: String,
    pub display_name: String,
    pub config: Value,
}

impl NamedStyle {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            config,
        }
    }
}
