//! Maven dependency scopes and the scope-transitivity table.

use serde::{Deserialize, Serialize};

/// Maven dependency scope. Unknown strings map to `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    None,
    Compile,
    Provided,
    Runtime,
    Test,
    System,
    Invalid,
}

impl Scope {
    pub const ALL: [Scope; 7] = [
        Scope::None,
        Scope::Compile,
        Scope::Provided,
        Scope::Runtime,
        Scope::Test,
        Scope::System,
        Scope::Invalid,
    ];

    /// Parse a POM scope string. Absent scope defaults to `Compile` at the
    /// call site, not here.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "none" => Scope::None,
            "compile" => Scope::Compile,
            "provided" => Scope::Provided,
            "runtime" => Scope::Runtime,
            "test" => Scope::Test,
            "system" => Scope::System,
            _ => Scope::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::None => "none",
            Scope::Compile => "compile",
            Scope::Provided => "provided",
            Scope::Runtime => "runtime",
            Scope::Test => "test",
            Scope::System => "system",
            Scope::Invalid => "invalid",
        }
    }

    /// The scope a transitive dependency takes on, per Maven's table.
    ///
    /// `parent` is the scope of the edge already in the tree, `child` the
    /// scope the dependency declares. `None` means the child is not
    /// transitively visible through that edge.
    pub fn transitive_of(parent: Scope, child: Scope) -> Option<Scope> {
        match (parent, child) {
            (Scope::Compile, Scope::Compile) => Some(Scope::Compile),
            (Scope::Compile, Scope::Runtime) => Some(Scope::Runtime),
            (Scope::Provided, Scope::Compile) => Some(Scope::Provided),
            (Scope::Provided, Scope::Runtime) => Some(Scope::Provided),
            (Scope::Runtime, Scope::Compile) => Some(Scope::Runtime),
            (Scope::Runtime, Scope::Runtime) => Some(Scope::Runtime),
            (Scope::Test, Scope::Compile) => Some(Scope::Test),
            (Scope::Test, Scope::Runtime) => Some(Scope::Test),
            _ => None,
        }
    }

    /// Whether a dependency with this scope is visible on the `query`
    /// classpath: exactly when the transitivity table maps it back onto
    /// `query`.
    pub fn is_in_classpath_of(self, query: Scope) -> bool {
        Scope::transitive_of(self, query) == Some(query)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
