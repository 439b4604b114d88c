use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all refract operations.
#[derive(Debug, Error, Diagnostic)]
pub enum RefractError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A coordinate string did not have the `group:artifact:version` shape.
    #[error("Malformed coordinate '{coordinate}'")]
    #[diagnostic(help("Coordinates must be written as group:artifact:version"))]
    MalformedCoordinate { coordinate: String },

    /// A version selector pattern could not be parsed at recipe construction.
    #[error("Invalid version selector '{selector}': {message}")]
    InvalidVersionSelector { selector: String, message: String },

    /// No configured repository had the requested POM, metadata, or
    /// artifact.
    #[error("{coordinate} was not found in any configured repository")]
    PomNotFound { coordinate: String },

    /// A dependency version was still a placeholder after interpolation.
    #[error("Unresolved version for {dependency}: {message}")]
    UnresolvedVersion { dependency: String, message: String },

    /// The parent chain of a POM loops back on itself.
    #[error("Cycle detected while resolving the parent chain of {coordinate}")]
    CycleDetected { coordinate: String },

    /// The persistent cache store is held by another process.
    #[error("Cache store at {path} is locked by another process")]
    #[diagnostic(help("Wait for the other refract process to finish, or remove the stale lock file"))]
    CacheLocked { path: String },

    /// Network request or download failed. Never cached; safe to retry.
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// The execution context was cancelled before or during an operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Malformed XML input (POM or repository metadata).
    #[error("XML parse error: {message}")]
    Xml { message: String },

    /// Malformed declarative recipe or style YAML.
    #[error("YAML parse error: {message}")]
    Yaml { message: String },

    /// A recipe failed validation and cannot run.
    #[error("Recipe validation failed: {message}")]
    RecipeValidation { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type RefractResult<T> = miette::Result<T>;
