//! Recipe engine for the refract refactoring framework.
//!
//! This crate defines the pieces every refactoring pass is built from: the
//! XML tag tree that visitors traverse, the visitor and execution-context
//! machinery (including deferred follow-up visitors), recipes and their
//! validation, declarative recipes assembled from YAML, and the environment
//! that aggregates recipe sources and activates recipes by name.
//!
//! This crate is intentionally free of network I/O; downloading and
//! dependency resolution live in `refract-maven`.

pub mod declarative;
pub mod environment;
pub mod execution;
pub mod loader;
pub mod recipe;
pub mod style;
pub mod tree;
pub mod visitor;
