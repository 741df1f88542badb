//! Error types for the state store, registry and lifecycle model.

use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::Lifecycle;

/// Errors from persisting the installation state document.
///
/// None of these are fatal: callers log them and continue with the
/// in-memory state ("changes not saved").
#[derive(Debug, Error)]
pub enum StateError {
    /// Writing the document (or its temp file) failed.
    #[error("failed to write state to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing the document during a reset failed.
    #[error("failed to remove state file {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the component registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A component name that the registry does not declare.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// A component lists a dependency that is not declared.
    #[error("component {component} depends on undeclared component {dependency}")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    /// The same name is declared twice.
    #[error("component {0} is declared more than once")]
    DuplicateComponent(String),

    /// The declared dependencies contain a cycle.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// The fixed install order puts a component before one of its dependencies.
    #[error("install order places {component} before its dependency {dependency}")]
    OrderViolation {
        component: String,
        dependency: String,
    },

    /// The fixed install order does not list every component exactly once.
    #[error("install order does not cover component {0}")]
    IncompleteOrder(String),
}

/// An illegal lifecycle transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal lifecycle transition {from} -> {to}")]
pub struct LifecycleError {
    pub from: Lifecycle,
    pub to: Lifecycle,
}
