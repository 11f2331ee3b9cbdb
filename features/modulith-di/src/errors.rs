use std::sync::Arc;

use futures_channel::oneshot;
use thiserror::Error;

use crate::{
    context::ContextId, dependency_graph::DependencyGraphErrors, token::Token, types::DynError,
};

/// Errors when trying to require a certain token
#[derive(Error, Debug, Clone)]
pub enum RequireError {
    /// The token is not visible from the requesting module
    #[error("No provider for '{token}' is visible from module '{module}'")]
    ProviderNotFound { token: Token, module: String },
    /// The provider exists but has no instance in the requested context
    #[error("'{token}' has no instance in {context}")]
    InstanceUnavailable { token: Token, context: ContextId },

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

#[derive(Error, Debug, Clone)]
pub enum InjectError {
    /// Could not require the token
    #[error(transparent)]
    Require(#[from] RequireError),
    /// A constructor or factory returned an error
    #[error("Construction of '{token}' failed - error: {error}")]
    ConstructionFailed { token: Token, error: Arc<DynError> },
    /// A constructor consumed more arguments than it declared
    #[error("'{owner}' asked for argument #{index} but only {declared} were declared")]
    MissingArgument {
        owner: Token,
        index: usize,
        declared: usize,
    },
    /// Ambient registration before the internal core module exists
    #[error("The internal core module is not registered, was the container scanned?")]
    AmbientModuleMissing,
    #[error("Module '{0}' is not registered in the container")]
    ModuleMissing(String),
    #[error("Dependencies of '{0}' were never linked, call `Container::link` first")]
    Unlinked(Token),
    /// The in-flight construction this resolution waited on was abandoned
    #[error("The construction this resolution was waiting on was abandoned")]
    Canceled,
}
impl From<oneshot::Canceled> for InjectError {
    fn from(_: oneshot::Canceled) -> Self {
        Self::Canceled
    }
}
impl InjectError {
    /// Whether an optional dependency may swallow this error
    pub(crate) fn is_absence(&self) -> bool {
        matches!(
            self,
            InjectError::Require(RequireError::ProviderNotFound { .. })
                | InjectError::Require(RequireError::InstanceUnavailable { .. })
        )
    }
}

/// Structural problems found while walking module imports
#[derive(Error, Debug, Clone)]
pub enum ModuleGraphError {
    #[error("Modules import each other in a cycle: {}", .chain.join(" -> "))]
    CircularImport { chain: Vec<String> },
    #[error("Module '{module}' registers '{token}' more than once")]
    DuplicateProvider { module: String, token: Token },
}

/// Errors while bootstrapping the container
#[derive(Error, Debug, Clone)]
pub enum InitError {
    #[error(transparent)]
    ModuleGraph(#[from] ModuleGraphError),
    /// There are issues with the dependency graph
    #[error(transparent)]
    DependencyGraph(#[from] DependencyGraphErrors),
    /// Eagerly loading a singleton failed
    #[error(transparent)]
    Inject(#[from] InjectError),
    /// Eager loading did not finish in time
    #[error("Loading the singletons did not finish in time")]
    Timeout,
}
