//! Registration errors. Any of these aborts startup.

use thiserror::Error;

use crate::protocol::UriError;

/// Errors raised while building the namespace tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two children of the same parent share a name.
    #[error("\"{name}\" is already registered in \"{parent}\"")]
    DuplicateName { name: String, parent: String },

    #[error("invalid name \"{name}\": {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The declared parameter list does not match the function arity.
    #[error("action \"{action}\" declares {declared} parameters but its function takes {expected}")]
    ParameterArity {
        action: String,
        declared: usize,
        expected: usize,
    },

    /// A parameter without a default follows one with a default.
    #[error("action \"{action}\": parameter \"{parameter}\" needs a default")]
    DefaultOrder { action: String, parameter: String },

    #[error("unknown parameter type \"{name}\"")]
    UnknownParameterType { name: String },

    /// The verb cannot be disabled on a model.
    #[error("verb \"{verb}\" cannot be disallowed")]
    InvalidVerb { verb: String },

    /// A registration target does not exist.
    #[error("no namespace at \"{path}\"")]
    PathNotFound { path: String },

    /// A `Model` parameter references a model that is not registered.
    #[error("parameter \"{parameter}\" references unknown model \"{model}\"")]
    UnresolvedModel { parameter: String, model: String },

    #[error(transparent)]
    Uri(#[from] UriError),
}
