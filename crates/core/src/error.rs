//! Error types shared by the registry, the invoker and registered functions.
//!
//! The synchronous path surfaces these directly; the asynchronous path folds
//! them into a [`FailureSummary`](crate::job::FailureSummary) using
//! [`CallError::category`].

use std::borrow::Cow;

/// The requested function could not be selected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// No function name was supplied, or it was empty.
    #[error("Must specify a function to run")]
    NotSpecified,

    /// The function name is not present in the registry.
    #[error("Function '{0}' is unavailable")]
    Unavailable(String),
}

/// Low data could not be reconciled with a function's signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// One or more required parameters were not supplied.
    #[error("Missing required argument(s): {}", missing.join(", "))]
    MissingArguments { missing: Vec<String> },

    /// More positional values than parameters and no variadic positional.
    #[error("Takes at most {expected} positional argument(s) but {given} were given")]
    TooManyPositional { expected: usize, given: usize },

    /// A named value matched no parameter and the function takes no `**kwargs`.
    #[error("Got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { name: String },

    /// The same parameter was supplied more than once.
    #[error("Got multiple values for argument '{name}'")]
    DuplicateArgument { name: String },

    /// A reserved low data key held a value of the wrong shape.
    #[error("Reserved key '{key}' must be {expected}")]
    InvalidReserved {
        key: &'static str,
        expected: &'static str,
    },

    /// A bound value could not be converted to the type a function asked for.
    #[error("Argument '{name}' has the wrong type: {message}")]
    TypeMismatch { name: String, message: String },
}

impl ResolutionError {
    /// Category reported in failure summaries.
    pub fn category(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "TypeError",
            _ => "ArgumentError",
        }
    }
}

/// A failure raised by a registered function.
///
/// Carries a free-form `category` (comparable to an exception class name)
/// alongside the message so callers can match on it without parsing text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FunctionError {
    category: Cow<'static, str>,
    message: String,
}

impl FunctionError {
    /// Default category for [`FunctionError::msg`].
    pub const DEFAULT_CATEGORY: &'static str = "FunctionError";

    pub fn new(category: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Build an error with the default category.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_CATEGORY, message)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ResolutionError> for FunctionError {
    fn from(err: ResolutionError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(err: serde_json::Error) -> Self {
        Self::new("SerializationError", err.to_string())
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        Self::new("IoError", err.to_string())
    }
}

/// Rejected function registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Function name must not be empty")]
    EmptyName,

    #[error("Duplicate function registered: {name}")]
    Duplicate { name: String },
}

/// Everything [`FunctionRegistry::invoke`](crate::registry::FunctionRegistry::invoke)
/// can fail with. Each source error is carried unmodified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Function(#[from] FunctionError),
}

impl CallError {
    /// Category reported in failure summaries.
    pub fn category(&self) -> &str {
        match self {
            Self::Invocation(_) => "InvocationError",
            Self::Resolution(err) => err.category(),
            Self::Function(err) => err.category(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
