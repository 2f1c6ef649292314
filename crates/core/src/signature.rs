//! Declared call signatures and low data reconciliation.
//!
//! Every registered function declares a [`Signature`]. At call time
//! [`Signature::resolve`] binds low data to it, producing [`BoundArgs`] or a
//! [`ResolutionError`]. Resolution borrows the low data and never mutates it.

use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ResolutionError;
use crate::low::{is_private, is_reserved, LowData, ARG_KEY, KWARG_KEY};
use crate::progress::ProgressSink;

/// Parameter layout of a registered function.
///
/// Required parameters always precede optional ones, matching the order in
/// which positional values are bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    required: Vec<String>,
    optional: Vec<(String, Value)>,
    varargs: bool,
    varkwargs: bool,
}

impl Signature {
    /// A signature taking no arguments at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required parameter.
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Append an optional parameter with its default value.
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.optional.push((name.into(), default.into()));
        self
    }

    /// Accept surplus positional values (`*args`).
    pub fn varargs(mut self) -> Self {
        self.varargs = true;
        self
    }

    /// Accept unmatched named values (`**kwargs`).
    pub fn varkwargs(mut self) -> Self {
        self.varkwargs = true;
        self
    }

    /// Declared parameter names in binding order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .map(String::as_str)
            .chain(self.optional.iter().map(|(name, _)| name.as_str()))
    }

    fn param_count(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    fn default_for(&self, index: usize) -> Option<&Value> {
        index
            .checked_sub(self.required.len())
            .and_then(|i| self.optional.get(i))
            .map(|(_, default)| default)
    }

    /// Bind `low` to this signature.
    ///
    /// Positional values from `arg` fill parameters in order. Named values,
    /// from the top level and from `kwarg`, fill parameters by name. Whatever
    /// is left goes to `*args` / `**kwargs` when accepted. Private keys are
    /// dropped for functions without `**kwargs`; any other leftover is an
    /// error. Unfilled optional parameters take their defaults.
    pub fn resolve(&self, low: &LowData) -> Result<BoundArgs, ResolutionError> {
        let positional: &[Value] = match low.get(ARG_KEY) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(values)) => values,
            Some(_) => {
                return Err(ResolutionError::InvalidReserved {
                    key: ARG_KEY,
                    expected: "a list",
                })
            }
        };
        let explicit_kwargs = match low.get(KWARG_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(ResolutionError::InvalidReserved {
                    key: KWARG_KEY,
                    expected: "a mapping",
                })
            }
        };

        let names: Vec<&str> = self.param_names().collect();
        let mut slots: Vec<Option<Value>> = vec![None; names.len()];
        let mut varargs = Vec::new();

        for (index, value) in positional.iter().enumerate() {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(value.clone());
            } else if self.varargs {
                varargs.push(value.clone());
            } else {
                return Err(ResolutionError::TooManyPositional {
                    expected: self.param_count(),
                    given: positional.len(),
                });
            }
        }

        let top_level = low.iter().filter(|(key, _)| !is_reserved(key));
        let named = top_level.chain(explicit_kwargs.into_iter().flatten());

        let mut seen = HashSet::new();
        let mut varkwargs = Map::new();
        for (name, value) in named {
            if !seen.insert(name.as_str()) {
                return Err(ResolutionError::DuplicateArgument { name: name.clone() });
            }
            match names.iter().position(|param| *param == name.as_str()) {
                Some(index) => {
                    if slots[index].is_some() {
                        return Err(ResolutionError::DuplicateArgument { name: name.clone() });
                    }
                    slots[index] = Some(value.clone());
                }
                None if self.varkwargs => {
                    varkwargs.insert(name.clone(), value.clone());
                }
                None if is_private(name) => {}
                None => {
                    return Err(ResolutionError::UnexpectedKeyword { name: name.clone() });
                }
            }
        }

        let mut params = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for (index, (name, slot)) in names.iter().zip(slots).enumerate() {
            match slot.or_else(|| self.default_for(index).cloned()) {
                Some(value) => params.push(((*name).to_string(), value)),
                None => missing.push((*name).to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ResolutionError::MissingArguments { missing });
        }

        Ok(BoundArgs {
            params,
            varargs,
            varkwargs,
            progress: ProgressSink::discard(),
        })
    }
}

/// Renders as a parameter list, e.g. `(name, greeting="hello", *args, **kwargs)`.
impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.required.clone();
        parts.extend(
            self.optional
                .iter()
                .map(|(name, default)| format!("{name}={default}")),
        );
        if self.varargs {
            parts.push("*args".to_string());
        }
        if self.varkwargs {
            parts.push("**kwargs".to_string());
        }
        write!(f, "({})", parts.join(", "))
    }
}

/// Arguments bound to a [`Signature`], handed to the function body.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    params: Vec<(String, Value)>,
    varargs: Vec<Value>,
    varkwargs: Map<String, Value>,
    progress: ProgressSink,
}

impl PartialEq for BoundArgs {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.varargs == other.varargs
            && self.varkwargs == other.varkwargs
    }
}

impl BoundArgs {
    pub(crate) fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Report progress while the function is still running.
    ///
    /// Delivered to the caller's sink when there is one, dropped otherwise.
    pub fn progress(&self, update: impl Into<Value>) {
        self.progress.emit(update.into());
    }

    /// Raw value of a declared parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }

    /// Typed value of a declared parameter.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, ResolutionError> {
        let raw = self
            .get(name)
            .ok_or_else(|| ResolutionError::MissingArguments {
                missing: vec![name.to_string()],
            })?;
        serde_json::from_value(raw.clone()).map_err(|e| ResolutionError::TypeMismatch {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Declared parameters in binding order.
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Surplus positional values.
    pub fn varargs(&self) -> &[Value] {
        &self.varargs
    }

    /// Unmatched named values.
    pub fn varkwargs(&self) -> &Map<String, Value> {
        &self.varkwargs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
