//! Function registry and synchronous invoker.
//!
//! [`FunctionRegistry`] maps dotted names (`module.action`) to a callable,
//! its declared [`Signature`] and its documentation. It is built up front and
//! read-only afterwards; share it behind an `Arc` across workers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::docs::strip_rst;
use crate::error::{CallError, FunctionError, InvocationError, RegistryError};
use crate::low::{LowData, FUN_KEY};
use crate::progress::ProgressSink;
use crate::signature::{BoundArgs, Signature};

/// Body of a registered function.
pub type Handler = dyn Fn(BoundArgs) -> Result<Value, FunctionError> + Send + Sync;

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredFunction {
    name: String,
    signature: Signature,
    doc: String,
    handler: Arc<Handler>,
}

impl RegisteredFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Resolve `low` against the signature and run the function.
    pub fn call(&self, low: &LowData) -> Result<Value, CallError> {
        self.call_with_progress(low, ProgressSink::discard())
    }

    /// Like [`call`](Self::call), routing progress updates to `progress`.
    pub fn call_with_progress(
        &self,
        low: &LowData,
        progress: ProgressSink,
    ) -> Result<Value, CallError> {
        let args = self.signature.resolve(low)?.with_progress(progress);
        Ok((self.handler)(args)?)
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Name-ordered set of callable functions.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function. Names must be non-empty and unique.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        doc: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(BoundArgs) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.functions.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        let entry = RegisteredFunction {
            name: name.clone(),
            signature,
            doc: doc.into(),
            handler: Arc::new(function),
        };
        self.functions.insert(name, entry);
        Ok(())
    }

    /// Check that `name` was given and is registered.
    pub fn verify(&self, name: Option<&str>) -> Result<&RegisteredFunction, InvocationError> {
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(InvocationError::NotSpecified),
        };
        self.functions
            .get(name)
            .ok_or_else(|| InvocationError::Unavailable(name.to_string()))
    }

    /// Verify `name`, bind `low` to its signature and call it.
    ///
    /// The function's return value is passed through untouched, and so is
    /// any error from verification, resolution or the function body.
    pub fn invoke(&self, name: &str, low: &LowData) -> Result<Value, CallError> {
        self.invoke_with_progress(name, low, ProgressSink::discard())
    }

    /// Like [`invoke`](Self::invoke), routing progress updates to `progress`.
    pub fn invoke_with_progress(
        &self,
        name: &str,
        low: &LowData,
        progress: ProgressSink,
    ) -> Result<Value, CallError> {
        let function = self.verify(Some(name))?;
        tracing::debug!(fun = name, "Invoking function");
        function.call_with_progress(low, progress)
    }

    /// Like [`invoke`](Self::invoke), reading the name from `low["fun"]`.
    pub fn invoke_low(&self, low: &LowData) -> Result<Value, CallError> {
        let name = low.get(FUN_KEY).and_then(Value::as_str);
        let function = self.verify(name)?;
        function.call(low)
    }

    /// Documentation of every function, or of those under `prefix`.
    ///
    /// A name matches when it equals `prefix` or starts with `prefix.`, so
    /// `pkg` selects `pkg` and `pkg.sub` but not `pkgx`. Markup is stripped.
    pub fn list_docs(&self, prefix: Option<&str>) -> BTreeMap<String, String> {
        let selector = prefix.filter(|p| !p.is_empty()).map(|prefix| {
            let exact = prefix.strip_suffix('.').unwrap_or(prefix);
            (exact, format!("{exact}."))
        });

        self.functions
            .iter()
            .filter(|(name, _)| match &selector {
                Some((exact, module)) => name.as_str() == *exact || name.starts_with(module),
                None => true,
            })
            .map(|(name, function)| (name.clone(), strip_rst(&function.doc)))
            .collect()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
