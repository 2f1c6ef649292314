//! Built-in runner modules served by the worker binary.


use crate::error::RegistryError;
use crate::registry::FunctionRegistry;

/// A registry holding every built-in module.
pub fn builtin_registry() -> Result<FunctionRegistry, RegistryError> {
    let mut registry = FunctionRegistry::new();
    test::register(&mut registry)?;
    Ok(registry)
}
