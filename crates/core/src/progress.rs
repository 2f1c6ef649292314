//! Progress updates from a running function.
//!
//! A function reports progress through [`BoundArgs::progress`](crate::signature::BoundArgs::progress).
//! The caller decides where updates go by handing a [`ProgressSink`] to
//! [`FunctionRegistry::invoke_with_progress`](crate::registry::FunctionRegistry::invoke_with_progress);
//! plain [`invoke`](crate::registry::FunctionRegistry::invoke) discards them.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type Emit = dyn Fn(Value) + Send + Sync;

/// Destination for progress updates. The default sink discards them.
#[derive(Clone, Default)]
pub struct ProgressSink {
    emit: Option<Arc<Emit>>,
}

impl ProgressSink {
    /// Sink calling `emit` for every update, in order, on the function's thread.
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self {
            emit: Some(Arc::new(emit)),
        }
    }

    pub fn discard() -> Self {
        Self::default()
    }

    /// Whether updates go anywhere.
    pub fn is_connected(&self) -> bool {
        self.emit.is_some()
    }

    pub fn emit(&self, update: Value) {
        match &self.emit {
            Some(emit) => emit(update),
            None => tracing::trace!("Progress update discarded"),
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[test]
    fn updates_reach_the_sink_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            ProgressSink::new(move |update| seen.lock().unwrap().push(update))
        };
        assert!(sink.is_connected());

        sink.emit(json!(1));
        sink.clone().emit(json!(2));
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn discard_sink_accepts_updates() {
        let sink = ProgressSink::discard();
        assert!(!sink.is_connected());
        sink.emit(json!("ignored"));
    }
}
