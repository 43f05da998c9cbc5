//! The primitive contract.

use crate::context::ExecutionContext;
use crate::error::PrimitiveError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of a single primitive invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveResult {
    /// Whether the primitive succeeded.
    pub success: bool,

    /// Entries merged into the context on success. Ignored on failure.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PrimitiveResult {
    /// A successful result with no data.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: Map::new(),
        }
    }

    /// A failed result with no data.
    pub fn failed() -> Self {
        Self {
            success: false,
            data: Map::new(),
        }
    }

    /// A failed result carrying an `error` explanation.
    pub fn failed_with(reason: impl Into<String>) -> Self {
        Self::failed().with("error", reason.into())
    }

    /// Adds an entry to the result data.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns the `error` explanation, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.data.get("error").and_then(Value::as_str)
    }
}

/// An atomic named operation.
///
/// Implementations may hold injected collaborators. They are registered once
/// and shared by every run, so any interior state must be thread-safe.
pub trait Primitive: Send + Sync {
    /// Executes against the run's context.
    ///
    /// The context is read-only here; whatever the primitive wants to publish
    /// goes into the returned result's `data` and is merged by the chain
    /// executor only if `success` is true.
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError>;
}

/// A primitive backed by a closure. See [`from_fn`].
pub struct FnPrimitive<F> {
    f: F,
}

/// Wraps a closure as a [`Primitive`].
pub fn from_fn<F>(f: F) -> FnPrimitive<F>
where
    F: Fn(&ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> + Send + Sync,
{
    FnPrimitive { f }
}

impl<F> Primitive for FnPrimitive<F>
where
    F: Fn(&ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_builders() {
        let ok = PrimitiveResult::ok().with("done", true);
        assert!(ok.success);
        assert_eq!(ok.data.get("done"), Some(&json!(true)));

        let failed = PrimitiveResult::failed_with("payment failed");
        assert!(!failed.success);
        assert_eq!(failed.error_message(), Some("payment failed"));
    }

    #[test]
    fn test_fn_primitive() {
        let p = from_fn(|ctx| {
            let n = ctx.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(PrimitiveResult::ok().with("n", n + 1))
        });

        let mut ctx = ExecutionContext::new();
        ctx.insert("n", 41);
        let result = p.execute(&ctx).unwrap();
        assert_eq!(result.data.get("n"), Some(&json!(42)));
    }
}
