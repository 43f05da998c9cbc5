//! Chain execution.

use crate::context::ExecutionContext;
use crate::definition::PrimitiveChain;
use crate::error::CoreError;
use crate::primitive::PrimitiveResult;
use crate::registry::PrimitiveRegistry;
use std::sync::Arc;

/// Result of running one chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Every primitive succeeded.
    Completed,
    /// A primitive reported failure; the chain stopped there.
    Failed {
        primitive: String,
        result: PrimitiveResult,
    },
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChainOutcome::Completed)
    }

    /// The chain's aggregate result. A completed chain yields an empty
    /// success, not the payload of its last primitive.
    pub fn into_result(self) -> PrimitiveResult {
        match self {
            ChainOutcome::Completed => PrimitiveResult::ok(),
            ChainOutcome::Failed { result, .. } => result,
        }
    }
}

/// Runs primitive chains against a context.
#[derive(Debug, Clone)]
pub struct ChainExecutor {
    registry: Arc<PrimitiveRegistry>,
}

impl ChainExecutor {
    pub fn new(registry: Arc<PrimitiveRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PrimitiveRegistry> {
        &self.registry
    }

    /// Executes `chain` in literal order.
    ///
    /// Stops at the first primitive that is missing, errors, or fails. Data
    /// of a successful primitive is merged into `ctx` before the next one
    /// runs; data of a failed primitive never is.
    pub fn execute(
        &self,
        chain: &PrimitiveChain,
        ctx: &mut ExecutionContext,
    ) -> Result<ChainOutcome, CoreError> {
        for name in &chain.primitives {
            let primitive = self.registry.lookup(name)?;

            let result = primitive
                .execute(ctx)
                .map_err(|source| CoreError::Primitive {
                    primitive: name.clone(),
                    source,
                })?;

            if !result.success {
                tracing::debug!(
                    "Primitive '{}' failed: {}",
                    name,
                    result.error_message().unwrap_or("no reason given")
                );
                return Ok(ChainOutcome::Failed {
                    primitive: name.clone(),
                    result,
                });
            }

            tracing::debug!("Primitive '{}' succeeded ({} key(s))", name, result.data.len());
            ctx.merge(&result.data);
        }

        Ok(ChainOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrimitiveError;
    use crate::primitive::from_fn;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Registers primitives that append their own name to a shared log.
    fn recording_registry(names: &[&str], log: Arc<Mutex<Vec<String>>>) -> PrimitiveRegistry {
        let mut registry = PrimitiveRegistry::new();
        for name in names {
            let log = log.clone();
            let own = name.to_string();
            registry.register(
                *name,
                from_fn(move |_| {
                    log.lock().unwrap().push(own.clone());
                    Ok(PrimitiveResult::ok().with("last", own.clone()))
                }),
            );
        }
        registry
    }

    #[test]
    fn test_runs_in_literal_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&["c", "a", "b"], log.clone());
        let executor = ChainExecutor::new(Arc::new(registry));

        let chain = PrimitiveChain::new(["b", "c", "a"], 0);
        let mut ctx = ExecutionContext::new();
        let outcome = executor.execute(&chain, &mut ctx).unwrap();

        assert_eq!(outcome, ChainOutcome::Completed);
        assert_eq!(*log.lock().unwrap(), vec!["b", "c", "a"]);
        assert_eq!(ctx.get("last"), Some(&json!("a")));
    }

    #[test]
    fn test_failure_short_circuits_without_merge() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("first", from_fn(|_| Ok(PrimitiveResult::ok().with("first", true))));
        registry.register(
            "reject",
            from_fn(|_| Ok(PrimitiveResult::failed_with("nope").with("leaked", true))),
        );
        registry.register("never", from_fn(|_| panic!("must not run")));
        let executor = ChainExecutor::new(Arc::new(registry));

        let chain = PrimitiveChain::new(["first", "reject", "never"], 0);
        let mut ctx = ExecutionContext::new();
        let outcome = executor.execute(&chain, &mut ctx).unwrap();

        match outcome {
            ChainOutcome::Failed { primitive, result } => {
                assert_eq!(primitive, "reject");
                assert_eq!(result.error_message(), Some("nope"));
                assert_eq!(result.data.get("leaked"), Some(&json!(true)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(ctx.get("first"), Some(&json!(true)));
        assert!(!ctx.contains_key("leaked"));
        assert!(!ctx.contains_key("error"));
    }

    #[test]
    fn test_missing_primitive_aborts() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("ok", from_fn(|_| Ok(PrimitiveResult::ok().with("ok", 1))));
        let executor = ChainExecutor::new(Arc::new(registry));

        let chain = PrimitiveChain::new(["ok", "ghost", "ok"], 0);
        let mut ctx = ExecutionContext::new();
        let result = executor.execute(&chain, &mut ctx);

        assert!(matches!(result, Err(CoreError::PrimitiveNotFound { ref name }) if name == "ghost"));
        assert_eq!(ctx.get("ok"), Some(&json!(1)));
    }

    #[test]
    fn test_primitive_error_propagates() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(
            "broken",
            from_fn(|_| {
                Err(PrimitiveError::Unavailable {
                    dependency: "payments".to_string(),
                    reason: "connection refused".to_string(),
                })
            }),
        );
        let executor = ChainExecutor::new(Arc::new(registry));

        let result = executor.execute(&PrimitiveChain::single("broken"), &mut ExecutionContext::new());
        assert!(matches!(result, Err(CoreError::Primitive { ref primitive, .. }) if primitive == "broken"));
    }

    #[test]
    fn test_later_primitives_see_earlier_data() {
        let mut registry = PrimitiveRegistry::new();
        registry.register("set", from_fn(|_| Ok(PrimitiveResult::ok().with("n", 1))));
        registry.register(
            "inc",
            from_fn(|ctx| {
                let n = ctx.get("n").and_then(Value::as_i64).unwrap_or(0);
                Ok(PrimitiveResult::ok().with("n", n + 1))
            }),
        );
        let executor = ChainExecutor::new(Arc::new(registry));

        let mut ctx = ExecutionContext::new();
        executor
            .execute(&PrimitiveChain::new(["set", "inc", "inc"], 0), &mut ctx)
            .unwrap();
        assert_eq!(ctx.get("n"), Some(&json!(3)));
    }

    #[test]
    fn test_empty_chain_completes() {
        let executor = ChainExecutor::new(Arc::new(PrimitiveRegistry::new()));
        let mut ctx = ExecutionContext::new();
        let outcome = executor.execute(&PrimitiveChain::default(), &mut ctx).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.into_result(), PrimitiveResult::ok());
        assert!(ctx.is_empty());
    }

    proptest! {
        #[test]
        fn prop_order_is_literal(order in Just(vec!["p0", "p1", "p2", "p3", "p4"]).prop_shuffle()) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let registry = recording_registry(&["p0", "p1", "p2", "p3", "p4"], log.clone());
            let executor = ChainExecutor::new(Arc::new(registry));

            let chain = PrimitiveChain::new(order.clone(), 0);
            executor.execute(&chain, &mut ExecutionContext::new()).unwrap();

            let ran = log.lock().unwrap().clone();
            prop_assert_eq!(ran, order.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }

        #[test]
        fn prop_last_write_wins(values in proptest::collection::vec(any::<i64>(), 1..8)) {
            let mut registry = PrimitiveRegistry::new();
            let mut names = Vec::new();
            for (i, v) in values.iter().enumerate() {
                let v = *v;
                let name = format!("w{}", i);
                registry.register(name.clone(), from_fn(move |_| Ok(PrimitiveResult::ok().with("k", v))));
                names.push(name);
            }
            let executor = ChainExecutor::new(Arc::new(registry));

            let mut ctx = ExecutionContext::new();
            executor.execute(&PrimitiveChain::new(names, 0), &mut ctx).unwrap();

            prop_assert_eq!(ctx.get("k"), Some(&json!(values[values.len() - 1])));
        }
    }
}
