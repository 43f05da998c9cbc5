//! Order validation.

use crate::keys;
use crate::order::Order;
use primflow_core::{ExecutionContext, Primitive, PrimitiveError, PrimitiveResult};

/// Checks that the context holds a well-formed order with an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOrder;

impl Primitive for ValidateOrder {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let order = match Order::from_context(ctx) {
            Ok(order) => order,
            Err(failure) => return Ok(failure),
        };

        if order.id.as_deref().map_or(true, str::is_empty) {
            return Ok(PrimitiveResult::failed_with("order id is required"));
        }

        Ok(PrimitiveResult::ok().with(keys::ORDER_VALIDATED, true))
    }
}
