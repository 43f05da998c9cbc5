//! Payment capture.

use crate::keys;
use crate::order::Order;
use crate::services::PaymentGateway;
use primflow_core::{ExecutionContext, Primitive, PrimitiveError, PrimitiveResult};
use std::sync::Arc;

/// Charges the order amount through the injected gateway.
///
/// A declined charge is a business failure; its data is discarded by the
/// chain executor, so `paymentProcessed` only reaches the context on approval.
pub struct ProcessPayment {
    gateway: Arc<dyn PaymentGateway>,
}

impl ProcessPayment {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }
}

impl Primitive for ProcessPayment {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let order = match Order::from_context(ctx) {
            Ok(order) => order,
            Err(failure) => return Ok(failure),
        };
        let Some(amount) = order.amount else {
            return Ok(PrimitiveResult::failed_with("invalid amount"));
        };

        let receipt = self.gateway.charge(order.id_or_default(), amount)?;

        let result = if receipt.approved {
            PrimitiveResult::ok()
        } else {
            PrimitiveResult::failed_with("payment failed")
        };
        Ok(result
            .with(keys::PAYMENT_PROCESSED, true)
            .with(keys::TRANSACTION_ID, receipt.transaction_id)
            .with(keys::AMOUNT, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SimulatedPaymentGateway;
    use serde_json::json;

    fn charge(order: serde_json::Value) -> PrimitiveResult {
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", order);
        ProcessPayment::new(Arc::new(SimulatedPaymentGateway::new()))
            .execute(&ctx)
            .unwrap()
    }

    #[test]
    fn test_approved_payment() {
        let result = charge(json!({"id": "ORD-1", "amount": 99.99}));

        assert!(result.success);
        assert_eq!(result.data["paymentProcessed"], json!(true));
        assert_eq!(result.data["transactionID"], json!("txn_1"));
        assert_eq!(result.data["amount"], json!(99.99));
    }

    #[test]
    fn test_declined_payment() {
        let result = charge(json!({"id": "ORD-1", "amount": 0.0}));

        assert!(!result.success);
        assert_eq!(result.error_message(), Some("payment failed"));
    }

    #[test]
    fn test_missing_amount() {
        let result = charge(json!({"id": "ORD-1"}));
        assert_eq!(result.error_message(), Some("invalid amount"));
    }

    #[test]
    fn test_gateway_outage_propagates() {
        let gateway = SimulatedPaymentGateway::new();
        gateway.set_online(false);
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", json!({"id": "ORD-1", "amount": 1.0}));

        let err = ProcessPayment::new(Arc::new(gateway)).execute(&ctx).unwrap_err();
        assert!(matches!(err, PrimitiveError::Unavailable { .. }));
    }
}
