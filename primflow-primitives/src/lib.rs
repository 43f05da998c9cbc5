//! # primflow-primitives
//!
//! Order-fulfilment primitives for primflow.
//!
//! This crate provides:
//! - A typed `Order` payload read from the `order` context entry
//! - Simulated inventory, payment, and carrier collaborators
//! - Six primitives covering an order's path from receipt to shipment
//!
//! The collaborators are deliberately simple stand-ins. Swap them for real
//! clients by implementing the traits in [`services`].

pub mod inventory;
pub mod keys;
pub mod order;
pub mod payment;
pub mod services;
pub mod shipping;
pub mod validate;

use primflow_core::PrimitiveRegistry;

pub use inventory::{AllocateInventory, CheckInventory};
pub use order::{Order, OrderItem, ShippingAddress};
pub use payment::ProcessPayment;
pub use services::{
    Carrier, InventoryService, PaymentGateway, PaymentReceipt, Services, ShippingLabel, Shipment,
    SimulatedCarrier, SimulatedInventory, SimulatedPaymentGateway,
};
pub use shipping::{GenerateShippingLabel, ShipOrder};
pub use validate::ValidateOrder;

/// Registered names of the built-in primitives.
pub const NAMES: &[&str] = &[
    "validateOrder",
    "checkInventory",
    "processPayment",
    "allocateInventory",
    "generateShippingLabel",
    "shipOrder",
];

/// Registers every built-in primitive, wired to `services`.
pub fn register_defaults(registry: &mut PrimitiveRegistry, services: &Services) {
    registry.register("validateOrder", ValidateOrder);
    registry.register("checkInventory", CheckInventory::new(services.inventory.clone()));
    registry.register("processPayment", ProcessPayment::new(services.payments.clone()));
    registry.register("allocateInventory", AllocateInventory::new(services.inventory.clone()));
    registry.register(
        "generateShippingLabel",
        GenerateShippingLabel::new(services.carrier.clone()),
    );
    registry.register("shipOrder", ShipOrder::new(services.carrier.clone()));
}

/// A registry holding the built-in primitives over simulated collaborators.
pub fn default_registry() -> PrimitiveRegistry {
    let mut registry = PrimitiveRegistry::new();
    register_defaults(&mut registry, &Services::simulated());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use primflow_core::{Catalog, ExecutionContext, StateExecutor, Termination, WorkflowRunner};
    use serde_json::json;
    use std::sync::Arc;

    fn order_flow() -> Catalog {
        Catalog::from_json(&json!({
            "states": {
                "OrderReceived": {
                    "preliminaryActions": [
                        {"primitives": ["validateOrder", "checkInventory"], "executionOrder": 1}
                    ],
                    "mainAction": "processPayment",
                    "transitions": {"success": "OrderFulfillment", "failure": "OrderCancelled"}
                },
                "OrderFulfillment": {
                    "preliminaryActions": [
                        {"primitives": ["allocateInventory"], "executionOrder": 1},
                        {"primitives": ["generateShippingLabel"], "executionOrder": 2}
                    ],
                    "mainAction": "shipOrder",
                    "transitions": {"success": "OrderCompleted", "failure": "CustomerServiceReview"}
                }
            }
        }))
        .unwrap()
    }

    fn sample_order(amount: f64) -> serde_json::Value {
        json!({
            "id": "ORD-12345",
            "amount": amount,
            "items": [
                {"id": "ITEM-1", "quantity": 1, "price": 49.99},
                {"id": "ITEM-2", "quantity": 1, "price": 50.00}
            ],
            "shippingAddress": {
                "street": "123 Main St",
                "city": "Springfield",
                "state": "IL",
                "zipCode": "62701",
                "country": "USA"
            }
        })
    }

    fn runner() -> WorkflowRunner {
        WorkflowRunner::new(StateExecutor::new(
            Arc::new(order_flow()),
            Arc::new(default_registry()),
        ))
        .with_halt_states(["OrderCancelled", "CustomerServiceReview", "OrderCompleted"])
    }

    #[test]
    fn test_registers_all_names() {
        let registry = default_registry();
        assert_eq!(registry.len(), NAMES.len());
        assert!(NAMES.iter().all(|n| registry.contains(n)));
        assert!(order_flow().validate(&registry).iter().all(|i| i.severity
            == primflow_core::IssueSeverity::Warning));
    }

    #[test]
    fn test_order_fulfilment_happy_path() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", sample_order(99.99));

        let report = runner().run("OrderReceived", &mut ctx).unwrap();

        assert_eq!(report.termination, Termination::Halted { state: "OrderCompleted".to_string() });
        assert_eq!(ctx.get("orderValidated"), Some(&json!(true)));
        assert_eq!(ctx.get("paymentProcessed"), Some(&json!(true)));
        assert_eq!(ctx.get("trackingNumber"), Some(&json!("TRACK-ORD-12345")));
        assert_eq!(ctx.get("shipmentID"), Some(&json!("SHIP-TRACK-ORD-12345")));
        assert_eq!(ctx.get("shippingStatus"), Some(&json!("in_transit")));
        assert_eq!(ctx.get("allocations").unwrap()["ITEM-1"], json!("alloc_ITEM-1"));
    }

    #[test]
    fn test_declined_payment_cancels_order() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", sample_order(0.0));

        let report = runner().run("OrderReceived", &mut ctx).unwrap();

        assert_eq!(report.termination, Termination::Halted { state: "OrderCancelled".to_string() });
        assert!(!ctx.contains_key("paymentProcessed"));
        assert!(!ctx.contains_key("trackingNumber"));
    }
}
