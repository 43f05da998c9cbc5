//! Typed order payload.

use crate::keys;
use primflow_core::{ExecutionContext, PrimitiveResult};
use serde::{Deserialize, Serialize};

/// The `order` context entry.
///
/// Optional fields are checked by the primitives that need them, so an order
/// can be validated before it carries items or an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub items: Option<Vec<OrderItem>>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub price: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
}

impl Order {
    /// Reads the order from the context.
    ///
    /// A missing or malformed order is a business failure, returned as the
    /// `Err` value ready to hand back from a primitive.
    pub fn from_context(ctx: &ExecutionContext) -> Result<Self, PrimitiveResult> {
        match ctx.get_as::<Order>(keys::ORDER) {
            Ok(Some(order)) => Ok(order),
            Ok(None) => Err(PrimitiveResult::failed_with("invalid order format")),
            Err(e) => {
                tracing::debug!("Order did not decode: {}", e);
                Err(PrimitiveResult::failed_with("invalid order format"))
            }
        }
    }

    /// The order id, or an empty string.
    pub fn id_or_default(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// The order's items, or the failure to report when there are none.
    pub fn require_items(&self) -> Result<&[OrderItem], PrimitiveResult> {
        self.items
            .as_deref()
            .ok_or_else(|| PrimitiveResult::failed_with("invalid items format"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_full_order() {
        let mut ctx = ExecutionContext::new();
        ctx.insert(
            "order",
            json!({
                "id": "ORD-1",
                "amount": 10.5,
                "items": [{"id": "A"}, {"id": "B", "quantity": 3}],
                "shippingAddress": {"city": "Springfield", "zipCode": "62701"}
            }),
        );

        let order = Order::from_context(&ctx).unwrap();
        assert_eq!(order.id_or_default(), "ORD-1");
        let items = order.require_items().unwrap();
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[1].quantity, 3);
        assert_eq!(order.shipping_address.unwrap().zip_code, "62701");
    }

    #[test]
    fn test_missing_order_is_business_failure() {
        let failure = Order::from_context(&ExecutionContext::new()).unwrap_err();
        assert!(!failure.success);
        assert_eq!(failure.error_message(), Some("invalid order format"));
    }

    #[test]
    fn test_non_object_order_is_business_failure() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", "not an order");
        assert!(Order::from_context(&ctx).is_err());
    }

    #[test]
    fn test_missing_items() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("order", json!({"id": "ORD-1"}));
        let order = Order::from_context(&ctx).unwrap();
        assert_eq!(
            order.require_items().unwrap_err().error_message(),
            Some("invalid items format")
        );
    }
}
