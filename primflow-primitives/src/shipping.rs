//! Shipping label generation and dispatch.

use crate::keys;
use crate::order::Order;
use crate::services::Carrier;
use primflow_core::{ExecutionContext, Primitive, PrimitiveError, PrimitiveResult};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Requests a label for the order's shipping address.
pub struct GenerateShippingLabel {
    carrier: Arc<dyn Carrier>,
}

impl GenerateShippingLabel {
    pub fn new(carrier: Arc<dyn Carrier>) -> Self {
        Self { carrier }
    }
}

impl Primitive for GenerateShippingLabel {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let order = match Order::from_context(ctx) {
            Ok(order) => order,
            Err(failure) => return Ok(failure),
        };
        let Some(address) = order.shipping_address.as_ref() else {
            return Ok(PrimitiveResult::failed_with("invalid shipping address"));
        };

        let label = self.carrier.create_label(order.id_or_default(), address)?;

        Ok(PrimitiveResult::ok()
            .with(keys::SHIPPING_LABEL_GENERATED, true)
            .with(keys::TRACKING_NUMBER, label.tracking_number)
            .with(keys::LABEL_URL, label.label_url))
    }
}

/// Hands a labelled, allocated order to the carrier.
pub struct ShipOrder {
    carrier: Arc<dyn Carrier>,
}

impl ShipOrder {
    pub fn new(carrier: Arc<dyn Carrier>) -> Self {
        Self { carrier }
    }
}

impl Primitive for ShipOrder {
    fn execute(&self, ctx: &ExecutionContext) -> Result<PrimitiveResult, PrimitiveError> {
        let Some(tracking_number) = ctx.get(keys::TRACKING_NUMBER).and_then(Value::as_str) else {
            return Ok(PrimitiveResult::failed_with("missing tracking number"));
        };
        let allocations: Map<String, Value> = match ctx.get(keys::ALLOCATIONS) {
            Some(Value::Object(map)) if map.values().all(Value::is_string) => map.clone(),
            _ => return Ok(PrimitiveResult::failed_with("missing inventory allocations")),
        };

        let shipment = self.carrier.dispatch(tracking_number)?;

        Ok(PrimitiveResult::ok()
            .with(keys::SHIPMENT_ID, shipment.shipment_id)
            .with(keys::SHIPPING_STATUS, shipment.status)
            .with(keys::SHIPPED_AT, shipment.shipped_at)
            .with(keys::ALLOCATIONS, allocations))
    }
}
