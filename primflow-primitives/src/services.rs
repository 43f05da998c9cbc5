//! External collaborators used by the order primitives, with simulated
//! in-process implementations.

use crate::order::ShippingAddress;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use primflow_core::PrimitiveError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Stock lookups and reservations.
pub trait InventoryService: Send + Sync {
    /// Whether `quantity` units of `item_id` can be reserved.
    fn is_available(&self, item_id: &str, quantity: u32) -> Result<bool, PrimitiveError>;

    /// Reserves stock. Returns the allocation id, or `None` if there is not
    /// enough stock.
    fn allocate(&self, item_id: &str, quantity: u32) -> Result<Option<String>, PrimitiveError>;

    /// Returns previously allocated stock.
    fn release(&self, item_id: &str, quantity: u32) -> Result<(), PrimitiveError>;
}

/// Outcome of a charge attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub approved: bool,
    pub transaction_id: String,
}

/// Card/payment processing.
pub trait PaymentGateway: Send + Sync {
    fn charge(&self, order_id: &str, amount: f64) -> Result<PaymentReceipt, PrimitiveError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingLabel {
    pub tracking_number: String,
    pub label_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shipment {
    pub shipment_id: String,
    pub status: String,
    pub shipped_at: String,
}

/// Label generation and dispatch.
pub trait Carrier: Send + Sync {
    fn create_label(
        &self,
        order_id: &str,
        address: &ShippingAddress,
    ) -> Result<ShippingLabel, PrimitiveError>;

    fn dispatch(&self, tracking_number: &str) -> Result<Shipment, PrimitiveError>;
}

/// The collaborators handed to [`register_defaults`](crate::register_defaults).
#[derive(Clone)]
pub struct Services {
    pub inventory: Arc<dyn InventoryService>,
    pub payments: Arc<dyn PaymentGateway>,
    pub carrier: Arc<dyn Carrier>,
}

impl Services {
    pub fn simulated() -> Self {
        Self {
            inventory: Arc::new(SimulatedInventory::new()),
            payments: Arc::new(SimulatedPaymentGateway::new()),
            carrier: Arc::new(SimulatedCarrier::new()),
        }
    }
}

/// Toggle shared by the simulators to fake an outage.
#[derive(Debug)]
struct Availability {
    name: &'static str,
    online: AtomicBool,
}

impl Availability {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            online: AtomicBool::new(true),
        }
    }

    fn check(&self) -> Result<(), PrimitiveError> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(PrimitiveError::Unavailable {
                dependency: self.name.to_string(),
                reason: "service offline".to_string(),
            })
        }
    }

    fn set(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

/// In-memory inventory.
///
/// Items without an explicit stock level are treated as unlimited.
#[derive(Debug)]
pub struct SimulatedInventory {
    stock: DashMap<String, u32>,
    availability: Availability,
}

impl Default for SimulatedInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedInventory {
    pub fn new() -> Self {
        Self {
            stock: DashMap::new(),
            availability: Availability::new("inventory"),
        }
    }

    /// Sets a finite stock level for an item.
    pub fn with_stock(self, item_id: impl Into<String>, quantity: u32) -> Self {
        self.stock.insert(item_id.into(), quantity);
        self
    }

    pub fn stock_of(&self, item_id: &str) -> Option<u32> {
        self.stock.get(item_id).map(|q| *q)
    }

    pub fn set_online(&self, online: bool) {
        self.availability.set(online);
    }
}

impl InventoryService for SimulatedInventory {
    fn is_available(&self, item_id: &str, quantity: u32) -> Result<bool, PrimitiveError> {
        self.availability.check()?;
        Ok(self
            .stock
            .get(item_id)
            .map(|level| *level >= quantity)
            .unwrap_or(true))
    }

    fn allocate(&self, item_id: &str, quantity: u32) -> Result<Option<String>, PrimitiveError> {
        self.availability.check()?;
        if let Some(mut level) = self.stock.get_mut(item_id) {
            if *level < quantity {
                return Ok(None);
            }
            *level -= quantity;
        }
        Ok(Some(format!("alloc_{}", item_id)))
    }

    fn release(&self, item_id: &str, quantity: u32) -> Result<(), PrimitiveError> {
        self.availability.check()?;
        if let Some(mut level) = self.stock.get_mut(item_id) {
            *level += quantity;
        }
        Ok(())
    }
}

/// Approves every positive amount.
#[derive(Debug)]
pub struct SimulatedPaymentGateway {
    next_txn: AtomicU64,
    availability: Availability,
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPaymentGateway {
    pub fn new() -> Self {
        Self {
            next_txn: AtomicU64::new(1),
            availability: Availability::new("payments"),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.availability.set(online);
    }
}

impl PaymentGateway for SimulatedPaymentGateway {
    fn charge(&self, order_id: &str, amount: f64) -> Result<PaymentReceipt, PrimitiveError> {
        self.availability.check()?;
        let seq = self.next_txn.fetch_add(1, Ordering::Relaxed);
        let approved = amount > 0.0;
        tracing::debug!(
            "Simulated charge of {:.2} for order {}: {}",
            amount,
            order_id,
            if approved { "approved" } else { "declined" }
        );
        Ok(PaymentReceipt {
            approved,
            transaction_id: format!("txn_{}", seq),
        })
    }
}

/// Issues deterministic tracking numbers derived from the order id.
#[derive(Debug)]
pub struct SimulatedCarrier {
    label_base_url: String,
    availability: Availability,
}

impl Default for SimulatedCarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCarrier {
    pub fn new() -> Self {
        Self {
            label_base_url: "https://shipping.example.com/labels".to_string(),
            availability: Availability::new("carrier"),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.availability.set(online);
    }
}

impl Carrier for SimulatedCarrier {
    fn create_label(
        &self,
        order_id: &str,
        address: &ShippingAddress,
    ) -> Result<ShippingLabel, PrimitiveError> {
        self.availability.check()?;
        let tracking_number = format!("TRACK-{}", order_id);
        tracing::debug!(
            "Simulated label {} to {}, {}",
            tracking_number,
            address.city,
            address.country
        );
        Ok(ShippingLabel {
            label_url: format!("{}/{}.pdf", self.label_base_url, tracking_number),
            tracking_number,
        })
    }

    fn dispatch(&self, tracking_number: &str) -> Result<Shipment, PrimitiveError> {
        self.availability.check()?;
        Ok(Shipment {
            shipment_id: format!("SHIP-{}", tracking_number),
            status: "in_transit".to_string(),
            shipped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}
