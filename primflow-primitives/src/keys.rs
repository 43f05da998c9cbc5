//! Context keys read and written by the order primitives.

pub const ORDER: &str = "order";
pub const ERROR: &str = "error";

pub const ORDER_VALIDATED: &str = "orderValidated";

pub const INVENTORY_CHECKED: &str = "inventoryChecked";
pub const ITEMS_AVAILABLE: &str = "itemsAvailable";
pub const INVENTORY_ALLOCATED: &str = "inventoryAllocated";
pub const ALLOCATIONS: &str = "allocations";

pub const PAYMENT_PROCESSED: &str = "paymentProcessed";
pub const TRANSACTION_ID: &str = "transactionID";
pub const AMOUNT: &str = "amount";

pub const SHIPPING_LABEL_GENERATED: &str = "shippingLabelGenerated";
pub const TRACKING_NUMBER: &str = "trackingNumber";
pub const LABEL_URL: &str = "labelURL";

pub const SHIPMENT_ID: &str = "shipmentID";
pub const SHIPPING_STATUS: &str = "shippingStatus";
pub const SHIPPED_AT: &str = "shippedAt";
