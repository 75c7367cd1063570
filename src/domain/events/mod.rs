//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use crate::domain::aggregates::CheckoutStep;
use crate::domain::value_objects::ProductId;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Checkout(CheckoutEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        let kind = match self {
            Self::Cart(CartEvent::ItemAdded { .. }) => "cart.item_added",
            Self::Cart(CartEvent::QuantityUpdated { .. }) => "cart.quantity_updated",
            Self::Cart(CartEvent::ItemRemoved { .. }) => "cart.item_removed",
            Self::Cart(CartEvent::Cleared) => "cart.cleared",
            Self::Checkout(CheckoutEvent::StepCompleted { .. }) => "checkout.step_completed",
            Self::Checkout(CheckoutEvent::OrderPlaced { .. }) => "checkout.order_placed",
        };
        format!("storefront.{kind}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { product_id: ProductId, quantity: u32, size: Option<String> },
    QuantityUpdated { product_id: ProductId, size: Option<String>, quantity: i64 },
    ItemRemoved { product_id: ProductId },
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    StepCompleted { step: CheckoutStep },
    OrderPlaced { order_number: String, total: Decimal },
}

/// Transient user-facing message, shown as a toast by the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self { Self { level: NoticeLevel::Success, message: message.into() } }
    pub fn error(message: impl Into<String>) -> Self { Self { level: NoticeLevel::Error, message: message.into() } }
}
