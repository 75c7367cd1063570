//! Order placement
//!
//! There is no payment gateway: placing an order waits out a simulated
//! processing delay, clears the session's cart and hands back a confirmation.

use std::collections::HashSet;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::cart::CartStore;
use crate::domain::aggregates::{Checkout, CheckoutStep, OrderError, OrderSummary, Product, ShippingInfo};
use crate::infrastructure::cart_storage::CartPersistence;

pub const DEFAULT_CHECKOUT_DELAY: Duration = Duration::from_millis(2000);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("An order for this session is already being placed")]
    InFlight,

    #[error(transparent)]
    Order(#[from] OrderError),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub id: Uuid,
    pub order_number: String,
    pub summary: OrderSummary,
    pub shipping: ShippingInfo,
    pub placed_at: DateTime<Utc>,
}

pub struct CheckoutService {
    delay: Duration,
    in_flight: StdMutex<HashSet<String>>,
}

/// Holds a session's slot in the in-flight set until dropped.
struct InFlightGuard<'a> {
    sessions: &'a StdMutex<HashSet<String>>,
    session: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.session);
    }
}

impl CheckoutService {
    pub fn new(delay: Duration) -> Self {
        Self { delay, in_flight: StdMutex::new(HashSet::new()) }
    }

    pub fn is_in_flight(&self, session: &str) -> bool {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).contains(session)
    }

    fn begin(&self, session: &str) -> Result<InFlightGuard<'_>, CheckoutError> {
        let mut sessions = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.insert(session.to_string()) {
            return Err(CheckoutError::InFlight);
        }
        Ok(InFlightGuard { sessions: &self.in_flight, session: session.to_string() })
    }

    /// Places the order for a checkout sitting on the review step.
    ///
    /// A second call for the same session while one is pending fails with
    /// [`CheckoutError::InFlight`]. A cart that cannot be cleared afterwards
    /// does not fail the order.
    pub async fn place_order<P: CartPersistence>(
        &self,
        session: &str,
        checkout: &mut Checkout,
        cart: &Mutex<CartStore<P>>,
        products: &[Product],
    ) -> Result<OrderConfirmation, CheckoutError> {
        let _guard = self.begin(session)?;
        if checkout.step() != CheckoutStep::Review {
            return Err(OrderError::NotReviewed(checkout.step()).into());
        }

        let summary = {
            let cart = cart.lock().await;
            if cart.is_empty() {
                return Err(CheckoutError::EmptyCart);
            }
            OrderSummary::compute(cart.lines(), products)
        };

        tracing::info!(session, total = %summary.total, "processing order");
        tokio::time::sleep(self.delay).await;

        let cleared = cart.lock().await.clear().await;
        if let Err(err) = cleared.outcome {
            tracing::warn!(session, error = %err, "order placed but cart could not be cleared");
        }

        let order_number = format!("ORD-{:08}", rand::random::<u32>() % 100_000_000);
        checkout.mark_placed(&order_number, &summary.total)?;
        tracing::info!(session, order_number = %order_number, "order placed");

        Ok(OrderConfirmation {
            id: Uuid::now_v7(),
            order_number,
            summary,
            shipping: checkout.shipping().clone(),
            placed_at: Utc::now(),
        })
    }
}

impl Default for CheckoutService {
    fn default() -> Self { Self::new(DEFAULT_CHECKOUT_DELAY) }
}
