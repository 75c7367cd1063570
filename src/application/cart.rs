//! Cart Reconciliation Store
//!
//! Owns the session's authoritative line list. Every mutation is tried on a
//! copy, handed to the persistence collaborator, and only committed once the
//! write succeeds, so a failed write leaves the last-known-good cart intact.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tokio::sync::Mutex;

use crate::domain::aggregates::{Cart, CartError, CartLine};
use crate::domain::events::{CartEvent, DomainEvent, Notice};
use crate::domain::value_objects::ProductId;
use crate::infrastructure::cart_storage::CartPersistence;

/// Result of a cart mutation: the full resulting line list, whether the
/// write went through, and the toast to show.
#[derive(Clone, Debug, PartialEq)]
pub struct CartUpdate {
    pub lines: Vec<CartLine>,
    pub outcome: Result<(), CartError>,
    pub notice: Option<Notice>,
}

impl CartUpdate {
    pub fn is_ok(&self) -> bool { self.outcome.is_ok() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
}

pub struct CartStore<P> {
    persistence: P,
    cart: Cart,
    events: Vec<DomainEvent>,
}

impl<P: CartPersistence> CartStore<P> {
    /// An empty store. Call [`CartStore::load`] to pull persisted lines.
    pub fn new(persistence: P) -> Self {
        Self { persistence, cart: Cart::new(), events: Vec::new() }
    }

    /// Constructs and loads in one step.
    pub async fn open(persistence: P) -> Self {
        let mut store = Self::new(persistence);
        store.load().await;
        store
    }

    /// Replaces in-memory state with the persisted lines. A failed read
    /// yields an empty cart rather than an error.
    pub async fn load(&mut self) -> CartUpdate {
        match self.persistence.load().await {
            Ok(lines) => {
                self.cart = Cart::from_lines(lines);
                self.snapshot(Ok(()), None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load cart");
                self.cart = Cart::new();
                self.snapshot(Err(CartError::Persistence(err.to_string())), Some(Notice::error("Failed to load cart")))
            }
        }
    }

    pub fn persistence(&self) -> &P { &self.persistence }

    pub fn lines(&self) -> &[CartLine] { self.cart.lines() }
    pub fn is_empty(&self) -> bool { self.cart.is_empty() }
    pub fn item_count(&self) -> u32 { self.cart.item_count() }
    pub fn quantity_of(&self, product_id: ProductId) -> u32 { self.cart.quantity_of(product_id) }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    pub async fn add_item(&mut self, product_id: ProductId, quantity: u32, size: Option<String>) -> CartUpdate {
        let mut candidate = self.cart.clone();
        if let Err(err) = candidate.add_item(product_id, quantity, size.clone(), Utc::now()) {
            return self.snapshot(Err(err), Some(Notice::error("Failed to add item to cart")));
        }
        let event = CartEvent::ItemAdded { product_id, quantity, size };
        self.commit(candidate, event, Some("Item added to cart!"), "Failed to add item to cart").await
    }

    /// Sets the quantity of the `(product_id, size)` line; zero or below removes it.
    /// A missing line leaves the cart untouched.
    pub async fn update_quantity(&mut self, product_id: ProductId, size: Option<&str>, quantity: i64) -> CartUpdate {
        let mut candidate = self.cart.clone();
        if !candidate.update_quantity(product_id, size, quantity) {
            return self.snapshot(Ok(()), None);
        }
        let event = CartEvent::QuantityUpdated { product_id, size: size.map(str::to_string), quantity };
        self.commit(candidate, event, None, "Failed to update quantity").await
    }

    /// Removes every line of the product.
    pub async fn remove_item(&mut self, product_id: ProductId) -> CartUpdate {
        let mut candidate = self.cart.clone();
        candidate.remove_item(product_id);
        self.commit(candidate, CartEvent::ItemRemoved { product_id }, Some("Item removed from cart"), "Failed to remove item")
            .await
    }

    pub async fn clear(&mut self) -> CartUpdate {
        let mut candidate = self.cart.clone();
        candidate.clear();
        self.commit(candidate, CartEvent::Cleared, Some("Cart cleared"), "Failed to clear cart").await
    }

    async fn commit(&mut self, candidate: Cart, event: CartEvent, success: Option<&str>, failure: &str) -> CartUpdate {
        if let Err(err) = self.persistence.save(candidate.lines()).await {
            tracing::warn!(error = %err, "cart write failed, keeping last-known-good cart");
            return self.snapshot(Err(CartError::Persistence(err.to_string())), Some(Notice::error(failure)));
        }
        self.cart = candidate;
        if self.persistence.reloads_after_save() {
            match self.persistence.load().await {
                Ok(lines) => self.cart = Cart::from_lines(lines),
                Err(err) => tracing::warn!(error = %err, "re-read after cart write failed"),
            }
        }
        tracing::debug!(?event, lines = self.cart.lines().len(), "cart updated");
        self.events.push(DomainEvent::Cart(event));
        self.snapshot(Ok(()), success.map(Notice::success))
    }

    fn snapshot(&self, outcome: Result<(), CartError>, notice: Option<Notice>) -> CartUpdate {
        CartUpdate { lines: self.cart.lines().to_vec(), outcome, notice }
    }
}

type PersistenceFactory<P> = Box<dyn Fn(&str) -> P + Send + Sync>;

pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

/// One [`CartStore`] per cart session, created and loaded on first use.
///
/// Sessions idle longer than the configured time, or beyond the capacity,
/// are dropped from memory; their lines stay in persistence and are
/// reloaded on the next access.
pub struct CartRegistry<P> {
    factory: PersistenceFactory<P>,
    sessions: Cache<String, Arc<Mutex<CartStore<P>>>>,
}

impl<P: CartPersistence + 'static> CartRegistry<P> {
    pub fn new(factory: impl Fn(&str) -> P + Send + Sync + 'static) -> Self {
        Self::with_limits(factory, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE)
    }

    pub fn with_limits(factory: impl Fn(&str) -> P + Send + Sync + 'static, max_sessions: u64, idle: Duration) -> Self {
        let sessions = Cache::builder().max_capacity(max_sessions).time_to_idle(idle).build();
        Self { factory: Box::new(factory), sessions }
    }

    /// Concurrent first accesses to one session share a single load; other
    /// sessions are not held up by it.
    pub async fn session(&self, session_id: &str) -> Arc<Mutex<CartStore<P>>> {
        self.sessions
            .get_with(session_id.to_string(), async {
                let store = CartStore::open((self.factory)(session_id)).await;
                tracing::info!(session = session_id, lines = store.lines().len(), "opened cart session");
                Arc::new(Mutex::new(store))
            })
            .await
    }

    /// Number of sessions currently held in memory.
    pub async fn cached_sessions(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::infrastructure::cart_storage::StorageError;

    /// In-memory persistence whose writes can be made to fail.
    #[derive(Default)]
    pub struct FlakyPersistence {
        pub saved: StdMutex<Vec<CartLine>>,
        pub fail_writes: AtomicBool,
        pub fail_reads: AtomicBool,
        pub load_delay: Duration,
    }

    impl FlakyPersistence {
        pub fn failing_writes() -> Self {
            let p = Self::default();
            p.fail_writes.store(true, Ordering::SeqCst);
            p
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "storage unavailable"))
    }

    impl CartPersistence for FlakyPersistence {
        async fn load(&self) -> Result<Vec<CartLine>, StorageError> {
            if !self.load_delay.is_zero() {
                tokio::time::sleep(self.load_delay).await;
            }
            if self.fail_reads.load(Ordering::SeqCst) { return Err(unavailable()); }
            Ok(self.saved.lock().map(|l| l.clone()).unwrap_or_default())
        }

        async fn save(&self, lines: &[CartLine]) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) { return Err(unavailable()); }
            if let Ok(mut saved) = self.saved.lock() {
                *saved = lines.to_vec();
            }
            Ok(())
        }
    }
}
