//! Cart Aggregate
//!
//! Pure line-list reconciliation. Persistence lives in `application::cart`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{LineId, Money, ProductId};
use crate::domain::aggregates::Product;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(rename = "Id")]
    pub id: LineId,
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn matches(&self, product_id: ProductId, size: Option<&str>) -> bool {
        self.product_id == product_id && self.size.as_deref() == size
    }

    pub fn line_total(&self, product: &Product) -> Money { product.unit_price().multiply(self.quantity) }
}

/// In-memory cart: at most one line per `(product_id, size)`, every quantity >= 1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Rebuilds a cart from persisted lines, merging duplicate keys and dropping empty lines.
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines.into_iter().filter(|l| l.quantity > 0) {
            match cart.lines.iter_mut().find(|l| l.matches(line.product_id, line.size.as_deref())) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => cart.lines.push(line),
            }
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }

    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines.iter().filter(|l| l.product_id == product_id).map(|l| l.quantity).sum()
    }

    fn next_id(&self) -> LineId {
        LineId(self.lines.iter().map(|l| l.id.0).max().unwrap_or(0) + 1)
    }

    /// Increments an existing `(product_id, size)` line or appends a new one.
    pub fn add_item(&mut self, product_id: ProductId, quantity: u32, size: Option<String>, now: DateTime<Utc>) -> Result<&CartLine, CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(pos) = self.lines.iter().position(|l| l.matches(product_id, size.as_deref())) {
            let line = &mut self.lines[pos];
            line.quantity = line.quantity.saturating_add(quantity);
            return Ok(&self.lines[pos]);
        }
        let id = self.next_id();
        self.lines.push(CartLine { id, product_id, quantity, size, added_at: now });
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Overwrites a line's quantity; zero or below deletes it. Returns whether a line matched.
    pub fn update_quantity(&mut self, product_id: ProductId, size: Option<&str>, quantity: i64) -> bool {
        let Some(pos) = self.lines.iter().position(|l| l.matches(product_id, size)) else { return false };
        if quantity <= 0 {
            self.lines.remove(pos);
        } else {
            self.lines[pos].quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
        true
    }

    /// Removes every line of a product. Returns the number of lines removed.
    pub fn remove_item(&mut self, product_id: ProductId) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        before - self.lines.len()
    }

    pub fn clear(&mut self) { self.lines.clear(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("Cart persistence failed: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> { Utc::now() }

    #[test]
    fn test_add_same_key_merges() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(5), 2, Some("M".into()), now()).unwrap();
        cart.add_item(ProductId(5), 1, Some("M".into()), now()).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert_eq!(cart.lines()[0].size.as_deref(), Some("M"));
    }

    #[test]
    fn test_different_sizes_are_separate_lines() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(5), 1, Some("M".into()), now()).unwrap();
        cart.add_item(ProductId(5), 1, Some("L".into()), now()).unwrap();
        cart.add_item(ProductId(5), 1, None, now()).unwrap();
        assert_eq!(cart.lines().len(), 3);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.quantity_of(ProductId(5)), 3);
    }

    #[test]
    fn test_ids_are_max_plus_one() {
        let mut cart = Cart::new();
        assert_eq!(cart.add_item(ProductId(1), 1, None, now()).unwrap().id, LineId(1));
        assert_eq!(cart.add_item(ProductId(2), 1, None, now()).unwrap().id, LineId(2));
        cart.remove_item(ProductId(1));
        assert_eq!(cart.add_item(ProductId(3), 1, None, now()).unwrap().id, LineId(3));
    }

    #[test]
    fn test_zero_quantity_add_rejected() {
        let mut cart = Cart::new();
        assert_eq!(cart.add_item(ProductId(1), 0, None, now()).unwrap_err(), CartError::InvalidQuantity);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_is_size_aware() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(5), 1, Some("M".into()), now()).unwrap();
        cart.add_item(ProductId(5), 1, Some("L".into()), now()).unwrap();
        assert!(cart.update_quantity(ProductId(5), Some("L"), 4));
        assert_eq!(cart.lines()[0].quantity, 1);
        assert_eq!(cart.lines()[1].quantity, 4);
    }

    #[test]
    fn test_update_to_zero_removes_line() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(1), 2, None, now()).unwrap();
        cart.add_item(ProductId(2), 1, None, now()).unwrap();
        assert!(cart.update_quantity(ProductId(1), None, 0));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 1);
        assert!(cart.update_quantity(ProductId(2), None, -3));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_missing_line_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(1), 2, None, now()).unwrap();
        let before = cart.clone();
        assert!(!cart.update_quantity(ProductId(9), None, 3));
        assert_eq!(cart, before);
    }

    #[test]
    fn test_remove_item_drops_every_size() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(5), 1, Some("M".into()), now()).unwrap();
        cart.add_item(ProductId(5), 1, Some("L".into()), now()).unwrap();
        cart.add_item(ProductId(6), 1, None, now()).unwrap();
        assert_eq!(cart.remove_item(ProductId(5)), 2);
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.add_item(ProductId(1), 4, None, now()).unwrap();
        cart.clear();
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_from_lines_merges_duplicates() {
        let at = now();
        let line = |id, qty| CartLine { id: LineId(id), product_id: ProductId(1), quantity: qty, size: None, added_at: at };
        let cart = Cart::from_lines(vec![line(1, 2), line(2, 3), line(3, 0)]);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 5);
    }
}
