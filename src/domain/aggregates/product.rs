//! Product Aggregate
//!
//! Products are read-only from the storefront's point of view: the backing
//! record store owns their lifecycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{CategoryId, Money, ProductId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "Id")]
    pub id: ProductId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub metal: String,
    #[serde(default)]
    pub gemstone: String,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub discount: u8,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl Product {
    pub fn unit_price(&self) -> Money { Money::usd(self.price) }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn is_on_sale(&self) -> bool { self.discount > 0 }
    pub fn rating_or_zero(&self) -> f64 { self.rating.unwrap_or(0.0) }

    /// A size is optional; when given it must be one the product declares.
    pub fn accepts_size(&self, size: Option<&str>) -> bool {
        match size {
            None => true,
            Some(s) => self.sizes.iter().any(|offered| offered == s),
        }
    }

    /// Largest quantity that can still be added when `in_cart` units are already held.
    pub fn max_addable(&self, in_cart: u32) -> u32 { self.stock.saturating_sub(in_cart) }

    /// Clamps a requested line quantity to stock. Removals (zero or below)
    /// pass through; a positive request for an out-of-stock product is `None`.
    pub fn stock_limited(&self, requested: i64) -> Option<i64> {
        if requested <= 0 { return Some(requested); }
        if self.stock == 0 { return None; }
        Some(requested.min(i64::from(self.stock)))
    }

    /// Text fields consulted by free-text search.
    pub fn searchable_fields(&self) -> [&str; 5] {
        [&self.name, &self.category, &self.metal, &self.gemstone, &self.description]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "Id")]
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub product_count: u32,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn product(id: u64, name: &str, price: i64) -> Product {
        Product {
            id: ProductId(id),
            name: name.to_string(),
            category: "Rings".to_string(),
            metal: "Gold".to_string(),
            gemstone: "Diamond".to_string(),
            weight: None,
            description: String::new(),
            price: Decimal::new(price, 0),
            original_price: None,
            discount: 0,
            stock: 10,
            is_new: false,
            rating: None,
            review_count: 0,
            images: vec![],
            sizes: vec![],
        }
    }
}
