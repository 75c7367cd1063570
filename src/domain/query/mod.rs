//! Catalog query pipeline
//!
//! Turns the full product collection plus the shopper's selections into the
//! page they see: search -> filter -> sort -> paginate. Every stage takes a
//! slice and returns a new vector; the input is never reordered, and outputs
//! only ever contain products from the input.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::aggregates::Product;
use crate::domain::value_objects::PriceRange;

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;

// =============================================================================
// Filters
// =============================================================================

/// One independent facet of the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Category,
    Metal,
    Gemstone,
    Price,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [Self::Category, Self::Metal, Self::Gemstone, Self::Price];

    pub fn as_str(self) -> &'static str {
        match self { Self::Category => "category", Self::Metal => "metal", Self::Gemstone => "gemstone", Self::Price => "price" }
    }

    /// The product attribute an option dimension tests. `None` for price.
    fn attribute(self, product: &Product) -> Option<&str> {
        match self {
            Self::Category => Some(&product.category),
            Self::Metal => Some(&product.metal),
            Self::Gemstone => Some(&product.gemstone),
            Self::Price => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown filter dimension: {0}")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownDimension(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Options(BTreeSet<String>),
    Range(PriceRange),
}

impl Selection {
    fn size(&self) -> usize {
        match self { Self::Options(set) => set.len(), Self::Range(_) => 1 }
    }
}

/// The shopper's applied filters. A missing dimension imposes no constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
    dimensions: BTreeMap<Dimension, Selection>,
}

/// Unknown dimension names are skipped, as with [`Dimension::from_str`].
/// Empty option sets are dropped.
impl<'de> Deserialize<'de> for FilterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut dimensions = BTreeMap::new();
        for (name, value) in raw {
            let Ok(dimension) = name.parse::<Dimension>() else { continue };
            match serde_json::from_value::<Selection>(value).map_err(D::Error::custom)? {
                Selection::Options(set) if set.is_empty() => {}
                selection => { dimensions.insert(dimension, selection); }
            }
        }
        Ok(Self { dimensions })
    }
}

impl FilterSet {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, dimension: Dimension) -> Option<&Selection> { self.dimensions.get(&dimension) }
    pub fn is_empty(&self) -> bool { self.dimensions.is_empty() }

    /// Selects `option` if it is not selected, deselects it otherwise.
    /// Ignored for the price dimension.
    pub fn toggle(&mut self, dimension: Dimension, option: &str) {
        if dimension == Dimension::Price { return; }
        let selection = self.dimensions.entry(dimension).or_insert_with(|| Selection::Options(BTreeSet::new()));
        let now_empty = match selection {
            Selection::Options(set) => {
                if !set.remove(option) {
                    set.insert(option.to_string());
                }
                set.is_empty()
            }
            Selection::Range(_) => {
                *selection = Selection::Options(BTreeSet::from([option.to_string()]));
                false
            }
        };
        if now_empty {
            self.dimensions.remove(&dimension);
        }
    }

    pub fn set_options<I, S>(&mut self, dimension: Dimension, options: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if dimension == Dimension::Price { return; }
        let set: BTreeSet<String> = options.into_iter().map(Into::into).collect();
        if set.is_empty() {
            self.dimensions.remove(&dimension);
        } else {
            self.dimensions.insert(dimension, Selection::Options(set));
        }
    }

    /// Sets the price interval; inverted bounds are swapped here rather than inside `filter`.
    pub fn set_price(&mut self, a: Decimal, b: Decimal) {
        self.dimensions.insert(Dimension::Price, Selection::Range(PriceRange::new(a, b)));
    }

    pub fn remove(&mut self, dimension: Dimension) { self.dimensions.remove(&dimension); }
    pub fn clear(&mut self) { self.dimensions.clear(); }

    /// Number of selected options, counting a price range as one.
    pub fn applied_count(&self) -> usize { self.dimensions.values().map(Selection::size).sum() }

    /// AND across dimensions, OR within one.
    pub fn matches(&self, product: &Product) -> bool {
        self.dimensions.iter().all(|(dimension, selection)| match (selection, dimension.attribute(product)) {
            (Selection::Options(set), Some(value)) => set.is_empty() || set.contains(value),
            (Selection::Range(range), None) => range.contains(product.price),
            // mismatched dimension/selection pairs carry no constraint
            _ => true,
        })
    }
}

pub fn filter(products: &[Product], filters: &FilterSet) -> Vec<Product> {
    products.iter().filter(|p| filters.matches(p)).cloned().collect()
}

// =============================================================================
// Search
// =============================================================================

fn matches_query(product: &Product, needle: &str) -> bool {
    product.searchable_fields().iter().any(|field| field.to_lowercase().contains(needle))
}

/// Case-insensitive substring search over the product's text fields.
pub fn search(products: &[Product], query: &str) -> Vec<Product> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return products.to_vec();
    }
    products.iter().filter(|p| matches_query(p, &needle)).cloned().collect()
}

/// Search-bar autocompletion: the first `limit` candidates containing `query`.
pub fn suggestions<'a, I>(candidates: I, query: &str, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = query.trim().to_lowercase();
    candidates
        .into_iter()
        .filter(|c| c.to_lowercase().contains(&needle))
        .take(limit)
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Sort
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum SortKey {
    #[default]
    Featured,
    Newest,
    PriceLow,
    PriceHigh,
    Name,
    Rating,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Featured => "featured",
            Self::Newest => "newest",
            Self::PriceLow => "price-low",
            Self::PriceHigh => "price-high",
            Self::Name => "name",
            Self::Rating => "rating",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Featured => "Featured",
            Self::Newest => "Newest First",
            Self::PriceLow => "Price: Low to High",
            Self::PriceHigh => "Price: High to Low",
            Self::Name => "Name A-Z",
            Self::Rating => "Highest Rated",
        }
    }

    fn compare(self, a: &Product, b: &Product) -> Ordering {
        match self {
            Self::PriceLow => a.price.cmp(&b.price),
            Self::PriceHigh => b.price.cmp(&a.price),
            Self::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()).then_with(|| a.name.cmp(&b.name)),
            Self::Newest => b.is_new.cmp(&a.is_new),
            Self::Featured | Self::Rating => b.rating_or_zero().total_cmp(&a.rating_or_zero()),
        }
    }
}

/// Unknown keys fall back to `featured`.
impl From<&str> for SortKey {
    fn from(value: &str) -> Self {
        match value.trim() {
            "newest" => Self::Newest,
            "price-low" => Self::PriceLow,
            "price-high" => Self::PriceHigh,
            "name" => Self::Name,
            "rating" => Self::Rating,
            _ => Self::Featured,
        }
    }
}

impl From<String> for SortKey {
    fn from(value: String) -> Self { Self::from(value.as_str()) }
}

impl From<SortKey> for &'static str {
    fn from(key: SortKey) -> Self { key.as_str() }
}

/// Stable sort into a new vector.
pub fn sort(products: &[Product], key: SortKey) -> Vec<Product> {
    let mut sorted = products.to_vec();
    sorted.sort_by(|a, b| key.compare(a, b));
    sorted
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Fixed-size windowing. Page numbers start at 1; page 0 reads as 1 and a
/// page size of 0 as 1. Pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size).min(total_items);
    let end = start.saturating_add(page_size).min(total_items);
    Page { items: items[start..end].to_vec(), page, page_size, total_pages, total_items }
}

// =============================================================================
// Query
// =============================================================================

/// Everything the shopper has selected on a listing page.
///
/// The mutators reset the page to 1, since any of them changes the
/// upstream result set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub query: String,
    pub filters: FilterSet,
    pub sort: SortKey,
    pub page: usize,
    pub page_size: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self { query: String::new(), filters: FilterSet::new(), sort: SortKey::default(), page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl CatalogQuery {
    pub fn new(page_size: usize) -> Self { Self { page_size, ..Self::default() } }

    pub fn set_search(&mut self, query: impl Into<String>) { self.query = query.into(); self.page = 1; }
    pub fn toggle_filter(&mut self, dimension: Dimension, option: &str) { self.filters.toggle(dimension, option); self.page = 1; }
    pub fn set_price(&mut self, a: Decimal, b: Decimal) { self.filters.set_price(a, b); self.page = 1; }
    pub fn clear_filters(&mut self) { self.filters.clear(); self.page = 1; }
    pub fn set_sort(&mut self, sort: SortKey) { self.sort = sort; self.page = 1; }
    pub fn set_page(&mut self, page: usize) { self.page = page.max(1); }

    /// Search, filter and sort without windowing.
    pub fn matching(&self, products: &[Product]) -> Vec<Product> {
        let found = search(products, &self.query);
        let filtered = filter(&found, &self.filters);
        sort(&filtered, self.sort)
    }

    pub fn run(&self, products: &[Product]) -> Page<Product> {
        paginate(&self.matching(products), self.page, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::fixtures::product;
    use crate::domain::value_objects::ProductId;

    fn catalog() -> Vec<Product> {
        let mut solitaire = product(1, "Solitaire Ring", 1200);
        solitaire.rating = Some(4.9);
        let mut chain = product(2, "rope chain", 300);
        chain.category = "Necklaces".into();
        chain.metal = "Silver".into();
        chain.gemstone = String::new();
        chain.is_new = true;
        let mut studs = product(3, "Ruby Studs", 650);
        studs.category = "Earrings".into();
        studs.gemstone = "Ruby".into();
        studs.rating = Some(4.5);
        studs.description = "Pigeon blood red stones".into();
        let mut bangle = product(4, "Kundan Bangle", 300);
        bangle.category = "Bangles".into();
        bangle.metal = "Kundan".into();
        bangle.is_new = true;
        bangle.rating = Some(4.5);
        vec![solitaire, chain, studs, bangle]
    }

    fn ids(products: &[Product]) -> Vec<u64> { products.iter().map(|p| p.id.0).collect() }

    #[test]
    fn test_price_scenario() {
        let mut gold = product(1, "A", 100);
        gold.metal = "Gold".into();
        let mut silver = product(2, "B", 900);
        silver.metal = "Silver".into();
        let mut filters = FilterSet::new();
        filters.set_price(Decimal::ZERO, Decimal::new(500, 0));
        assert_eq!(ids(&filter(&[gold, silver], &filters)), vec![1]);
    }

    #[test]
    fn test_inverted_price_is_normalized() {
        let mut filters = FilterSet::new();
        filters.set_price(Decimal::new(700, 0), Decimal::new(300, 0));
        assert_eq!(ids(&filter(&catalog(), &filters)), vec![2, 3, 4]);
    }

    #[test]
    fn test_and_across_or_within() {
        let mut filters = FilterSet::new();
        filters.set_options(Dimension::Metal, ["Gold", "Silver"]);
        assert_eq!(ids(&filter(&catalog(), &filters)), vec![1, 2, 3]);
        filters.toggle(Dimension::Category, "Necklaces");
        assert_eq!(ids(&filter(&catalog(), &filters)), vec![2]);
    }

    #[test]
    fn test_filter_is_order_preserving_subset_and_idempotent() {
        let products = catalog();
        let mut filters = FilterSet::new();
        filters.set_options(Dimension::Category, ["Rings", "Bangles", "Earrings"]);
        filters.set_price(Decimal::new(300, 0), Decimal::new(1200, 0));
        let once = filter(&products, &filters);
        assert_eq!(ids(&once), vec![1, 3, 4]);
        assert_eq!(filter(&once, &filters), once);
    }

    #[test]
    fn test_toggle_twice_removes_dimension() {
        let mut filters = FilterSet::new();
        filters.toggle(Dimension::Gemstone, "Ruby");
        assert_eq!(filters.applied_count(), 1);
        filters.toggle(Dimension::Gemstone, "Ruby");
        assert!(filters.is_empty());
        filters.toggle(Dimension::Price, "100");
        assert!(filters.is_empty());
    }

    #[test]
    fn test_applied_count() {
        let mut filters = FilterSet::new();
        filters.set_options(Dimension::Metal, ["Gold", "Silver"]);
        filters.set_price(Decimal::ZERO, Decimal::ONE);
        assert_eq!(filters.applied_count(), 3);
    }

    #[test]
    fn test_dimension_parse() {
        assert_eq!("Metal".parse::<Dimension>(), Ok(Dimension::Metal));
        assert!("size".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_filter_set_wire_shape() {
        let filters: FilterSet = serde_json::from_str(r#"{"metal":["Gold"],"price":[500,0]}"#).unwrap();
        assert_eq!(ids(&filter(&catalog(), &filters)), Vec::<u64>::new());
        let filters: FilterSet = serde_json::from_str(r#"{"metal":["Silver"],"price":[500,0]}"#).unwrap();
        assert_eq!(ids(&filter(&catalog(), &filters)), vec![2]);
    }

    #[test]
    fn test_filter_set_skips_unknown_dimensions() {
        let filters: FilterSet = serde_json::from_str(r#"{"size":["7"],"Metal":["Silver"],"gemstone":[]}"#).unwrap();
        assert_eq!(filters.applied_count(), 1);
        assert!(filters.get(Dimension::Metal).is_some());
        assert!(filters.get(Dimension::Gemstone).is_none());
        assert!(serde_json::from_str::<FilterSet>(r#"{"metal":42}"#).is_err());
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let products = catalog();
        assert_eq!(ids(&search(&products, "RUBY")), vec![3]);
        assert_eq!(ids(&search(&products, "pigeon")), vec![3]);
        assert_eq!(ids(&search(&products, "kundan")), vec![4]);
        assert_eq!(ids(&search(&products, "  ")), vec![1, 2, 3, 4]);
        assert!(search(&products, "platinum").is_empty());
    }

    #[test]
    fn test_sort_keys() {
        let products = catalog();
        assert_eq!(ids(&sort(&products, SortKey::PriceLow)), vec![2, 4, 3, 1]);
        assert_eq!(ids(&sort(&products, SortKey::PriceHigh)), vec![1, 3, 2, 4]);
        assert_eq!(ids(&sort(&products, SortKey::Name)), vec![4, 2, 3, 1]);
        assert_eq!(ids(&sort(&products, SortKey::Rating)), vec![1, 3, 4, 2]);
        assert_eq!(ids(&sort(&products, SortKey::Newest)), vec![2, 4, 1, 3]);
        assert_eq!(ids(&sort(&products, SortKey::Featured)), vec![1, 3, 4, 2]);
        assert_eq!(ids(&products), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        for key in [SortKey::Featured, SortKey::Newest, SortKey::PriceLow, SortKey::PriceHigh, SortKey::Name, SortKey::Rating] {
            let once = sort(&catalog(), key);
            assert_eq!(sort(&once, key), once, "{}", key.as_str());
        }
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::from("price-high"), SortKey::PriceHigh);
        assert_eq!(SortKey::from("bogus"), SortKey::Featured);
        assert_eq!(serde_json::to_string(&SortKey::PriceLow).unwrap(), "\"price-low\"");
    }

    #[test]
    fn test_paginate_pages_reconstruct_input() {
        let items: Vec<u32> = (1..=25).collect();
        let first = paginate(&items, 1, 12);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.items.len(), 12);
        let mut rebuilt = Vec::new();
        for page in 1..=first.total_pages {
            let window = paginate(&items, page, 12);
            assert!(window.items.len() <= 12);
            rebuilt.extend(window.items);
        }
        assert_eq!(rebuilt, items);
    }

    #[test]
    fn test_paginate_edges() {
        let items: Vec<u32> = (1..=3).collect();
        assert!(paginate(&items, 5, 2).items.is_empty());
        assert_eq!(paginate(&items, 0, 2).items, vec![1, 2]);
        assert_eq!(paginate(&items, 1, 0).items, vec![1]);
        let empty: Vec<u32> = Vec::new();
        let page = paginate(&empty, 1, 12);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_empty_catalog_flows_through() {
        let mut query = CatalogQuery::default();
        query.set_search("gold");
        query.toggle_filter(Dimension::Metal, "Gold");
        let page = query.run(&[]);
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 0);
    }

    #[test]
    fn test_query_mutators_reset_page() {
        let mut query = CatalogQuery::new(1);
        query.set_page(3);
        assert_eq!(query.run(&catalog()).items[0].id, ProductId(4));
        query.set_sort(SortKey::PriceLow);
        assert_eq!(query.page, 1);
        query.set_page(2);
        query.toggle_filter(Dimension::Metal, "Gold");
        assert_eq!(query.page, 1);
    }

    #[test]
    fn test_suggestions() {
        let names = ["Gold Ring", "Gold Chain", "Silver Ring", "Rose Gold Band", "Gold Coin", "Gold Anklet", "Gold Stud"];
        let hits = suggestions(names.iter().copied(), "gold", DEFAULT_SUGGESTION_LIMIT);
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0], "Gold Ring");
        assert!(!hits.contains(&"Silver Ring".to_string()));
    }
}
