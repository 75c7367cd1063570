//! Catalog service: product and category lookups over the record store.

use crate::domain::aggregates::{Category, Product};
use crate::domain::query::{filter, search, FilterSet};
use crate::domain::value_objects::{CategoryId, ProductId};
use crate::infrastructure::records::{to_domain_all, Entity, FetchParams, RecordStore, SortDirection, ID_FIELD};
use crate::{EcommerceError, Result};

pub const DEFAULT_SHOWCASE_LIMIT: usize = 8;
pub const DEFAULT_RELATED_LIMIT: usize = 4;
const FEATURED_MIN_RATING: f64 = 4.5;

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: RecordStore> CatalogService<S> {
    pub fn new(store: S) -> Self { Self { store } }

    pub async fn all_products(&self) -> Result<Vec<Product>> {
        let params = FetchParams::new().order_by(ID_FIELD, SortDirection::Asc);
        let records = self.store.fetch(Product::TABLE, &params).await?.into_data()?;
        Ok(to_domain_all(records)?)
    }

    pub async fn product(&self, id: ProductId) -> Result<Product> {
        let record = self
            .store
            .get_by_id(Product::TABLE, id.value(), &[])
            .await?
            .into_data()?
            .ok_or(EcommerceError::ProductNotFound(id))?;
        Ok(Product::to_domain(record)?)
    }

    /// Products whose category equals `category`, ignoring case.
    pub async fn products_in_category(&self, category: &str) -> Result<Vec<Product>> {
        Ok(self
            .all_products()
            .await?
            .into_iter()
            .filter(|p| p.category.eq_ignore_ascii_case(category))
            .collect())
    }

    pub async fn featured(&self, limit: usize) -> Result<Vec<Product>> {
        self.showcase(limit, |p| p.rating_or_zero() >= FEATURED_MIN_RATING).await
    }

    pub async fn new_arrivals(&self, limit: usize) -> Result<Vec<Product>> {
        self.showcase(limit, |p| p.is_new).await
    }

    pub async fn on_sale(&self, limit: usize) -> Result<Vec<Product>> {
        self.showcase(limit, Product::is_on_sale).await
    }

    async fn showcase(&self, limit: usize, keep: impl Fn(&Product) -> bool) -> Result<Vec<Product>> {
        Ok(self.all_products().await?.into_iter().filter(|p| keep(p)).take(limit).collect())
    }

    /// Products sharing a category or metal with `id`. Unknown ids have no relations.
    pub async fn related(&self, id: ProductId, limit: usize) -> Result<Vec<Product>> {
        let products = self.all_products().await?;
        let Some(anchor) = products.iter().find(|p| p.id == id).cloned() else {
            return Ok(Vec::new());
        };
        Ok(products
            .into_iter()
            .filter(|p| p.id != id && (p.category == anchor.category || p.metal == anchor.metal))
            .take(limit)
            .collect())
    }

    pub async fn search(&self, query: &str, filters: &FilterSet) -> Result<Vec<Product>> {
        let products = self.all_products().await?;
        Ok(filter(&search(&products, query), filters))
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let params = FetchParams::new().order_by(ID_FIELD, SortDirection::Asc);
        let records = self.store.fetch(Category::TABLE, &params).await?.into_data()?;
        Ok(to_domain_all(records)?)
    }

    pub async fn category(&self, id: CategoryId) -> Result<Category> {
        let record = self
            .store
            .get_by_id(Category::TABLE, id.value(), &[])
            .await?
            .into_data()?
            .ok_or_else(|| EcommerceError::CategoryNotFound(format!("with id {id}")))?;
        Ok(Category::to_domain(record)?)
    }

    pub async fn category_by_slug(&self, slug: &str) -> Result<Category> {
        let params = FetchParams::new().where_eq("slug", slug);
        let record = self
            .store
            .fetch(Category::TABLE, &params)
            .await?
            .into_data()?
            .into_iter()
            .next()
            .ok_or_else(|| EcommerceError::CategoryNotFound(format!("with slug {slug}")))?;
        Ok(Category::to_domain(record)?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::seeded_store;
    use crate::domain::query::Dimension;

    fn ids(products: &[Product]) -> Vec<u64> { products.iter().map(|p| p.id.0).collect() }

    #[tokio::test]
    async fn test_product_lookup() {
        let catalog = CatalogService::new(seeded_store().await);
        assert_eq!(catalog.product(ProductId(2)).await.unwrap().name, "Rope Chain");
        assert!(matches!(catalog.product(ProductId(42)).await, Err(EcommerceError::ProductNotFound(ProductId(42)))));
    }

    #[tokio::test]
    async fn test_category_listing_is_case_insensitive() {
        let catalog = CatalogService::new(seeded_store().await);
        assert_eq!(ids(&catalog.products_in_category("RINGS").await.unwrap()), vec![1, 4]);
    }

    #[tokio::test]
    async fn test_showcases() {
        let catalog = CatalogService::new(seeded_store().await);
        assert_eq!(ids(&catalog.featured(DEFAULT_SHOWCASE_LIMIT).await.unwrap()), vec![1, 4]);
        assert_eq!(ids(&catalog.new_arrivals(1).await.unwrap()), vec![2]);
        assert_eq!(ids(&catalog.on_sale(DEFAULT_SHOWCASE_LIMIT).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn test_related() {
        let catalog = CatalogService::new(seeded_store().await);
        assert_eq!(ids(&catalog.related(ProductId(1), DEFAULT_RELATED_LIMIT).await.unwrap()), vec![2]);
        assert_eq!(ids(&catalog.related(ProductId(3), DEFAULT_RELATED_LIMIT).await.unwrap()), vec![4]);
        assert!(catalog.related(ProductId(77), DEFAULT_RELATED_LIMIT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_filters() {
        let catalog = CatalogService::new(seeded_store().await);
        let mut filters = FilterSet::new();
        filters.toggle(Dimension::Metal, "Silver");
        assert_eq!(ids(&catalog.search("", &filters).await.unwrap()), vec![3, 4]);
        assert_eq!(ids(&catalog.search("pearl", &filters).await.unwrap()), vec![3]);
    }

    #[tokio::test]
    async fn test_categories() {
        let catalog = CatalogService::new(seeded_store().await);
        assert_eq!(catalog.categories().await.unwrap().len(), 2);
        assert_eq!(catalog.category_by_slug("necklaces").await.unwrap().id, CategoryId(2));
        assert_eq!(catalog.category(CategoryId(1)).await.unwrap().slug, "rings");
        assert!(matches!(catalog.category_by_slug("tiaras").await, Err(EcommerceError::CategoryNotFound(_))));
    }
}
