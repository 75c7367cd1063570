//! Luxe Jewels Storefront - catalog, cart and checkout over HTTP

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use luxe_jewels_storefront::application::cart::{CartRegistry, CartUpdate};
use luxe_jewels_storefront::application::catalog::{CatalogService, DEFAULT_RELATED_LIMIT, DEFAULT_SHOWCASE_LIMIT};
use luxe_jewels_storefront::application::checkout::{CheckoutError, CheckoutService, OrderConfirmation};
use luxe_jewels_storefront::config::{CartBackendKind, Config};
use luxe_jewels_storefront::domain::aggregates::{OrderSummary, PaymentInfo, ShippingInfo};
use luxe_jewels_storefront::domain::events::{DomainEvent, Notice};
use luxe_jewels_storefront::domain::query::{suggestions, DEFAULT_SUGGESTION_LIMIT};
use luxe_jewels_storefront::infrastructure::cart_storage::{CartBackend, LocalCartStorage, RemoteCartStorage};
use luxe_jewels_storefront::infrastructure::records::{MemoryRecordStore, PgRecordStore, RecordBackend};
use luxe_jewels_storefront::{
    CartLine, CatalogQuery, Category, Checkout, CheckoutStep, Dimension, EcommerceError, Page, Product, ProductId, SortKey,
};

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    catalog: CatalogService<RecordBackend>,
    carts: Arc<CartRegistry<CartBackend>>,
    checkout: Arc<CheckoutService>,
    nats: Option<async_nats::Client>,
    page_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let records = match &config.database_url {
        Some(url) => {
            let store = PgRecordStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            tracing::info!("using Postgres record store");
            RecordBackend::Postgres(store)
        }
        None => {
            let store = MemoryRecordStore::new();
            if let Err(e) = store.seed_from_file(&config.catalog_seed).await {
                tracing::warn!(error = %e, "starting with an empty catalog");
            }
            RecordBackend::Memory(store)
        }
    };

    let carts = match config.cart_backend {
        CartBackendKind::Local => {
            let dir = config.cart_storage_dir.clone();
            CartRegistry::new(move |session| CartBackend::Local(LocalCartStorage::for_session(dir.clone(), session)))
        }
        CartBackendKind::Remote => {
            let records = records.clone();
            CartRegistry::new(move |session| CartBackend::Remote(RemoteCartStorage::new(records.clone(), session)))
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events will not be published"); None }
        },
        None => None,
    };

    let state = AppState {
        catalog: CatalogService::new(records),
        carts: Arc::new(carts),
        checkout: Arc::new(CheckoutService::new(config.checkout_delay)),
        nats,
        page_size: config.page_size,
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "luxe-jewels-storefront"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/featured", get(featured_products))
        .route("/api/v1/products/new", get(new_arrivals))
        .route("/api/v1/products/sale", get(sale_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/related", get(related_products))
        .route("/api/v1/search/suggestions", get(search_suggestions))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/categories/:slug", get(get_category))
        .route("/api/v1/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items/:product_id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/checkout/:session", post(place_order))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("💎 Luxe Jewels storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn catalog_error(e: EcommerceError) -> ApiError {
    match e {
        EcommerceError::ProductNotFound(_) | EcommerceError::CategoryNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        EcommerceError::InvalidSize { .. } | EcommerceError::InvalidQuantity => (StatusCode::BAD_REQUEST, e.to_string()),
        EcommerceError::InsufficientInventory => (StatusCode::CONFLICT, e.to_string()),
        other => { tracing::error!(error = %other, "catalog request failed"); (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()) }
    }
}

async fn publish(nats: &Option<async_nats::Client>, events: Vec<DomainEvent>) {
    let Some(client) = nats else { return };
    for event in events {
        let payload = match serde_json::to_vec(&event) { Ok(p) => p, Err(e) => { tracing::warn!(error = %e, "unserializable event"); continue } };
        if let Err(e) = client.publish(event.subject(), payload.into()).await {
            tracing::warn!(subject = %event.subject(), error = %e, "failed to publish event");
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ListParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub metal: Option<String>,
    pub gemstone: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub page: Page<Product>,
    pub applied_filters: usize,
    pub sort: &'static str,
}

fn parse_price(raw: &Option<String>) -> Result<Option<Decimal>, ApiError> {
    raw.as_deref().filter(|s| !s.trim().is_empty()).map(|s| s.trim().parse::<Decimal>()).transpose().map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid price: {e}")))
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<ProductListing>, ApiError> {
    p.validate().map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let mut query = CatalogQuery::new(p.per_page.unwrap_or(s.page_size));
    query.set_search(p.q.clone().unwrap_or_default());
    for (dimension, raw) in [(Dimension::Category, &p.category), (Dimension::Metal, &p.metal), (Dimension::Gemstone, &p.gemstone)] {
        if let Some(raw) = raw { query.filters.set_options(dimension, raw.split(',').map(str::trim).filter(|o| !o.is_empty())); }
    }
    match (parse_price(&p.min_price)?, parse_price(&p.max_price)?) {
        (None, None) => {}
        (min, max) => query.set_price(min.unwrap_or(Decimal::ZERO), max.unwrap_or(Decimal::MAX)),
    }
    query.set_sort(SortKey::from(p.sort.as_deref().unwrap_or_default()));
    query.set_page(p.page.unwrap_or(1));

    let products = s.catalog.all_products().await.map_err(catalog_error)?;
    Ok(Json(ProductListing { page: query.run(&products), applied_filters: query.filters.applied_count(), sort: query.sort.label() }))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<u64>) -> Result<Json<Product>, ApiError> {
    s.catalog.product(ProductId(id)).await.map(Json).map_err(catalog_error)
}

async fn related_products(State(s): State<AppState>, Path(id): Path<u64>) -> Result<Json<Vec<Product>>, ApiError> {
    s.catalog.related(ProductId(id), DEFAULT_RELATED_LIMIT).await.map(Json).map_err(catalog_error)
}

async fn featured_products(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    s.catalog.featured(DEFAULT_SHOWCASE_LIMIT).await.map(Json).map_err(catalog_error)
}

async fn new_arrivals(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    s.catalog.new_arrivals(DEFAULT_SHOWCASE_LIMIT).await.map(Json).map_err(catalog_error)
}

async fn sale_products(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    s.catalog.on_sale(DEFAULT_SHOWCASE_LIMIT).await.map(Json).map_err(catalog_error)
}

#[derive(Debug, Deserialize)] pub struct SuggestParams { pub q: String }

async fn search_suggestions(State(s): State<AppState>, Query(p): Query<SuggestParams>) -> Result<Json<Vec<String>>, ApiError> {
    if p.q.trim().is_empty() { return Ok(Json(Vec::new())); }
    let products = s.catalog.all_products().await.map_err(catalog_error)?;
    Ok(Json(suggestions(products.iter().map(|p| p.name.as_str()), &p.q, DEFAULT_SUGGESTION_LIMIT)))
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    s.catalog.categories().await.map(Json).map_err(catalog_error)
}

async fn get_category(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<Category>, ApiError> {
    s.catalog.category_by_slug(&slug).await.map(Json).map_err(catalog_error)
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub summary: OrderSummary,
    pub notice: Option<Notice>,
}

async fn cart_response(s: &AppState, update: CartUpdate, events: Vec<DomainEvent>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    publish(&s.nats, events).await;
    let products = s.catalog.all_products().await.map_err(catalog_error)?;
    let status = if update.is_ok() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let summary = OrderSummary::compute(&update.lines, &products);
    Ok((status, Json(CartView { item_count: update.item_count(), lines: update.lines, summary, notice: update.notice })))
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let cart = s.carts.session(&session).await;
    let lines = cart.lock().await.lines().to_vec();
    cart_response(&s, CartUpdate { lines, outcome: Ok(()), notice: None }, Vec::new()).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest { pub product_id: ProductId, pub quantity: Option<u32>, pub size: Option<String> }

async fn add_to_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddToCartRequest>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let product = s.catalog.product(r.product_id).await.map_err(catalog_error)?;
    if !product.accepts_size(r.size.as_deref()) {
        return Err(catalog_error(EcommerceError::InvalidSize { product_id: product.id, size: r.size.unwrap_or_default() }));
    }
    let quantity = r.quantity.unwrap_or(1);
    if quantity == 0 { return Err(catalog_error(EcommerceError::InvalidQuantity)); }
    let cart = s.carts.session(&session).await;
    let mut store = cart.lock().await;
    let available = product.max_addable(store.quantity_of(product.id));
    if available == 0 { return Err(catalog_error(EcommerceError::InsufficientInventory)); }
    let update = store.add_item(product.id, quantity.min(available), r.size).await;
    let events = store.take_events();
    drop(store);
    cart_response(&s, update, events).await
}

#[derive(Debug, Deserialize)] pub struct UpdateQuantityRequest { pub quantity: i64, pub size: Option<String> }

async fn update_cart_item(State(s): State<AppState>, Path((session, product_id)): Path<(String, u64)>, Json(r): Json<UpdateQuantityRequest>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let product = s.catalog.product(ProductId(product_id)).await.map_err(catalog_error)?;
    let quantity = product.stock_limited(r.quantity).ok_or_else(|| catalog_error(EcommerceError::InsufficientInventory))?;
    let cart = s.carts.session(&session).await;
    let mut store = cart.lock().await;
    let update = store.update_quantity(product.id, r.size.as_deref(), quantity).await;
    let events = store.take_events();
    drop(store);
    cart_response(&s, update, events).await
}

async fn remove_cart_item(State(s): State<AppState>, Path((session, product_id)): Path<(String, u64)>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let cart = s.carts.session(&session).await;
    let mut store = cart.lock().await;
    let update = store.remove_item(ProductId(product_id)).await;
    let events = store.take_events();
    drop(store);
    cart_response(&s, update, events).await
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let cart = s.carts.session(&session).await;
    let mut store = cart.lock().await;
    let update = store.clear().await;
    let events = store.take_events();
    drop(store);
    cart_response(&s, update, events).await
}

// =============================================================================
// Checkout
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest { pub shipping: ShippingInfo, pub payment: PaymentInfo }

#[derive(Debug, Serialize)]
pub struct CheckoutRejected { pub step: CheckoutStep, pub errors: BTreeMap<String, String> }

async fn place_order(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<OrderConfirmation>), ApiError> {
    let mut checkout = Checkout::new();
    checkout.set_shipping(r.shipping);
    checkout.next_step();
    checkout.set_payment(r.payment);
    checkout.next_step();
    if checkout.step() != CheckoutStep::Review {
        let rejected = CheckoutRejected { step: checkout.step(), errors: checkout.errors().clone() };
        return Err((StatusCode::UNPROCESSABLE_ENTITY, serde_json::to_string(&rejected).unwrap_or_default()));
    }

    let products = s.catalog.all_products().await.map_err(catalog_error)?;
    let cart = s.carts.session(&session).await;
    let confirmation = s.checkout.place_order(&session, &mut checkout, &cart, &products).await.map_err(|e| match e {
        CheckoutError::EmptyCart => (StatusCode::BAD_REQUEST, e.to_string()),
        CheckoutError::InFlight | CheckoutError::Order(_) => (StatusCode::CONFLICT, e.to_string()),
    })?;

    let mut events = checkout.take_events();
    events.extend(cart.lock().await.take_events());
    publish(&s.nats, events).await;
    Ok((StatusCode::CREATED, Json(confirmation)))
}
