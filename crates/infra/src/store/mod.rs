//! Product and order storage boundary.
//!
//! Two implementations: [`InMemoryProductStore`]/[`InMemoryOrderStore`] for
//! tests and local runs, and the Postgres stores in [`postgres`].
//!
//! ## Atomicity
//!
//! Stock, rating and view counters are never read-modify-written by callers.
//! Each is a single storage operation (`UPDATE ... SET stock = stock - $n WHERE
//! stock >= $n` in Postgres, one write-lock section in memory), so concurrent
//! checkouts cannot oversell and concurrent ratings cannot lose updates.
//!
//! Restocking an order line (`restock_item`) records the line id together with
//! the stock increment, so a retried restock of the same line is a no-op.
//!
//! Orders are saved whole, guarded by their version (`ExpectedVersion`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_catalog::{
    Category, Product, ProductDraft, ProductFilter, ProductSort, ProductSummary,
};
use storefront_core::{
    ExpectedVersion, OrderId, OrderItemId, Page, PageRequest, ProductId, UserId,
};
use storefront_orders::{
    DEFAULT_PRODUCT_ITEMS_LIMIT, NewOrder, Order, OrderItem, OrderNumber, OrderQuery, OrderStatus,
};

use crate::error::StoreResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryOrderStore, InMemoryProductStore};
pub use postgres::{PostgresOrderStore, PostgresProductStore};

/// Catalog storage.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert a validated product. `Duplicate` when the sku or slug is taken.
    async fn insert_product(&self, draft: ProductDraft, at: DateTime<Utc>) -> StoreResult<Product>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>>;

    /// Persist catalog edits (name, slug, pricing, flags, media).
    ///
    /// Counters (`stock`, `sold_count`, ratings, views) are left as stored; they
    /// only change through the dedicated operations below.
    async fn update_product(&self, product: &Product) -> StoreResult<Product>;

    /// Atomically take `quantity` units: `InsufficientStock` (and no change)
    /// when fewer are on hand, `NotFound` for an unknown product.
    async fn decrease_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product>;

    /// Put units back on the shelf (cancellation, return, failed checkout).
    /// `sold_count` never goes down.
    async fn increase_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product>;

    /// Put an order line's units back exactly once.
    ///
    /// Returns `false` (and changes nothing) when `item_id` was already
    /// restocked. `NotFound` for an unknown product.
    async fn restock_item(
        &self,
        item_id: OrderItemId,
        product_id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Atomically fold one rating (1..=5) into the running average.
    async fn update_rating(&self, id: ProductId, rating: u8, at: DateTime<Utc>)
    -> StoreResult<Product>;

    /// Count a product page view. Inactive products are `NotFound`.
    async fn record_view(&self, id: ProductId) -> StoreResult<Product>;

    /// Paged catalog listing over active products.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>>;

    /// Active products in a category, newest first.
    async fn find_by_category(
        &self,
        category: Category,
        limit: u32,
    ) -> StoreResult<Vec<ProductSummary>>;

    /// Active featured products, best rated first.
    async fn find_featured(&self, limit: u32) -> StoreResult<Vec<ProductSummary>>;

    /// Active products created in the last 30 days, newest first.
    async fn find_new(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductSummary>>;

    /// Active products whose name, description or brand contains `term`, best rated first.
    async fn search_products(&self, term: &str, limit: u32) -> StoreResult<Vec<ProductSummary>>;
}

/// Order storage. An order is stored together with its items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order and its items. `Duplicate` when the order number is taken.
    async fn insert_order(&self, order: NewOrder, at: DateTime<Utc>) -> StoreResult<Order>;

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    async fn get_order_by_number(&self, number: &OrderNumber) -> StoreResult<Option<Order>>;

    /// Persist status, amounts and item changes.
    ///
    /// Fails with `Conflict` unless the stored version matches `expected`;
    /// returns the order at its new version.
    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> StoreResult<Order>;

    async fn find_orders(&self, query: OrderQuery) -> StoreResult<Vec<Order>>;

    /// Items of one order in creation order.
    async fn items_of(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>>;

    /// Most recent sales lines of a product, newest first.
    async fn items_for_product(&self, product_id: ProductId, limit: u32)
    -> StoreResult<Vec<OrderItem>>;

    async fn find_by_user(&self, user_id: UserId) -> StoreResult<Vec<Order>> {
        self.find_orders(OrderQuery::by_user(user_id)).await
    }

    async fn find_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        self.find_orders(OrderQuery::by_status(status)).await
    }

    async fn find_pending(&self) -> StoreResult<Vec<Order>> {
        self.find_orders(OrderQuery::pending()).await
    }

    async fn recent_sales(&self, product_id: ProductId) -> StoreResult<Vec<OrderItem>> {
        self.items_for_product(product_id, DEFAULT_PRODUCT_ITEMS_LIMIT)
            .await
    }
}

#[async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn insert_product(&self, draft: ProductDraft, at: DateTime<Utc>) -> StoreResult<Product> {
        (**self).insert_product(draft, at).await
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        (**self).get_product(id).await
    }

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        (**self).get_product_by_slug(slug).await
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        (**self).update_product(product).await
    }

    async fn decrease_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        (**self).decrease_stock(id, quantity, at).await
    }

    async fn increase_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        (**self).increase_stock(id, quantity, at).await
    }

    async fn restock_item(
        &self,
        item_id: OrderItemId,
        product_id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        (**self).restock_item(item_id, product_id, quantity, at).await
    }

    async fn update_rating(
        &self,
        id: ProductId,
        rating: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        (**self).update_rating(id, rating, at).await
    }

    async fn record_view(&self, id: ProductId) -> StoreResult<Product> {
        (**self).record_view(id).await
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>> {
        (**self).list_products(filter, sort, page).await
    }

    async fn find_by_category(
        &self,
        category: Category,
        limit: u32,
    ) -> StoreResult<Vec<ProductSummary>> {
        (**self).find_by_category(category, limit).await
    }

    async fn find_featured(&self, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        (**self).find_featured(limit).await
    }

    async fn find_new(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        (**self).find_new(now, limit).await
    }

    async fn search_products(&self, term: &str, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        (**self).search_products(term, limit).await
    }
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn insert_order(&self, order: NewOrder, at: DateTime<Utc>) -> StoreResult<Order> {
        (**self).insert_order(order, at).await
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> StoreResult<Option<Order>> {
        (**self).get_order_by_number(number).await
    }

    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> StoreResult<Order> {
        (**self).save_order(order, expected).await
    }

    async fn find_orders(&self, query: OrderQuery) -> StoreResult<Vec<Order>> {
        (**self).find_orders(query).await
    }

    async fn items_of(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        (**self).items_of(order_id).await
    }

    async fn items_for_product(
        &self,
        product_id: ProductId,
        limit: u32,
    ) -> StoreResult<Vec<OrderItem>> {
        (**self).items_for_product(product_id, limit).await
    }
}
