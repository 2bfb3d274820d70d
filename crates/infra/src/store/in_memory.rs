use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_catalog::{
    Category, Product, ProductDraft, ProductFilter, ProductSort, ProductSummary,
    new_arrivals_since,
};
use storefront_core::{
    AggregateRoot, DomainError, ExpectedVersion, OrderId, OrderItemId, Page, PageRequest,
    ProductId,
};
use storefront_orders::{NewOrder, Order, OrderItem, OrderNumber, OrderQuery};

use super::{OrderStore, ProductStore};
use crate::error::{StoreError, StoreResult};

fn poisoned() -> StoreError {
    StoreError::database("lock poisoned")
}

#[derive(Debug, Default)]
struct ProductTable {
    next_id: i64,
    rows: HashMap<ProductId, Product>,
    restocked_items: HashSet<OrderItemId>,
}

impl ProductTable {
    fn get_mut(&mut self, id: ProductId) -> StoreResult<&mut Product> {
        self.rows
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found().into())
    }

    fn ensure_unique(&self, id: Option<ProductId>, sku: &str, slug: &str) -> StoreResult<()> {
        for other in self.rows.values().filter(|p| Some(p.id_typed()) != id) {
            if other.sku() == sku {
                return Err(DomainError::duplicate("products_sku_key").into());
            }
            if other.slug() == slug {
                return Err(DomainError::duplicate("products_slug_key").into());
            }
        }
        Ok(())
    }

    /// Active products passing `keep`, sorted and capped.
    fn select(
        &self,
        keep: impl Fn(&Product) -> bool,
        sort: ProductSort,
        limit: u32,
    ) -> Vec<ProductSummary> {
        let mut hits: Vec<&Product> = self
            .rows
            .values()
            .filter(|&p| p.is_active() && keep(p))
            .collect();
        hits.sort_by(|a, b| sort.compare(a, b));
        hits.into_iter()
            .take(limit as usize)
            .map(Product::summary)
            .collect()
    }
}

/// In-memory catalog.
///
/// Intended for tests/dev. Every counter update runs inside one write lock, so
/// it has the same all-or-nothing behaviour as the SQL store.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    table: RwLock<ProductTable>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&ProductTable) -> StoreResult<T>) -> StoreResult<T> {
        let table = self.table.read().map_err(|_| poisoned())?;
        f(&table)
    }

    fn write<T>(&self, f: impl FnOnce(&mut ProductTable) -> StoreResult<T>) -> StoreResult<T> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        f(&mut table)
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert_product(&self, draft: ProductDraft, at: DateTime<Utc>) -> StoreResult<Product> {
        self.write(|table| {
            table.ensure_unique(None, &draft.sku, &draft.slug)?;
            table.next_id += 1;
            let id = ProductId::new(table.next_id);
            let product = Product::from_draft(id, draft, at);
            table.rows.insert(id, product.clone());
            Ok(product)
        })
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        self.read(|table| Ok(table.rows.get(&id).cloned()))
    }

    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        self.read(|table| Ok(table.rows.values().find(|p| p.slug() == slug).cloned()))
    }

    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        self.write(|table| {
            let id = product.id_typed();
            table.ensure_unique(Some(id), product.sku(), product.slug())?;
            let stored = table.get_mut(id)?;

            let current = stored.record();
            let mut next = product.record().clone();
            next.stock = current.stock;
            next.sold_count = current.sold_count;
            next.rating_average = current.rating_average;
            next.rating_count = current.rating_count;
            next.view_count = current.view_count;
            next.created_at = current.created_at;

            *stored = Product::restore(next);
            Ok(stored.clone())
        })
    }

    async fn decrease_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.write(|table| {
            let product = table.get_mut(id)?;
            product.decrease_stock(quantity, at)?;
            Ok(product.clone())
        })
    }

    async fn increase_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.write(|table| {
            let product = table.get_mut(id)?;
            product.increase_stock(quantity, at)?;
            Ok(product.clone())
        })
    }

    async fn restock_item(
        &self,
        item_id: OrderItemId,
        product_id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.write(|table| {
            if table.restocked_items.contains(&item_id) {
                return Ok(false);
            }
            table.get_mut(product_id)?.increase_stock(quantity, at)?;
            table.restocked_items.insert(item_id);
            Ok(true)
        })
    }

    async fn update_rating(
        &self,
        id: ProductId,
        rating: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.write(|table| {
            let product = table.get_mut(id)?;
            product.update_rating(rating, at)?;
            Ok(product.clone())
        })
    }

    async fn record_view(&self, id: ProductId) -> StoreResult<Product> {
        self.write(|table| {
            let product = table.get_mut(id)?;
            if !product.is_active() {
                return Err(DomainError::not_found().into());
            }
            product.record_view();
            Ok(product.clone())
        })
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>> {
        self.read(|table| {
            let mut hits: Vec<&Product> = table.rows.values().filter(|p| filter.matches(p)).collect();
            hits.sort_by(|a, b| sort.compare(a, b));

            let total = hits.len() as u64;
            let items = hits
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .map(Product::summary)
                .collect();
            Ok(Page::new(items, total, page))
        })
    }

    async fn find_by_category(
        &self,
        category: Category,
        limit: u32,
    ) -> StoreResult<Vec<ProductSummary>> {
        self.read(|table| {
            Ok(table.select(|p| p.record().category == category, ProductSort::Newest, limit))
        })
    }

    async fn find_featured(&self, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        self.read(|table| Ok(table.select(|p| p.record().is_featured, ProductSort::RatingDesc, limit)))
    }

    async fn find_new(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        let since = new_arrivals_since(now);
        self.read(|table| Ok(table.select(|p| p.record().created_at >= since, ProductSort::Newest, limit)))
    }

    async fn search_products(&self, term: &str, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        let filter = ProductFilter::search(term);
        self.read(|table| Ok(table.select(|p| filter.matches(p), ProductSort::RatingDesc, limit)))
    }
}

#[derive(Debug, Default)]
struct OrderTable {
    next_order_id: i64,
    next_item_id: i64,
    rows: HashMap<OrderId, Order>,
}

/// In-memory order book.
///
/// Intended for tests/dev. Saves honour `ExpectedVersion` the same way the SQL
/// store does.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    table: RwLock<OrderTable>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&OrderTable) -> StoreResult<T>) -> StoreResult<T> {
        let table = self.table.read().map_err(|_| poisoned())?;
        f(&table)
    }

    fn write<T>(&self, f: impl FnOnce(&mut OrderTable) -> StoreResult<T>) -> StoreResult<T> {
        let mut table = self.table.write().map_err(|_| poisoned())?;
        f(&mut table)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: NewOrder, at: DateTime<Utc>) -> StoreResult<Order> {
        self.write(|table| {
            if table
                .rows
                .values()
                .any(|o| o.order_number() == &order.order_number)
            {
                return Err(DomainError::duplicate("orders_order_number_key").into());
            }

            table.next_order_id += 1;
            let id = OrderId::new(table.next_order_id);
            let item_ids = order
                .items()
                .iter()
                .map(|_| {
                    table.next_item_id += 1;
                    OrderItemId::new(table.next_item_id)
                })
                .collect();

            let order = Order::from_new(id, order, item_ids, at)?;
            table.rows.insert(id, order.clone());
            Ok(order)
        })
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        self.read(|table| Ok(table.rows.get(&id).cloned()))
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> StoreResult<Option<Order>> {
        self.read(|table| {
            Ok(table
                .rows
                .values()
                .find(|o| o.order_number() == number)
                .cloned())
        })
    }

    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> StoreResult<Order> {
        self.write(|table| {
            let stored = table
                .rows
                .get_mut(&order.id_typed())
                .ok_or_else(DomainError::not_found)?;
            expected.check(stored.version())?;

            let mut next = order.clone();
            next.mark_saved(stored.version() + 1);
            *stored = next.clone();
            Ok(next)
        })
    }

    async fn find_orders(&self, query: OrderQuery) -> StoreResult<Vec<Order>> {
        self.read(|table| {
            let mut hits: Vec<&Order> = table.rows.values().filter(|o| query.matches(o)).collect();
            if query.oldest_first() {
                hits.sort_by_key(|o| (o.created_at(), o.id_typed()));
            } else {
                hits.sort_by(|a, b| {
                    b.created_at()
                        .cmp(&a.created_at())
                        .then_with(|| b.id_typed().cmp(&a.id_typed()))
                });
            }
            Ok(hits
                .into_iter()
                .take(query.limit() as usize)
                .cloned()
                .collect())
        })
    }

    async fn items_of(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        self.read(|table| {
            Ok(table
                .rows
                .get(&order_id)
                .map(|o| o.items().to_vec())
                .unwrap_or_default())
        })
    }

    async fn items_for_product(
        &self,
        product_id: ProductId,
        limit: u32,
    ) -> StoreResult<Vec<OrderItem>> {
        self.read(|table| {
            let mut items: Vec<&OrderItem> = table
                .rows
                .values()
                .flat_map(|o| o.items())
                .filter(|i| i.product_id() == product_id)
                .collect();
            items.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then_with(|| b.id_typed().cmp(&a.id_typed()))
            });
            Ok(items.into_iter().take(limit as usize).cloned().collect())
        })
    }
}
