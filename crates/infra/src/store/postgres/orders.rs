use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use storefront_core::{
    AggregateRoot, DomainError, ExpectedVersion, OrderId, OrderItemId, ProductId, UserId,
};
use storefront_orders::{
    LinePricing, NewOrder, Order, OrderAmounts, OrderItem, OrderItemRecord, OrderNumber,
    OrderQuery, OrderRecord, OrderStatus, PaymentStatus, ProductSnapshot, ShippingAddress,
};

use super::{column, count_column, money_column, percent_column, percent_to_sql, to_sql_int};
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::OrderStore;

const ORDER_COLUMNS: &str = "id, order_number, user_id, shipping_address, payment_method, \
     payment_status, status, subtotal, tax_amount, shipping_fee, discount_amount, total_amount, \
     shipping_method, tracking_number, estimated_delivery, notes, coupon_code, paid_at, \
     shipped_at, delivered_at, cancelled_at, created_at, updated_at, version";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, product_sku, product_image, \
     product_specifications, quantity, unit_price, discount_percent, total_price, is_returned, \
     return_reason, return_date, restocked_at, created_at, updated_at";

/// Postgres-backed order book.
///
/// An order and its items are written in one transaction. Saves lock the order
/// row (`SELECT ... FOR UPDATE`) before checking the expected version, so two
/// writers holding the same version cannot both succeed.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Attach items to already loaded order headers, keeping header order.
    async fn with_items(&self, records: Vec<OrderRecord>) -> StoreResult<Vec<Order>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = records.iter().map(|r| r.id.get()).collect();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(ids.as_slice())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let item = item_from_row(row)?;
            items.entry(item.order_id()).or_default().push(item);
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let lines = items.remove(&record.id).unwrap_or_default();
                Order::restore(record, lines)
            })
            .collect())
    }

    async fn hydrate(&self, row: Option<PgRow>) -> StoreResult<Option<Order>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let record = order_from_row(&row)?;
        Ok(self.with_items(vec![record]).await?.pop())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(
        skip(self, order),
        fields(order_number = %order.order_number, user_id = %order.user_id, lines = order.items().len()),
        err
    )]
    async fn insert_order(&self, order: NewOrder, at: DateTime<Utc>) -> StoreResult<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        let amounts = order.amounts();
        let row = sqlx::query(
            "INSERT INTO orders (order_number, user_id, shipping_address, payment_method, \
             subtotal, tax_amount, shipping_fee, discount_amount, total_amount, shipping_method, \
             estimated_delivery, notes, coupon_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             RETURNING id",
        )
        .bind(order.order_number.as_str())
        .bind(order.user_id.get())
        .bind(Json(&order.shipping_address))
        .bind(order.payment_method.as_str())
        .bind(amounts.subtotal().amount())
        .bind(amounts.tax_amount().amount())
        .bind(amounts.shipping_fee().amount())
        .bind(amounts.discount_amount().amount())
        .bind(amounts.total_amount().amount())
        .bind(order.shipping_method.as_str())
        .bind(order.estimated_delivery)
        .bind(order.notes.as_deref())
        .bind(order.coupon_code())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        let order_id: i64 = column(&row, "id")?;

        let mut item_ids = Vec::with_capacity(order.items().len());
        for item in order.items() {
            let pricing = &item.pricing;
            let row = sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, product_sku, \
                 product_image, product_specifications, quantity, unit_price, discount_percent, \
                 total_price, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
                 RETURNING id",
            )
            .bind(order_id)
            .bind(item.product.product_id.get())
            .bind(&item.product.name)
            .bind(&item.product.sku)
            .bind(item.product.image.as_deref())
            .bind(Json(&item.product.specifications))
            .bind(to_sql_int("quantity", pricing.quantity())?)
            .bind(pricing.unit_price().amount())
            .bind(percent_to_sql(pricing.discount_percent()))
            .bind(pricing.total_price().amount())
            .bind(at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
            item_ids.push(OrderItemId::new(column(&row, "id")?));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        let order = Order::from_new(OrderId::new(order_id), order, item_ids, at)?;
        debug!(order_id = %order.id_typed(), "order inserted");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        self.hydrate(row).await
    }

    #[instrument(skip(self), fields(order_number = %number), err)]
    async fn get_order_by_number(&self, number: &OrderNumber) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1");
        let row = sqlx::query(&sql)
            .bind(number.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order_by_number", e))?;
        self.hydrate(row).await
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.id_typed(), status = order.status().as_str(), expected = ?expected),
        err
    )]
    async fn save_order(&self, order: &Order, expected: ExpectedVersion) -> StoreResult<Order> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("save_order", e))?;

        let row = sqlx::query("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order.id_typed().get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_order", e))?
            .ok_or_else(DomainError::not_found)?;
        let current = version_from(column(&row, "version")?)?;
        expected.check(current)?;

        let version = update_header(&mut tx, order.record()).await?;
        for item in order.items() {
            update_item(&mut tx, item.record()).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("save_order", e))?;

        let mut saved = order.clone();
        saved.mark_saved(version);
        debug!(version, "order saved");
        Ok(saved)
    }

    #[instrument(skip(self), fields(query = ?query), err)]
    async fn find_orders(&self, query: OrderQuery) -> StoreResult<Vec<Order>> {
        let limit = i64::from(query.limit());
        let rows = match query {
            OrderQuery::ByUser { user_id, .. } => {
                let sql = format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2"
                );
                sqlx::query(&sql)
                    .bind(user_id.get())
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await
            }
            OrderQuery::ByStatus { status, .. } => {
                let sql = format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2"
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await
            }
            OrderQuery::Pending { .. } => {
                let sql = format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND payment_status = $2 \
                     ORDER BY created_at ASC, id ASC LIMIT $3"
                );
                sqlx::query(&sql)
                    .bind(OrderStatus::Pending.as_str())
                    .bind(PaymentStatus::Paid.as_str())
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await
            }
        }
        .map_err(|e| map_sqlx_error("find_orders", e))?;

        let records = rows
            .iter()
            .map(order_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        self.with_items(records).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn items_of(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(order_id.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("items_of", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn items_for_product(
        &self,
        product_id: ProductId,
        limit: u32,
    ) -> StoreResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE product_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.get())
            .bind(i64::from(limit))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("items_for_product", e))?;
        rows.iter().map(item_from_row).collect()
    }
}

async fn update_header(conn: &mut PgConnection, r: &OrderRecord) -> StoreResult<u64> {
    let row = sqlx::query(
        "UPDATE orders SET shipping_address = $2, payment_status = $3, status = $4, \
         subtotal = $5, tax_amount = $6, shipping_fee = $7, discount_amount = $8, \
         total_amount = $9, shipping_method = $10, tracking_number = $11, \
         estimated_delivery = $12, notes = $13, coupon_code = $14, paid_at = $15, \
         shipped_at = $16, delivered_at = $17, cancelled_at = $18, updated_at = $19, \
         version = version + 1 \
         WHERE id = $1 RETURNING version",
    )
    .bind(r.id.get())
    .bind(Json(&r.shipping_address))
    .bind(r.payment_status.as_str())
    .bind(r.status.as_str())
    .bind(r.amounts.subtotal().amount())
    .bind(r.amounts.tax_amount().amount())
    .bind(r.amounts.shipping_fee().amount())
    .bind(r.amounts.discount_amount().amount())
    .bind(r.amounts.total_amount().amount())
    .bind(r.shipping_method.as_str())
    .bind(r.tracking_number.as_deref())
    .bind(r.estimated_delivery)
    .bind(r.notes.as_deref())
    .bind(r.coupon_code.as_deref())
    .bind(r.paid_at)
    .bind(r.shipped_at)
    .bind(r.delivered_at)
    .bind(r.cancelled_at)
    .bind(r.updated_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_order", e))?;
    version_from(column(&row, "version")?)
}

async fn update_item(conn: &mut PgConnection, r: &OrderItemRecord) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE order_items SET quantity = $3, unit_price = $4, discount_percent = $5, \
         total_price = $6, is_returned = $7, return_reason = $8, return_date = $9, \
         restocked_at = $10, updated_at = $11 \
         WHERE id = $1 AND order_id = $2",
    )
    .bind(r.id.get())
    .bind(r.order_id.get())
    .bind(to_sql_int("quantity", r.pricing.quantity())?)
    .bind(r.pricing.unit_price().amount())
    .bind(percent_to_sql(r.pricing.discount_percent()))
    .bind(r.pricing.total_price().amount())
    .bind(r.is_returned)
    .bind(r.return_reason.as_deref())
    .bind(r.return_date)
    .bind(r.restocked_at)
    .bind(r.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_order_item", e))?;

    if result.rows_affected() == 0 {
        return Err(DomainError::invariant(format!(
            "order item {} does not belong to order {}",
            r.id, r.order_id
        ))
        .into());
    }
    Ok(())
}

fn version_from(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::database(format!("negative version: {value}")))
}

fn order_from_row(row: &PgRow) -> StoreResult<OrderRecord> {
    let number: String = column(row, "order_number")?;
    let shipping_address: Json<ShippingAddress> = column(row, "shipping_address")?;
    let payment_method: String = column(row, "payment_method")?;
    let payment_status: String = column(row, "payment_status")?;
    let status: String = column(row, "status")?;
    let shipping_method: String = column(row, "shipping_method")?;

    Ok(OrderRecord {
        id: OrderId::new(column(row, "id")?),
        order_number: OrderNumber::parse(number)?,
        user_id: UserId::new(column(row, "user_id")?),
        shipping_address: shipping_address.0,
        payment_method: payment_method.parse()?,
        payment_status: payment_status.parse()?,
        status: status.parse()?,
        amounts: OrderAmounts::new(
            money_column(row, "subtotal")?,
            money_column(row, "tax_amount")?,
            money_column(row, "shipping_fee")?,
            money_column(row, "discount_amount")?,
        )?,
        shipping_method: shipping_method.parse()?,
        tracking_number: column(row, "tracking_number")?,
        estimated_delivery: column(row, "estimated_delivery")?,
        notes: column(row, "notes")?,
        coupon_code: column(row, "coupon_code")?,
        paid_at: column(row, "paid_at")?,
        shipped_at: column(row, "shipped_at")?,
        delivered_at: column(row, "delivered_at")?,
        cancelled_at: column(row, "cancelled_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        version: version_from(column(row, "version")?)?,
    })
}

fn item_from_row(row: &PgRow) -> StoreResult<OrderItem> {
    let specifications: Json<Map<String, JsonValue>> = column(row, "product_specifications")?;

    Ok(OrderItem::restore(OrderItemRecord {
        id: OrderItemId::new(column(row, "id")?),
        order_id: OrderId::new(column(row, "order_id")?),
        product: ProductSnapshot {
            product_id: ProductId::new(column(row, "product_id")?),
            name: column(row, "product_name")?,
            sku: column(row, "product_sku")?,
            image: column(row, "product_image")?,
            specifications: specifications.0,
        },
        pricing: LinePricing::new(
            money_column(row, "unit_price")?,
            percent_column(row, "discount_percent")?,
            count_column(row, "quantity")?,
        )?,
        is_returned: column(row, "is_returned")?,
        return_reason: column(row, "return_reason")?,
        return_date: column(row, "return_date")?,
        restocked_at: column(row, "restocked_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use storefront_catalog::{Category, NewProduct};
    use storefront_core::Money;
    use storefront_orders::{NewOrderItem, PaymentMethod};

    use crate::db;
    use crate::store::{PostgresProductStore, ProductStore};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// Runs against `DATABASE_URL`; `cargo test -- --ignored` with a scratch database.
    #[tokio::test]
    #[ignore]
    async fn postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::connect(&url, &Default::default()).await.unwrap();
        db::migrate(&pool).await.unwrap();

        let products = PostgresProductStore::new(pool.clone());
        let orders = PostgresOrderStore::new(pool);

        let suffix = Utc::now().timestamp_micros();
        let mut input = NewProduct::new(
            format!("PG-{suffix}"),
            format!("Postgres Phone {suffix}"),
            "Stored in a real database",
            Category::Smartphone,
            "Acme",
            Money::from_major(300),
        );
        input.stock = 4;
        let product = products
            .insert_product(input.into_draft().unwrap(), test_time())
            .await
            .unwrap();

        let err = products
            .decrease_stock(product.id_typed(), 5, test_time())
            .await
            .unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::insufficient_stock(5, 4)));
        let product = products
            .decrease_stock(product.id_typed(), 2, test_time())
            .await
            .unwrap();
        assert_eq!((product.stock(), product.sold_count()), (2, 2));

        let new = NewOrder::new(
            OrderNumber::generate(test_time(), &mut rand::thread_rng()),
            UserId::new(1),
            ShippingAddress {
                recipient: "Jane Doe".into(),
                phone: "0901234567".into(),
                street: "1 Main St".into(),
                ward: None,
                district: None,
                city: "Hanoi".into(),
            },
            PaymentMethod::Cod,
            vec![NewOrderItem::for_product(&product, 2).unwrap()],
        )
        .unwrap();
        let mut order = orders.insert_order(new, test_time()).await.unwrap();

        order.confirm(test_time()).unwrap();
        let saved = orders
            .save_order(&order, ExpectedVersion::Exact(0))
            .await
            .unwrap();
        assert_eq!(saved.version(), 1);

        let loaded = orders.get_order(order.id_typed()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Confirmed);
        assert_eq!(loaded.items().len(), 1);
        assert_eq!(loaded.total_amount(), Money::from_major(600));

        let stale = orders.save_order(&order, ExpectedVersion::Exact(0)).await;
        assert!(stale.unwrap_err().is_conflict());

        let mut cancelled = loaded;
        cancelled.cancel(None, test_time()).unwrap();
        let mut cancelled = orders
            .save_order(&cancelled, ExpectedVersion::Exact(1))
            .await
            .unwrap();
        let line = cancelled.items()[0].id_typed();
        assert!(
            products
                .restock_item(line, product.id_typed(), 2, test_time())
                .await
                .unwrap()
        );
        assert!(
            !products
                .restock_item(line, product.id_typed(), 2, test_time())
                .await
                .unwrap()
        );
        let restocked = products.get_product(product.id_typed()).await.unwrap().unwrap();
        assert_eq!((restocked.stock(), restocked.sold_count()), (4, 2));

        cancelled.mark_restocked(line, test_time()).unwrap();
        orders
            .save_order(&cancelled, ExpectedVersion::Exact(2))
            .await
            .unwrap();
        let reloaded = orders.get_order(order.id_typed()).await.unwrap().unwrap();
        assert_eq!(reloaded.pending_restock().count(), 0);
    }
}
