use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use tracing::{debug, instrument};

use storefront_catalog::{
    Category, Product, ProductDraft, ProductFilter, ProductImage, ProductRecord, ProductSort,
    ProductSummary, new_arrivals_since, validate_rating,
};
use storefront_core::{DomainError, Money, OrderItemId, Page, PageRequest, ProductId};

use super::{
    column, contains_pattern, count_column, money_column, percent_column, percent_to_sql,
    to_sql_int,
};
use crate::error::{StoreResult, map_sqlx_error};
use crate::store::ProductStore;

/// Every product column except `specifications`.
macro_rules! product_columns {
    () => {
        "id, sku, slug, name, description, short_description, category, brand, price, \
         original_price, discount, stock, min_stock, sold_count, rating_average, rating_count, \
         view_count, images, tags, warranty_months, is_active, is_featured, is_new, created_at, \
         updated_at"
    };
}

/// Listing filter; `$1..$5` are category, brand pattern, min/max price, search pattern.
macro_rules! listing_filter {
    () => {
        "WHERE is_active \
           AND ($1::text IS NULL OR category = $1) \
           AND ($2::text IS NULL OR brand ILIKE $2) \
           AND ($3::numeric IS NULL OR price >= $3) \
           AND ($4::numeric IS NULL OR price <= $4) \
           AND ($5::text IS NULL OR name ILIKE $5 OR description ILIKE $5 OR brand ILIKE $5)"
    };
}

const RETURNING_PRODUCT: &str = concat!("RETURNING ", product_columns!(), ", specifications");

/// Summary rows skip the specification document.
const SELECT_SUMMARY: &str = concat!(
    "SELECT ",
    product_columns!(),
    ", '{}'::jsonb AS specifications FROM products"
);

/// Postgres-backed catalog.
///
/// Counter updates are single conditional `UPDATE` statements, so concurrent
/// callers serialize on the row lock and never observe a partial change.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn fetch_summaries(
        &self,
        operation: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> StoreResult<Vec<ProductSummary>> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| product_from_row(row).map(|p| p.summary()))
            .collect()
    }

    async fn stock_of(&self, id: ProductId) -> StoreResult<Option<u32>> {
        let row = sqlx::query("SELECT stock FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock_of", e))?;
        row.map(|row| count_column(&row, "stock")).transpose()
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self, draft), fields(sku = %draft.sku, slug = %draft.slug), err)]
    async fn insert_product(&self, draft: ProductDraft, at: DateTime<Utc>) -> StoreResult<Product> {
        let sql = format!(
            "INSERT INTO products (sku, slug, name, description, short_description, category, \
             brand, price, original_price, discount, stock, min_stock, images, specifications, \
             tags, warranty_months, is_featured, is_new, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $19) {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(&draft.sku)
            .bind(&draft.slug)
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(draft.short_description.as_deref())
            .bind(draft.category.as_str())
            .bind(&draft.brand)
            .bind(draft.price.amount())
            .bind(draft.original_price.map(|p| p.amount()))
            .bind(percent_to_sql(draft.discount))
            .bind(to_sql_int("stock", draft.stock)?)
            .bind(to_sql_int("min_stock", draft.min_stock)?)
            .bind(Json(&draft.images))
            .bind(Json(&draft.specifications))
            .bind(draft.tags.as_slice())
            .bind(to_sql_int("warranty_months", draft.warranty_months)?)
            .bind(draft.is_featured)
            .bind(draft.is_new)
            .bind(at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;

        let product = product_from_row(&row)?;
        debug!(product_id = %product.id_typed(), "product inserted");
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let sql = concat!(
            "SELECT ",
            product_columns!(),
            ", specifications FROM products WHERE id = $1"
        );
        let row = sqlx::query(sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_product_by_slug(&self, slug: &str) -> StoreResult<Option<Product>> {
        let sql = concat!(
            "SELECT ",
            product_columns!(),
            ", specifications FROM products WHERE slug = $1"
        );
        let row = sqlx::query(sql)
            .bind(slug)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product_by_slug", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn update_product(&self, product: &Product) -> StoreResult<Product> {
        let r = product.record();
        let sql = format!(
            "UPDATE products SET sku = $2, slug = $3, name = $4, description = $5, \
             short_description = $6, category = $7, brand = $8, price = $9, original_price = $10, \
             discount = $11, min_stock = $12, images = $13, specifications = $14, tags = $15, \
             warranty_months = $16, is_active = $17, is_featured = $18, is_new = $19, \
             updated_at = $20 \
             WHERE id = $1 {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(r.id.get())
            .bind(&r.sku)
            .bind(&r.slug)
            .bind(&r.name)
            .bind(&r.description)
            .bind(r.short_description.as_deref())
            .bind(r.category.as_str())
            .bind(&r.brand)
            .bind(r.price.amount())
            .bind(r.original_price.map(|p| p.amount()))
            .bind(percent_to_sql(r.discount))
            .bind(to_sql_int("min_stock", r.min_stock)?)
            .bind(Json(&r.images))
            .bind(Json(&r.specifications))
            .bind(r.tags.as_slice())
            .bind(to_sql_int("warranty_months", r.warranty_months)?)
            .bind(r.is_active)
            .bind(r.is_featured)
            .bind(r.is_new)
            .bind(r.updated_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?
            .ok_or_else(DomainError::not_found)?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn decrease_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1").into());
        }
        let sql = format!(
            "UPDATE products SET stock = stock - $2, sold_count = sold_count + $2, updated_at = $3 \
             WHERE id = $1 AND stock >= $2 {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(to_sql_int("quantity", quantity)?)
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("decrease_stock", e))?;

        match row {
            Some(row) => product_from_row(&row),
            // Nothing matched: either the product is gone or stock is short.
            None => match self.stock_of(id).await? {
                Some(available) => Err(DomainError::insufficient_stock(quantity, available).into()),
                None => Err(DomainError::not_found().into()),
            },
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn increase_stock(
        &self,
        id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1").into());
        }
        let sql = format!(
            "UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1 \
             {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(to_sql_int("quantity", quantity)?)
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("increase_stock", e))?
            .ok_or_else(DomainError::not_found)?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(order_item_id = %item_id, product_id = %product_id), err)]
    async fn restock_item(
        &self,
        item_id: OrderItemId,
        product_id: ProductId,
        quantity: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let quantity = to_sql_int("quantity", quantity)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("restock_item", e))?;

        let claimed = sqlx::query(
            "INSERT INTO product_restocks (order_item_id, product_id, quantity, restocked_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (order_item_id) DO NOTHING",
        )
        .bind(item_id.get())
        .bind(product_id.get())
        .bind(quantity)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("restock_item", e))?;
        if claimed.rows_affected() == 0 {
            debug!("order item already restocked");
            return Ok(false);
        }

        let updated = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1",
        )
        .bind(product_id.get())
        .bind(quantity)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("restock_item", e))?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::not_found().into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("restock_item", e))?;
        Ok(true)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn update_rating(
        &self,
        id: ProductId,
        rating: u8,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        validate_rating(rating)?;
        let sql = format!(
            "UPDATE products SET \
               rating_average = ROUND((rating_average * rating_count + $2) / (rating_count + 1), 2), \
               rating_count = rating_count + 1, \
               updated_at = $3 \
             WHERE id = $1 {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .bind(i32::from(rating))
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_rating", e))?
            .ok_or_else(DomainError::not_found)?;
        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn record_view(&self, id: ProductId) -> StoreResult<Product> {
        let sql = format!(
            "UPDATE products SET view_count = view_count + 1 WHERE id = $1 AND is_active \
             {RETURNING_PRODUCT}"
        );
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_view", e))?
            .ok_or_else(DomainError::not_found)?;
        product_from_row(&row)
    }

    #[instrument(
        skip(self, filter),
        fields(sort = ?sort, page = page.page(), limit = page.limit()),
        err
    )]
    async fn list_products(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>> {
        let category = filter.category.map(Category::as_str);
        let brand = filter.brand.as_deref().map(contains_pattern);
        let min_price = filter.min_price.map(|m| m.amount());
        let max_price = filter.max_price.map(|m| m.amount());
        let search = filter.search.as_deref().map(contains_pattern);

        let count_row = sqlx::query(concat!(
            "SELECT COUNT(*) AS total FROM products ",
            listing_filter!()
        ))
        .bind(category)
        .bind(brand.as_deref())
        .bind(min_price)
        .bind(max_price)
        .bind(search.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        let total: i64 = column(&count_row, "total")?;

        let sql = format!(
            "{SELECT_SUMMARY} {} ORDER BY {} LIMIT $6 OFFSET $7",
            listing_filter!(),
            sort.order_by()
        );
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        let query = sqlx::query(&sql)
            .bind(category)
            .bind(brand.as_deref())
            .bind(min_price)
            .bind(max_price)
            .bind(search.as_deref())
            .bind(i64::from(page.limit()))
            .bind(offset);
        let items = self.fetch_summaries("list_products", query).await?;

        Ok(Page::new(items, u64::try_from(total).unwrap_or_default(), page))
    }

    #[instrument(skip(self), fields(category = category.as_str()), err)]
    async fn find_by_category(
        &self,
        category: Category,
        limit: u32,
    ) -> StoreResult<Vec<ProductSummary>> {
        let sql = format!(
            "{SELECT_SUMMARY} WHERE is_active AND category = $1 \
             ORDER BY {} LIMIT $2",
            ProductSort::Newest.order_by()
        );
        let query = sqlx::query(&sql)
            .bind(category.as_str())
            .bind(i64::from(limit));
        self.fetch_summaries("find_by_category", query).await
    }

    #[instrument(skip(self), err)]
    async fn find_featured(&self, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        let sql = format!(
            "{SELECT_SUMMARY} WHERE is_active AND is_featured ORDER BY {} LIMIT $1",
            ProductSort::RatingDesc.order_by()
        );
        let query = sqlx::query(&sql).bind(i64::from(limit));
        self.fetch_summaries("find_featured", query).await
    }

    #[instrument(skip(self), err)]
    async fn find_new(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        let sql = format!(
            "{SELECT_SUMMARY} WHERE is_active AND created_at >= $1 ORDER BY {} LIMIT $2",
            ProductSort::Newest.order_by()
        );
        let since = new_arrivals_since(now);
        let query = sqlx::query(&sql).bind(since).bind(i64::from(limit));
        self.fetch_summaries("find_new", query).await
    }

    #[instrument(skip(self), err)]
    async fn search_products(&self, term: &str, limit: u32) -> StoreResult<Vec<ProductSummary>> {
        let sql = format!(
            "{SELECT_SUMMARY} WHERE is_active \
               AND (name ILIKE $1 OR description ILIKE $1 OR brand ILIKE $1) \
             ORDER BY {} LIMIT $2",
            ProductSort::RatingDesc.order_by()
        );
        let pattern = contains_pattern(term);
        let query = sqlx::query(&sql)
            .bind(pattern.as_str())
            .bind(i64::from(limit));
        self.fetch_summaries("search_products", query).await
    }
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let category: String = column(row, "category")?;
    let images: Json<Vec<ProductImage>> = column(row, "images")?;
    let specifications: Json<Map<String, JsonValue>> = column(row, "specifications")?;

    Ok(Product::restore(ProductRecord {
        id: ProductId::new(column(row, "id")?),
        sku: column(row, "sku")?,
        slug: column(row, "slug")?,
        name: column(row, "name")?,
        description: column(row, "description")?,
        short_description: column(row, "short_description")?,
        category: category.parse()?,
        brand: column(row, "brand")?,
        price: money_column(row, "price")?,
        original_price: column::<Option<Decimal>>(row, "original_price")?
            .map(Money::new)
            .transpose()?,
        discount: percent_column(row, "discount")?,
        stock: count_column(row, "stock")?,
        min_stock: count_column(row, "min_stock")?,
        sold_count: count_column(row, "sold_count")?,
        rating_average: column(row, "rating_average")?,
        rating_count: count_column(row, "rating_count")?,
        view_count: count_column(row, "view_count")?,
        images: images.0,
        specifications: specifications.0,
        tags: column(row, "tags")?,
        warranty_months: count_column(row, "warranty_months")?,
        is_active: column(row, "is_active")?,
        is_featured: column(row, "is_featured")?,
        is_new: column(row, "is_new")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    }))
}
