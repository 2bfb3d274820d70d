use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use storefront_core::{AggregateRoot, DomainError, DomainResult, Money, Percent, ProductId};

use crate::slug::{slugify, validate_slug};

pub const DEFAULT_MIN_STOCK: u32 = 5;
pub const DEFAULT_WARRANTY_MONTHS: u32 = 12;
pub const MAX_RATING: u8 = 5;

/// Catalog category (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Smartphone,
    Laptop,
    Tablet,
    Desktop,
    Accessories,
    Audio,
    Camera,
    Gaming,
    Smartwatch,
    Tv,
    HomeAppliance,
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Smartphone,
        Category::Laptop,
        Category::Tablet,
        Category::Desktop,
        Category::Accessories,
        Category::Audio,
        Category::Camera,
        Category::Gaming,
        Category::Smartwatch,
        Category::Tv,
        Category::HomeAppliance,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Smartphone => "smartphone",
            Category::Laptop => "laptop",
            Category::Tablet => "tablet",
            Category::Desktop => "desktop",
            Category::Accessories => "accessories",
            Category::Audio => "audio",
            Category::Camera => "camera",
            Category::Gaming => "gaming",
            Category::Smartwatch => "smartwatch",
            Category::Tv => "tv",
            Category::HomeAppliance => "home-appliance",
            Category::Other => "other",
        }
    }
}

impl core::str::FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown category '{s}'")))
    }
}

/// One product image; the first image flagged `is_main` is the display image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    pub alt: Option<String>,
    #[serde(default)]
    pub is_main: bool,
}

/// Input for a catalog-management "create product" action.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    /// Derived from `name` when absent.
    pub slug: Option<String>,
    pub description: String,
    pub short_description: Option<String>,
    pub category: Category,
    pub brand: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub discount: Percent,
    pub stock: u32,
    pub min_stock: u32,
    pub images: Vec<ProductImage>,
    pub specifications: Map<String, JsonValue>,
    pub tags: Vec<String>,
    pub warranty_months: u32,
    pub is_featured: bool,
    pub is_new: bool,
}

impl NewProduct {
    /// Minimal product input; everything else takes its catalog default.
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: Category,
        brand: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            slug: None,
            description: description.into(),
            short_description: None,
            category,
            brand: brand.into(),
            price,
            original_price: None,
            discount: Percent::ZERO,
            stock: 0,
            min_stock: DEFAULT_MIN_STOCK,
            images: Vec::new(),
            specifications: Map::new(),
            tags: Vec::new(),
            warranty_months: DEFAULT_WARRANTY_MONTHS,
            is_featured: false,
            is_new: true,
        }
    }

    /// Validate the input and resolve derived fields (trimmed text, slug).
    pub fn into_draft(self) -> DomainResult<ProductDraft> {
        let sku = self.sku.trim().to_string();
        if sku.is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        if sku.chars().count() > 50 {
            return Err(DomainError::validation("SKU must be at most 50 characters"));
        }

        let name = validate_name(&self.name)?;

        let description = self.description.trim().to_string();
        let description_len = description.chars().count();
        if !(10..=2000).contains(&description_len) {
            return Err(DomainError::validation(
                "description must be between 10 and 2000 characters",
            ));
        }

        let short_description = match self.short_description {
            Some(s) if s.chars().count() > 200 => {
                return Err(DomainError::validation(
                    "short description must be at most 200 characters",
                ));
            }
            other => other,
        };

        let brand = self.brand.trim().to_string();
        if brand.is_empty() {
            return Err(DomainError::validation("brand cannot be empty"));
        }

        let slug = resolve_slug(&name, self.slug)?;

        Ok(ProductDraft {
            sku,
            name,
            slug,
            description,
            short_description,
            category: self.category,
            brand,
            price: self.price,
            original_price: self.original_price,
            discount: self.discount,
            stock: self.stock,
            min_stock: self.min_stock,
            images: self.images,
            specifications: self.specifications,
            tags: self.tags,
            warranty_months: self.warranty_months,
            is_featured: self.is_featured,
            is_new: self.is_new,
        })
    }
}

/// Validated product input, ready to be inserted by a store.
///
/// Only obtainable through [`NewProduct::into_draft`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ProductDraft {
    pub sku: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub short_description: Option<String>,
    pub category: Category,
    pub brand: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub discount: Percent,
    pub stock: u32,
    pub min_stock: u32,
    pub images: Vec<ProductImage>,
    pub specifications: Map<String, JsonValue>,
    pub tags: Vec<String>,
    pub warranty_months: u32,
    pub is_featured: bool,
    pub is_new: bool,
}

/// Persisted shape of a product (one `products` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub short_description: Option<String>,
    pub category: Category,
    pub brand: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub discount: Percent,
    pub stock: u32,
    pub min_stock: u32,
    pub sold_count: u32,
    pub rating_average: Decimal,
    pub rating_count: u32,
    pub view_count: u32,
    pub images: Vec<ProductImage>,
    pub specifications: Map<String, JsonValue>,
    pub tags: Vec<String>,
    pub warranty_months: u32,
    pub is_active: bool,
    pub is_featured: bool,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: Product.
///
/// All stock, pricing and rating changes go through methods that enforce the
/// catalog rules; the persisted fields are readable through [`Product::record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Product {
    record: ProductRecord,
}

impl Product {
    /// Materialize a freshly inserted product.
    pub fn from_draft(id: ProductId, draft: ProductDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            record: ProductRecord {
                id,
                sku: draft.sku,
                slug: draft.slug,
                name: draft.name,
                description: draft.description,
                short_description: draft.short_description,
                category: draft.category,
                brand: draft.brand,
                price: draft.price,
                original_price: draft.original_price,
                discount: draft.discount,
                stock: draft.stock,
                min_stock: draft.min_stock,
                sold_count: 0,
                rating_average: Decimal::ZERO,
                rating_count: 0,
                view_count: 0,
                images: draft.images,
                specifications: draft.specifications,
                tags: draft.tags,
                warranty_months: draft.warranty_months,
                is_active: true,
                is_featured: draft.is_featured,
                is_new: draft.is_new,
                created_at,
                updated_at: created_at,
            },
        }
    }

    /// Rehydrate from storage.
    pub fn restore(record: ProductRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &ProductRecord {
        &self.record
    }

    pub fn into_record(self) -> ProductRecord {
        self.record
    }

    pub fn id_typed(&self) -> ProductId {
        self.record.id
    }

    pub fn sku(&self) -> &str {
        &self.record.sku
    }

    pub fn slug(&self) -> &str {
        &self.record.slug
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn price(&self) -> Money {
        self.record.price
    }

    pub fn discount(&self) -> Percent {
        self.record.discount
    }

    pub fn stock(&self) -> u32 {
        self.record.stock
    }

    pub fn min_stock(&self) -> u32 {
        self.record.min_stock
    }

    pub fn sold_count(&self) -> u32 {
        self.record.sold_count
    }

    pub fn rating_average(&self) -> Decimal {
        self.record.rating_average
    }

    pub fn rating_count(&self) -> u32 {
        self.record.rating_count
    }

    pub fn view_count(&self) -> u32 {
        self.record.view_count
    }

    pub fn is_active(&self) -> bool {
        self.record.is_active
    }

    /// Price after the percentage discount.
    pub fn final_price(&self) -> Money {
        self.record.price.percent_off(self.record.discount)
    }

    pub fn is_in_stock(&self) -> bool {
        self.record.stock > 0
    }

    /// `0 < stock <= min_stock`.
    pub fn is_low_stock(&self) -> bool {
        self.record.stock > 0 && self.record.stock <= self.record.min_stock
    }

    /// Active products with stock on hand can be ordered.
    pub fn can_be_sold(&self) -> bool {
        self.record.is_active && self.is_in_stock()
    }

    /// URL of the main image, falling back to the first image.
    pub fn main_image(&self) -> Option<&str> {
        let images = &self.record.images;
        images
            .iter()
            .find(|img| img.is_main)
            .or_else(|| images.first())
            .map(|img| img.url.as_str())
    }

    /// Take `quantity` units out of stock and count them as sold.
    ///
    /// Fails without touching state when fewer than `quantity` units are on hand.
    pub fn decrease_stock(&mut self, quantity: u32, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive_quantity(quantity)?;
        if quantity > self.record.stock {
            return Err(DomainError::insufficient_stock(quantity, self.record.stock));
        }
        let sold_count = self
            .record
            .sold_count
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("sold_count overflow"))?;

        self.record.stock -= quantity;
        self.record.sold_count = sold_count;
        self.record.updated_at = at;
        Ok(())
    }

    /// Put `quantity` units back on hand (restock or return).
    pub fn increase_stock(&mut self, quantity: u32, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive_quantity(quantity)?;
        self.record.stock = self
            .record
            .stock
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("stock overflow"))?;
        self.record.updated_at = at;
        Ok(())
    }

    /// Fold one more rating into the running average.
    pub fn update_rating(&mut self, rating: u8, at: DateTime<Utc>) -> DomainResult<()> {
        validate_rating(rating)?;
        self.record.rating_average =
            next_rating_average(self.record.rating_average, self.record.rating_count, rating);
        self.record.rating_count += 1;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn record_view(&mut self) {
        self.record.view_count = self.record.view_count.saturating_add(1);
    }

    /// Soft delete: the row stays so historical order items keep their reference.
    pub fn deactivate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.record.is_active {
            return Err(DomainError::conflict("product is already inactive"));
        }
        self.record.is_active = false;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn activate(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.record.is_active {
            return Err(DomainError::conflict("product is already active"));
        }
        self.record.is_active = true;
        self.record.updated_at = at;
        Ok(())
    }

    /// Rename the product; the slug follows the name unless one is supplied.
    pub fn rename(
        &mut self,
        name: &str,
        slug: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let name = validate_name(name)?;
        let slug = resolve_slug(&name, slug)?;
        self.record.name = name;
        self.record.slug = slug;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn reprice(
        &mut self,
        price: Money,
        original_price: Option<Money>,
        discount: Percent,
        at: DateTime<Utc>,
    ) {
        self.record.price = price;
        self.record.original_price = original_price;
        self.record.discount = discount;
        self.record.updated_at = at;
    }

    pub fn set_min_stock(&mut self, min_stock: u32, at: DateTime<Utc>) {
        self.record.min_stock = min_stock;
        self.record.updated_at = at;
    }

    /// Listing view of this product.
    pub fn summary(&self) -> ProductSummary {
        ProductSummary::from(self)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn version(&self) -> u64 {
        // Products are mutated through atomic single-row updates, not versioned saves.
        0
    }
}

/// Catalog list entry: everything but `specifications`, plus derived prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub sku: String,
    pub slug: String,
    pub name: String,
    pub short_description: Option<String>,
    pub category: Category,
    pub brand: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub discount: Percent,
    pub final_price: Money,
    pub stock: u32,
    pub is_in_stock: bool,
    pub is_low_stock: bool,
    pub rating_average: Decimal,
    pub rating_count: u32,
    pub sold_count: u32,
    pub main_image: Option<String>,
    pub tags: Vec<String>,
    pub is_featured: bool,
    pub is_new: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        let r = &p.record;
        Self {
            id: r.id,
            sku: r.sku.clone(),
            slug: r.slug.clone(),
            name: r.name.clone(),
            short_description: r.short_description.clone(),
            category: r.category,
            brand: r.brand.clone(),
            price: r.price,
            original_price: r.original_price,
            discount: r.discount,
            final_price: p.final_price(),
            stock: r.stock,
            is_in_stock: p.is_in_stock(),
            is_low_stock: p.is_low_stock(),
            rating_average: r.rating_average,
            rating_count: r.rating_count,
            sold_count: r.sold_count,
            main_image: p.main_image().map(str::to_string),
            tags: r.tags.clone(),
            is_featured: r.is_featured,
            is_new: r.is_new,
            created_at: r.created_at,
        }
    }
}

/// `(average * count + rating) / (count + 1)`, kept to two decimals.
pub fn next_rating_average(average: Decimal, count: u32, rating: u8) -> Decimal {
    let total = average * Decimal::from(count) + Decimal::from(rating);
    let next = total / Decimal::from(u64::from(count) + 1);
    next.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn validate_rating(rating: u8) -> DomainResult<()> {
    if !(1..=MAX_RATING).contains(&rating) {
        return Err(DomainError::validation(format!(
            "rating must be within 1..={MAX_RATING}, got {rating}"
        )));
    }
    Ok(())
}

fn ensure_positive_quantity(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(DomainError::validation(
            "name must be between 2 and 100 characters",
        ));
    }
    Ok(name.to_string())
}

fn resolve_slug(name: &str, slug: Option<String>) -> DomainResult<String> {
    match slug {
        Some(slug) => {
            let slug = slug.trim().to_string();
            validate_slug(&slug)?;
            Ok(slug)
        }
        None => slugify(name),
    }
}
