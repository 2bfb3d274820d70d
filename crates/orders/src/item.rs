//! Order line items: product snapshots plus line pricing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use storefront_catalog::Product;
use storefront_core::{
    DomainError, DomainResult, Entity, Money, OrderId, OrderItemId, Percent, ProductId,
    ValueObject,
};

/// `unit_price * (1 - discount/100) * quantity`, rounded to cents once.
///
/// `unit_price * quantity` is exact at two decimals, so the only rounding is the
/// one `percent_off` performs. Fails when the undiscounted total is not a
/// storable amount.
pub fn line_total(
    unit_price: Money,
    discount_percent: Percent,
    quantity: u32,
) -> DomainResult<Money> {
    Ok(unit_price.times(quantity)?.percent_off(discount_percent))
}

/// Unit price, discount and quantity of a line, with the total derived from them.
///
/// The three inputs are only writable through setters, each of which recomputes
/// `total_price`, so the stored total always agrees with its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinePricing {
    unit_price: Money,
    discount_percent: Percent,
    quantity: u32,
    total_price: Money,
}

impl LinePricing {
    pub fn new(unit_price: Money, discount_percent: Percent, quantity: u32) -> DomainResult<Self> {
        ensure_quantity(quantity)?;
        Ok(Self {
            unit_price,
            discount_percent,
            quantity,
            total_price: line_total(unit_price, discount_percent, quantity)?,
        })
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn discount_percent(&self) -> Percent {
        self.discount_percent
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn final_unit_price(&self) -> Money {
        self.unit_price.percent_off(self.discount_percent)
    }

    pub fn set_unit_price(&mut self, unit_price: Money) -> DomainResult<()> {
        self.total_price = line_total(unit_price, self.discount_percent, self.quantity)?;
        self.unit_price = unit_price;
        Ok(())
    }

    pub fn set_discount_percent(&mut self, discount_percent: Percent) -> DomainResult<()> {
        self.total_price = line_total(self.unit_price, discount_percent, self.quantity)?;
        self.discount_percent = discount_percent;
        Ok(())
    }

    /// On error the line is left as it was.
    pub fn set_quantity(&mut self, quantity: u32) -> DomainResult<()> {
        ensure_quantity(quantity)?;
        self.total_price = line_total(self.unit_price, self.discount_percent, quantity)?;
        self.quantity = quantity;
        Ok(())
    }

    /// Recompute the total from the current inputs. Idempotent.
    pub fn recalculate(&mut self) -> DomainResult<Money> {
        self.total_price = line_total(self.unit_price, self.discount_percent, self.quantity)?;
        Ok(self.total_price)
    }
}

impl ValueObject for LinePricing {}

fn ensure_quantity(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

/// Product details copied onto the line when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub image: Option<String>,
    #[serde(default)]
    pub specifications: Map<String, JsonValue>,
}

impl ProductSnapshot {
    pub fn of(product: &Product) -> Self {
        let record = product.record();
        Self {
            product_id: record.id,
            name: record.name.clone(),
            sku: record.sku.clone(),
            image: product.main_image().map(str::to_string),
            specifications: record.specifications.clone(),
        }
    }
}

/// A line about to be placed on a new order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product: ProductSnapshot,
    pub pricing: LinePricing,
}

impl NewOrderItem {
    /// Price `quantity` units at the product's current price and discount.
    ///
    /// Only active products can be ordered. Stock is not checked here; the store
    /// checks and decrements it atomically.
    pub fn for_product(product: &Product, quantity: u32) -> DomainResult<Self> {
        if !product.is_active() {
            return Err(DomainError::validation(format!(
                "product {} is not available",
                product.sku()
            )));
        }
        Ok(Self {
            product: ProductSnapshot::of(product),
            pricing: LinePricing::new(product.price(), product.discount(), quantity)?,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.pricing.quantity()
    }
}

/// Persisted shape of a line item (one `order_items` row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product: ProductSnapshot,
    pub pricing: LinePricing,
    pub is_returned: bool,
    pub return_reason: Option<String>,
    pub return_date: Option<DateTime<Utc>>,
    /// Set once the line's units are back in stock.
    pub restocked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity: one line of an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OrderItem {
    record: OrderItemRecord,
}

impl OrderItem {
    pub fn from_new(
        id: OrderItemId,
        order_id: OrderId,
        item: NewOrderItem,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record: OrderItemRecord {
                id,
                order_id,
                product: item.product,
                pricing: item.pricing,
                is_returned: false,
                return_reason: None,
                return_date: None,
                restocked_at: None,
                created_at,
                updated_at: created_at,
            },
        }
    }

    pub fn restore(record: OrderItemRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &OrderItemRecord {
        &self.record
    }

    pub fn id_typed(&self) -> OrderItemId {
        self.record.id
    }

    pub fn order_id(&self) -> OrderId {
        self.record.order_id
    }

    pub fn product_id(&self) -> ProductId {
        self.record.product.product_id
    }

    pub fn product(&self) -> &ProductSnapshot {
        &self.record.product
    }

    pub fn pricing(&self) -> &LinePricing {
        &self.record.pricing
    }

    pub fn quantity(&self) -> u32 {
        self.record.pricing.quantity()
    }

    pub fn total_price(&self) -> Money {
        self.record.pricing.total_price()
    }

    pub fn final_unit_price(&self) -> Money {
        self.record.pricing.final_unit_price()
    }

    pub fn is_returned(&self) -> bool {
        self.record.is_returned
    }

    pub fn is_restocked(&self) -> bool {
        self.record.restocked_at.is_some()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    pub fn set_quantity(&mut self, quantity: u32, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.pricing.set_quantity(quantity)?;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_unit_price(&mut self, unit_price: Money, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.pricing.set_unit_price(unit_price)?;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_discount_percent(
        &mut self,
        discount_percent: Percent,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.record.pricing.set_discount_percent(discount_percent)?;
        self.record.updated_at = at;
        Ok(())
    }

    /// Flag the line as returned. Restocking is up to the caller.
    ///
    /// A second call is a `Conflict` so a retried return cannot restock twice.
    pub fn mark_returned(&mut self, reason: Option<String>, at: DateTime<Utc>) -> DomainResult<()> {
        if self.record.is_returned {
            return Err(DomainError::conflict(format!(
                "order item {} is already returned",
                self.record.id
            )));
        }
        self.record.is_returned = true;
        self.record.return_reason = reason;
        self.record.return_date = Some(at);
        self.record.updated_at = at;
        Ok(())
    }
}

impl OrderItem {
    /// Record that the line's units went back on the shelf. One-shot.
    pub fn mark_restocked(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.record.restocked_at.is_some() {
            return Err(DomainError::conflict(format!(
                "order item {} is already restocked",
                self.record.id
            )));
        }
        self.record.restocked_at = Some(at);
        self.record.updated_at = at;
        Ok(())
    }
}

impl Entity for OrderItem {
    type Id = OrderItemId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use storefront_catalog::{Category, NewProduct};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap()
    }

    fn pct(value: u8) -> Percent {
        Percent::new(value).unwrap()
    }

    fn test_product() -> Product {
        let mut input = NewProduct::new(
            "PHN-1",
            "Phone One",
            "A phone for testing lines",
            Category::Smartphone,
            "Acme",
            Money::from_major(500),
        );
        input.discount = pct(20);
        input.stock = 10;
        Product::from_draft(ProductId::new(9), input.into_draft().unwrap(), test_time())
    }

    fn test_item() -> OrderItem {
        let new = NewOrderItem::for_product(&test_product(), 3).unwrap();
        OrderItem::from_new(OrderItemId::new(1), OrderId::new(1), new, test_time())
    }

    #[test]
    fn line_total_applies_discount_then_quantity() {
        let pricing = LinePricing::new(Money::from_major(500), pct(20), 3).unwrap();
        assert_eq!(pricing.final_unit_price(), Money::from_major(400));
        assert_eq!(pricing.total_price(), Money::from_major(1200));
    }

    #[test]
    fn line_total_rounds_once() {
        // 19.99 * 0.85 * 3 = 50.9745
        let pricing = LinePricing::new(Money::from_cents(1999), pct(15), 3).unwrap();
        assert_eq!(pricing.total_price().amount(), Decimal::new(5097, 2));
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(matches!(
            LinePricing::new(Money::from_major(1), Percent::ZERO, 0),
            Err(DomainError::Validation(_))
        ));

        let mut item = test_item();
        assert!(matches!(
            item.set_quantity(0, test_time()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(item.quantity(), 3);
    }

    #[test]
    fn setters_recompute_total() {
        let mut item = test_item();
        assert_eq!(item.total_price(), Money::from_major(1200));

        item.set_quantity(1, test_time()).unwrap();
        assert_eq!(item.total_price(), Money::from_major(400));

        item.set_discount_percent(Percent::ZERO, test_time()).unwrap();
        assert_eq!(item.total_price(), Money::from_major(500));

        item.set_unit_price(Money::from_major(250), test_time()).unwrap();
        assert_eq!(item.total_price(), Money::from_major(250));
    }

    #[test]
    fn oversized_line_totals_are_rejected() {
        assert!(matches!(
            LinePricing::new(Money::ceiling(), Percent::ZERO, 2),
            Err(DomainError::Validation(_))
        ));

        let mut item = test_item();
        assert!(matches!(
            item.set_quantity(u32::MAX, test_time()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            item.set_unit_price(Money::ceiling(), test_time()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(item.quantity(), 3);
        assert_eq!(item.pricing().unit_price(), Money::from_major(500));
        assert_eq!(item.total_price(), Money::from_major(1200));
    }

    #[test]
    fn snapshot_copies_product_details() {
        let item = test_item();
        assert_eq!(item.product().name, "Phone One");
        assert_eq!(item.product().sku, "PHN-1");
        assert_eq!(item.product_id(), ProductId::new(9));
        assert_eq!(item.pricing().unit_price(), Money::from_major(500));
        assert_eq!(item.pricing().discount_percent(), pct(20));
    }

    #[test]
    fn inactive_products_cannot_be_ordered() {
        let mut product = test_product();
        product.deactivate(test_time()).unwrap();
        assert!(matches!(
            NewOrderItem::for_product(&product, 1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn mark_returned_is_one_shot() {
        let mut item = test_item();
        item.mark_returned(Some("damaged".into()), test_time()).unwrap();
        assert!(item.is_returned());
        assert_eq!(item.record().return_reason.as_deref(), Some("damaged"));
        assert_eq!(item.record().return_date, Some(test_time()));

        match item.mark_returned(None, test_time()) {
            Err(DomainError::Conflict(_)) => {}
            other => panic!("Expected Conflict for second return, got {other:?}"),
        }
    }

    #[test]
    fn mark_restocked_is_one_shot() {
        let mut item = test_item();
        assert!(!item.is_restocked());
        item.mark_restocked(test_time()).unwrap();
        assert!(item.is_restocked());
        assert_eq!(item.record().restocked_at, Some(test_time()));
        assert!(matches!(item.mark_restocked(test_time()), Err(DomainError::Conflict(_))));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: recomputing a line total is idempotent and matches the
            /// closed-form total, whatever sequence of edits produced the line.
            #[test]
            fn recalculation_is_idempotent(
                cents in 0u32..1_000_000,
                discount in 0u8..=100,
                qty in 1u32..1_000,
                new_qty in 1u32..1_000,
                new_discount in 0u8..=100,
            ) {
                let mut pricing = LinePricing::new(Money::from_cents(cents), pct(discount), qty).unwrap();
                pricing.set_quantity(new_qty).unwrap();
                pricing.set_discount_percent(pct(new_discount)).unwrap();

                let once = pricing.total_price();
                let twice = pricing.recalculate().unwrap();
                prop_assert_eq!(once, twice);
                prop_assert_eq!(pricing.recalculate().unwrap(), once);
                prop_assert_eq!(
                    once,
                    line_total(Money::from_cents(cents), pct(new_discount), new_qty).unwrap()
                );
                prop_assert!(once <= Money::from_cents(cents).times(new_qty).unwrap());
            }
        }
    }
}
