use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{
    AggregateRoot, DomainError, DomainResult, Money, OrderId, OrderItemId, ProductId, UserId,
    ValueObject,
};

use crate::item::{NewOrderItem, OrderItem};
use crate::number::OrderNumber;
use crate::status::{OrderStatus, PaymentStatus};

/// Default row cap for [`OrderQuery::ByUser`].
pub const DEFAULT_USER_ORDERS_LIMIT: u32 = 10;
/// Default row cap for status listings and the pending-payment queue.
pub const DEFAULT_STATUS_ORDERS_LIMIT: u32 = 20;
/// Default row cap for a product's sales history.
pub const DEFAULT_PRODUCT_ITEMS_LIMIT: u32 = 20;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    BankTransfer,
    CreditCard,
    Momo,
    Vnpay,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Momo => "momo",
            PaymentMethod::Vnpay => "vnpay",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "momo" => Ok(PaymentMethod::Momo),
            "vnpay" => Ok(PaymentMethod::Vnpay),
            other => Err(DomainError::validation(format!("unknown payment method '{other}'"))),
        }
    }
}

/// Delivery speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    SameDay,
}

impl ShippingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
            ShippingMethod::SameDay => "same_day",
        }
    }
}

impl FromStr for ShippingMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(ShippingMethod::Standard),
            "express" => Ok(ShippingMethod::Express),
            "same_day" => Ok(ShippingMethod::SameDay),
            other => Err(DomainError::validation(format!("unknown shipping method '{other}'"))),
        }
    }
}

/// Where the order ships to. Stored as a JSON document on the order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: String,
    pub street: String,
    pub ward: Option<String>,
    pub district: Option<String>,
    pub city: String,
}

impl ShippingAddress {
    pub fn validate(&self) -> DomainResult<()> {
        if self.recipient.trim().is_empty() {
            return Err(DomainError::validation("recipient cannot be empty"));
        }
        if self.street.trim().is_empty() {
            return Err(DomainError::validation("street cannot be empty"));
        }
        if self.city.trim().is_empty() {
            return Err(DomainError::validation("city cannot be empty"));
        }
        let digits = self.phone.strip_prefix('+').unwrap_or(&self.phone);
        if !(8..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "invalid phone number '{}'",
                self.phone
            )));
        }
        Ok(())
    }
}

impl ValueObject for ShippingAddress {}

/// The money side of an order.
///
/// `total_amount == subtotal + tax_amount + shipping_fee - discount_amount`
/// holds after every setter; a discount larger than the rest is rejected and
/// leaves the amounts untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderAmounts {
    subtotal: Money,
    tax_amount: Money,
    shipping_fee: Money,
    discount_amount: Money,
    total_amount: Money,
}

impl OrderAmounts {
    pub fn new(
        subtotal: Money,
        tax_amount: Money,
        shipping_fee: Money,
        discount_amount: Money,
    ) -> DomainResult<Self> {
        let mut amounts = Self {
            subtotal,
            tax_amount,
            shipping_fee,
            discount_amount,
            total_amount: Money::ZERO,
        };
        amounts.calculate_total()?;
        Ok(amounts)
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn shipping_fee(&self) -> Money {
        self.shipping_fee
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Recompute `total_amount` from the four components. Idempotent.
    pub fn calculate_total(&mut self) -> DomainResult<Money> {
        self.total_amount = total_of(
            self.subtotal,
            self.tax_amount,
            self.shipping_fee,
            self.discount_amount,
        )?;
        Ok(self.total_amount)
    }

    pub fn set_subtotal(&mut self, subtotal: Money) -> DomainResult<()> {
        self.update(|a| a.subtotal = subtotal)
    }

    pub fn set_tax_amount(&mut self, tax_amount: Money) -> DomainResult<()> {
        self.update(|a| a.tax_amount = tax_amount)
    }

    pub fn set_shipping_fee(&mut self, shipping_fee: Money) -> DomainResult<()> {
        self.update(|a| a.shipping_fee = shipping_fee)
    }

    pub fn set_discount_amount(&mut self, discount_amount: Money) -> DomainResult<()> {
        self.update(|a| a.discount_amount = discount_amount)
    }

    fn update(&mut self, change: impl FnOnce(&mut Self)) -> DomainResult<()> {
        let mut next = *self;
        change(&mut next);
        next.calculate_total()?;
        *self = next;
        Ok(())
    }
}

impl ValueObject for OrderAmounts {}

fn total_of(
    subtotal: Money,
    tax_amount: Money,
    shipping_fee: Money,
    discount_amount: Money,
) -> DomainResult<Money> {
    let gross = Money::total([subtotal, tax_amount, shipping_fee])?;
    gross.checked_sub(discount_amount).ok_or_else(|| {
        DomainError::validation(format!(
            "discount {discount_amount} exceeds order amount {gross}"
        ))
    })
}

/// A validated order ready to be inserted, with its lines.
///
/// The subtotal always equals the sum of the line totals.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    coupon_code: Option<String>,
    amounts: OrderAmounts,
    items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(
        order_number: OrderNumber,
        user_id: UserId,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        items: Vec<NewOrderItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("an order needs at least one item"));
        }
        shipping_address.validate()?;

        let subtotal = Money::total(items.iter().map(|i| i.pricing.total_price()))?;
        Ok(Self {
            order_number,
            user_id,
            shipping_address,
            payment_method,
            shipping_method: ShippingMethod::default(),
            estimated_delivery: None,
            notes: None,
            coupon_code: None,
            amounts: OrderAmounts::new(subtotal, Money::ZERO, Money::ZERO, Money::ZERO)?,
            items,
        })
    }

    pub fn set_shipping(&mut self, method: ShippingMethod, fee: Money) -> DomainResult<()> {
        self.amounts.set_shipping_fee(fee)?;
        self.shipping_method = method;
        Ok(())
    }

    pub fn set_tax_amount(&mut self, tax_amount: Money) -> DomainResult<()> {
        self.amounts.set_tax_amount(tax_amount)
    }

    /// Apply a coupon worth `amount`.
    pub fn apply_discount(&mut self, coupon_code: Option<String>, amount: Money) -> DomainResult<()> {
        if let Some(code) = &coupon_code {
            if code.is_empty() || code.chars().count() > 20 {
                return Err(DomainError::validation(
                    "coupon code must be between 1 and 20 characters",
                ));
            }
        }
        self.amounts.set_discount_amount(amount)?;
        self.coupon_code = coupon_code;
        Ok(())
    }

    pub fn amounts(&self) -> &OrderAmounts {
        &self.amounts
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn items(&self) -> &[NewOrderItem] {
        &self.items
    }

    /// Units requested per product, in line order.
    pub fn stock_demand(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.items.iter().map(|i| (i.product_id(), i.quantity()))
    }
}

/// Persisted shape of an order header (one `orders` row).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub amounts: OrderAmounts,
    pub shipping_method: ShippingMethod,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: Order.
///
/// Owns its line items. Status and payment changes go through the transition
/// methods below; each one stamps the timestamp it is given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    #[serde(flatten)]
    record: OrderRecord,
    items: Vec<OrderItem>,
}

impl Order {
    /// Materialize a freshly inserted order; `item_ids` are the ids assigned to
    /// `new.items()`, in the same order.
    pub fn from_new(
        id: OrderId,
        new: NewOrder,
        item_ids: Vec<OrderItemId>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if item_ids.len() != new.items.len() {
            return Err(DomainError::invariant(format!(
                "expected {} item ids, got {}",
                new.items.len(),
                item_ids.len()
            )));
        }

        let items = new
            .items
            .into_iter()
            .zip(item_ids)
            .map(|(item, item_id)| OrderItem::from_new(item_id, id, item, created_at))
            .collect();

        Ok(Self {
            record: OrderRecord {
                id,
                order_number: new.order_number,
                user_id: new.user_id,
                shipping_address: new.shipping_address,
                payment_method: new.payment_method,
                payment_status: PaymentStatus::Pending,
                status: OrderStatus::Pending,
                amounts: new.amounts,
                shipping_method: new.shipping_method,
                tracking_number: None,
                estimated_delivery: new.estimated_delivery,
                notes: new.notes,
                coupon_code: new.coupon_code,
                paid_at: None,
                shipped_at: None,
                delivered_at: None,
                cancelled_at: None,
                created_at,
                updated_at: created_at,
                version: 0,
            },
            items,
        })
    }

    /// Rehydrate from storage. Items are kept in creation order.
    pub fn restore(record: OrderRecord, mut items: Vec<OrderItem>) -> Self {
        items.sort_by_key(|i| (i.created_at(), i.id_typed()));
        Self { record, items }
    }

    pub fn record(&self) -> &OrderRecord {
        &self.record
    }

    pub fn id_typed(&self) -> OrderId {
        self.record.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.record.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.record.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.record.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.record.payment_status
    }

    pub fn amounts(&self) -> &OrderAmounts {
        &self.record.amounts
    }

    pub fn total_amount(&self) -> Money {
        self.record.amounts.total_amount()
    }

    pub fn notes(&self) -> Option<&str> {
        self.record.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id_typed() == item_id)
    }

    /// Lines whose units are owed back to stock: every line of a cancelled or
    /// returned order, plus individually returned lines, until restocked.
    pub fn pending_restock(&self) -> impl Iterator<Item = &OrderItem> + '_ {
        let whole_order = self.record.status.is_terminal();
        self.items
            .iter()
            .filter(move |i| !i.is_restocked() && (whole_order || i.is_returned()))
    }

    /// Record that `item_id`'s units are back in stock.
    ///
    /// `InvariantViolation` for a line that owes nothing, `Conflict` when it was
    /// already recorded.
    pub fn mark_restocked(&mut self, item_id: OrderItemId, at: DateTime<Utc>) -> DomainResult<()> {
        let whole_order = self.record.status.is_terminal();
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id_typed() == item_id)
            .ok_or_else(DomainError::not_found)?;
        if !whole_order && !item.is_returned() {
            return Err(DomainError::invariant(format!(
                "order item {item_id} is still sold and cannot be restocked"
            )));
        }
        item.mark_restocked(at)?;
        self.record.updated_at = at;
        Ok(())
    }

    /// Recompute `total_amount`. Idempotent.
    pub fn calculate_total(&mut self) -> DomainResult<Money> {
        self.record.amounts.calculate_total()
    }

    /// Set the subtotal to the sum of the line totals and recompute the total.
    pub fn recalculate_subtotal(&mut self, at: DateTime<Utc>) -> DomainResult<Money> {
        let subtotal = Money::total(self.items.iter().map(OrderItem::total_price))?;
        self.record.amounts.set_subtotal(subtotal)?;
        self.record.updated_at = at;
        Ok(subtotal)
    }

    pub fn set_tax_amount(&mut self, tax_amount: Money, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.amounts.set_tax_amount(tax_amount)?;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_shipping_fee(&mut self, shipping_fee: Money, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.amounts.set_shipping_fee(shipping_fee)?;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_discount_amount(
        &mut self,
        discount_amount: Money,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.record.amounts.set_discount_amount(discount_amount)?;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_estimated_delivery(&mut self, estimate: Option<DateTime<Utc>>, at: DateTime<Utc>) {
        self.record.estimated_delivery = estimate;
        self.record.updated_at = at;
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_to(OrderStatus::Confirmed, at)
    }

    pub fn start_processing(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_to(OrderStatus::Processing, at)
    }

    pub fn mark_as_shipped(
        &mut self,
        tracking_number: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(tracking) = &tracking_number {
            if tracking.is_empty() || tracking.chars().count() > 50 {
                return Err(DomainError::validation(
                    "tracking number must be between 1 and 50 characters",
                ));
            }
        }
        self.move_to(OrderStatus::Shipped, at)?;
        self.record.shipped_at = Some(at);
        if tracking_number.is_some() {
            self.record.tracking_number = tracking_number;
        }
        Ok(())
    }

    pub fn mark_as_delivered(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_to(OrderStatus::Delivered, at)?;
        self.record.delivered_at = Some(at);
        Ok(())
    }

    /// Cancel the order, appending `Cancellation reason: <reason>` to the notes.
    ///
    /// Stock is not restored here; see [`Order::pending_restock`].
    pub fn cancel(&mut self, reason: Option<&str>, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_to(OrderStatus::Cancelled, at)?;
        self.record.cancelled_at = Some(at);
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            let line = format!("Cancellation reason: {reason}");
            self.record.notes = Some(match self.record.notes.take() {
                Some(notes) if !notes.is_empty() => format!("{notes}\n{line}"),
                _ => line,
            });
        }
        Ok(())
    }

    /// Take the whole order back; every line not yet returned is flagged returned.
    pub fn mark_returned(&mut self, reason: Option<&str>, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_to(OrderStatus::Returned, at)?;
        for item in self.items.iter_mut().filter(|i| !i.is_returned()) {
            item.mark_returned(reason.map(str::to_string), at)?;
        }
        Ok(())
    }

    /// Return a single line of a shipped or delivered order.
    pub fn return_item(
        &mut self,
        item_id: OrderItemId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<&OrderItem> {
        if !matches!(
            self.record.status,
            OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(DomainError::invariant(format!(
                "items of a {} order cannot be returned",
                self.record.status.as_str()
            )));
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id_typed() == item_id)
            .ok_or_else(DomainError::not_found)?;
        item.mark_returned(reason, at)?;
        self.record.updated_at = at;
        Ok(item)
    }

    pub fn mark_as_paid(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.record.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot take payment for a {} order",
                self.record.status.as_str()
            )));
        }
        self.move_payment_to(PaymentStatus::Paid, at)?;
        self.record.paid_at = Some(at);
        Ok(())
    }

    pub fn mark_payment_failed(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_payment_to(PaymentStatus::Failed, at)
    }

    pub fn refund(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.move_payment_to(PaymentStatus::Refunded, at)
    }

    /// Record the version a store just persisted.
    pub fn mark_saved(&mut self, version: u64) {
        self.record.version = version;
    }

    fn move_to(&mut self, next: OrderStatus, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.status.ensure_transition(next)?;
        self.record.status = next;
        self.record.updated_at = at;
        Ok(())
    }

    fn move_payment_to(&mut self, next: PaymentStatus, at: DateTime<Utc>) -> DomainResult<()> {
        self.record.payment_status.ensure_transition(next)?;
        self.record.payment_status = next;
        self.record.updated_at = at;
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn version(&self) -> u64 {
        self.record.version
    }
}

/// Order listing queries, with the default caps the storefront uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderQuery {
    /// A customer's orders, newest first.
    ByUser { user_id: UserId, limit: u32 },
    /// Orders in one status, newest first.
    ByStatus { status: OrderStatus, limit: u32 },
    /// Paid orders still waiting to be confirmed, oldest first.
    Pending { limit: u32 },
}

impl OrderQuery {
    pub fn by_user(user_id: UserId) -> Self {
        OrderQuery::ByUser {
            user_id,
            limit: DEFAULT_USER_ORDERS_LIMIT,
        }
    }

    pub fn by_status(status: OrderStatus) -> Self {
        OrderQuery::ByStatus {
            status,
            limit: DEFAULT_STATUS_ORDERS_LIMIT,
        }
    }

    pub fn pending() -> Self {
        OrderQuery::Pending {
            limit: DEFAULT_STATUS_ORDERS_LIMIT,
        }
    }

    pub fn with_limit(self, limit: u32) -> Self {
        match self {
            OrderQuery::ByUser { user_id, .. } => OrderQuery::ByUser { user_id, limit },
            OrderQuery::ByStatus { status, .. } => OrderQuery::ByStatus { status, limit },
            OrderQuery::Pending { .. } => OrderQuery::Pending { limit },
        }
    }

    pub fn limit(&self) -> u32 {
        match *self {
            OrderQuery::ByUser { limit, .. }
            | OrderQuery::ByStatus { limit, .. }
            | OrderQuery::Pending { limit } => limit,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        match *self {
            OrderQuery::ByUser { user_id, .. } => order.user_id() == user_id,
            OrderQuery::ByStatus { status, .. } => order.status() == status,
            OrderQuery::Pending { .. } => {
                order.status() == OrderStatus::Pending
                    && order.payment_status() == PaymentStatus::Paid
            }
        }
    }

    /// Whether results come back oldest first.
    pub fn oldest_first(&self) -> bool {
        matches!(self, OrderQuery::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::LinePricing;
    use crate::item::ProductSnapshot;
    use chrono::{Duration, TimeZone};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storefront_core::Percent;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap()
    }

    fn later(minutes: i64) -> DateTime<Utc> {
        test_time() + Duration::minutes(minutes)
    }

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Nguyen Van A".into(),
            phone: "+84901234567".into(),
            street: "12 Le Loi".into(),
            ward: Some("Ben Nghe".into()),
            district: Some("District 1".into()),
            city: "Ho Chi Minh City".into(),
        }
    }

    fn test_line(product_id: i64, unit: u16, qty: u32) -> NewOrderItem {
        NewOrderItem {
            product: ProductSnapshot {
                product_id: ProductId::new(product_id),
                name: format!("Product {product_id}"),
                sku: format!("SKU-{product_id}"),
                image: None,
                specifications: Default::default(),
            },
            pricing: LinePricing::new(Money::from_major(unit), Percent::ZERO, qty).unwrap(),
        }
    }

    fn test_new_order(lines: Vec<NewOrderItem>) -> NewOrder {
        let number = OrderNumber::generate(test_time(), &mut StdRng::seed_from_u64(1));
        NewOrder::new(number, UserId::new(7), test_address(), PaymentMethod::Cod, lines).unwrap()
    }

    fn test_order() -> Order {
        let new = test_new_order(vec![test_line(1, 40, 2), test_line(2, 20, 1)]);
        Order::from_new(
            OrderId::new(1),
            new,
            vec![OrderItemId::new(10), OrderItemId::new(11)],
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn total_is_subtotal_plus_tax_plus_shipping_minus_discount() {
        let amounts = OrderAmounts::new(
            Money::from_major(100),
            Money::from_major(10),
            Money::from_major(5),
            Money::from_major(15),
        )
        .unwrap();
        assert_eq!(amounts.total_amount(), Money::from_major(100));
    }

    #[test]
    fn all_zero_amounts_total_zero() {
        let amounts = OrderAmounts::new(Money::ZERO, Money::ZERO, Money::ZERO, Money::ZERO).unwrap();
        assert_eq!(amounts.total_amount(), Money::ZERO);
    }

    #[test]
    fn discount_above_gross_is_rejected_without_change() {
        let mut amounts = OrderAmounts::new(
            Money::from_major(10),
            Money::ZERO,
            Money::ZERO,
            Money::ZERO,
        )
        .unwrap();
        let before = amounts;

        match amounts.set_discount_amount(Money::from_major(11)) {
            Err(DomainError::Validation(_)) => {}
            other => panic!("Expected Validation error, got {other:?}"),
        }
        assert_eq!(amounts, before);
    }

    #[test]
    fn new_order_subtotal_is_sum_of_lines() {
        let mut new = test_new_order(vec![test_line(1, 40, 2), test_line(2, 20, 1)]);
        assert_eq!(new.amounts().subtotal(), Money::from_major(100));

        new.set_tax_amount(Money::from_major(10)).unwrap();
        new.set_shipping(ShippingMethod::Express, Money::from_major(5)).unwrap();
        new.apply_discount(Some("SPRING15".into()), Money::from_major(15)).unwrap();
        assert_eq!(new.amounts().total_amount(), Money::from_major(100));
        assert_eq!(new.coupon_code(), Some("SPRING15"));
        assert_eq!(new.shipping_method, ShippingMethod::Express);
    }

    #[test]
    fn new_order_requires_items_and_valid_address() {
        let number = OrderNumber::parse("ORD2403090001").unwrap();
        assert!(matches!(
            NewOrder::new(number.clone(), UserId::new(1), test_address(), PaymentMethod::Cod, vec![]),
            Err(DomainError::Validation(_))
        ));

        let mut address = test_address();
        address.phone = "12ab".into();
        assert!(matches!(
            NewOrder::new(number, UserId::new(1), address, PaymentMethod::Cod, vec![test_line(1, 1, 1)]),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn from_new_needs_one_id_per_item() {
        let new = test_new_order(vec![test_line(1, 40, 2)]);
        assert!(matches!(
            Order::from_new(OrderId::new(1), new, vec![], test_time()),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn recalculate_subtotal_follows_lines() {
        let mut order = test_order();
        order.set_shipping_fee(Money::from_major(5), later(1)).unwrap();
        assert_eq!(order.recalculate_subtotal(later(2)).unwrap(), Money::from_major(100));
        assert_eq!(order.total_amount(), Money::from_major(105));
        assert_eq!(order.calculate_total().unwrap(), Money::from_major(105));
        assert_eq!(order.calculate_total().unwrap(), Money::from_major(105));
    }

    #[test]
    fn happy_path_lifecycle_stamps_timestamps() {
        let mut order = test_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);

        order.mark_as_paid(later(1)).unwrap();
        order.confirm(later(2)).unwrap();
        order.start_processing(later(3)).unwrap();
        order.mark_as_shipped(Some("VN123".into()), later(4)).unwrap();
        order.mark_as_delivered(later(5)).unwrap();

        let r = order.record();
        assert_eq!(r.status, OrderStatus::Delivered);
        assert_eq!(r.payment_status, PaymentStatus::Paid);
        assert_eq!(r.paid_at, Some(later(1)));
        assert_eq!(r.shipped_at, Some(later(4)));
        assert_eq!(r.delivered_at, Some(later(5)));
        assert_eq!(r.tracking_number.as_deref(), Some("VN123"));
        assert_eq!(r.updated_at, later(5));
    }

    #[test]
    fn shipping_without_tracking_keeps_existing_number() {
        let mut order = test_order();
        order.mark_as_shipped(None, later(1)).unwrap();
        assert_eq!(order.record().tracking_number, None);
        assert_eq!(order.record().shipped_at, Some(later(1)));
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let mut order = test_order();
        match order.mark_as_delivered(later(1)) {
            Err(DomainError::InvariantViolation(_)) => {}
            other => panic!("Expected InvariantViolation, got {other:?}"),
        }
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.record().delivered_at, None);

        order.mark_as_shipped(None, later(2)).unwrap();
        assert!(matches!(
            order.cancel(Some("too late"), later(3)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn cancel_appends_reason_to_notes() {
        let mut order = test_order();
        order.record.notes = Some("Leave at the door".into());
        order.cancel(Some("changed my mind"), later(1)).unwrap();

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.record().cancelled_at, Some(later(1)));
        assert_eq!(
            order.notes(),
            Some("Leave at the door\nCancellation reason: changed my mind")
        );

        let mut bare = test_order();
        bare.cancel(Some("duplicate order"), later(1)).unwrap();
        assert_eq!(bare.notes(), Some("Cancellation reason: duplicate order"));

        let mut silent = test_order();
        silent.cancel(None, later(1)).unwrap();
        assert_eq!(silent.notes(), None);
    }

    #[test]
    fn cancelled_orders_cannot_be_paid() {
        let mut order = test_order();
        order.cancel(None, later(1)).unwrap();
        assert!(matches!(
            order.mark_as_paid(later(2)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn payment_can_fail_then_succeed_then_refund() {
        let mut order = test_order();
        order.mark_payment_failed(later(1)).unwrap();
        order.mark_as_paid(later(2)).unwrap();
        order.refund(later(3)).unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert!(matches!(order.refund(later(4)), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn return_item_requires_shipped_order_and_is_one_shot() {
        let mut order = test_order();
        assert!(matches!(
            order.return_item(OrderItemId::new(10), None, later(1)),
            Err(DomainError::InvariantViolation(_))
        ));

        order.mark_as_shipped(None, later(1)).unwrap();
        order.mark_as_delivered(later(2)).unwrap();

        let item = order
            .return_item(OrderItemId::new(10), Some("broken".into()), later(3))
            .unwrap();
        assert!(item.is_returned());
        assert_eq!(order.items().iter().filter(|i| !i.is_returned()).count(), 1);

        assert!(matches!(
            order.return_item(OrderItemId::new(10), None, later(4)),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            order.return_item(OrderItemId::new(99), None, later(4)),
            Err(DomainError::NotFound)
        ));
    }

    #[test]
    fn restock_is_owed_for_cancelled_orders_and_returned_lines() {
        let mut order = test_order();
        assert_eq!(order.pending_restock().count(), 0);
        assert!(matches!(
            order.mark_restocked(OrderItemId::new(10), later(1)),
            Err(DomainError::InvariantViolation(_))
        ));

        let mut shipped = order.clone();
        shipped.mark_as_shipped(None, later(1)).unwrap();
        shipped.return_item(OrderItemId::new(11), None, later(2)).unwrap();
        let owed: Vec<_> = shipped.pending_restock().map(OrderItem::id_typed).collect();
        assert_eq!(owed, vec![OrderItemId::new(11)]);

        order.cancel(None, later(1)).unwrap();
        assert_eq!(order.pending_restock().count(), 2);
        order.mark_restocked(OrderItemId::new(10), later(2)).unwrap();
        let owed: Vec<_> = order.pending_restock().map(OrderItem::id_typed).collect();
        assert_eq!(owed, vec![OrderItemId::new(11)]);
        assert!(matches!(
            order.mark_restocked(OrderItemId::new(10), later(3)),
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            order.mark_restocked(OrderItemId::new(99), later(3)),
            Err(DomainError::NotFound)
        ));
    }

    #[test]
    fn mark_returned_flags_remaining_items() {
        let mut order = test_order();
        order.mark_as_shipped(None, later(1)).unwrap();
        order.return_item(OrderItemId::new(10), None, later(2)).unwrap();
        order.mark_returned(Some("refused"), later(3)).unwrap();

        assert_eq!(order.status(), OrderStatus::Returned);
        assert!(order.items().iter().all(OrderItem::is_returned));
        let second = order.item(OrderItemId::new(11)).unwrap();
        assert_eq!(second.record().return_reason.as_deref(), Some("refused"));
    }

    #[test]
    fn order_queries_match_and_default_limits() {
        let mut order = test_order();
        assert!(OrderQuery::by_user(UserId::new(7)).matches(&order));
        assert!(!OrderQuery::by_user(UserId::new(8)).matches(&order));
        assert_eq!(OrderQuery::by_user(UserId::new(7)).limit(), 10);
        assert_eq!(OrderQuery::by_status(OrderStatus::Pending).limit(), 20);
        assert_eq!(OrderQuery::pending().with_limit(5).limit(), 5);

        assert!(!OrderQuery::pending().matches(&order));
        order.mark_as_paid(later(1)).unwrap();
        assert!(OrderQuery::pending().matches(&order));
        assert!(OrderQuery::pending().oldest_first());
        assert!(!OrderQuery::by_status(OrderStatus::Pending).oldest_first());
    }

    #[test]
    fn serializes_flat_with_items() {
        let order = test_order();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payment_method"], "cod");
        assert!(json["order_number"].as_str().unwrap().starts_with("ORD240309"));
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
        assert!(json.get("total_amount").is_some());
    }

    #[test]
    fn amounts_past_the_storable_maximum_are_rejected() {
        let mut big = test_line(1, 1, 1);
        big.pricing = LinePricing::new(Money::ceiling(), Percent::ZERO, 1).unwrap();
        let number = OrderNumber::generate(test_time(), &mut StdRng::seed_from_u64(3));
        let result = NewOrder::new(
            number,
            UserId::new(7),
            test_address(),
            PaymentMethod::Cod,
            vec![big.clone(), big.clone()],
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let mut new = test_new_order(vec![big]);
        assert!(matches!(
            new.set_tax_amount(Money::from_cents(1)),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(new.amounts().total_amount(), Money::ceiling());
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

            /// Property: the total always equals subtotal + tax + shipping - discount,
            /// whatever order the components were set in.
            #[test]
            fn total_matches_components(
                subtotal in 0u32..10_000_000,
                tax in 0u32..1_000_000,
                shipping in 0u32..1_000_000,
                discount in 0u32..12_000_000,
            ) {
                let mut amounts = OrderAmounts::default();
                amounts.set_tax_amount(Money::from_cents(tax)).unwrap();
                amounts.set_shipping_fee(Money::from_cents(shipping)).unwrap();
                amounts.set_subtotal(Money::from_cents(subtotal)).unwrap();

                let gross = u64::from(subtotal) + u64::from(tax) + u64::from(shipping);
                let result = amounts.set_discount_amount(Money::from_cents(discount));

                if u64::from(discount) <= gross {
                    prop_assert!(result.is_ok());
                    let expected = Money::from_cents((gross - u64::from(discount)) as u32);
                    prop_assert_eq!(amounts.total_amount(), expected);
                    prop_assert_eq!(amounts.calculate_total().unwrap(), expected);
                } else {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(amounts.discount_amount(), Money::ZERO);
                }
            }
        }
    }
}
