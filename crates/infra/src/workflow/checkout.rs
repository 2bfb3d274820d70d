//! Checkout: turn a cart into a placed order.
//!
//! ```text
//! CheckoutRequest
//!   ↓
//! 1. Price every line against the current catalog (nothing written yet)
//!   ↓
//! 2. Take stock line by line (atomic per product)
//!   ↓
//! 3. Insert the order, regenerating the number on collisions
//! ```
//!
//! If step 2 or 3 fails, the stock already taken is put back on the shelf with
//! `increase_stock` before the error is returned. `sold_count` keeps counting
//! the attempted units; it never goes down.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, instrument, warn};

use storefront_core::{DomainError, Money, ProductId, UserId};
use storefront_orders::{
    NewOrder, NewOrderItem, Order, OrderNumber, PaymentMethod, ShippingAddress, ShippingMethod,
};

use crate::config::{DEFAULT_ORDER_NUMBER_ATTEMPTS, StorefrontConfig};
use crate::error::StoreResult;
use crate::store::{OrderStore, ProductStore};

/// One cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub lines: Vec<CheckoutLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub shipping_fee: Money,
    pub tax_amount: Money,
    pub coupon_code: Option<String>,
    pub discount_amount: Money,
    pub notes: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Use this number instead of generating one. A collision is then final.
    pub order_number: Option<OrderNumber>,
}

impl CheckoutRequest {
    /// Standard shipping, no fees, no coupon.
    pub fn new(
        user_id: UserId,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        lines: Vec<CheckoutLine>,
    ) -> Self {
        Self {
            user_id,
            lines,
            shipping_address,
            payment_method,
            shipping_method: ShippingMethod::default(),
            shipping_fee: Money::ZERO,
            tax_amount: Money::ZERO,
            coupon_code: None,
            discount_amount: Money::ZERO,
            notes: None,
            estimated_delivery: None,
            order_number: None,
        }
    }
}

/// Places orders against a catalog and an order book.
#[derive(Debug, Clone)]
pub struct Checkout<P, O> {
    products: P,
    orders: O,
    order_number_attempts: u32,
}

impl<P, O> Checkout<P, O>
where
    P: ProductStore,
    O: OrderStore,
{
    pub fn new(products: P, orders: O) -> Self {
        Self {
            products,
            orders,
            order_number_attempts: DEFAULT_ORDER_NUMBER_ATTEMPTS,
        }
    }

    /// Checkout with the order number budget from `config`.
    pub fn from_config(products: P, orders: O, config: &StorefrontConfig) -> Self {
        Self::new(products, orders).with_order_number_attempts(config.order_number_attempts)
    }

    /// How many generated order numbers to try before giving up (at least 1).
    pub fn with_order_number_attempts(mut self, attempts: u32) -> Self {
        self.order_number_attempts = attempts.max(1);
        self
    }

    /// Place an order.
    ///
    /// Errors: `NotFound` for an unknown product, `Validation` for an inactive
    /// product or bad order data, `InsufficientStock` when a line cannot be
    /// filled, `Duplicate` when no free order number was found.
    #[instrument(
        skip(self, request, rng),
        fields(user_id = %request.user_id, lines = request.lines.len()),
        err
    )]
    pub async fn place_order<R>(
        &self,
        request: CheckoutRequest,
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> StoreResult<Order>
    where
        R: Rng + Send + ?Sized,
    {
        let fixed_number = request.order_number.is_some();
        let mut order = self.build_order(request, at, rng).await?;

        let demand: Vec<(ProductId, u32)> = order.stock_demand().collect();
        let mut taken = Vec::with_capacity(demand.len());
        for (product_id, quantity) in demand {
            if let Err(err) = self.products.decrease_stock(product_id, quantity, at).await {
                self.release(&taken, at).await;
                return Err(err);
            }
            taken.push((product_id, quantity));
        }

        let mut attempt = 1;
        loop {
            match self.orders.insert_order(order.clone(), at).await {
                Ok(placed) => {
                    info!(
                        order_id = %placed.id_typed(),
                        order_number = %placed.order_number(),
                        total = %placed.total_amount(),
                        "order placed"
                    );
                    return Ok(placed);
                }
                Err(err)
                    if err.is_duplicate()
                        && !fixed_number
                        && attempt < self.order_number_attempts =>
                {
                    warn!(
                        order_number = %order.order_number,
                        attempt,
                        "order number taken, regenerating"
                    );
                    attempt += 1;
                    order.order_number = OrderNumber::generate(at, rng);
                }
                Err(err) => {
                    self.release(&taken, at).await;
                    return Err(err);
                }
            }
        }
    }

    async fn build_order<R>(
        &self,
        request: CheckoutRequest,
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> StoreResult<NewOrder>
    where
        R: Rng + Send + ?Sized,
    {
        if request.lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one item").into());
        }

        let mut items = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = self
                .products
                .get_product(line.product_id)
                .await?
                .ok_or_else(DomainError::not_found)?;
            items.push(NewOrderItem::for_product(&product, line.quantity)?);
        }

        let number = match request.order_number {
            Some(number) => number,
            None => OrderNumber::generate(at, rng),
        };
        let mut order = NewOrder::new(
            number,
            request.user_id,
            request.shipping_address,
            request.payment_method,
            items,
        )?;
        order.set_shipping(request.shipping_method, request.shipping_fee)?;
        order.set_tax_amount(request.tax_amount)?;
        if request.coupon_code.is_some() || !request.discount_amount.is_zero() {
            order.apply_discount(request.coupon_code, request.discount_amount)?;
        }
        order.notes = request.notes;
        order.estimated_delivery = request.estimated_delivery;
        Ok(order)
    }

    /// Put back stock taken for an order that was not placed.
    async fn release(&self, taken: &[(ProductId, u32)], at: DateTime<Utc>) {
        for &(product_id, quantity) in taken {
            match self.products.increase_stock(product_id, quantity, at).await {
                Ok(_) => warn!(product_id = %product_id, quantity, "released reserved stock"),
                Err(err) => warn!(
                    product_id = %product_id,
                    quantity,
                    error = %err,
                    "failed to release reserved stock"
                ),
            }
        }
    }
}
