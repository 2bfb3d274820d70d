//! Order status and payment changes after checkout.
//!
//! Every action loads the order, applies one aggregate transition and saves
//! with `ExpectedVersion::Exact(loaded_version)`, so a concurrent change to the
//! same order surfaces as `Conflict` instead of being overwritten.
//!
//! Cancelling and returning save the new status first; the lines that now owe
//! stock are listed by [`Order::pending_restock`]. Each one is then restocked
//! through `ProductStore::restock_item` (exactly once per line) and marked on
//! the order. If restocking stops half way the status change stays, the rest
//! of the lines stay pending, and [`Fulfilment::restock_pending`] finishes the
//! job when called again.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use storefront_core::{
    AggregateRoot, DomainError, DomainResult, ExpectedVersion, OrderId, OrderItemId, ProductId,
};
use storefront_orders::Order;

use crate::error::StoreResult;
use crate::store::{OrderStore, ProductStore};

#[derive(Debug, Clone)]
pub struct Fulfilment<P, O> {
    products: P,
    orders: O,
}

impl<P, O> Fulfilment<P, O>
where
    P: ProductStore,
    O: OrderStore,
{
    pub fn new(products: P, orders: O) -> Self {
        Self { products, orders }
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn confirm(&self, order_id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        self.apply(order_id, |order| order.confirm(at)).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn start_processing(
        &self,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        self.apply(order_id, |order| order.start_processing(at)).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn ship(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        self.apply(order_id, |order| order.mark_as_shipped(tracking_number, at))
            .await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn deliver(&self, order_id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        self.apply(order_id, |order| order.mark_as_delivered(at)).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn mark_paid(&self, order_id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        self.apply(order_id, |order| order.mark_as_paid(at)).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn mark_payment_failed(
        &self,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        self.apply(order_id, |order| order.mark_payment_failed(at))
            .await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn refund(&self, order_id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        self.apply(order_id, |order| order.refund(at)).await
    }

    /// Cancel the order and restock its lines.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let saved = self
            .apply(order_id, |order| order.cancel(reason, at))
            .await?;
        info!(order_number = %saved.order_number(), "order cancelled");
        self.settle_restock(saved, at).await
    }

    /// Take the whole order back and restock the lines not restocked yet.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn return_order(
        &self,
        order_id: OrderId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let saved = self
            .apply(order_id, |order| order.mark_returned(reason, at))
            .await?;
        info!(order_number = %saved.order_number(), "order returned");
        self.settle_restock(saved, at).await
    }

    /// Return one line of a shipped or delivered order and restock it.
    #[instrument(skip(self), fields(order_id = %order_id, item_id = %item_id), err)]
    pub async fn return_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<Order> {
        let saved = self
            .apply(order_id, |order| order.return_item(item_id, reason, at).map(|_| ()))
            .await?;
        self.settle_restock(saved, at).await
    }

    /// Restock whatever the order still owes. Safe to call any number of times.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn restock_pending(&self, order_id: OrderId, at: DateTime<Utc>) -> StoreResult<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        self.settle_restock(order, at).await
    }

    async fn apply(
        &self,
        order_id: OrderId,
        change: impl FnOnce(&mut Order) -> DomainResult<()> + Send,
    ) -> StoreResult<Order> {
        let mut order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(order.version());
        change(&mut order)?;
        self.orders.save_order(&order, expected).await
    }

    /// Restock pending lines one at a time, recording each on the order.
    ///
    /// Stops at the first failure; the remaining lines stay pending.
    async fn settle_restock(&self, mut order: Order, at: DateTime<Utc>) -> StoreResult<Order> {
        let owed: Vec<(OrderItemId, ProductId, u32)> = order
            .pending_restock()
            .map(|item| (item.id_typed(), item.product_id(), item.quantity()))
            .collect();

        for (item_id, product_id, quantity) in owed {
            let applied = self
                .products
                .restock_item(item_id, product_id, quantity, at)
                .await
                .inspect_err(|err| {
                    error!(
                        item_id = %item_id,
                        product_id = %product_id,
                        quantity,
                        error = %err,
                        "restock failed, line left pending"
                    )
                })?;
            if !applied {
                warn!(item_id = %item_id, "stock already returned, recording it");
            }

            let expected = ExpectedVersion::Exact(order.version());
            order.mark_restocked(item_id, at)?;
            order = self.orders.save_order(&order, expected).await?;
        }
        Ok(order)
    }
}
