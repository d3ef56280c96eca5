// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Placed orders and their status machine.
//!
//! ```text
//!  Pending ──► Accepted ──► Out for delivery ──► Delivered ──► Received
//!     │            │               │     ▲            │
//!     │            │               │     └─not recv'd─┤
//!     └────────────┴───────────────┴──────────────────┴──► Canceled
//! ```
//!
//! `Received` and `Canceled` are terminal. Everything except `status` is fixed
//! when the order is created.

use crate::base::{Actor, CustomerId, OrderId, ProductId};
use crate::error::{Entity, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Accepted,
    #[serde(rename = "Out for delivery")]
    OutForDelivery,
    Delivered,
    Received,
    Canceled,
}

impl OrderStatus {
    /// Statuses an administrator can assign directly.
    pub const ADMIN_SETTABLE: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Accepted => "Accepted",
            OrderStatus::OutForDelivery => "Out for delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Received => "Received",
            OrderStatus::Canceled => "Canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Received | OrderStatus::Canceled)
    }

    /// Checks whether `actor` may move an order from `self` to `to`.
    ///
    /// Ownership is checked separately; this is the status rule only.
    pub fn authorize(self, actor: &Actor, to: OrderStatus) -> Result<(), StoreError> {
        use OrderStatus::*;

        if self == Canceled && to == Canceled {
            return Err(StoreError::AlreadyCanceled);
        }
        if self.is_terminal() {
            return Err(StoreError::Forbidden);
        }
        let allowed = match actor {
            Actor::Admin(_) => Self::ADMIN_SETTABLE.contains(&to),
            Actor::Customer(_) => matches!(
                (self, to),
                (_, Canceled) | (Delivered, Received) | (Delivered, OutForDelivery)
            ),
        };
        if allowed { Ok(()) } else { Err(StoreError::Forbidden) }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "outfordelivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "received" => Ok(OrderStatus::Received),
            "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
            _ => Err(StoreError::invalid(format!("unknown order status '{}'", s.trim()))),
        }
    }
}

/// How the order entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTag {
    #[serde(rename = "DIRECT_ORDER")]
    Direct,
    #[serde(rename = "CART_ORDER")]
    Cart,
}

impl PaymentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTag::Direct => "DIRECT_ORDER",
            PaymentTag::Cart => "CART_ORDER",
        }
    }
}

impl fmt::Display for PaymentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to record an order, captured at checkout.
#[derive(Debug, Clone)]
pub(crate) struct NewOrder {
    pub(crate) customer_id: CustomerId,
    pub(crate) product_id: ProductId,
    pub(crate) product_name: String,
    pub(crate) product_picture: Option<String>,
    pub(crate) quantity: u32,
    pub(crate) unit_price: Decimal,
    /// `unit_price * quantity`, range-checked by the caller.
    pub(crate) total: Decimal,
    pub(crate) reserved: u32,
    pub(crate) payment: PaymentTag,
}

#[derive(Debug)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    product_id: ProductId,
    /// Display fields copied from the product so the order outlives it.
    product_name: String,
    product_picture: Option<String>,
    quantity: u32,
    unit_price: Decimal,
    total: Decimal,
    /// Units actually taken from stock; released once on cancellation.
    reserved: u32,
    payment: PaymentTag,
    created_at: DateTime<Utc>,
    status: Mutex<OrderStatus>,
}

impl Order {
    fn new(id: OrderId, new: NewOrder) -> Self {
        Self {
            id,
            customer_id: new.customer_id,
            product_id: new.product_id,
            product_name: new.product_name,
            product_picture: new.product_picture,
            quantity: new.quantity,
            unit_price: new.unit_price,
            total: new.total,
            reserved: new.reserved,
            payment: new.payment,
            created_at: Utc::now(),
            status: Mutex::new(OrderStatus::Pending),
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn payment(&self) -> PaymentTag {
        self.payment
    }

    pub fn status(&self) -> OrderStatus {
        *self.status.lock()
    }

    /// Applies a status change under the order's lock.
    ///
    /// `on_change` runs while the lock is still held, with the previous
    /// status, so side effects of a transition (restoring stock) happen
    /// exactly once.
    pub(crate) fn transition<F>(&self, actor: &Actor, to: OrderStatus, on_change: F) -> Result<OrderStatus, StoreError>
    where
        F: FnOnce(&Order, OrderStatus),
    {
        if !actor.is_admin() && actor.customer_id() != self.customer_id {
            return Err(StoreError::Forbidden);
        }
        let mut status = self.status.lock();
        let from = *status;
        from.authorize(actor, to)?;
        *status = to;
        on_change(self, from);
        Ok(from)
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            customer: self.customer_id,
            product: self.product_id,
            product_name: self.product_name.clone(),
            product_picture: self.product_picture.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total: self.total(),
            payment_id: self.payment,
            status: self.status(),
            created_at: self.created_at,
        }
    }
}

/// Flat, serializable view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer: CustomerId,
    pub product: ProductId,
    pub product_name: String,
    pub product_picture: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub payment_id: PaymentTag,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of every placed order.
#[derive(Debug)]
pub struct OrderLedger {
    orders: DashMap<OrderId, Arc<Order>>,
    next_id: AtomicU32,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Appends an order with status `Pending`.
    ///
    /// `before_listed` runs after the id is assigned but before the order can
    /// be found through the ledger, so nothing else can act on it yet.
    pub(crate) fn create<F>(&self, new: NewOrder, before_listed: F) -> Arc<Order>
    where
        F: FnOnce(&Order),
    {
        let id = OrderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let order = Arc::new(Order::new(id, new));
        before_listed(&order);
        self.orders.insert(id, Arc::clone(&order));
        order
    }

    pub fn get(&self, id: OrderId) -> Option<Arc<Order>> {
        self.orders.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn require(&self, id: OrderId) -> Result<Arc<Order>, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(Entity::Order))
    }

    /// A customer's orders in creation order.
    pub fn list_for(&self, customer_id: CustomerId) -> Vec<OrderSnapshot> {
        self.collect(|order| order.customer_id == customer_id)
    }

    /// Every order in creation order.
    pub fn list_all(&self) -> Vec<OrderSnapshot> {
        self.collect(|_| true)
    }

    fn collect(&self, filter: impl Fn(&Order) -> bool) -> Vec<OrderSnapshot> {
        let handles: Vec<Arc<Order>> = self
            .orders
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut snapshots: Vec<OrderSnapshot> = handles.iter().map(|o| o.snapshot()).collect();
        snapshots.sort_by_key(|o| o.id);
        snapshots
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use OrderStatus::*;

    const OWNER: CustomerId = CustomerId(1);
    const CUSTOMER: Actor = Actor::Customer(OWNER);
    const ADMIN: Actor = Actor::Admin(CustomerId(99));

    fn new_order(quantity: u32) -> NewOrder {
        NewOrder {
            customer_id: OWNER,
            product_id: ProductId(1),
            product_name: "Laptop".into(),
            product_picture: None,
            quantity,
            unit_price: dec!(800.00),
            total: dec!(800.00) * Decimal::from(quantity),
            reserved: quantity,
            payment: PaymentTag::Cart,
        }
    }

    #[test]
    fn customer_rules() {
        for from in [Pending, Accepted, OutForDelivery, Delivered] {
            assert_eq!(from.authorize(&CUSTOMER, Canceled), Ok(()));
        }
        assert_eq!(Delivered.authorize(&CUSTOMER, Received), Ok(()));
        assert_eq!(Delivered.authorize(&CUSTOMER, OutForDelivery), Ok(()));

        assert_eq!(Pending.authorize(&CUSTOMER, Received), Err(StoreError::Forbidden));
        assert_eq!(Pending.authorize(&CUSTOMER, Accepted), Err(StoreError::Forbidden));
        assert_eq!(OutForDelivery.authorize(&CUSTOMER, Delivered), Err(StoreError::Forbidden));
        assert_eq!(Canceled.authorize(&CUSTOMER, Canceled), Err(StoreError::AlreadyCanceled));
        assert_eq!(Received.authorize(&CUSTOMER, Canceled), Err(StoreError::Forbidden));
    }

    #[test]
    fn admin_rules() {
        for to in OrderStatus::ADMIN_SETTABLE {
            assert_eq!(Pending.authorize(&ADMIN, to), Ok(()));
        }
        // No skip restriction.
        assert_eq!(Pending.authorize(&ADMIN, Delivered), Ok(()));
        assert_eq!(Accepted.authorize(&ADMIN, Received), Err(StoreError::Forbidden));
        assert_eq!(Received.authorize(&ADMIN, Pending), Err(StoreError::Forbidden));
        assert_eq!(Canceled.authorize(&ADMIN, Pending), Err(StoreError::Forbidden));
    }

    #[test]
    fn status_parsing_accepts_display_form() {
        for status in [Pending, Accepted, OutForDelivery, Delivered, Received, Canceled] {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!("out_for_delivery".parse::<OrderStatus>(), Ok(OutForDelivery));
        assert_eq!("Cancelled".parse::<OrderStatus>(), Ok(Canceled));
        assert!("Lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn ledger_creates_pending_orders_in_sequence() {
        let ledger = OrderLedger::new();
        let first = ledger.create(new_order(1), |_| {});
        let second = ledger.create(new_order(2), |_| {});

        assert_eq!(first.id(), OrderId(1));
        assert_eq!(second.id(), OrderId(2));
        assert_eq!(first.status(), Pending);
        assert_eq!(second.total(), dec!(1600.00));

        let ids: Vec<OrderId> = ledger.list_all().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(2)]);
        assert!(ledger.list_for(CustomerId(2)).is_empty());
    }

    #[test]
    fn order_is_unlisted_until_create_hook_returns() {
        let ledger = OrderLedger::new();
        let mut seen = None;
        let order = ledger.create(new_order(1), |order| {
            assert!(ledger.get(order.id()).is_none());
            seen = Some(order.id());
        });

        assert_eq!(seen, Some(order.id()));
        assert!(ledger.get(order.id()).is_some());
    }

    #[test]
    fn transition_checks_ownership() {
        let ledger = OrderLedger::new();
        let order = ledger.create(new_order(1), |_| {});
        let stranger = Actor::Customer(CustomerId(2));

        assert_eq!(
            order.transition(&stranger, Canceled, |_, _| {}),
            Err(StoreError::Forbidden)
        );
        assert_eq!(order.status(), Pending);
    }

    #[test]
    fn transition_runs_side_effect_once() {
        let ledger = OrderLedger::new();
        let order = ledger.create(new_order(3), |_| {});
        let mut released = 0;

        assert_eq!(
            order.transition(&CUSTOMER, Canceled, |o, _| released += o.reserved()),
            Ok(Pending)
        );
        assert_eq!(
            order.transition(&CUSTOMER, Canceled, |o, _| released += o.reserved()),
            Err(StoreError::AlreadyCanceled)
        );
        assert_eq!(released, 3);
    }

    #[test]
    fn snapshot_serializes_payment_tag_and_status() {
        let ledger = OrderLedger::new();
        let order = ledger.create(new_order(1), |_| {});
        order.transition(&ADMIN, OutForDelivery, |_, _| {}).unwrap();

        let json = serde_json::to_value(order.snapshot()).unwrap();
        assert_eq!(json["payment_id"], "CART_ORDER");
        assert_eq!(json["status"], "Out for delivery");
        assert_eq!(json["unit_price"], "800.00");
    }
}
