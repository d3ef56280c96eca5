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

//! The storefront engine.
//!
//! [`Store`] owns the catalog, customer accounts, carts and the order ledger,
//! and is the only entry point callers use. Every operation takes the caller's
//! identity as an `Option<CustomerId>` supplied by the session layer.

use crate::base::{Actor, CartLineId, CustomerId, OrderId, ProductId};
use crate::cart::{CartEntry, CartRemoval, CartStore, CartUpdate};
use crate::config::StoreConfig;
use crate::customer::{CustomerSummary, Customers, NewCustomer, Profile};
use crate::error::StoreError;
use crate::events::{EventLog, StoreEvent};
use crate::inventory::Inventory;
use crate::order::{OrderLedger, OrderSnapshot, OrderStatus};
use crate::product::{ProductDraft, ProductSnapshot, sum_amounts};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

/// A customer's cart as shown on the cart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub entries: Vec<CartEntry>,
    pub amount: Decimal,
}

pub struct Store {
    pub(crate) config: StoreConfig,
    pub(crate) inventory: Inventory,
    pub(crate) customers: Customers,
    pub(crate) carts: CartStore,
    pub(crate) orders: OrderLedger,
    pub(crate) events: EventLog,
    /// Shared by ordinary operations, exclusive for cascading deletes, so a
    /// cascade is never observed half done.
    pub(crate) gate: RwLock<()>,
}

impl Store {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Store {
            config,
            inventory: Inventory::new(),
            customers: Customers::new(),
            carts: CartStore::new(),
            orders: OrderLedger::new(),
            events: EventLog::new(),
            gate: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // === Identity ===

    /// Resolves a session identity to an actor.
    ///
    /// A session pointing at a deleted account is treated as anonymous.
    pub fn actor(&self, session: Option<CustomerId>) -> Result<Actor, StoreError> {
        let id = session.ok_or(StoreError::Unauthenticated)?;
        let customer = self.customers.get(id).ok_or(StoreError::Unauthenticated)?;
        Ok(if customer.is_admin() {
            Actor::Admin(id)
        } else {
            Actor::Customer(id)
        })
    }

    /// Resolves the session for customer-facing routes, where even an
    /// administrator acts as an ordinary customer.
    pub(crate) fn customer(&self, session: Option<CustomerId>) -> Result<CustomerId, StoreError> {
        self.actor(session).map(|actor| actor.customer_id())
    }

    fn admin(&self, session: Option<CustomerId>) -> Result<Actor, StoreError> {
        let actor = self.actor(session)?;
        if actor.is_admin() {
            Ok(actor)
        } else {
            debug!(customer = %actor.customer_id(), "admin action refused");
            Err(StoreError::Forbidden)
        }
    }

    // === Accounts ===

    pub fn register(&self, new: NewCustomer) -> Result<CustomerId, StoreError> {
        let id = self.customers.register(new)?;
        info!(customer = %id, "customer registered");
        Ok(id)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<CustomerId, StoreError> {
        self.customers
            .authenticate(email, password)
            .inspect_err(|_| debug!("login rejected"))
    }

    pub fn update_profile(&self, session: Option<CustomerId>, profile: Profile) -> Result<(), StoreError> {
        let id = self.customer(session)?;
        self.customers.update_profile(id, profile)
    }

    pub fn change_password(&self, session: Option<CustomerId>, current: &str, new: &str) -> Result<(), StoreError> {
        let id = self.customer(session)?;
        self.customers.change_password(id, current, new)
    }

    /// Makes `id` the first administrator. Fails once any administrator
    /// exists; after that, use [`Store::grant_admin`].
    pub fn bootstrap_admin(&self, id: CustomerId) -> Result<(), StoreError> {
        // Exclusive, so two racing bootstraps cannot both see no admin.
        let _gate = self.gate.write();
        if self.customers.list().iter().any(|c| c.is_admin) {
            return Err(StoreError::Forbidden);
        }
        self.customers.set_admin(id, true)?;
        info!(customer = %id, "administrator bootstrapped");
        Ok(())
    }

    /// Grants the admin flag to another account.
    pub fn grant_admin(&self, session: Option<CustomerId>, target: CustomerId) -> Result<(), StoreError> {
        let actor = self.admin(session)?;
        self.customers.set_admin(target, true)?;
        info!(customer = %target, by = %actor.customer_id(), "admin granted");
        Ok(())
    }

    pub fn list_customers(&self, session: Option<CustomerId>) -> Result<Vec<CustomerSummary>, StoreError> {
        self.admin(session)?;
        Ok(self.customers.list())
    }

    /// Removes an account and its cart in one step. Orders are kept.
    pub fn delete_customer(&self, session: Option<CustomerId>, target: CustomerId) -> Result<(), StoreError> {
        let actor = self.admin(session)?;
        if target == actor.customer_id() {
            return Err(StoreError::Forbidden);
        }
        let _gate = self.gate.write();
        self.customers.remove(target)?;
        let cart_lines_removed = self.carts.remove_cart(target);
        self.events.record(StoreEvent::CustomerDeleted {
            customer_id: target,
            cart_lines_removed,
        });
        info!(customer = %target, cart_lines_removed, "customer deleted");
        Ok(())
    }

    // === Catalog ===

    pub fn add_product(&self, session: Option<CustomerId>, draft: ProductDraft) -> Result<ProductId, StoreError> {
        self.admin(session)?;
        let _gate = self.gate.read();
        let id = self.inventory.add_product(draft)?;
        info!(product = %id, "product added");
        Ok(id)
    }

    pub fn update_product(
        &self,
        session: Option<CustomerId>,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<(), StoreError> {
        self.admin(session)?;
        let _gate = self.gate.read();
        self.inventory.update_product(id, draft)?;
        info!(product = %id, "product updated");
        Ok(())
    }

    /// Removes a product and every cart line referencing it. Orders keep
    /// their own copy of the product's name and picture.
    pub fn delete_product(&self, session: Option<CustomerId>, id: ProductId) -> Result<usize, StoreError> {
        self.admin(session)?;
        let _gate = self.gate.write();
        self.inventory.remove_product(id)?;
        let cart_lines_removed = self.carts.purge_product(id);
        self.events.record(StoreEvent::ProductDeleted {
            product_id: id,
            cart_lines_removed,
        });
        info!(product = %id, cart_lines_removed, "product deleted");
        Ok(cart_lines_removed)
    }

    pub fn product(&self, id: ProductId) -> Option<ProductSnapshot> {
        self.inventory.get(id).map(|p| p.snapshot())
    }

    pub fn products(&self) -> Vec<ProductSnapshot> {
        self.inventory.list()
    }

    pub fn stock(&self, id: ProductId) -> Result<u32, StoreError> {
        self.inventory.stock(id)
    }

    // === Cart ===

    pub fn add_to_cart(&self, session: Option<CustomerId>, product: ProductId) -> Result<CartUpdate, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        let update = self
            .carts
            .add_or_increment(&self.inventory, customer, product)
            .inspect_err(|e| debug!(customer = %customer, product = %product, error = %e, "add to cart refused"))?;
        info!(customer = %customer, product = %product, quantity = update.quantity, "added to cart");
        Ok(update)
    }

    pub fn increment_line(&self, session: Option<CustomerId>, line: CartLineId) -> Result<CartUpdate, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        self.carts
            .increment(&self.inventory, customer, line)
            .inspect_err(|e| debug!(customer = %customer, line = %line, error = %e, "increment refused"))
    }

    pub fn decrement_line(&self, session: Option<CustomerId>, line: CartLineId) -> Result<CartUpdate, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        self.carts
            .decrement(&self.inventory, customer, line)
            .inspect_err(|e| debug!(customer = %customer, line = %line, error = %e, "decrement refused"))
    }

    pub fn remove_line(&self, session: Option<CustomerId>, line: CartLineId) -> Result<CartRemoval, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        self.carts
            .remove(&self.inventory, customer, line)
            .inspect_err(|e| debug!(customer = %customer, line = %line, error = %e, "remove refused"))
    }

    pub fn cart(&self, session: Option<CustomerId>) -> Result<CartView, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        let entries = self.carts.list_for(&self.inventory, customer)?;
        let amount = sum_amounts(entries.iter().map(|e| e.subtotal))?;
        Ok(CartView { entries, amount })
    }

    pub fn cart_total(&self, session: Option<CustomerId>) -> Result<Decimal, StoreError> {
        let _gate = self.gate.read();
        let customer = self.customer(session)?;
        self.carts.total_for(&self.inventory, customer)
    }

    /// Number of lines in the cart; zero for anonymous visitors.
    pub fn cart_count(&self, session: Option<CustomerId>) -> usize {
        self.customer(session)
            .map(|customer| self.carts.line_count(customer))
            .unwrap_or(0)
    }

    // === Orders ===

    pub fn orders(&self, session: Option<CustomerId>) -> Result<Vec<OrderSnapshot>, StoreError> {
        let customer = self.customer(session)?;
        Ok(self.orders.list_for(customer))
    }

    pub fn all_orders(&self, session: Option<CustomerId>) -> Result<Vec<OrderSnapshot>, StoreError> {
        self.admin(session)?;
        Ok(self.orders.list_all())
    }

    /// A single order, visible to its owner and to administrators.
    pub fn order(&self, session: Option<CustomerId>, id: OrderId) -> Result<OrderSnapshot, StoreError> {
        let actor = self.actor(session)?;
        let order = self.orders.require(id)?;
        if !actor.is_admin() && order.customer_id() != actor.customer_id() {
            return Err(StoreError::Forbidden);
        }
        Ok(order.snapshot())
    }

    /// Cancels an order and restores the stock it reserved.
    ///
    /// Owners may cancel their own orders; administrators may cancel any.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyCanceled`] - The order is already canceled.
    /// - [`StoreError::Forbidden`] - Not the owner, or the order was received.
    pub fn cancel_order(&self, session: Option<CustomerId>, id: OrderId) -> Result<OrderSnapshot, StoreError> {
        let actor = self.actor(session)?;
        self.transition(actor, id, OrderStatus::Canceled)
    }

    /// Customer confirms a delivered order arrived.
    pub fn confirm_received(&self, session: Option<CustomerId>, id: OrderId) -> Result<OrderSnapshot, StoreError> {
        let customer = self.customer(session)?;
        self.transition(Actor::Customer(customer), id, OrderStatus::Received)
    }

    /// Customer disputes a delivery; the order goes back out for delivery.
    pub fn report_not_received(&self, session: Option<CustomerId>, id: OrderId) -> Result<OrderSnapshot, StoreError> {
        let customer = self.customer(session)?;
        self.transition(Actor::Customer(customer), id, OrderStatus::OutForDelivery)
    }

    /// Administrator sets any of the five admin statuses on an open order.
    /// Setting `Canceled` restores stock like a customer cancellation.
    pub fn set_order_status(
        &self,
        session: Option<CustomerId>,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderSnapshot, StoreError> {
        let actor = self.admin(session)?;
        self.transition(actor, id, status)
    }

    /// Status lock first, then the product lock for a release. Checkout never
    /// takes a status lock, so the two orders cannot meet in a cycle.
    fn transition(&self, actor: Actor, id: OrderId, to: OrderStatus) -> Result<OrderSnapshot, StoreError> {
        let _gate = self.gate.read();
        let order = self.orders.require(id)?;
        let mut released = None;

        let from = order
            .transition(&actor, to, |order, _| {
                if to == OrderStatus::Canceled
                    && order.reserved() > 0
                    && self.inventory.release(order.product_id(), order.reserved())
                {
                    released = Some(order.reserved());
                }
            })
            .inspect_err(|e| debug!(order = %id, to = %to, error = %e, "status change refused"))?;

        self.events.record(StoreEvent::OrderStatusChanged {
            order_id: id,
            from,
            to,
            by: actor.customer_id(),
        });
        if let Some(quantity) = released {
            self.events.record(StoreEvent::StockReleased {
                order_id: id,
                product_id: order.product_id(),
                quantity,
            });
        }
        info!(order = %id, from = %from, to = %to, by = %actor.customer_id(), "order status changed");
        Ok(order.snapshot())
    }

    // === Audit ===

    /// Removes and returns every event recorded since the last drain.
    ///
    /// The log is unbounded; long-running callers must drain it regularly.
    pub fn drain_events(&self) -> Vec<StoreEvent> {
        self.events.drain()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
