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

//! Per-customer shopping carts.
//!
//! A cart is an insertion-ordered list of lines, one per product. Every
//! mutation checks the product's stock at the moment it happens; stock that
//! drops later (an admin adjustment, another customer's checkout) is caught at
//! checkout time instead.

use crate::base::{CartLineId, CustomerId, ProductId};
use crate::error::{Entity, StoreError};
use crate::inventory::Inventory;
use crate::product::{ProductSnapshot, line_total, sum_amounts};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: CartLineId,
    /// `None` once the product has gone away.
    pub product_id: Option<ProductId>,
    pub quantity: u32,
}

/// A cart line joined with its product for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub line_id: CartLineId,
    pub quantity: u32,
    pub product: Option<ProductSnapshot>,
    pub subtotal: Decimal,
}

/// Result of an incremental cart change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartUpdate {
    pub line_id: CartLineId,
    pub quantity: u32,
    /// Cart total after the change.
    pub amount: Decimal,
    /// The line has reached the product's stock; further increments fail.
    pub limited: bool,
    pub max_stock: u32,
    /// The line was deleted because its quantity reached zero.
    pub removed: bool,
}

/// Result of deleting a line outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartRemoval {
    pub amount: Decimal,
    pub line_count: usize,
}

#[derive(Debug, Default)]
pub(crate) struct CartData {
    lines: Vec<CartLine>,
}

impl CartData {
    pub(crate) fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    fn position(&self, line_id: CartLineId) -> Option<usize> {
        self.lines.iter().position(|line| line.id == line_id)
    }

    fn line_mut(&mut self, line_id: CartLineId) -> Result<&mut CartLine, StoreError> {
        self.lines
            .iter_mut()
            .find(|line| line.id == line_id)
            .ok_or(StoreError::NotFound(Entity::CartLine))
    }

    pub(crate) fn remove_line(&mut self, line_id: CartLineId) -> Option<CartLine> {
        self.position(line_id).map(|index| self.lines.remove(index))
    }

    /// Sum of price times quantity over lines whose product still exists.
    fn amount(&self, inventory: &Inventory) -> Result<Decimal, StoreError> {
        self.amount_with(inventory, None)
    }

    /// The total the cart would have with one line set to a new quantity,
    /// computed before the change is made.
    fn amount_with(&self, inventory: &Inventory, change: Option<(CartLineId, u32)>) -> Result<Decimal, StoreError> {
        let subtotals = self
            .lines
            .iter()
            .filter_map(|line| {
                let product = inventory.get(line.product_id?)?;
                let quantity = match change {
                    Some((id, quantity)) if id == line.id => quantity,
                    _ => line.quantity,
                };
                Some(line_total(product.current_price(), quantity))
            })
            .collect::<Result<Vec<_>, _>>()?;
        sum_amounts(subtotals)
    }
}

#[derive(Debug)]
pub struct Cart {
    customer_id: CustomerId,
    inner: Mutex<CartData>,
}

impl Cart {
    fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            inner: Mutex::new(CartData::default()),
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.lock().lines.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CartData> {
        self.inner.lock()
    }
}

/// All carts, plus a line-to-owner index for ownership checks.
#[derive(Debug)]
pub struct CartStore {
    carts: DashMap<CustomerId, Arc<Cart>>,
    owners: DashMap<CartLineId, CustomerId>,
    next_id: AtomicU32,
}

impl CartStore {
    pub fn new() -> Self {
        Self {
            carts: DashMap::new(),
            owners: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// The customer's cart, created empty on first use.
    pub(crate) fn cart_for(&self, customer_id: CustomerId) -> Arc<Cart> {
        Arc::clone(
            self.carts
                .entry(customer_id)
                .or_insert_with(|| Arc::new(Cart::new(customer_id)))
                .value(),
        )
    }

    /// Resolves a line to its owner's cart.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - No such line.
    /// - [`StoreError::Forbidden`] - The line belongs to another customer.
    fn owned_cart(&self, customer_id: CustomerId, line_id: CartLineId) -> Result<Arc<Cart>, StoreError> {
        let owner = self
            .owners
            .get(&line_id)
            .map(|entry| *entry.value())
            .ok_or(StoreError::NotFound(Entity::CartLine))?;
        if owner != customer_id {
            return Err(StoreError::Forbidden);
        }
        Ok(self.cart_for(customer_id))
    }

    /// Adds one unit of a product, creating the line if needed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - Unknown product.
    /// - [`StoreError::OutOfStock`] - New line for a product with no stock.
    /// - [`StoreError::StockExceeded`] - Existing line is already at stock.
    pub fn add_or_increment(
        &self,
        inventory: &Inventory,
        customer_id: CustomerId,
        product_id: ProductId,
    ) -> Result<CartUpdate, StoreError> {
        let product = inventory.require(product_id)?;
        let cart = self.cart_for(customer_id);
        let mut data = cart.lock();
        let stock = product.stock();

        let existing = data
            .lines
            .iter()
            .find(|line| line.product_id == Some(product_id))
            .map(|line| (line.id, line.quantity));

        let (line_id, quantity, amount) = match existing {
            Some((line_id, quantity)) => {
                if quantity >= stock {
                    return Err(StoreError::StockExceeded { quantity, max: stock });
                }
                let amount = data.amount_with(inventory, Some((line_id, quantity + 1)))?;
                data.line_mut(line_id)?.quantity = quantity + 1;
                (line_id, quantity + 1, amount)
            }
            None => {
                if stock < 1 {
                    return Err(StoreError::OutOfStock);
                }
                let amount = sum_amounts([data.amount(inventory)?, line_total(product.current_price(), 1)?])?;
                let id = CartLineId(self.next_id.fetch_add(1, Ordering::SeqCst));
                data.lines.push(CartLine {
                    id,
                    product_id: Some(product_id),
                    quantity: 1,
                });
                self.owners.insert(id, customer_id);
                (id, 1, amount)
            }
        };

        Ok(CartUpdate {
            line_id,
            quantity,
            amount,
            limited: quantity >= stock,
            max_stock: stock,
            removed: false,
        })
    }

    /// Adds one unit to an existing line.
    ///
    /// # Errors
    ///
    /// [`StoreError::StockExceeded`] carries the unchanged quantity and the
    /// stock ceiling so the caller can stop offering increments.
    pub fn increment(
        &self,
        inventory: &Inventory,
        customer_id: CustomerId,
        line_id: CartLineId,
    ) -> Result<CartUpdate, StoreError> {
        let cart = self.owned_cart(customer_id, line_id)?;
        let mut data = cart.lock();
        let line = data.line_mut(line_id)?;
        let product = inventory.require(line.product_id.ok_or(StoreError::NotFound(Entity::Product))?)?;
        let stock = product.stock();

        if line.quantity >= stock {
            return Err(StoreError::StockExceeded {
                quantity: line.quantity,
                max: stock,
            });
        }
        let quantity = line.quantity + 1;
        let amount = data.amount_with(inventory, Some((line_id, quantity)))?;
        data.line_mut(line_id)?.quantity = quantity;

        Ok(CartUpdate {
            line_id,
            quantity,
            amount,
            limited: quantity >= stock,
            max_stock: stock,
            removed: false,
        })
    }

    /// Removes one unit; a line that reaches zero is deleted.
    pub fn decrement(
        &self,
        inventory: &Inventory,
        customer_id: CustomerId,
        line_id: CartLineId,
    ) -> Result<CartUpdate, StoreError> {
        let cart = self.owned_cart(customer_id, line_id)?;
        let mut data = cart.lock();
        let line = data.line_mut(line_id)?;
        let max_stock = line
            .product_id
            .and_then(|id| inventory.get(id))
            .map(|product| product.stock())
            .unwrap_or(0);

        let quantity = line.quantity.saturating_sub(1);
        let amount = data.amount_with(inventory, Some((line_id, quantity)))?;
        let removed = quantity == 0;
        if removed {
            data.remove_line(line_id);
            self.owners.remove(&line_id);
        } else {
            data.line_mut(line_id)?.quantity = quantity;
        }

        Ok(CartUpdate {
            line_id,
            quantity,
            amount,
            limited: !removed && quantity >= max_stock,
            max_stock,
            removed,
        })
    }

    /// Deletes a line regardless of quantity.
    pub fn remove(
        &self,
        inventory: &Inventory,
        customer_id: CustomerId,
        line_id: CartLineId,
    ) -> Result<CartRemoval, StoreError> {
        let cart = self.owned_cart(customer_id, line_id)?;
        let mut data = cart.lock();
        if data.position(line_id).is_none() {
            return Err(StoreError::NotFound(Entity::CartLine));
        }
        let amount = data.amount_with(inventory, Some((line_id, 0)))?;
        data.remove_line(line_id);
        self.owners.remove(&line_id);

        Ok(CartRemoval {
            amount,
            line_count: data.lines.len(),
        })
    }

    /// Lines in insertion order, each joined with its product.
    pub fn list_for(&self, inventory: &Inventory, customer_id: CustomerId) -> Result<Vec<CartEntry>, StoreError> {
        let Some(cart) = self.carts.get(&customer_id).map(|c| Arc::clone(c.value())) else {
            return Ok(Vec::new());
        };
        let data = cart.lock();
        data.lines
            .iter()
            .map(|line| {
                let product = line
                    .product_id
                    .and_then(|id| inventory.get(id))
                    .map(|p| p.snapshot());
                let subtotal = match &product {
                    Some(p) => line_total(p.current_price, line.quantity)?,
                    None => Decimal::ZERO,
                };
                Ok(CartEntry {
                    line_id: line.id,
                    quantity: line.quantity,
                    product,
                    subtotal,
                })
            })
            .collect()
    }

    /// Recomputed from current prices on every call.
    pub fn total_for(&self, inventory: &Inventory, customer_id: CustomerId) -> Result<Decimal, StoreError> {
        match self.carts.get(&customer_id).map(|c| Arc::clone(c.value())) {
            Some(cart) => cart.lock().amount(inventory),
            None => Ok(Decimal::ZERO),
        }
    }

    pub fn line_count(&self, customer_id: CustomerId) -> usize {
        self.carts
            .get(&customer_id)
            .map(|c| Arc::clone(c.value()))
            .map(|cart| cart.lock().lines.len())
            .unwrap_or(0)
    }

    /// Drops ownership records for lines consumed by checkout.
    pub(crate) fn forget_lines(&self, line_ids: &[CartLineId]) {
        for id in line_ids {
            self.owners.remove(id);
        }
    }

    /// Deletes every line referencing the product. Returns the number removed.
    pub(crate) fn purge_product(&self, product_id: ProductId) -> usize {
        let carts: Vec<Arc<Cart>> = self.carts.iter().map(|c| Arc::clone(c.value())).collect();
        let mut removed = Vec::new();
        for cart in carts {
            let mut data = cart.lock();
            data.lines.retain(|line| {
                let keep = line.product_id != Some(product_id);
                if !keep {
                    removed.push(line.id);
                }
                keep
            });
        }
        self.forget_lines(&removed);
        removed.len()
    }

    /// Deletes a customer's cart and all its lines.
    pub(crate) fn remove_cart(&self, customer_id: CustomerId) -> usize {
        let Some((_, cart)) = self.carts.remove(&customer_id) else {
            return 0;
        };
        let ids: Vec<CartLineId> = cart.lock().lines.iter().map(|line| line.id).collect();
        self.forget_lines(&ids);
        ids.len()
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}
