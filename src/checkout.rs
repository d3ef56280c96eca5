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

//! Turning cart lines, or a single product, into orders.
//!
//! Both flows go through a review (computed, never stored) and a confirm.
//! Confirm is all-or-nothing: it holds the caller's cart and every touched
//! product locked while it stages the order set, so either every order is
//! placed with its stock taken and its cart line consumed, or nothing changes.

use crate::base::{CartLineId, CustomerId, ProductId};
use crate::cart::{CartData, CartLine};
use crate::customer::Customer;
use crate::error::StoreError;
use crate::events::StoreEvent;
use crate::inventory::take_stock;
use crate::order::{NewOrder, Order, OrderSnapshot, PaymentTag};
use crate::product::{Product, ProductData, line_total, sum_amounts};
use crate::store::Store;
use parking_lot::MutexGuard;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What the customer wants to buy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutRequest {
    /// One unit of a product, bypassing the cart.
    Direct(ProductId),
    /// The selected lines of the caller's cart.
    Cart(Vec<CartLineId>),
}

impl CheckoutRequest {
    pub fn payment(&self) -> PaymentTag {
        match self {
            CheckoutRequest::Direct(_) => PaymentTag::Direct,
            CheckoutRequest::Cart(_) => PaymentTag::Cart,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    /// `None` for a direct order.
    pub cart_line_id: Option<CartLineId>,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
    pub picture: Option<String>,
}

/// The order summary shown before confirming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub items: Vec<ReviewItem>,
    pub amount: Decimal,
    pub shipping: Decimal,
    pub total_with_shipping: Decimal,
    pub payment_mode: String,
    pub customer_address: Option<String>,
    pub direct_product: Option<ProductId>,
}

/// Orders placed by a successful confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub orders: Vec<OrderSnapshot>,
    pub amount: Decimal,
    pub shipping: Decimal,
    pub total_with_shipping: Decimal,
}

/// A selected cart line resolved to a live product.
struct Staged {
    line: CartLine,
    product_id: ProductId,
}

/// Orders created by a confirm, with totals checked before any stock moved.
struct Placed {
    orders: Vec<Arc<Order>>,
    amount: Decimal,
    total_with_shipping: Decimal,
}

impl Store {
    /// Computes the order summary for a request without changing anything.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unauthenticated`] - No session.
    /// - [`StoreError::IncompleteProfile`] - Sex, birth date or phone missing.
    /// - [`StoreError::NotFound`] - Direct order for an unknown product.
    /// - [`StoreError::ValidationFailed`] - Nothing selected, or none of the
    ///   selected lines are in the caller's cart.
    /// - [`StoreError::TransactionFailed`] - A selected line's product is gone.
    pub fn review(&self, session: Option<CustomerId>, request: &CheckoutRequest) -> Result<Review, StoreError> {
        let _gate = self.gate.read();
        let customer = self.checkout_customer(session)?;

        let (items, direct_product) = match request {
            CheckoutRequest::Direct(product_id) => {
                let product = self.inventory.require(*product_id)?;
                let data = product.lock();
                (vec![review_item(None, *product_id, &data, 1)?], Some(*product_id))
            }
            CheckoutRequest::Cart(selection) => {
                let cart = self.carts.cart_for(customer.id());
                let cart_data = cart.lock();
                let mut items = Vec::new();
                for staged in self.stage(&cart_data, selection)? {
                    let product = self
                        .inventory
                        .get(staged.product_id)
                        .ok_or(StoreError::TransactionFailed)?;
                    let data = product.lock();
                    items.push(review_item(
                        Some(staged.line.id),
                        staged.product_id,
                        &data,
                        staged.line.quantity,
                    )?);
                }
                (items, None)
            }
        };

        let (amount, total_with_shipping) = self.totals(items.iter().map(|item| item.subtotal))?;
        Ok(Review {
            items,
            amount,
            shipping: self.config.shipping_fee,
            total_with_shipping,
            payment_mode: self.config.payment_mode.clone(),
            customer_address: customer.address().map(str::to_owned),
            direct_product,
        })
    }

    /// Places the orders described by `request`.
    ///
    /// # Errors
    ///
    /// Everything [`Store::review`] reports, plus under
    /// [`StockPolicy::Strict`](crate::StockPolicy::Strict):
    ///
    /// - [`StoreError::OutOfStock`] - A product has no stock left.
    /// - [`StoreError::StockExceeded`] - A line asks for more than remains.
    ///
    /// On any error no order is placed, no stock moves and the cart is left
    /// as it was.
    pub fn confirm(&self, session: Option<CustomerId>, request: &CheckoutRequest) -> Result<Receipt, StoreError> {
        let _gate = self.gate.read();
        let customer = self.checkout_customer(session)?;

        let placed = match request {
            CheckoutRequest::Direct(product_id) => self.confirm_direct(customer.id(), *product_id),
            CheckoutRequest::Cart(selection) => self.confirm_cart(customer.id(), selection),
        }
        .inspect_err(|e| debug!(customer = %customer.id(), error = %e, "checkout refused"))?;

        let orders: Vec<OrderSnapshot> = placed.orders.iter().map(|order| order.snapshot()).collect();
        info!(
            customer = %customer.id(),
            payment = %request.payment(),
            orders = orders.len(),
            amount = %placed.amount,
            "checkout confirmed"
        );
        Ok(Receipt {
            orders,
            amount: placed.amount,
            shipping: self.config.shipping_fee,
            total_with_shipping: placed.total_with_shipping,
        })
    }

    /// Sums line subtotals and adds shipping.
    fn totals(&self, subtotals: impl IntoIterator<Item = Decimal>) -> Result<(Decimal, Decimal), StoreError> {
        let amount = sum_amounts(subtotals)?;
        let total_with_shipping = sum_amounts([amount, self.config.shipping_fee])?;
        Ok((amount, total_with_shipping))
    }

    /// Adds an order to the ledger. `OrderPlaced` is recorded before the order
    /// is listed, so it precedes any event about the order.
    fn place(&self, new: NewOrder) -> Arc<Order> {
        self.orders.create(new, |order| {
            self.events.record(StoreEvent::OrderPlaced {
                order_id: order.id(),
                customer_id: order.customer_id(),
                product_id: order.product_id(),
                quantity: order.quantity(),
                unit_price: order.unit_price(),
                payment: order.payment(),
            })
        })
    }

    fn checkout_customer(&self, session: Option<CustomerId>) -> Result<Customer, StoreError> {
        let id = self.customer(session)?;
        let customer = self.customers.get(id).ok_or(StoreError::Unauthenticated)?;
        if !customer.is_profile_complete() {
            return Err(StoreError::IncompleteProfile);
        }
        Ok(customer)
    }

    fn confirm_direct(&self, customer_id: CustomerId, product_id: ProductId) -> Result<Placed, StoreError> {
        let product = self.inventory.require(product_id)?;
        let mut data = product.lock();
        let total = line_total(data.current_price, 1)?;
        let (amount, total_with_shipping) = self.totals([total])?;
        let reserved = take_stock(&mut data, 1, self.config.stock_policy)?;
        let order = self.place(new_order(
            customer_id,
            product_id,
            &data,
            1,
            total,
            reserved,
            PaymentTag::Direct,
        ));
        Ok(Placed {
            orders: vec![order],
            amount,
            total_with_shipping,
        })
    }

    fn confirm_cart(&self, customer_id: CustomerId, selection: &[CartLineId]) -> Result<Placed, StoreError> {
        let cart = self.carts.cart_for(customer_id);
        let mut cart_data = cart.lock();
        let staged = self.stage(&cart_data, selection)?;

        let mut products: BTreeMap<ProductId, Arc<Product>> = BTreeMap::new();
        for item in &staged {
            let product = self
                .inventory
                .get(item.product_id)
                .ok_or(StoreError::TransactionFailed)?;
            products.insert(item.product_id, product);
        }
        // BTreeMap iteration is ascending, which is the product lock order.
        let mut guards: BTreeMap<ProductId, MutexGuard<'_, ProductData>> = products
            .iter()
            .map(|(id, product)| (*id, product.lock()))
            .collect();

        let subtotals = staged
            .iter()
            .map(|item| {
                let data = guards.get(&item.product_id).ok_or(StoreError::TransactionFailed)?;
                line_total(data.current_price, item.line.quantity)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (amount, total_with_shipping) = self.totals(subtotals.iter().copied())?;

        let reserved = self.reserve_all(&mut guards, &staged)?;

        let mut orders = Vec::with_capacity(staged.len());
        let mut consumed = Vec::with_capacity(staged.len());
        for ((item, reserved), total) in staged.iter().zip(reserved).zip(subtotals) {
            let data = guards.get(&item.product_id).ok_or(StoreError::TransactionFailed)?;
            orders.push(self.place(new_order(
                customer_id,
                item.product_id,
                data,
                item.line.quantity,
                total,
                reserved,
                PaymentTag::Cart,
            )));
            cart_data.remove_line(item.line.id);
            consumed.push(item.line.id);
        }
        self.carts.forget_lines(&consumed);
        Ok(Placed {
            orders,
            amount,
            total_with_shipping,
        })
    }

    /// Resolves the selection against the caller's own cart. Lines that are
    /// not in the cart are skipped.
    fn stage(&self, cart: &CartData, selection: &[CartLineId]) -> Result<Vec<Staged>, StoreError> {
        if selection.is_empty() {
            return Err(StoreError::invalid("no items selected"));
        }
        let lines: Vec<&CartLine> = cart
            .lines()
            .iter()
            .filter(|line| selection.contains(&line.id))
            .collect();
        if lines.is_empty() {
            return Err(StoreError::invalid("none of the selected items are in the cart"));
        }

        lines
            .into_iter()
            .map(|line| {
                let product_id = line
                    .product_id
                    .filter(|id| self.inventory.get(*id).is_some())
                    .ok_or(StoreError::TransactionFailed)?;
                Ok(Staged {
                    line: line.clone(),
                    product_id,
                })
            })
            .collect()
    }

    /// Takes stock for every staged line, or for none of them.
    fn reserve_all(
        &self,
        guards: &mut BTreeMap<ProductId, MutexGuard<'_, ProductData>>,
        staged: &[Staged],
    ) -> Result<Vec<u32>, StoreError> {
        let mut reserved = Vec::with_capacity(staged.len());
        for item in staged {
            let result = match guards.get_mut(&item.product_id) {
                Some(data) => take_stock(data, item.line.quantity, self.config.stock_policy),
                None => Err(StoreError::TransactionFailed),
            };
            match result {
                Ok(taken) => reserved.push(taken),
                Err(error) => {
                    for (undo, taken) in staged.iter().zip(&reserved) {
                        if let Some(data) = guards.get_mut(&undo.product_id) {
                            data.release(*taken);
                        }
                    }
                    return Err(error);
                }
            }
        }
        Ok(reserved)
    }
}

fn review_item(
    line: Option<CartLineId>,
    product_id: ProductId,
    data: &ProductData,
    quantity: u32,
) -> Result<ReviewItem, StoreError> {
    Ok(ReviewItem {
        cart_line_id: line,
        product_id,
        name: data.name.clone(),
        unit_price: data.current_price,
        quantity,
        subtotal: line_total(data.current_price, quantity)?,
        picture: data.picture.clone(),
    })
}

fn new_order(
    customer_id: CustomerId,
    product_id: ProductId,
    data: &ProductData,
    quantity: u32,
    total: Decimal,
    reserved: u32,
    payment: PaymentTag,
) -> NewOrder {
    NewOrder {
        customer_id,
        product_id,
        product_name: data.name.clone(),
        product_picture: data.picture.clone(),
        quantity,
        unit_price: data.current_price,
        total,
        reserved,
        payment,
    }
}
