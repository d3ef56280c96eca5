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

//! Catalog products and their stock counters.
//!
//! Every stock change happens under the product's own lock, so a stock check
//! and the decrement that follows it are a single atomic step.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use storefront_ledger::{Category, Product, ProductDraft, ProductId};
//!
//! let draft = ProductDraft::new("Pixel 8", dec!(599.00), 5, Category::Phone);
//! let product = Product::new(ProductId(1), draft);
//! assert_eq!(product.stock(), 5);
//! ```

use crate::base::ProductId;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storefront departments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Phone,
    Accessories,
    Watch,
    Laptop,
    Gaming,
    Television,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Phone,
        Category::Accessories,
        Category::Watch,
        Category::Laptop,
        Category::Gaming,
        Category::Television,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Phone => "Phone",
            Category::Accessories => "Accessories",
            Category::Watch => "Watch",
            Category::Laptop => "Laptop",
            Category::Gaming => "Gaming",
            Category::Television => "Television",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StoreError::invalid(format!("unknown category '{}'", s.trim())))
    }
}

/// Admin input for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub current_price: Decimal,
    pub previous_price: Option<Decimal>,
    pub stock: u32,
    pub category: Category,
    #[serde(default)]
    pub flash_sale: bool,
    #[serde(default)]
    pub picture: Option<String>,
}

impl ProductDraft {
    pub fn new(name: impl Into<String>, current_price: Decimal, stock: u32, category: Category) -> Self {
        Self {
            name: name.into(),
            current_price,
            previous_price: None,
            stock,
            category,
            flash_sale: false,
            picture: None,
        }
    }

    pub fn with_previous_price(mut self, price: Decimal) -> Self {
        self.previous_price = Some(price);
        self
    }

    pub fn with_picture(mut self, url: impl Into<String>) -> Self {
        self.picture = Some(url.into());
        self
    }

    pub fn on_flash_sale(mut self) -> Self {
        self.flash_sale = true;
        self
    }

    /// Rejects blank names and prices outside `0..=MAX_PRICE`.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("product name is required"));
        }
        if !(Decimal::ZERO..=MAX_PRICE).contains(&self.current_price) {
            return Err(StoreError::invalid("current price is out of range"));
        }
        if self
            .previous_price
            .is_some_and(|p| !(Decimal::ZERO..=MAX_PRICE).contains(&p))
        {
            return Err(StoreError::invalid("previous price is out of range"));
        }
        Ok(())
    }
}

/// Highest price the catalog accepts.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// `price * quantity`.
///
/// # Errors
///
/// [`StoreError::ValidationFailed`] if the result leaves the decimal range.
pub(crate) fn line_total(price: Decimal, quantity: u32) -> Result<Decimal, StoreError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(amount_out_of_range)
}

/// Checked sum of money amounts.
pub(crate) fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, StoreError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(amount).ok_or_else(amount_out_of_range))
}

fn amount_out_of_range() -> StoreError {
    StoreError::invalid("amount is out of range")
}

/// Point-in-time copy of a product, safe to hand to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub current_price: Decimal,
    pub previous_price: Option<Decimal>,
    pub stock: u32,
    pub category: Category,
    pub flash_sale: bool,
    pub picture: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ProductData {
    pub(crate) name: String,
    pub(crate) current_price: Decimal,
    pub(crate) previous_price: Option<Decimal>,
    pub(crate) stock: u32,
    pub(crate) category: Category,
    pub(crate) flash_sale: bool,
    pub(crate) picture: Option<String>,
}

impl ProductData {
    fn from_draft(draft: ProductDraft) -> Self {
        Self {
            name: draft.name.trim().to_string(),
            current_price: draft.current_price,
            previous_price: draft.previous_price,
            stock: draft.stock,
            category: draft.category,
            flash_sale: draft.flash_sale,
            picture: draft.picture,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.current_price >= Decimal::ZERO,
            "Invariant violated: current price went negative: {}",
            self.current_price
        );
    }

    /// Takes exactly `quantity` units or nothing.
    pub(crate) fn reserve(&mut self, quantity: u32) -> Result<u32, StoreError> {
        if quantity == 0 {
            return Err(StoreError::invalid("quantity must be positive"));
        }
        if self.stock == 0 {
            return Err(StoreError::OutOfStock);
        }
        if self.stock < quantity {
            return Err(StoreError::StockExceeded {
                quantity,
                max: self.stock,
            });
        }
        self.stock -= quantity;
        self.assert_invariants();
        Ok(quantity)
    }

    /// Takes up to `quantity` units, flooring stock at zero. Returns the
    /// number of units actually taken.
    pub(crate) fn reserve_clamped(&mut self, quantity: u32) -> u32 {
        let taken = quantity.min(self.stock);
        self.stock -= taken;
        self.assert_invariants();
        taken
    }

    /// Returns units to stock. There is no upper bound.
    pub(crate) fn release(&mut self, quantity: u32) {
        self.stock = self.stock.saturating_add(quantity);
        self.assert_invariants();
    }

    pub(crate) fn replace(&mut self, draft: ProductDraft) {
        *self = Self::from_draft(draft);
        self.assert_invariants();
    }
}

/// Catalog product.
#[derive(Debug)]
pub struct Product {
    id: ProductId,
    date_added: DateTime<Utc>,
    inner: Mutex<ProductData>,
}

impl Product {
    pub fn new(id: ProductId, draft: ProductDraft) -> Self {
        Self {
            id,
            date_added: Utc::now(),
            inner: Mutex::new(ProductData::from_draft(draft)),
        }
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn date_added(&self) -> DateTime<Utc> {
        self.date_added
    }

    pub fn stock(&self) -> u32 {
        self.inner.lock().stock
    }

    pub fn current_price(&self) -> Decimal {
        self.inner.lock().current_price
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn snapshot(&self) -> ProductSnapshot {
        let data = self.inner.lock();
        self.snapshot_from(&data)
    }

    pub(crate) fn snapshot_from(&self, data: &ProductData) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            name: data.name.clone(),
            current_price: data.current_price,
            previous_price: data.previous_price,
            stock: data.stock,
            category: data.category,
            flash_sale: data.flash_sale,
            picture: data.picture.clone(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProductData> {
        self.inner.lock()
    }
}
