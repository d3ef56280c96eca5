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

//! Store configuration.

use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How checkout reserves stock for an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StockPolicy {
    /// Decrement only if enough stock remains; otherwise the checkout fails.
    #[default]
    Strict,
    /// Decrement as far as possible, flooring at zero. Checkout never fails
    /// for lack of stock.
    Clamp,
}

/// Tunables shared by every operation on a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub stock_policy: StockPolicy,
    /// Flat shipping charge added to every review.
    pub shipping_fee: Decimal,
    /// Label shown on reviews. Payment is not collected by the store.
    pub payment_mode: String,
}

impl StoreConfig {
    pub const DEFAULT_PAYMENT_MODE: &'static str = "Cash on Delivery";

    pub fn with_stock_policy(mut self, policy: StockPolicy) -> Self {
        self.stock_policy = policy;
        self
    }

    pub fn with_shipping_fee(mut self, fee: Decimal) -> Self {
        self.shipping_fee = fee;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stock_policy: StockPolicy::Strict,
            shipping_fee: Decimal::ZERO,
            payment_mode: Self::DEFAULT_PAYMENT_MODE.to_string(),
        }
    }
}
