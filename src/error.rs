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

//! Error types for storefront operations.

use std::fmt;
use thiserror::Error;

/// The kind of record a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Product,
    CartLine,
    Order,
    Customer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Product => "product",
            Entity::CartLine => "cart line",
            Entity::Order => "order",
            Entity::Customer => "customer",
        };
        f.write_str(name)
    }
}

/// Storefront operation errors.
///
/// Every error is local to the request that produced it; none of them leave
/// the store in a partially applied state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No customer identity was supplied
    #[error("authentication required")]
    Unauthenticated,

    /// Caller does not own the record, is not an administrator, or asked for a
    /// status transition they are not allowed to make
    #[error("action not permitted")]
    Forbidden,

    /// Referenced ID does not exist
    #[error("{0} not found")]
    NotFound(Entity),

    /// Product has no stock left
    #[error("item is out of stock")]
    OutOfStock,

    /// Requested quantity would exceed the product's stock
    #[error("only {max} item(s) in stock")]
    StockExceeded { quantity: u32, max: u32 },

    /// Order has already been canceled
    #[error("order is already canceled")]
    AlreadyCanceled,

    /// Sex, date of birth or phone number is missing from the profile
    #[error("profile must be completed before placing an order")]
    IncompleteProfile,

    /// Malformed input
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A multi-step mutation was rolled back
    #[error("order failed")]
    TransactionFailed,
}

impl StoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        StoreError::ValidationFailed(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, StoreError};

    #[test]
    fn error_display_messages() {
        assert_eq!(StoreError::Unauthenticated.to_string(), "authentication required");
        assert_eq!(StoreError::Forbidden.to_string(), "action not permitted");
        assert_eq!(
            StoreError::NotFound(Entity::CartLine).to_string(),
            "cart line not found"
        );
        assert_eq!(StoreError::OutOfStock.to_string(), "item is out of stock");
        assert_eq!(
            StoreError::StockExceeded { quantity: 3, max: 3 }.to_string(),
            "only 3 item(s) in stock"
        );
        assert_eq!(
            StoreError::AlreadyCanceled.to_string(),
            "order is already canceled"
        );
        assert_eq!(
            StoreError::IncompleteProfile.to_string(),
            "profile must be completed before placing an order"
        );
        assert_eq!(
            StoreError::invalid("no items selected").to_string(),
            "validation failed: no items selected"
        );
        assert_eq!(StoreError::TransactionFailed.to_string(), "order failed");
    }

    #[test]
    fn errors_are_cloneable() {
        let error = StoreError::StockExceeded { quantity: 2, max: 2 };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
