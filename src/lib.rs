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

//! # Storefront Ledger
//!
//! This library provides the order lifecycle engine of a small storefront:
//! customers fill a cart, check out selected lines (or buy a single product
//! directly), and follow their orders from `Pending` to `Received`, while the
//! engine keeps every product's stock count consistent.
//!
//! ## Core Components
//!
//! - [`Store`]: Central engine owning the catalog, accounts, carts and orders
//! - [`Inventory`]: Products and their stock, with atomic reserve and release
//! - [`CartStore`]: Per-customer carts that respect stock on every change
//! - [`OrderLedger`]: Placed orders and their status machine
//! - [`CheckoutRequest`]: Direct or cart checkout, reviewed then confirmed
//! - [`StoreError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use storefront_ledger::{Category, CheckoutRequest, NewCustomer, ProductDraft, Profile, Store};
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let store = Store::new();
//! let admin = store.register(NewCustomer {
//!     email: "admin@example.com".into(),
//!     username: "admin".into(),
//!     address: "1 Warehouse Road".into(),
//!     password: "secret123".into(),
//! }).unwrap();
//! store.bootstrap_admin(admin).unwrap();
//!
//! let phone = store
//!     .add_product(Some(admin), ProductDraft::new("Phone", dec!(299.00), 10, Category::Phone))
//!     .unwrap();
//!
//! // Checkout needs a complete profile.
//! store.update_profile(Some(admin), Profile {
//!     address: Some("1 Warehouse Road".into()),
//!     phone: Some("555-0100".into()),
//!     sex: Some("M".into()),
//!     date_of_birth: NaiveDate::from_ymd_opt(1985, 1, 1),
//!     profile_picture: None,
//! }).unwrap();
//!
//! let line = store.add_to_cart(Some(admin), phone).unwrap().line_id;
//! let receipt = store.confirm(Some(admin), &CheckoutRequest::Cart(vec![line])).unwrap();
//!
//! assert_eq!(receipt.amount, dec!(299.00));
//! assert_eq!(store.stock(phone), Ok(9));
//! assert_eq!(store.cart_count(Some(admin)), 0);
//! ```
//!
//! ## Thread Safety
//!
//! `Store` is `Send + Sync`. Each product, cart and order has its own lock,
//! so operations on different customers and products run in parallel.
//! Checkout locks the cart, then products by ascending id. A status change
//! locks the order's status, then, when it cancels, the order's product. No
//! operation waits for a status lock while holding a product lock.

mod base;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod customer;
pub mod error;
pub mod events;
pub mod inventory;
pub mod order;
pub mod product;
mod store;

pub use base::{Actor, CartLineId, CustomerId, OrderId, ProductId};
pub use cart::{CartEntry, CartLine, CartRemoval, CartStore, CartUpdate};
pub use checkout::{CheckoutRequest, Receipt, Review, ReviewItem};
pub use config::{StockPolicy, StoreConfig};
pub use customer::{Customer, CustomerSummary, Customers, NewCustomer, Profile};
pub use error::{Entity, StoreError};
pub use events::{EventLog, StoreEvent};
pub use inventory::Inventory;
pub use order::{Order, OrderLedger, OrderSnapshot, OrderStatus, PaymentTag};
pub use product::{Category, MAX_PRICE, Product, ProductDraft, ProductSnapshot};
pub use store::{CartView, Store};
