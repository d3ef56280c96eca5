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

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use storefront_ledger::{Category, CustomerId, NewCustomer, ProductDraft, ProductId, Profile, Store, StoreConfig};

/// A store with one admin and a number of shoppers with complete profiles.
pub struct Shop {
    pub store: Store,
    pub admin: Option<CustomerId>,
    pub shoppers: Vec<Option<CustomerId>>,
}

pub fn new_customer(name: &str) -> NewCustomer {
    NewCustomer {
        email: format!("{name}@example.com"),
        username: name.to_string(),
        address: format!("{} Market Street", name.len()),
        password: "secret123".to_string(),
    }
}

pub fn complete_profile() -> Profile {
    Profile {
        address: Some("12 Market Street".to_string()),
        phone: Some("555-0100".to_string()),
        sex: Some("F".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2),
        profile_picture: None,
    }
}

pub fn shop(config: StoreConfig, shoppers: usize) -> Shop {
    let store = Store::with_config(config);
    let admin = store.register(new_customer("admin")).unwrap();
    store.bootstrap_admin(admin).unwrap();
    store.update_profile(Some(admin), complete_profile()).unwrap();

    let shoppers = (0..shoppers)
        .map(|i| {
            let id = store.register(new_customer(&format!("shopper{i}"))).unwrap();
            store.update_profile(Some(id), complete_profile()).unwrap();
            Some(id)
        })
        .collect();

    Shop {
        store,
        admin: Some(admin),
        shoppers,
    }
}

impl Shop {
    pub fn product(&self, name: &str, price: Decimal, stock: u32) -> ProductId {
        self.store
            .add_product(self.admin, ProductDraft::new(name, price, stock, Category::Gaming))
            .unwrap()
    }

    pub fn restock(&self, product: ProductId, stock: u32) {
        let current = self.store.product(product).unwrap();
        self.store
            .update_product(
                self.admin,
                product,
                ProductDraft::new(current.name, current.current_price, stock, current.category),
            )
            .unwrap();
    }
}
