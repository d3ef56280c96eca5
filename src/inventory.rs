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

//! The inventory ledger: catalog storage and atomic stock reservation.

use crate::base::ProductId;
use crate::config::StockPolicy;
use crate::error::{Entity, StoreError};
use crate::product::{Product, ProductData, ProductDraft, ProductSnapshot};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

#[derive(Debug)]
pub struct Inventory {
    /// Products indexed by ID.
    products: DashMap<ProductId, Arc<Product>>,
    next_id: AtomicU32,
}

impl Inventory {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Validates the draft and adds it to the catalog.
    pub fn add_product(&self, draft: ProductDraft) -> Result<ProductId, StoreError> {
        draft.validate()?;
        let id = ProductId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.products.insert(id, Arc::new(Product::new(id, draft)));
        Ok(id)
    }

    /// Replaces every editable field of a product, including its stock count.
    ///
    /// Existing cart lines are not re-checked against the new stock.
    pub fn update_product(&self, id: ProductId, draft: ProductDraft) -> Result<(), StoreError> {
        draft.validate()?;
        let product = self.require(id)?;
        product.lock().replace(draft);
        Ok(())
    }

    /// Removes a product from the catalog, returning it.
    pub fn remove_product(&self, id: ProductId) -> Result<Arc<Product>, StoreError> {
        self.products
            .remove(&id)
            .map(|(_, product)| product)
            .ok_or(StoreError::NotFound(Entity::Product))
    }

    /// Returns a handle to the product.
    ///
    /// The map guard is dropped before returning, so callers may lock the
    /// product without holding a shard lock.
    pub fn get(&self, id: ProductId) -> Option<Arc<Product>> {
        self.products.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn require(&self, id: ProductId) -> Result<Arc<Product>, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(Entity::Product))
    }

    pub fn stock(&self, id: ProductId) -> Result<u32, StoreError> {
        Ok(self.require(id)?.stock())
    }

    /// Takes stock under `policy` and returns the units actually taken.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] - Unknown product.
    /// - [`StoreError::OutOfStock`] - Strict policy and stock is zero.
    /// - [`StoreError::StockExceeded`] - Strict policy and stock is positive
    ///   but below `quantity`.
    pub fn reserve(&self, id: ProductId, quantity: u32, policy: StockPolicy) -> Result<u32, StoreError> {
        take_stock(&mut self.require(id)?.lock(), quantity, policy)
    }

    /// Returns units to stock. Returns `false` if the product no longer exists.
    pub fn release(&self, id: ProductId, quantity: u32) -> bool {
        match self.get(id) {
            Some(product) => {
                product.lock().release(quantity);
                true
            }
            None => {
                warn!(product = %id, quantity, "release skipped, product was deleted");
                false
            }
        }
    }

    /// Snapshots of every product, ordered by ID.
    pub fn list(&self) -> Vec<ProductSnapshot> {
        let handles: Vec<Arc<Product>> = self
            .products
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut snapshots: Vec<ProductSnapshot> = handles.iter().map(|p| p.snapshot()).collect();
        snapshots.sort_by_key(|p| p.id);
        snapshots
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Takes stock from an already locked product.
///
/// `Strict` decrements by exactly `quantity` or fails. `Clamp` decrements as
/// far as it can, flooring at zero.
pub(crate) fn take_stock(data: &mut ProductData, quantity: u32, policy: StockPolicy) -> Result<u32, StoreError> {
    match policy {
        StockPolicy::Strict => data.reserve(quantity),
        StockPolicy::Clamp => Ok(data.reserve_clamped(quantity)),
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}
