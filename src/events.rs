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

//! Audit trail of committed state changes.

use crate::base::{CustomerId, OrderId, ProductId};
use crate::order::{OrderStatus, PaymentTag};
use crossbeam::queue::SegQueue;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    OrderPlaced {
        order_id: OrderId,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Decimal,
        payment: PaymentTag,
    },
    OrderStatusChanged {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        by: CustomerId,
    },
    StockReleased {
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    },
    ProductDeleted {
        product_id: ProductId,
        cart_lines_removed: usize,
    },
    CustomerDeleted {
        customer_id: CustomerId,
        cart_lines_removed: usize,
    },
}

/// Lock-free FIFO of events waiting to be collected.
#[derive(Debug)]
pub struct EventLog {
    events: SegQueue<StoreEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: SegQueue::new(),
        }
    }

    pub fn record(&self, event: StoreEvent) {
        self.events.push(event);
    }

    /// Removes and returns every pending event, oldest first.
    pub fn drain(&self) -> Vec<StoreEvent> {
        std::iter::from_fn(|| self.events.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
