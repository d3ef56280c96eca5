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

//! Benchmarks for the storefront engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded cart mutations
//! - Direct and cart checkouts
//! - Multi-threaded checkouts on one hot product and on disjoint products
//! - Scaling with number of threads
//!
//! Account setup hashes passwords, so every benchmark builds its store once
//! and reuses it across iterations.

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;
use storefront_ledger::{
    Category, CheckoutRequest, CustomerId, NewCustomer, ProductDraft, ProductId, Profile, Store,
};

// =============================================================================
// Helper Functions
// =============================================================================

const PLENTY: u32 = u32::MAX / 2;

struct Bench {
    store: Store,
    admin: Option<CustomerId>,
    shoppers: Vec<Option<CustomerId>>,
}

fn setup(shoppers: usize) -> Bench {
    let store = Store::new();
    let register = |name: String| {
        let id = store
            .register(NewCustomer {
                email: format!("{name}@example.com"),
                username: name,
                address: "12 Market Street".to_string(),
                password: "secret123".to_string(),
            })
            .unwrap();
        store
            .update_profile(
                Some(id),
                Profile {
                    address: Some("12 Market Street".to_string()),
                    phone: Some("555-0100".to_string()),
                    sex: Some("F".to_string()),
                    date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2),
                    profile_picture: None,
                },
            )
            .unwrap();
        id
    };

    let admin = register("admin".to_string());
    store.bootstrap_admin(admin).unwrap();
    let shoppers = (0..shoppers).map(|i| Some(register(format!("shopper{i}")))).collect();

    Bench {
        store,
        admin: Some(admin),
        shoppers,
    }
}

impl Bench {
    fn products(&self, count: usize) -> Vec<ProductId> {
        (0..count)
            .map(|i| {
                self.store
                    .add_product(
                        self.admin,
                        ProductDraft::new(format!("Item {i}"), Decimal::new(999, 2), PLENTY, Category::Gaming),
                    )
                    .unwrap()
            })
            .collect()
    }

    /// Direct order immediately canceled, so stock stays level.
    fn order_and_cancel(&self, shopper: Option<CustomerId>, product: ProductId) {
        let receipt = self
            .store
            .confirm(shopper, &CheckoutRequest::Direct(product))
            .unwrap();
        self.store.cancel_order(shopper, receipt.orders[0].id).unwrap();
    }
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_cart_add_remove(c: &mut Criterion) {
    let bench = setup(1);
    let product = bench.products(1)[0];
    let shopper = bench.shoppers[0];

    c.bench_function("cart_add_remove", |b| {
        b.iter(|| {
            let line = bench.store.add_to_cart(shopper, black_box(product)).unwrap().line_id;
            bench.store.remove_line(shopper, line).unwrap();
        })
    });
}

fn bench_cart_increment_decrement(c: &mut Criterion) {
    let bench = setup(1);
    let product = bench.products(1)[0];
    let shopper = bench.shoppers[0];
    let line = bench.store.add_to_cart(shopper, product).unwrap().line_id;

    c.bench_function("cart_increment_decrement", |b| {
        b.iter(|| {
            bench.store.increment_line(shopper, black_box(line)).unwrap();
            bench.store.decrement_line(shopper, black_box(line)).unwrap();
        })
    });
}

fn bench_cart_checkout(c: &mut Criterion) {
    let mut group = c.benchmark_group("cart_checkout");
    group.sample_size(30).measurement_time(Duration::from_secs(3));
    let bench = setup(1);
    let shopper = bench.shoppers[0];

    for lines in [1usize, 5, 20].iter() {
        let products = bench.products(*lines);
        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &products, |b, products| {
            b.iter(|| {
                let selection = products
                    .iter()
                    .map(|p| bench.store.add_to_cart(shopper, *p).unwrap().line_id)
                    .collect();
                let receipt = bench
                    .store
                    .confirm(shopper, &CheckoutRequest::Cart(selection))
                    .unwrap();
                black_box(receipt);
            })
        });
    }
    group.finish();
}

fn bench_direct_order_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_order");
    group.sample_size(30).measurement_time(Duration::from_secs(3));
    let bench = setup(1);
    let product = bench.products(1)[0];

    group.bench_function("confirm_cancel", |b| {
        b.iter(|| bench.order_and_cancel(bench.shoppers[0], black_box(product)))
    });
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_orders_hot_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_orders_hot_product");
    group.sample_size(20).measurement_time(Duration::from_secs(3));
    let bench = setup(8);
    let product = bench.products(1)[0];

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                (0..count).into_par_iter().for_each(|i| {
                    bench.order_and_cancel(bench.shoppers[i % bench.shoppers.len()], product);
                });
            })
        });
    }
    group.finish();
}

fn bench_parallel_orders_disjoint_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_orders_disjoint_products");
    group.sample_size(20).measurement_time(Duration::from_secs(3));
    let bench = setup(8);
    let products = bench.products(8);

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                (0..count).into_par_iter().for_each(|i| {
                    let slot = i % bench.shoppers.len();
                    bench.order_and_cancel(bench.shoppers[slot], products[slot]);
                });
            })
        });
    }
    group.finish();
}

// =============================================================================
// Scaling Benchmarks
// =============================================================================

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.sample_size(20).measurement_time(Duration::from_secs(3));
    let bench = setup(8);
    let products = bench.products(8);
    let total_orders = 1_000usize;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_orders as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                // Configure rayon thread pool for this benchmark
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    pool.install(|| {
                        (0..total_orders).into_par_iter().for_each(|i| {
                            let slot = i % bench.shoppers.len();
                            bench.order_and_cancel(bench.shoppers[slot], products[(i / 8) % products.len()]);
                        });
                    });
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_cart_add_remove,
    bench_cart_increment_decrement,
    bench_cart_checkout,
    bench_direct_order_cancel,
);

criterion_group!(
    multi_threaded,
    bench_parallel_orders_hot_product,
    bench_parallel_orders_disjoint_products,
    bench_thread_scaling,
);

criterion_main!(single_threaded, multi_threaded);
