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

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use storefront_ledger::{
    CartLineId, Category, CheckoutRequest, CustomerId, NewCustomer, OrderId, OrderStatus, ProductDraft, ProductId,
    Profile, StockPolicy, Store, StoreConfig, StoreError,
};
use tracing::{debug, info, warn};

/// Storefront replay - run a day of storefront activity from CSV files
///
/// Loads a product catalog and customer accounts, replays customer and admin
/// commands against the store, then writes either every order or the final
/// stock levels to stdout as CSV.
#[derive(Parser, Debug)]
#[command(name = "storefront-ledger")]
#[command(about = "Replays storefront commands and reports orders or stock", long_about = None)]
struct Args {
    /// Path to CSV file with storefront commands
    ///
    /// Expected format: customer,command,target,value
    /// Example: cargo run -- --catalog products.csv --customers customers.csv commands.csv > orders.csv
    #[arg(value_name = "FILE")]
    commands: PathBuf,

    /// Product catalog: name,price,previous_price,stock,category,flash_sale,picture
    #[arg(long, value_name = "FILE")]
    catalog: PathBuf,

    /// Customer accounts: email,username,address,password,phone,sex,date_of_birth,admin
    #[arg(long, value_name = "FILE")]
    customers: PathBuf,

    /// How checkout takes stock
    #[arg(long, env = "STOREFRONT_STOCK_POLICY", value_enum, default_value_t = StockPolicy::Strict)]
    stock_policy: StockPolicy,

    /// Flat shipping charge added to every review
    #[arg(long, env = "STOREFRONT_SHIPPING_FEE", default_value = "0")]
    shipping_fee: Decimal,

    /// What to write to stdout once the commands are replayed
    #[arg(long, value_enum, default_value_t = Report::Orders)]
    report: Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Orders,
    Stock,
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("cannot open '{path}': {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("customer row {row}: {source}")]
    Customer { row: usize, source: StoreError },
    #[error("the customer file must contain at least one admin account")]
    NoAdmin,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn main() {
    let args = Args::parse();
    setup_tracing();

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn setup_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run(args: &Args) -> Result<(), ReplayError> {
    let config = StoreConfig::default()
        .with_stock_policy(args.stock_policy)
        .with_shipping_fee(args.shipping_fee);
    let store = Store::with_config(config);

    let admin = load_customers(&store, open(&args.customers)?)?;
    load_catalog(&store, admin, open(&args.catalog)?)?;
    let applied = replay(&store, open(&args.commands)?)?;
    let events = drain_audit(&store);
    info!(applied, events, "replay finished");

    match args.report {
        Report::Orders => write_orders(&store, admin, std::io::stdout()),
        Report::Stock => write_stock(&store, std::io::stdout()),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ReplayError> {
    File::open(path).map(BufReader::new).map_err(|source| ReplayError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Account row. Accounts get ids in file order, starting at 1.
#[derive(Debug, Deserialize)]
struct CustomerRecord {
    email: String,
    username: String,
    address: String,
    password: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    admin: bool,
}

/// Registers every account and returns the first admin's id.
///
/// # Errors
///
/// Unlike commands, a bad account row stops the replay: later commands refer
/// to customers by position.
fn load_customers<R: Read>(store: &Store, input: R) -> Result<CustomerId, ReplayError> {
    let mut admin: Option<CustomerId> = None;

    for (index, result) in reader(input).deserialize::<CustomerRecord>().enumerate() {
        let row = index + 1;
        let record = result?;
        let id = store
            .register(NewCustomer {
                email: record.email,
                username: record.username,
                address: record.address.clone(),
                password: record.password,
            })
            .map_err(|source| ReplayError::Customer { row, source })?;
        store
            .update_profile(
                Some(id),
                Profile {
                    address: Some(record.address),
                    phone: record.phone,
                    sex: record.sex,
                    date_of_birth: record.date_of_birth,
                    profile_picture: None,
                },
            )
            .map_err(|source| ReplayError::Customer { row, source })?;

        if record.admin {
            let granted = match admin {
                None => store.bootstrap_admin(id),
                Some(existing) => store.grant_admin(Some(existing), id),
            };
            granted.map_err(|source| ReplayError::Customer { row, source })?;
            admin.get_or_insert(id);
        }
    }

    admin.ok_or(ReplayError::NoAdmin)
}

/// Catalog row. Products get ids in file order, starting at 1.
#[derive(Debug, Deserialize)]
struct ProductRecord {
    name: String,
    price: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    previous_price: Option<Decimal>,
    stock: u32,
    category: String,
    #[serde(default)]
    flash_sale: bool,
    #[serde(default)]
    picture: Option<String>,
}

impl ProductRecord {
    fn into_draft(self) -> Result<ProductDraft, StoreError> {
        let mut draft = ProductDraft::new(self.name, self.price, self.stock, self.category.parse::<Category>()?);
        if let Some(previous) = self.previous_price {
            draft = draft.with_previous_price(previous);
        }
        if let Some(picture) = self.picture.filter(|p| !p.is_empty()) {
            draft = draft.with_picture(picture);
        }
        if self.flash_sale {
            draft = draft.on_flash_sale();
        }
        Ok(draft)
    }
}

/// Adds every valid catalog row. Invalid rows are skipped with a warning.
fn load_catalog<R: Read>(store: &Store, admin: CustomerId, input: R) -> Result<usize, ReplayError> {
    let mut loaded = 0;
    for result in reader(input).deserialize::<ProductRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping malformed catalog row: {e}");
                continue;
            }
        };
        match record.into_draft().and_then(|draft| store.add_product(Some(admin), draft)) {
            Ok(_) => loaded += 1,
            Err(e) => warn!("skipping catalog row: {e}"),
        }
    }
    Ok(loaded)
}

/// Raw command row.
///
/// Fields: `customer, command, target, value`
#[derive(Debug, Deserialize)]
struct CommandRecord {
    customer: u32,
    command: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Add(ProductId),
    Plus(CartLineId),
    Minus(CartLineId),
    Remove(CartLineId),
    Checkout(CheckoutRequest),
    Cancel(OrderId),
    Received(OrderId),
    NotReceived(OrderId),
    Status(OrderId, OrderStatus),
    DeleteProduct(ProductId),
    DeleteCustomer(CustomerId),
}

impl CommandRecord {
    /// Converts the row to a command.
    ///
    /// Returns `None` for unknown commands or unparsable targets.
    fn into_command(self) -> Option<Command> {
        let id = || self.target.parse::<u32>().ok();
        let command = match self.command.to_lowercase().as_str() {
            "add" => Command::Add(ProductId(id()?)),
            "plus" => Command::Plus(CartLineId(id()?)),
            "minus" => Command::Minus(CartLineId(id()?)),
            "remove" => Command::Remove(CartLineId(id()?)),
            "direct" => Command::Checkout(CheckoutRequest::Direct(ProductId(id()?))),
            "checkout" => {
                let lines = self
                    .target
                    .split_whitespace()
                    .map(|line| line.parse().map(CartLineId))
                    .collect::<Result<Vec<_>, _>>()
                    .ok()?;
                Command::Checkout(CheckoutRequest::Cart(lines))
            }
            "cancel" => Command::Cancel(OrderId(id()?)),
            "received" => Command::Received(OrderId(id()?)),
            "not-received" => Command::NotReceived(OrderId(id()?)),
            "status" => Command::Status(OrderId(id()?), self.value.parse().ok()?),
            "delete-product" => Command::DeleteProduct(ProductId(id()?)),
            "delete-customer" => Command::DeleteCustomer(CustomerId(id()?)),
            _ => return None,
        };
        Some(command)
    }
}

fn apply(store: &Store, session: Option<CustomerId>, command: Command) -> Result<(), StoreError> {
    match command {
        Command::Add(product) => store.add_to_cart(session, product).map(drop),
        Command::Plus(line) => store.increment_line(session, line).map(drop),
        Command::Minus(line) => store.decrement_line(session, line).map(drop),
        Command::Remove(line) => store.remove_line(session, line).map(drop),
        Command::Checkout(request) => store.confirm(session, &request).map(drop),
        Command::Cancel(order) => store.cancel_order(session, order).map(drop),
        Command::Received(order) => store.confirm_received(session, order).map(drop),
        Command::NotReceived(order) => store.report_not_received(session, order).map(drop),
        Command::Status(order, status) => store.set_order_status(session, order, status).map(drop),
        Command::DeleteProduct(product) => store.delete_product(session, product).map(drop),
        Command::DeleteCustomer(customer) => store.delete_customer(session, customer),
    }
}

/// Replays commands in file order and returns how many succeeded.
///
/// Malformed rows and rejected commands are skipped; the store is never left
/// in a partial state by a rejected command.
///
/// # Example
///
/// ```csv
/// customer,command,target,value
/// 2,add,1,
/// 2,checkout,1,
/// 1,status,1,Accepted
/// ```
fn replay<R: Read>(store: &Store, input: R) -> Result<usize, ReplayError> {
    let mut applied = 0;
    for (index, result) in reader(input).deserialize::<CommandRecord>().enumerate() {
        let row = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(row, "skipping malformed row: {e}");
                continue;
            }
        };
        let session = Some(CustomerId(record.customer));
        let Some(command) = record.into_command() else {
            debug!(row, "skipping invalid command");
            continue;
        };
        match apply(store, session, command) {
            Ok(()) => applied += 1,
            Err(e) => debug!(row, "command rejected: {e}"),
        }
    }
    Ok(applied)
}

/// Empties the store's event log, logging each event at `debug`.
fn drain_audit(store: &Store) -> usize {
    let events = store.drain_events();
    for event in &events {
        debug!(?event, "audit");
    }
    events.len()
}

#[derive(Debug, Serialize)]
struct OrderRow {
    order: OrderId,
    customer: CustomerId,
    product: ProductId,
    product_name: String,
    quantity: u32,
    unit_price: Decimal,
    total: Decimal,
    payment: String,
    status: String,
}

/// Writes every order, oldest first.
///
/// # CSV Format
///
/// Columns: `order, customer, product, product_name, quantity, unit_price, total, payment, status`
fn write_orders<W: Write>(store: &Store, admin: CustomerId, writer: W) -> Result<(), ReplayError> {
    let mut wtr = Writer::from_writer(writer);
    for order in store.all_orders(Some(admin))? {
        wtr.serialize(OrderRow {
            order: order.id,
            customer: order.customer,
            product: order.product,
            product_name: order.product_name,
            quantity: order.quantity,
            unit_price: order.unit_price,
            total: order.total,
            payment: order.payment_id.to_string(),
            status: order.status.to_string(),
        })?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct StockRow {
    product: ProductId,
    name: String,
    stock: u32,
    price: Decimal,
}

/// Writes the remaining stock of every product.
///
/// # CSV Format
///
/// Columns: `product, name, stock, price`
fn write_stock<W: Write>(store: &Store, writer: W) -> Result<(), ReplayError> {
    let mut wtr = Writer::from_writer(writer);
    for product in store.products() {
        wtr.serialize(StockRow {
            product: product.id,
            name: product.name,
            stock: product.stock,
            price: product.current_price,
        })?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CUSTOMERS: &str = "email,username,address,password,phone,sex,date_of_birth,admin\n\
                             admin@example.com,admin,1 Warehouse Road,secret123,555-0100,M,1980-01-01,true\n\
                             alice@example.com,alice,12 Market Street,secret123,555-0101,F,1990-04-02,false\n\
                             bob@example.com,bob,3 Side Lane,secret123,,,,false\n";

    const CATALOG: &str = "name,price,previous_price,stock,category,flash_sale,picture\n\
                           Phone,300.00,350.00,2,phone,true,\n\
                           Case,15.00,,10,Accessories,false,case.png\n";

    fn setup() -> (Store, CustomerId) {
        let store = Store::new();
        let admin = load_customers(&store, Cursor::new(CUSTOMERS)).unwrap();
        let loaded = load_catalog(&store, admin, Cursor::new(CATALOG)).unwrap();
        assert_eq!(loaded, 2);
        (store, admin)
    }

    fn orders_csv(store: &Store, admin: CustomerId) -> String {
        let mut output = Vec::new();
        write_orders(store, admin, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn first_admin_row_becomes_admin() {
        let (store, admin) = setup();
        assert_eq!(admin, CustomerId(1));
        assert!(store.actor(Some(admin)).unwrap().is_admin());
        assert!(!store.actor(Some(CustomerId(2))).unwrap().is_admin());
    }

    #[test]
    fn customers_without_admin_are_rejected() {
        let store = Store::new();
        let csv = "email,username,address,password,phone,sex,date_of_birth,admin\n\
                   bob@example.com,bob,3 Side Lane,secret123,,,,false\n";
        assert!(matches!(
            load_customers(&store, Cursor::new(csv)),
            Err(ReplayError::NoAdmin)
        ));
    }

    #[test]
    fn catalog_skips_bad_rows() {
        let store = Store::new();
        let admin = load_customers(&store, Cursor::new(CUSTOMERS)).unwrap();
        let csv = "name,price,previous_price,stock,category,flash_sale,picture\n\
                   Phone,300.00,,2,Phone,false,\n\
                   Toaster,20.00,,2,Kitchen,false,\n\
                   ,5.00,,1,Watch,false,\n";
        assert_eq!(load_catalog(&store, admin, Cursor::new(csv)).unwrap(), 1);
    }

    #[test]
    fn parse_commands() {
        let record = |command: &str, target: &str, value: &str| CommandRecord {
            customer: 2,
            command: command.into(),
            target: target.into(),
            value: value.into(),
        };
        assert_eq!(record("add", "3", "").into_command(), Some(Command::Add(ProductId(3))));
        assert_eq!(
            record("checkout", "1 4", "").into_command(),
            Some(Command::Checkout(CheckoutRequest::Cart(vec![CartLineId(1), CartLineId(4)])))
        );
        assert_eq!(
            record("status", "7", "Out for delivery").into_command(),
            Some(Command::Status(OrderId(7), OrderStatus::OutForDelivery))
        );
        assert_eq!(record("status", "7", "Lost").into_command(), None);
        assert_eq!(record("refund", "7", "").into_command(), None);
        assert_eq!(record("add", "x", "").into_command(), None);
    }

    #[test]
    fn replay_cart_checkout_and_cancel() {
        let (store, admin) = setup();
        let commands = "customer,command,target,value\n\
                        2,add,1,\n\
                        2,add,1,\n\
                        2,add,2,\n\
                        2,checkout,1 2,\n\
                        2,cancel,1,\n\
                        1,status,2,Accepted\n";

        let applied = replay(&store, Cursor::new(commands)).unwrap();
        assert_eq!(applied, 6);
        // Two orders placed, one canceled with its stock released, one accepted.
        assert_eq!(drain_audit(&store), 5);
        assert_eq!(drain_audit(&store), 0);
        assert_eq!(store.stock(ProductId(1)), Ok(2));
        assert_eq!(store.stock(ProductId(2)), Ok(9));

        let output = orders_csv(&store, admin);
        assert!(output.starts_with("order,customer,product,product_name,quantity,unit_price,total,payment,status"));
        assert!(output.contains("1,2,1,Phone,2,300.00,600.00,CART_ORDER,Canceled"));
        assert!(output.contains("2,2,2,Case,1,15.00,15.00,CART_ORDER,Accepted"));
    }

    #[test]
    fn rejected_commands_are_skipped() {
        let (store, _) = setup();
        let commands = "customer,command,target,value\n\
                        3,direct,1,\n\
                        9,add,1,\n\
                        2,direct,1,\n\
                        2,status,1,Accepted\n\
                        not,a,valid,row\n";

        // Bob's profile is incomplete, customer 9 does not exist, and only
        // admins set statuses.
        assert_eq!(replay(&store, Cursor::new(commands)).unwrap(), 1);
        assert_eq!(store.stock(ProductId(1)), Ok(1));
    }

    #[test]
    fn stock_report_lists_every_product() {
        let (store, _) = setup();
        let mut output = Vec::new();
        write_stock(&store, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "product,name,stock,price\n1,Phone,2,300.00\n2,Case,10,15.00\n"
        );
    }
}
