//! order-relay - branch order intake, printer dispatch and notification
//!
//! Core flow: an order request is validated against the branch-scoped
//! catalog, assigned a daily sequential code, persisted, then its items are
//! partitioned by category and delivered to the category printers
//! concurrently. The order lands in a terminal status reflecting the
//! dispatch outcome and a best-effort summary is posted to the orders chat.
//! A background task bundles the data directories at midnight and ships the
//! archive offsite.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod order_codes;
pub mod orders;
pub mod printer;
pub mod store;
pub mod telemetry;

pub use backup::BackupScheduler;
pub use catalog::{Branch, Category, Product, RoutingTarget, User};
pub use config::Config;
pub use dispatch::{DispatchBatch, DispatchOutcome, Dispatcher};
pub use error::{
    BackupError, DispatchError, NotifyError, StoreError, SubmitError, ValidationError,
};
pub use notify::{NotificationSink, TelegramSink};
pub use orders::{
    Order, OrderFilter, OrderItem, OrderItemRequest, OrderService, OrderStatus, Submission,
};
pub use printer::{HttpPrinterClient, PrinterClient};
pub use store::{SqliteStore, Store};
