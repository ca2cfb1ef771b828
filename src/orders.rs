//! Order lifecycle: validation, build, status machine and the end-to-end
//! submit flow.
//!
//! An order is validated against the catalog (first failure wins, nothing
//! persisted on rejection), priced from a creation-time product snapshot,
//! given a daily sequential code and persisted as `pending`. Submission then
//! confirms it, fans it out to the printers, records the terminal status and
//! sends the notification summary. Dispatch failures never fail the request:
//! the order exists either way, with the outcome reflected in its status.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dispatch::{route, DispatchOutcome, Dispatcher};
use crate::error::{StoreError, SubmitError, ValidationError};
use crate::notify::{self, NotificationSink};
use crate::order_codes::DailyCounter;
use crate::store::Store;

// ---------------------------------------------------------------------------
// Order model
// ---------------------------------------------------------------------------

/// Lifecycle: `pending -> confirmed -> {sent_to_printer, print_error}`.
/// The two dispatch outcomes are terminal; nothing in this crate moves an
/// order out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    SentToPrinter,
    PrintError,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::SentToPrinter => "sent_to_printer",
            OrderStatus::PrintError => "print_error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::SentToPrinter | OrderStatus::PrintError)
    }

    /// Legal state-machine edges.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Confirmed, OrderStatus::SentToPrinter)
                | (OrderStatus::Confirmed, OrderStatus::PrintError)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "sent_to_printer" => Ok(OrderStatus::SentToPrinter),
            "print_error" => Ok(OrderStatus::PrintError),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered line. Name, unit type and price are snapshots taken at order
/// creation; later catalog edits never change historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: f64,
    #[serde(rename = "type")]
    pub unit_type: String,
    pub subtotal: f64,
}

/// A persisted order. `id` is the store-owned internal sequence number;
/// `code` is the human-readable daily code (`YY-MM-DD-N`). Line items are
/// immutable once created; only `status`/`updated_at` change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub code: String,
    pub user_id: i64,
    pub user_name: String,
    pub branch_id: i64,
    pub branch_name: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One requested line of a new order, as received from the HTTP layer.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: f64,
}

/// Listing filter for the admin order views. `date` matches the local
/// calendar day the order was created on.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub branch_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub date: Option<NaiveDate>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(branch_id) = self.branch_id {
            if order.branch_id != branch_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        if let Some(date) = self.date {
            if order.created_at.with_timezone(&Local).date_naive() != date {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Order service
// ---------------------------------------------------------------------------

/// Result of a completed submission: the persisted order in its terminal
/// status plus the per-destination dispatch outcome.
#[derive(Debug)]
pub struct Submission {
    pub order: Order,
    pub outcome: DispatchOutcome,
}

/// Owns the order lifecycle. One instance per process; the daily code
/// counters are recovered from the store when it is built.
pub struct OrderService {
    store: Arc<dyn Store>,
    counter: DailyCounter,
    dispatcher: Dispatcher,
    sink: Arc<dyn NotificationSink>,
}

impl OrderService {
    /// Build the service, rebuilding the daily code counters from the
    /// persisted order history.
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, StoreError> {
        let orders = store.list_orders()?;
        let counter = DailyCounter::recover(orders.iter().map(|o| o.code.as_str()));
        info!(
            orders = orders.len(),
            last_today = counter.last_issued(Local::now().date_naive()).unwrap_or(0),
            "order code counters recovered"
        );
        Ok(Self {
            store,
            counter,
            dispatcher,
            sink,
        })
    }

    /// Validate, price and persist a new order with status `pending`.
    ///
    /// Preconditions are checked in order, first failure wins: user exists,
    /// user has a branch, branch exists, order non-empty, then per item:
    /// product exists, product available at the branch, quantity positive.
    /// No partial orders are ever persisted.
    pub fn create_order(
        &self,
        user_id: i64,
        items: &[OrderItemRequest],
    ) -> Result<Order, SubmitError> {
        self.create_order_at(user_id, items, Local::now())
    }

    fn create_order_at(
        &self,
        user_id: i64,
        items: &[OrderItemRequest],
        now: DateTime<Local>,
    ) -> Result<Order, SubmitError> {
        let user = self
            .store
            .user(user_id)?
            .ok_or(ValidationError::UserNotFound(user_id))?;
        let branch_id = user
            .branch_id
            .ok_or(ValidationError::NoBranchAssigned(user_id))?;
        let branch = self
            .store
            .branch(branch_id)?
            .ok_or(ValidationError::BranchNotFound(branch_id))?;

        if items.is_empty() {
            return Err(ValidationError::EmptyOrder.into());
        }

        let mut lines = Vec::with_capacity(items.len());
        for requested in items {
            let product = self
                .store
                .product(requested.product_id)?
                .ok_or(ValidationError::ProductNotFound(requested.product_id))?;
            if !product.available_at(branch_id) {
                return Err(ValidationError::ProductNotAvailableAtBranch {
                    name: product.name,
                    branch_id,
                }
                .into());
            }
            if requested.quantity <= 0.0 {
                return Err(ValidationError::InvalidQuantity {
                    product_id: requested.product_id,
                    quantity: requested.quantity,
                }
                .into());
            }
            lines.push(OrderItem {
                product_id: product.id,
                name: product.name,
                quantity: requested.quantity,
                unit_type: product.unit_type,
                subtotal: product.price * requested.quantity,
            });
        }

        let total = lines.iter().map(|l| l.subtotal).sum();
        let created_at = now.with_timezone(&Utc);
        let mut order = Order {
            id: 0,
            code: self.counter.next_code(now.date_naive()),
            user_id: user.id,
            user_name: user.name,
            branch_id,
            branch_name: branch.name,
            items: lines,
            total,
            status: OrderStatus::Pending,
            created_at,
            updated_at: created_at,
        };
        order.id = self.store.insert_order(&order)?;

        info!(
            order_id = order.id,
            code = %order.code,
            branch = %order.branch_name,
            items = order.items.len(),
            "order created"
        );
        Ok(order)
    }

    /// Apply a status transition and persist it. Returns `false` (leaving
    /// the order untouched) when the edge is not part of the state machine,
    /// e.g. any transition out of a terminal state.
    pub fn transition(
        &self,
        order: &mut Order,
        next: OrderStatus,
    ) -> Result<bool, StoreError> {
        if !order.status.can_transition_to(next) {
            warn!(
                order_id = order.id,
                from = %order.status,
                to = %next,
                "refusing illegal status transition"
            );
            return Ok(false);
        }
        let updated_at = Utc::now();
        self.store.update_order_status(order.id, next, updated_at)?;
        order.status = next;
        order.updated_at = updated_at;
        Ok(true)
    }

    /// The full lifecycle for one client request: create the order, confirm
    /// it, fan it out to every routed destination, record the terminal
    /// status and send the summary notification exactly once.
    ///
    /// Once validation passes this never fails on dispatch: the order is
    /// returned with `sent_to_printer` or `print_error` status.
    pub async fn submit(
        &self,
        user_id: i64,
        items: &[OrderItemRequest],
    ) -> Result<Submission, SubmitError> {
        self.submit_at(user_id, items, Local::now()).await
    }

    async fn submit_at(
        &self,
        user_id: i64,
        items: &[OrderItemRequest],
        now: DateTime<Local>,
    ) -> Result<Submission, SubmitError> {
        let mut order = self.create_order_at(user_id, items, now)?;

        // Confirmed marks "about to dispatch", independent of the outcome.
        self.transition(&mut order, OrderStatus::Confirmed)?;

        let batches = route(&order, self.store.as_ref());
        let outcome = self.dispatcher.deliver_all(&order, &batches).await;

        let terminal = if outcome.all_succeeded() {
            OrderStatus::SentToPrinter
        } else {
            OrderStatus::PrintError
        };
        self.transition(&mut order, terminal)?;

        info!(
            order_id = order.id,
            code = %order.code,
            status = %order.status,
            attempted = outcome.attempted.len(),
            failed = outcome.failures.len(),
            "dispatch finished"
        );

        // Best effort: the summary reflects the final status, and a broken
        // notification channel never affects the order.
        let summary = notify::order_summary(&order, &outcome, &batches, now);
        if let Err(e) = self.sink.notify(&summary).await {
            warn!(order_id = order.id, error = %e, "order notification failed");
        }

        Ok(Submission { order, outcome })
    }

    /// Point read of a persisted order.
    pub fn order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        self.store.order(id)
    }

    /// Filtered listing for the admin views, newest first.
    pub fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        self.store.list_orders_filtered(filter)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
