//! Dispatch routing and fan-out.
//!
//! `route` partitions an order's line items by routing target (the printer
//! named by each item's category) into per-destination batches. The
//! `Dispatcher` then delivers every batch, concurrently, waiting for all
//! destinations before aggregating the outcome — a failure at one printer
//! never prevents delivery to the others, and never fails the request.
//!
//! Routing is re-derived from the catalog on every dispatch. Items whose
//! product or category no longer resolves are logged and dropped: the order
//! was validated at creation time, and a later catalog edit must not block
//! an already-accepted order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::warn;

use crate::catalog::RoutingTarget;
use crate::orders::Order;
use crate::printer::PrinterClient;
use crate::store::Store;

/// One printable line of a dispatch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintLine {
    pub product: String,
    pub count: f64,
    #[serde(rename = "type")]
    pub unit_type: String,
}

/// The subset of an order bound for one destination. Ephemeral: rebuilt from
/// the order and the catalog on every dispatch attempt, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchBatch {
    /// Names of the categories feeding this destination, joined for the
    /// receipt header.
    pub category_label: String,
    /// Lines in the order's original line-item order.
    pub items: Vec<PrintLine>,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Partition an order's items into per-destination batches using the current
/// catalog: item -> product -> category -> routing target.
pub fn route(order: &Order, store: &dyn Store) -> BTreeMap<RoutingTarget, DispatchBatch> {
    let mut grouped: BTreeMap<RoutingTarget, (Vec<String>, Vec<PrintLine>)> = BTreeMap::new();

    for item in &order.items {
        let product = match store.product(item.product_id) {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(
                    order_id = order.id,
                    product_id = item.product_id,
                    "product no longer in catalog, dropping item from dispatch"
                );
                continue;
            }
            Err(e) => {
                warn!(
                    order_id = order.id,
                    product_id = item.product_id,
                    error = %e,
                    "product lookup failed, dropping item from dispatch"
                );
                continue;
            }
        };
        let category = match store.category(product.category_id) {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(
                    order_id = order.id,
                    product_id = item.product_id,
                    category_id = product.category_id,
                    "category no longer in catalog, dropping item from dispatch"
                );
                continue;
            }
            Err(e) => {
                warn!(
                    order_id = order.id,
                    category_id = product.category_id,
                    error = %e,
                    "category lookup failed, dropping item from dispatch"
                );
                continue;
            }
        };

        let (labels, lines) = grouped.entry(category.printer).or_default();
        if !labels.contains(&category.name) {
            labels.push(category.name);
        }
        lines.push(PrintLine {
            product: item.name.clone(),
            count: item.quantity,
            unit_type: item.unit_type.clone(),
        });
    }

    grouped
        .into_iter()
        .map(|(target, (labels, items))| {
            (
                target,
                DispatchBatch {
                    category_label: labels.join(", "),
                    items,
                },
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Aggregate result of one dispatch fan-out, both lists sorted by target.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Every destination a delivery was attempted to.
    pub attempted: Vec<RoutingTarget>,
    /// The subset of `attempted` that failed.
    pub failures: Vec<RoutingTarget>,
}

impl DispatchOutcome {
    /// True iff at least one destination was attempted and none failed.
    /// An order whose items all failed to resolve made zero attempts, which
    /// is deliberately not success.
    pub fn all_succeeded(&self) -> bool {
        !self.attempted.is_empty() && self.failures.is_empty()
    }
}

/// Delivers batches to their destinations and aggregates the outcome.
pub struct Dispatcher {
    client: Arc<dyn PrinterClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn PrinterClient>) -> Self {
        Self { client }
    }

    /// Attempt delivery to every destination concurrently and wait for all
    /// of them. Individual failures are logged and recorded, never raised;
    /// each delivery is bounded by the client's own timeout.
    pub async fn deliver_all(
        &self,
        order: &Order,
        batches: &BTreeMap<RoutingTarget, DispatchBatch>,
    ) -> DispatchOutcome {
        if batches.is_empty() {
            warn!(
                order_id = order.id,
                code = %order.code,
                "no items resolved to any destination, nothing dispatched"
            );
            return DispatchOutcome::default();
        }

        let mut set = JoinSet::new();
        for (&target, batch) in batches {
            let client = Arc::clone(&self.client);
            let batch = batch.clone();
            let order = order.clone();
            set.spawn(async move {
                match client.deliver(target, &batch, &order).await {
                    Ok(()) => (target, true),
                    Err(e) => {
                        warn!(
                            order_id = order.id,
                            code = %order.code,
                            destination = e.destination(),
                            error = %e,
                            "printer delivery failed"
                        );
                        (target, false)
                    }
                }
            });
        }

        let mut outcome = DispatchOutcome::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((target, succeeded)) => {
                    outcome.attempted.push(target);
                    if !succeeded {
                        outcome.failures.push(target);
                    }
                }
                Err(e) => {
                    warn!(order_id = order.id, error = %e, "delivery task failed to join");
                }
            }
        }
        // A panicked delivery task reports nothing; its destination still
        // counts as attempted and failed.
        for &target in batches.keys() {
            if !outcome.attempted.contains(&target) {
                outcome.attempted.push(target);
                outcome.failures.push(target);
            }
        }
        outcome.attempted.sort_unstable();
        outcome.failures.sort_unstable();
        outcome
    }
}

// ===========================================================================
// Tests
// ===========================================================================
