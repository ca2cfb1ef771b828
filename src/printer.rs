//! Printer dispatch client.
//!
//! Delivers one batch to one physical destination as a JSON POST against the
//! endpoint configured for that routing target. Fire-once policy: a non-200
//! response, transport failure or timeout yields a `DispatchError` for the
//! caller to aggregate; there is no automatic retry.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::catalog::RoutingTarget;
use crate::config::Config;
use crate::dispatch::{DispatchBatch, PrintLine};
use crate::error::DispatchError;
use crate::orders::Order;

/// Delivery seam. The HTTP implementation below is the real thing; tests
/// substitute recording fakes.
#[async_trait]
pub trait PrinterClient: Send + Sync {
    async fn deliver(
        &self,
        target: RoutingTarget,
        batch: &DispatchBatch,
        order: &Order,
    ) -> Result<(), DispatchError>;
}

/// Wire label for a routing target, e.g. `p1`.
pub fn destination_label(target: RoutingTarget) -> String {
    format!("p{target}")
}

/// The dispatch request body. The field names are the print services' wire
/// contract ("filial" is the branch) and must not change.
#[derive(Debug, Serialize)]
struct PrinterRequest<'a> {
    printer: String,
    order_id: &'a str,
    category: &'a str,
    username: &'a str,
    filial: &'a str,
    items: &'a [PrintLine],
}

impl<'a> PrinterRequest<'a> {
    fn new(target: RoutingTarget, batch: &'a DispatchBatch, order: &'a Order) -> Self {
        Self {
            printer: destination_label(target),
            order_id: &order.code,
            category: &batch.category_label,
            username: &order.user_name,
            filial: &order.branch_name,
            items: &batch.items,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpPrinterClient {
    client: Client,
    endpoints: BTreeMap<RoutingTarget, String>,
}

impl HttpPrinterClient {
    /// Build the client from configuration. Every outbound call shares one
    /// bounded timeout so a single unreachable printer cannot stall a
    /// request indefinitely.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.dispatch_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoints: config.printers.clone(),
        })
    }
}

#[async_trait]
impl PrinterClient for HttpPrinterClient {
    async fn deliver(
        &self,
        target: RoutingTarget,
        batch: &DispatchBatch,
        order: &Order,
    ) -> Result<(), DispatchError> {
        let endpoint = self
            .endpoints
            .get(&target)
            .ok_or(DispatchError::UnknownDestination(target))?;

        let request = PrinterRequest::new(target, batch, order);
        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|source| DispatchError::Transport {
                destination: target,
                source,
            })?;

        // 200 is the only success signal the print services emit.
        let status = response.status();
        if status.as_u16() != 200 {
            return Err(DispatchError::BadStatus {
                destination: target,
                status: status.as_u16(),
            });
        }

        info!(
            code = %order.code,
            destination = target,
            items = batch.items.len(),
            "batch delivered to printer"
        );
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStatus;
    use chrono::Utc;

    fn sample_order() -> Order {
        Order {
            id: 1,
            code: "25-06-01-1".into(),
            user_id: 1,
            user_name: "Dilshod".into(),
            branch_id: 1,
            branch_name: "Chilonzor".into(),
            items: Vec::new(),
            total: 0.0,
            status: OrderStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn request_body_matches_the_wire_contract() {
        let batch = DispatchBatch {
            category_label: "Hot dishes".into(),
            items: vec![PrintLine {
                product: "Somsa".into(),
                count: 2.5,
                unit_type: "kg".into(),
            }],
        };
        let order = sample_order();
        let body =
            serde_json::to_value(PrinterRequest::new(3, &batch, &order)).expect("serialize");

        assert_eq!(body["printer"], "p3");
        assert_eq!(body["order_id"], "25-06-01-1");
        assert_eq!(body["category"], "Hot dishes");
        assert_eq!(body["username"], "Dilshod");
        assert_eq!(body["filial"], "Chilonzor");
        assert_eq!(body["items"][0]["product"], "Somsa");
        assert_eq!(body["items"][0]["count"], 2.5);
        assert_eq!(body["items"][0]["type"], "kg");
    }

    #[tokio::test]
    async fn unknown_destination_fails_without_a_network_call() {
        let config = Config::default(); // no printers configured
        let client = HttpPrinterClient::new(&config).expect("build client");
        let batch = DispatchBatch {
            category_label: "Drinks".into(),
            items: Vec::new(),
        };

        let err = client
            .deliver(7, &batch, &sample_order())
            .await
            .expect_err("must fail");
        assert!(matches!(err, DispatchError::UnknownDestination(7)));
    }
}
