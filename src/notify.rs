//! Order notification sink.
//!
//! After every completed dispatch attempt a human-readable summary of the
//! order and its per-destination outcome is posted to the monitoring chat.
//! Strictly best-effort: a broken channel is logged by the caller and never
//! touches the order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::RoutingTarget;
use crate::config::Config;
use crate::dispatch::{DispatchBatch, DispatchOutcome};
use crate::error::NotifyError;
use crate::orders::Order;
use crate::printer::destination_label;

/// Notification seam; the Telegram implementation below is the default, a
/// no-op fake stands in for it in tests.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Summary formatting
// ---------------------------------------------------------------------------

/// Render the order summary message: code, requester, branch, time, the
/// overall dispatch banner and a per-destination item listing. Pure, so the
/// message shape is testable without a network.
pub fn order_summary(
    order: &Order,
    outcome: &DispatchOutcome,
    batches: &BTreeMap<RoutingTarget, DispatchBatch>,
    now: DateTime<Local>,
) -> String {
    let mut text = String::new();
    text.push_str("🧾 *New order*\n\n");
    text.push_str(&format!("📋 *Order:* `{}`\n", order.code));
    text.push_str(&format!("👤 *Requested by:* {}\n", order.user_name));
    text.push_str(&format!("🏢 *Branch:* {}\n", order.branch_name));
    text.push_str(&format!("⏰ *Time:* {}\n\n", now.format("%Y-%m-%d %H:%M:%S")));

    let banner = if outcome.all_succeeded() {
        "✅ Sent to printer".to_string()
    } else if outcome.attempted.is_empty() {
        "⚠️ No items could be routed to a printer".to_string()
    } else {
        let failed: Vec<String> = outcome
            .failures
            .iter()
            .map(|&t| destination_label(t))
            .collect();
        format!("❌ Printing failed ({})", failed.join(", "))
    };
    text.push_str(&format!("🖨️ *Status:* {banner}\n"));

    for (&target, batch) in batches {
        text.push_str(&format!(
            "\n📦 *{} — {}*\n",
            destination_label(target),
            batch.category_label
        ));
        for item in &batch.items {
            text.push_str(&format!(
                "   • {} — {} {}\n",
                item.product, item.count, item.unit_type
            ));
        }
    }

    text
}

// ---------------------------------------------------------------------------
// Telegram implementation
// ---------------------------------------------------------------------------

/// Telegram `sendMessage` body.
#[derive(Debug, Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

pub struct TelegramSink {
    client: Client,
    send_url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.notify_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            send_url: format!(
                "{}/bot{}/sendMessage",
                config.telegram.api_base, config.telegram.bot_token
            ),
            chat_id: config.telegram.orders_chat_id.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let message = TelegramMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };
        let response = self.client.post(&self.send_url).json(&message).send().await?;
        let status = response.status();
        if status.as_u16() != 200 {
            return Err(NotifyError::BadStatus(status.as_u16()));
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::PrintLine;
    use crate::orders::OrderStatus;
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample_order() -> Order {
        Order {
            id: 1,
            code: "25-06-01-2".into(),
            user_id: 1,
            user_name: "Dilshod".into(),
            branch_id: 1,
            branch_name: "Chilonzor".into(),
            items: Vec::new(),
            total: 31_500.0,
            status: OrderStatus::SentToPrinter,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_batches() -> BTreeMap<RoutingTarget, DispatchBatch> {
        BTreeMap::from([
            (
                1,
                DispatchBatch {
                    category_label: "Hot dishes".into(),
                    items: vec![PrintLine {
                        product: "Somsa".into(),
                        count: 2.0,
                        unit_type: "piece".into(),
                    }],
                },
            ),
            (
                2,
                DispatchBatch {
                    category_label: "Drinks".into(),
                    items: vec![PrintLine {
                        product: "Ayran".into(),
                        count: 1.5,
                        unit_type: "l".into(),
                    }],
                },
            ),
        ])
    }

    fn local_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 5).unwrap()
    }

    #[test]
    fn success_summary_lists_every_destination() {
        let outcome = DispatchOutcome {
            attempted: vec![1, 2],
            failures: vec![],
        };
        let text = order_summary(&sample_order(), &outcome, &sample_batches(), local_noon());

        assert!(text.contains("`25-06-01-2`"));
        assert!(text.contains("Dilshod"));
        assert!(text.contains("Chilonzor"));
        assert!(text.contains("2025-06-01 12:00:05"));
        assert!(text.contains("✅ Sent to printer"));
        assert!(text.contains("p1 — Hot dishes"));
        assert!(text.contains("p2 — Drinks"));
        assert!(text.contains("• Somsa — 2 piece"));
        assert!(text.contains("• Ayran — 1.5 l"));
    }

    #[test]
    fn failure_summary_names_the_failed_destinations() {
        let outcome = DispatchOutcome {
            attempted: vec![1, 2],
            failures: vec![2],
        };
        let text = order_summary(&sample_order(), &outcome, &sample_batches(), local_noon());
        assert!(text.contains("❌ Printing failed (p2)"));
    }

    #[test]
    fn zero_attempts_is_reported_as_a_warning_not_success() {
        let text = order_summary(
            &sample_order(),
            &DispatchOutcome::default(),
            &BTreeMap::new(),
            local_noon(),
        );
        assert!(text.contains("⚠️ No items could be routed"));
        assert!(!text.contains("✅"));
    }

    #[test]
    fn telegram_message_shape() {
        let message = TelegramMessage {
            chat_id: "-4985547344",
            text: "hello",
            parse_mode: "Markdown",
        };
        let body = serde_json::to_value(&message).expect("serialize");
        assert_eq!(body["chat_id"], "-4985547344");
        assert_eq!(body["text"], "hello");
        assert_eq!(body["parse_mode"], "Markdown");
    }
}
