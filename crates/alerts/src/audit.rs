//! Audit record of notification attempts.
//!
//! One entry per item per attempt. Entries are immutable once built; the only
//! constructors are [`AuditEntry::delivered`] and [`AuditEntry::failed`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpulse_core::{AuditEntryId, ShopId};
use stockpulse_inventory::ItemKey;

use crate::cadence::AlertKind;
use crate::payload::{AlertLine, AlertPayload};

/// Operator-facing reason a notification attempt failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// No recipient could be resolved for the shop.
    RecipientUnavailable,
    DeliveryTimeout,
    RateLimited,
    TransportError,
    DeliveryRejected,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::RecipientUnavailable => "recipient_unavailable",
            FailureCategory::DeliveryTimeout => "delivery_timeout",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::TransportError => "transport_error",
            FailureCategory::DeliveryRejected => "delivery_rejected",
        }
    }

    /// Text shown in the shop's alert history.
    pub fn describe(&self) -> &'static str {
        match self {
            FailureCategory::RecipientUnavailable => "No recipient email address is available",
            FailureCategory::DeliveryTimeout => "The email service did not respond in time",
            FailureCategory::RateLimited => "The email service is rate limiting requests",
            FailureCategory::TransportError => "Could not reach the email service",
            FailureCategory::DeliveryRejected => "The email service rejected the message",
        }
    }
}

impl core::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub shop_id: ShopId,
    pub key: ItemKey,
    pub product_title: String,
    pub variant_title: Option<String>,
    pub current_inventory: i64,
    pub threshold_quantity: i64,
    /// `None` when recipient resolution itself failed.
    pub recipient: Option<String>,
    pub alert_kind: AlertKind,
    pub delivered: bool,
    pub failure: Option<FailureCategory>,
    /// Raw capability error, for operators with log access.
    pub error_detail: Option<String>,
    pub payload_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn delivered(
        line: &AlertLine,
        payload: &AlertPayload,
        recipient: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::build(line, payload, Some(recipient.to_string()), None, None, created_at)
    }

    pub fn failed(
        line: &AlertLine,
        payload: &AlertPayload,
        recipient: Option<&str>,
        failure: FailureCategory,
        error_detail: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            line,
            payload,
            recipient.map(str::to_string),
            Some(failure),
            Some(error_detail.into()),
            created_at,
        )
    }

    /// One entry per line of the payload, all sharing the same outcome.
    pub fn for_payload(
        payload: &AlertPayload,
        recipient: Option<&str>,
        outcome: Result<(), (FailureCategory, String)>,
        created_at: DateTime<Utc>,
    ) -> Vec<Self> {
        payload
            .lines()
            .iter()
            .map(|line| match (&outcome, recipient) {
                (Ok(()), Some(to)) => Self::delivered(line, payload, to, created_at),
                (Ok(()), None) => Self::failed(
                    line,
                    payload,
                    None,
                    FailureCategory::RecipientUnavailable,
                    "delivered without a recipient",
                    created_at,
                ),
                (Err((category, detail)), _) => {
                    Self::failed(line, payload, recipient, *category, detail.clone(), created_at)
                }
            })
            .collect()
    }

    fn build(
        line: &AlertLine,
        payload: &AlertPayload,
        recipient: Option<String>,
        failure: Option<FailureCategory>,
        error_detail: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            shop_id: payload.shop_id().clone(),
            key: line.key.clone(),
            product_title: line.product_title.clone(),
            variant_title: line.variant_title.clone(),
            current_inventory: line.current_inventory,
            threshold_quantity: line.threshold_quantity,
            recipient,
            alert_kind: payload.kind(),
            delivered: failure.is_none(),
            failure,
            error_detail,
            payload_snapshot: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            created_at,
        }
    }

    /// History line: "Sent" or the failure description.
    pub fn status_message(&self) -> &'static str {
        match self.failure {
            None => "Sent",
            Some(category) => category.describe(),
        }
    }
}
