use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::models::{DueTarget, MonitorTarget, OwnerId};

use super::templates;

/// Delivery transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Messages go to the owner's chat; the owner id is the chat id.
    Telegram { bot_token: String },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: String, // "GET" or "POST"
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        /// Tera template for the POST body.
        #[serde(default)]
        body_template: Option<String>,
    },
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReachabilityChanged,
    PaymentDue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    ReachabilityChanged {
        target_name: String,
        hosting: String,
        online: bool,
        ip: Option<String>,
        url: Option<String>,
    },
    PaymentDue {
        as_of: NaiveDate,
        items: Vec<DueTarget>,
    },
}

/// A message for one owner. Built, rendered, delivered, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub owner_id: OwnerId,
    pub payload: NotificationPayload,
}

impl NotificationEvent {
    pub fn reachability_changed(target: &MonitorTarget, online: bool) -> Self {
        Self {
            owner_id: target.owner_id,
            payload: NotificationPayload::ReachabilityChanged {
                target_name: target.name.clone(),
                hosting: target.hosting.clone(),
                online,
                ip: target.ip().map(str::to_string),
                url: target.url().map(str::to_string),
            },
        }
    }

    pub fn payment_due(owner_id: OwnerId, as_of: NaiveDate, items: Vec<DueTarget>) -> Self {
        Self {
            owner_id,
            payload: NotificationPayload::PaymentDue { as_of, items },
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self.payload {
            NotificationPayload::ReachabilityChanged { .. } => NotificationKind::ReachabilityChanged,
            NotificationPayload::PaymentDue { .. } => NotificationKind::PaymentDue,
        }
    }

    pub fn render(&self) -> String {
        match &self.payload {
            NotificationPayload::ReachabilityChanged {
                target_name,
                hosting,
                online,
                ip,
                url,
            } => templates::status_change(
                target_name,
                hosting,
                *online,
                ip.as_deref(),
                url.as_deref(),
            ),
            NotificationPayload::PaymentDue { as_of, items } => templates::reminder(items, *as_of),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_config_defaults_to_post() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"type":"webhook","url":"https://hooks.example.com/x"}"#).unwrap();
        match config {
            ChannelConfig::Webhook { method, headers, body_template, .. } => {
                assert_eq!(method, "POST");
                assert!(headers.is_none());
                assert!(body_template.is_none());
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn status_event_carries_owner_and_addresses() {
        let target = MonitorTarget {
            id: 3,
            owner_id: 99,
            name: "edge-1".into(),
            hosting: "4VPS".into(),
            ip: Some("203.0.113.5".into()),
            url: Some(" ".into()),
        };
        let event = NotificationEvent::reachability_changed(&target, false);
        assert_eq!(event.owner_id, 99);
        assert_eq!(event.kind(), NotificationKind::ReachabilityChanged);
        match &event.payload {
            NotificationPayload::ReachabilityChanged { ip, url, online, .. } => {
                assert_eq!(ip.as_deref(), Some("203.0.113.5"));
                assert!(url.is_none());
                assert!(!online);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
