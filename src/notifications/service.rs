use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::db::models::OwnerId;

use super::models::{ChannelConfig, NotificationEvent, NotificationKind};
use super::senders::{
    NotificationSender, SenderError, telegram::TelegramSender, webhook::WebhookSender,
};

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Sender error: {0}")]
    SenderError(#[from] SenderError),
}

/// Delivers notification events to their owners.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Renders events and pushes them through the configured transport.
pub struct NotificationService {
    sender: Box<dyn NotificationSender>,
}

impl NotificationService {
    pub fn new(sender: Box<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    pub fn from_config(config: &ChannelConfig) -> Result<Self, NotificationError> {
        let sender: Box<dyn NotificationSender> = match config {
            ChannelConfig::Telegram { bot_token } => Box::new(TelegramSender::new(bot_token)?),
            ChannelConfig::Webhook {
                url,
                method,
                headers,
                body_template,
            } => Box::new(WebhookSender::new(
                url,
                method,
                headers.as_ref(),
                body_template.as_deref(),
            )?),
        };
        Ok(Self::new(sender))
    }

    /// Sends an already rendered message to one owner.
    pub async fn send_text(
        &self,
        owner_id: OwnerId,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), NotificationError> {
        let mut context = HashMap::new();
        context.insert("owner_id".to_string(), owner_id.to_string());
        context.insert("kind".to_string(), kind_name(kind).to_string());

        self.sender
            .send(&owner_id.to_string(), message, &context)
            .await?;
        debug!(owner_id, kind = kind_name(kind), "Notification delivered.");
        Ok(())
    }
}

fn kind_name(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::ReachabilityChanged => "reachability_changed",
        NotificationKind::PaymentDue => "payment_due",
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        self.send_text(event.owner_id, event.kind(), &event.render())
            .await
    }
}
