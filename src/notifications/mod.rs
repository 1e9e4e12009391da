pub mod encryption;
pub mod models;
pub mod senders;
pub mod service;
pub mod templates;

pub use models::{ChannelConfig, NotificationEvent, NotificationKind, NotificationPayload};
pub use service::{NotificationError, NotificationService, Notifier};
