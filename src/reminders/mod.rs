//! Daily payment reminders.

pub mod schedule;
pub mod service;

pub use service::{ReminderReport, ReminderService, ReminderSettings};
