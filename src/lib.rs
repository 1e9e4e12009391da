pub mod config;
pub mod db;
pub mod hosting;
pub mod monitoring;
pub mod notifications;
pub mod reminders;
pub mod version;
