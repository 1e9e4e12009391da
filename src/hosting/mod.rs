//! Hosting-provider integrations.
//!
//! Providers form a closed set. The registry maps each one to its client with
//! an exhaustive match, so adding a provider without a client does not compile.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub mod four_vps;

pub use four_vps::FourVpsClient;

#[derive(Error, Debug)]
pub enum HostingError {
    #[error("Unknown hosting provider: {0}")]
    UnknownProvider(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Provider returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostingProvider {
    FourVps,
}

impl HostingProvider {
    pub const ALL: [HostingProvider; 1] = [HostingProvider::FourVps];

    /// Key used in storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            HostingProvider::FourVps => "4vps",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HostingProvider::FourVps => "4VPS",
        }
    }
}

impl fmt::Display for HostingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostingProvider {
    type Err = HostingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HostingError::UnknownProvider(wanted.to_string()))
    }
}

/// A server as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostingServer {
    pub external_id: String,
    pub name: String,
    pub ip: Option<String>,
    pub price: f64,
    pub currency: String,
    pub expiry_date: Option<NaiveDate>,
    /// `active`, `stopped`, `expired` or whatever the provider reports.
    pub status: String,
    pub hosting: String,
    pub location: Option<String>,
    pub cpu: Option<u32>,
    pub ram_gb: Option<f64>,
    pub disk_gb: Option<f64>,
}

#[async_trait]
pub trait HostingClient: Send + Sync {
    fn provider(&self) -> HostingProvider;

    async fn list_servers(&self) -> Result<Vec<HostingServer>, HostingError>;

    /// Whether the API key is accepted.
    async fn test_connection(&self) -> bool {
        self.list_servers().await.is_ok()
    }
}

/// Builds provider clients for an API key.
#[derive(Debug, Default, Clone)]
pub struct HostingRegistry {
    base_urls: HashMap<HostingProvider, String>,
}

impl HostingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points a provider at a different API root.
    pub fn with_base_url(mut self, provider: HostingProvider, base_url: &str) -> Self {
        self.base_urls.insert(provider, base_url.to_string());
        self
    }

    pub fn client(
        &self,
        provider: HostingProvider,
        api_key: &str,
    ) -> Result<Box<dyn HostingClient>, HostingError> {
        let base_url = self.base_urls.get(&provider).map(String::as_str);
        match provider {
            HostingProvider::FourVps => Ok(Box::new(FourVpsClient::new(
                api_key,
                base_url.unwrap_or(four_vps::BASE_URL),
            )?)),
        }
    }

    /// Looks a provider up by name.
    pub fn client_by_name(
        &self,
        provider: &str,
        api_key: &str,
    ) -> Result<Box<dyn HostingClient>, HostingError> {
        self.client(provider.parse()?, api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("4vps".parse::<HostingProvider>().unwrap(), HostingProvider::FourVps);
        assert_eq!(" 4VPS ".parse::<HostingProvider>().unwrap(), HostingProvider::FourVps);
        assert_eq!(HostingProvider::FourVps.to_string(), "4vps");
    }

    #[test]
    fn unknown_provider_is_a_typed_error() {
        let err = HostingRegistry::new()
            .client_by_name("hetzner", "key")
            .err()
            .unwrap();
        assert!(matches!(err, HostingError::UnknownProvider(name) if name == "hetzner"));
    }

    #[test]
    fn registry_builds_client_for_every_provider() {
        let registry = HostingRegistry::new();
        for provider in HostingProvider::ALL {
            assert_eq!(registry.client(provider, "key").unwrap().provider(), provider);
        }
    }
}
