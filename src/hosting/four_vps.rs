//! 4VPS.su API client.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::version::user_agent;

use super::{HostingClient, HostingError, HostingProvider, HostingServer};

pub const BASE_URL: &str = "https://4vps.su/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FourVpsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FourVpsClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, HostingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, HostingError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(HostingError::UnexpectedStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl HostingClient for FourVpsClient {
    fn provider(&self) -> HostingProvider {
        HostingProvider::FourVps
    }

    async fn list_servers(&self) -> Result<Vec<HostingServer>, HostingError> {
        let data = self.get_json("/myservers").await?;
        let servers = parse_server_list(&data)?;
        debug!(count = servers.len(), "Fetched servers from 4VPS.");
        Ok(servers)
    }
}

/// Accepts a bare array or an object wrapping it in `data` or `servers`.
pub fn parse_server_list(data: &Value) -> Result<Vec<HostingServer>, HostingError> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("data").or_else(|| map.get("servers")) {
            Some(Value::Array(items)) => items,
            _ => return Ok(Vec::new()),
        },
        other => {
            return Err(HostingError::InvalidResponse(format!(
                "expected a server list, got {other}"
            )));
        }
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let server = parse_server(item);
            if server.is_none() {
                warn!("Skipping 4VPS server entry without an id.");
            }
            server
        })
        .collect())
}

/// Reads one server entry. Field names vary between API versions, so each
/// value is taken from the first non-empty of several keys.
pub fn parse_server(data: &Value) -> Option<HostingServer> {
    let external_id = first(data, &["id", "server_id"]).and_then(as_text)?;

    let name = first(data, &["name", "hostname"])
        .and_then(as_text)
        .unwrap_or_else(|| format!("Server {external_id}"));

    let status = match data.get("status") {
        Some(Value::Number(n)) if n.as_i64() == Some(1) => "active".to_string(),
        Some(Value::Number(_)) => "stopped".to_string(),
        Some(Value::String(s)) => s.to_lowercase(),
        _ => "unknown".to_string(),
    };

    let ram_gb = first(data, &["ram", "memory"])
        .and_then(as_number)
        .map(|ram| if ram > 100.0 { ram / 1024.0 } else { ram });

    Some(HostingServer {
        name,
        ip: first(data, &["ip", "ipv4", "primary_ip"]).and_then(as_text),
        price: data.get("price").and_then(as_number).unwrap_or(0.0),
        currency: "RUB".to_string(),
        expiry_date: first(data, &["expired", "expiry", "expire_date"]).and_then(as_date),
        status,
        hosting: HostingProvider::FourVps.display_name().to_string(),
        location: first(data, &["dc", "datacenter", "location"]).and_then(as_text),
        cpu: first(data, &["cpu", "cores"])
            .and_then(as_number)
            .map(|cpu| cpu as u32),
        ram_gb,
        disk_gb: first(data, &["disk", "storage"]).and_then(as_number),
        external_id,
    })
}

fn first<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|value| !is_blank(value))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unix seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`. Unix
/// timestamps are read as UTC.
fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.date_naive())
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
                .ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::senders::test_support::capture_one;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_full_entry() {
        let server = parse_server(&json!({
            "id": 1201,
            "name": "nl-edge",
            "ipv4": "203.0.113.10",
            "price": "349.5",
            "expired": 1792281600,
            "status": 1,
            "dc": "Amsterdam",
            "cores": 2,
            "memory": 2048,
            "disk": 40
        }))
        .unwrap();

        assert_eq!(server.external_id, "1201");
        assert_eq!(server.name, "nl-edge");
        assert_eq!(server.ip.as_deref(), Some("203.0.113.10"));
        assert_eq!(server.price, 349.5);
        assert_eq!(server.expiry_date, Some(day("2026-10-18")));
        assert_eq!(server.status, "active");
        assert_eq!(server.location.as_deref(), Some("Amsterdam"));
        assert_eq!(server.cpu, Some(2));
        assert_eq!(server.ram_gb, Some(2.0));
        assert_eq!(server.disk_gb, Some(40.0));
        assert_eq!(server.hosting, "4VPS");
        assert_eq!(server.currency, "RUB");
    }

    #[test]
    fn falls_back_on_sparse_entries() {
        let server = parse_server(&json!({
            "server_id": "abc",
            "name": "",
            "expire_date": "2026-11-02T00:00:00Z",
            "status": "Stopped",
            "ram": 4
        }))
        .unwrap();

        assert_eq!(server.name, "Server abc");
        assert!(server.ip.is_none());
        assert_eq!(server.price, 0.0);
        assert_eq!(server.expiry_date, Some(day("2026-11-02")));
        assert_eq!(server.status, "stopped");
        assert_eq!(server.ram_gb, Some(4.0));

        assert!(parse_server(&json!({ "name": "no id" })).is_none());
        assert_eq!(
            parse_server(&json!({ "id": 1, "expiry": "garbage" })).unwrap().expiry_date,
            None
        );
    }

    #[test]
    fn accepts_wrapped_and_bare_lists() {
        let bare = json!([{ "id": 1 }, { "name": "skipped" }]);
        assert_eq!(parse_server_list(&bare).unwrap().len(), 1);

        let wrapped = json!({ "data": [{ "id": 1 }, { "id": 2 }] });
        assert_eq!(parse_server_list(&wrapped).unwrap().len(), 2);

        let servers = json!({ "servers": [{ "id": 3 }] });
        assert_eq!(parse_server_list(&servers).unwrap()[0].external_id, "3");

        assert!(parse_server_list(&json!({ "error": "none" })).unwrap().is_empty());
        assert!(parse_server_list(&json!("nope")).is_err());
    }

    #[tokio::test]
    async fn lists_servers_with_bearer_key() {
        let (addr, request) = capture_one("200 OK", r#"{"data":[{"id":7,"name":"fi-1"}]}"#).await;
        let client = FourVpsClient::new("k-123", &format!("http://{addr}/api")).unwrap();

        let servers = client.list_servers().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "fi-1");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/myservers HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer k-123"));
    }

    #[tokio::test]
    async fn rejected_key_fails_connection_test() {
        let (addr, _request) = capture_one("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let client = FourVpsClient::new("wrong", &format!("http://{addr}")).unwrap();
        assert!(!client.test_connection().await);
    }
}
