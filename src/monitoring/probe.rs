//! One-shot reachability probes.
//!
//! A probe never fails: timeouts, refused connections and TLS or protocol
//! errors all fold into `false`.
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, redirect};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::version::user_agent;

/// A validated address, ready to be probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Url(Url),
    Ip(IpAddr),
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeTarget::Url(url) => write!(f, "{url}"),
            ProbeTarget::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns whether the target answered within `timeout`.
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> bool;
}

/// Probes over the real network: one HTTP GET for URLs, TCP handshakes for
/// bare IPs.
pub struct NetworkProber {
    client: Client,
    ip_ports: Vec<u16>,
}

impl NetworkProber {
    pub fn new(ip_ports: Vec<u16>) -> Result<Self, reqwest::Error> {
        // Redirects are never followed: a probe is exactly one request, and a
        // redirect target has not been through the safety checks.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .no_proxy()
            .user_agent(user_agent())
            .build()?;
        Ok(Self { client, ip_ports })
    }

    async fn probe_url(&self, url: &Url, timeout: Duration) -> bool {
        let request = self.client.get(url.clone()).timeout(timeout).send();
        // The response is dropped without reading the body, which returns the
        // connection on every path. The outer timeout also covers DNS.
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => {
                let status = response.status();
                debug!(%url, %status, "URL probe answered.");
                status.as_u16() < 500
            }
            Ok(Err(e)) => {
                debug!(%url, error = %e, timed_out = e.is_timeout(), "URL probe failed.");
                false
            }
            Err(_) => {
                debug!(%url, "URL probe timed out.");
                false
            }
        }
    }

    async fn probe_ip(&self, ip: IpAddr, timeout: Duration) -> bool {
        for &port in &self.ip_ports {
            let addr = SocketAddr::new(ip, port);
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => {
                    debug!(%addr, "TCP probe connected.");
                    return true;
                }
                Ok(Err(e)) => debug!(%addr, error = %e, "TCP probe refused."),
                Err(_) => debug!(%addr, "TCP probe timed out."),
            }
        }
        false
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> bool {
        match target {
            ProbeTarget::Url(url) => self.probe_url(url, timeout).await,
            ProbeTarget::Ip(ip) => self.probe_ip(*ip, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response per connection.
    async fn http_server(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    /// A port on which nothing is listening.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn url_for(addr: SocketAddr) -> ProbeTarget {
        ProbeTarget::Url(Url::parse(&format!("http://{addr}/health")).unwrap())
    }

    #[tokio::test]
    async fn client_errors_count_as_reachable() {
        let prober = NetworkProber::new(vec![]).unwrap();
        for status in ["200 OK", "301 Moved Permanently", "404 Not Found"] {
            let addr = http_server(status).await;
            assert!(
                prober.probe(&url_for(addr), Duration::from_secs(2)).await,
                "{status} should be reachable"
            );
        }
    }

    #[tokio::test]
    async fn server_errors_count_as_unreachable() {
        let prober = NetworkProber::new(vec![]).unwrap();
        for status in ["500 Internal Server Error", "503 Service Unavailable"] {
            let addr = http_server(status).await;
            assert!(!prober.probe(&url_for(addr), Duration::from_secs(2)).await);
        }
    }

    #[tokio::test]
    async fn silent_server_times_out_as_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let prober = NetworkProber::new(vec![]).unwrap();
        let started = std::time::Instant::now();
        assert!(!prober.probe(&url_for(addr), Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
        holder.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let port = closed_port().await;
        let prober = NetworkProber::new(vec![]).unwrap();
        let target = ProbeTarget::Url(Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap());
        assert!(!prober.probe(&target, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn ip_probe_succeeds_when_only_the_last_port_is_open() {
        let open = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = open.local_addr().unwrap().port();
        let first = closed_port().await;
        let second = closed_port().await;

        let prober = NetworkProber::new(vec![first, second, open_port]).unwrap();
        let target = ProbeTarget::Ip("127.0.0.1".parse().unwrap());
        assert!(prober.probe(&target, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn ip_probe_stops_at_the_first_open_port() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ports = vec![
            first.local_addr().unwrap().port(),
            second.local_addr().unwrap().port(),
        ];

        let prober = NetworkProber::new(ports).unwrap();
        let target = ProbeTarget::Ip("127.0.0.1".parse().unwrap());
        assert!(prober.probe(&target, Duration::from_secs(1)).await);

        // The handshake is queued on the first listener even before accept.
        let accepted = tokio::time::timeout(Duration::from_secs(1), first.accept()).await;
        assert!(matches!(accepted, Ok(Ok(_))), "first port was never dialled");
        let untouched = tokio::time::timeout(Duration::from_millis(200), second.accept()).await;
        assert!(untouched.is_err(), "second port was dialled after a success");
    }

    #[tokio::test]
    async fn ip_probe_fails_when_every_port_is_closed() {
        let prober = NetworkProber::new(vec![closed_port().await, closed_port().await]).unwrap();
        let target = ProbeTarget::Ip("127.0.0.1".parse().unwrap());
        assert!(!prober.probe(&target, Duration::from_millis(500)).await);
    }
}
