use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod telegram;
pub mod webhook;

/// Upper bound for a single delivery request.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// A transport that pushes one rendered message to one recipient.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a notification.
    ///
    /// * `recipient` - transport-specific address (the chat id for Telegram).
    /// * `message` - the rendered message text.
    /// * `context` - key-value pairs available to templating transports.
    async fn send(
        &self,
        recipient: &str,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}

fn http_client() -> Result<reqwest::Client, SenderError> {
    Ok(reqwest::Client::builder()
        .timeout(DELIVERY_TIMEOUT)
        .user_agent(crate::version::user_agent())
        .build()?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accepts one HTTP request, hands back its raw text and answers with
    /// `status_line` and `body`.
    pub async fn capture_one(
        status_line: &'static str,
        body: &'static str,
    ) -> (SocketAddr, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
        });
        (addr, rx)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }
}
