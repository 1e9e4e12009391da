use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError, http_client};

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
    url: String,
    method: Method,
    headers: header::HeaderMap,
    body_template: Option<String>,
}

impl WebhookSender {
    pub fn new(
        url: &str,
        method: &str,
        headers: Option<&HashMap<String, String>>,
        body_template: Option<&str>,
    ) -> Result<Self, SenderError> {
        let method = match method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            other => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {other}"
                )));
            }
        };

        let mut header_map = header::HeaderMap::new();
        for (key, value) in headers.into_iter().flatten() {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header name: {e}")))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid header value: {e}")))?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            client: http_client()?,
            url: url.to_string(),
            method,
            headers: header_map,
            body_template: body_template.map(str::to_string),
        })
    }

    fn render_body(
        &self,
        recipient: &str,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<String, SenderError> {
        let Some(template) = &self.body_template else {
            let body = serde_json::json!({
                "recipient": recipient,
                "text": message,
                "context": context,
            });
            return Ok(body.to_string());
        };

        let mut tera_context = Context::new();
        for (key, value) in context {
            tera_context.insert(key, value);
        }
        tera_context.insert("recipient", recipient);
        tera_context.insert("message", message);

        Tera::one_off(template, &tera_context, false)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        recipient: &str,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let mut request_builder = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());

        if self.method == Method::POST {
            let rendered_body = self.render_body(recipient, message, context)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        } else {
            request_builder = request_builder.query(&[("recipient", recipient), ("text", message)]);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
