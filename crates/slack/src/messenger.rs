//! Slack Web API client backing the core messaging ports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use requesty_core::config::SlackConfig;
use requesty_core::domain::request::Request;
use requesty_core::ports::{
    DeliveryReceipt, Messenger, MessagingError, NotificationTarget, RequestNotifier,
};

use crate::blocks::{self, MessageTemplate};
use crate::socket::ResponseSink;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
    channel: Option<Value>,
}

pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(
        bot_token: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| MessagingError::Transport(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, bot_token })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, MessagingError> {
        Self::new(
            config.bot_token.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn call(&self, method: &str, body: Value) -> Result<ApiEnvelope, MessagingError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "egress.slack.request_failed",
                    method,
                    error = %error,
                    "slack web api request failed"
                );
                MessagingError::Transport(error.to_string())
            })?;

        if !response.status().is_success() {
            return Err(MessagingError::Transport(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|error| MessagingError::Transport(format!("{method} response: {error}")))?;
        check_envelope(method, envelope)
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, MessagingError> {
        let envelope = self.call("conversations.open", json!({ "users": user_id })).await?;
        envelope
            .channel
            .as_ref()
            .and_then(|channel| channel.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                MessagingError::Rejected("conversations.open returned no channel id".to_owned())
            })
    }

    async fn post_message(&self, channel_id: &str, body: Value) -> Result<String, MessagingError> {
        let mut body = body;
        body["channel"] = Value::String(channel_id.to_owned());
        let envelope = self.call("chat.postMessage", body).await?;
        let ts = envelope.ts.ok_or_else(|| {
            MessagingError::Rejected("chat.postMessage returned no message ts".to_owned())
        })?;
        debug!(
            event_name = "egress.slack.message_posted",
            channel_id,
            message_ts = %ts,
            "slack message posted"
        );
        Ok(ts)
    }

    async fn post_template(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<String, MessagingError> {
        self.post_message(channel_id, template_body(message)?).await
    }
}

fn check_envelope(method: &str, envelope: ApiEnvelope) -> Result<ApiEnvelope, MessagingError> {
    if envelope.ok {
        return Ok(envelope);
    }
    let reason = envelope.error.as_deref().unwrap_or("unknown_error");
    Err(MessagingError::Rejected(format!("{method}: {reason}")))
}

fn template_body(message: &MessageTemplate) -> Result<Value, MessagingError> {
    serde_json::to_value(message)
        .map_err(|error| MessagingError::Rejected(format!("unencodable message: {error}")))
}

#[async_trait]
impl Messenger for SlackWebClient {
    async fn send_direct_message(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        let channel_id = self.open_direct_channel(user_id).await?;
        let message_ts = self.post_message(&channel_id, json!({ "text": text })).await?;
        Ok(DeliveryReceipt { channel_id, message_ts })
    }

    async fn send_channel_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<String, MessagingError> {
        self.post_message(channel_id, json!({ "text": text })).await
    }
}

#[async_trait]
impl RequestNotifier for SlackWebClient {
    async fn post_request_notification(
        &self,
        target: &NotificationTarget,
        request: &Request,
    ) -> Result<DeliveryReceipt, MessagingError> {
        let card = blocks::new_request_notification(request);
        let channel_id = match target {
            NotificationTarget::DirectMessage(user_id) => self.open_direct_channel(user_id).await?,
            NotificationTarget::Channel(channel_id) => channel_id.clone(),
        };
        let message_ts = self.post_template(&channel_id, &card).await?;
        Ok(DeliveryReceipt { channel_id, message_ts })
    }
}

#[async_trait]
impl ResponseSink for SlackWebClient {
    /// Response URLs are pre-authorized, so no bearer token is sent.
    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), MessagingError> {
        let mut body = template_body(message)?;
        body["response_type"] = Value::String("ephemeral".to_owned());

        let response = self
            .http
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| MessagingError::Transport(error.to_string()))?;
        if !response.status().is_success() {
            return Err(MessagingError::Rejected(format!(
                "response_url returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
