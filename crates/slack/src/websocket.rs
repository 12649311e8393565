//! Socket Mode transport over a live WebSocket.
//!
//! `apps.connections.open` is called with the app-level token to obtain a
//! single-use `wss://` URL; frames are then read from that socket until Slack
//! asks for a refresh or the connection drops.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use requesty_core::config::SlackConfig;

use crate::events::{parse_socket_message, SlackEnvelope};
use crate::socket::{SocketTransport, TransportError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
    reason: Option<String>,
}

/// What a single text frame means to the read loop.
#[derive(Debug, PartialEq)]
enum Frame {
    Envelope(SlackEnvelope),
    Refresh(String),
    Skip,
}

fn classify_frame(text: &str) -> Frame {
    if let Ok(control) = serde_json::from_str::<ControlFrame>(text) {
        if control.kind == "disconnect" {
            return Frame::Refresh(control.reason.unwrap_or_else(|| "unspecified".to_owned()));
        }
    }

    match parse_socket_message(text) {
        Ok(Some(envelope)) => Frame::Envelope(envelope),
        Ok(None) => Frame::Skip,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.frame_rejected",
                error = %error,
                "dropping unparseable socket mode frame"
            );
            Frame::Skip
        }
    }
}

fn socket_url(response: ConnectionsOpen) -> Result<String, TransportError> {
    if !response.ok {
        let reason = response.error.as_deref().unwrap_or("unknown_error");
        return Err(TransportError::Connect(format!("apps.connections.open: {reason}")));
    }
    response
        .url
        .filter(|url| url.starts_with("wss://") || url.starts_with("ws://"))
        .ok_or_else(|| {
            TransportError::Connect("apps.connections.open returned no socket url".to_owned())
        })
}

pub struct WebSocketTransport {
    http: Client,
    base_url: String,
    app_token: SecretString,
    reader: Mutex<Option<SplitStream<Socket>>>,
    writer: Mutex<Option<SplitSink<Socket, Message>>>,
}

impl WebSocketTransport {
    pub fn from_config(config: &SlackConfig) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            app_token: config.app_token.clone(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        })
    }

    async fn open_url(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .post(format!("{}/apps.connections.open", self.base_url))
            .bearer_auth(self.app_token.expose_secret())
            .send()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "apps.connections.open returned HTTP {}",
                response.status()
            )));
        }

        let body: ConnectionsOpen = response
            .json()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        socket_url(body)
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self.open_url().await?;
        let (socket, _) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        let (writer, reader) = socket.split();
        *self.writer.lock().await = Some(writer);
        *self.reader.lock().await = Some(reader);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("socket is not connected".to_owned()))?;

        loop {
            let message = match reader.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("socket closed".to_owned())),
            };

            match message {
                Message::Text(text) => match classify_frame(&text) {
                    Frame::Envelope(envelope) => return Ok(Some(envelope)),
                    Frame::Refresh(reason) => return Err(TransportError::Refresh(reason)),
                    Frame::Skip => {}
                },
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .unwrap_or_else(|| "no reason".to_owned());
                    return Err(TransportError::Receive(format!("socket closed: {reason}")));
                }
                // Pongs to server pings are queued by tungstenite while reading.
                other => debug!(frame = ?other, "ignoring non-text socket frame"),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("socket is not connected".to_owned()))?;
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        writer
            .send(Message::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.reader.lock().await.take();
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        info!(event_name = "ingress.slack.socket_closed", "closing socket mode connection");
        writer.close().await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
