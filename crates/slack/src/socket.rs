use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use requesty_core::ports::MessagingError;

use crate::blocks::MessageTemplate;
use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    /// The server asked for a fresh connection; not counted as a failure.
    #[error("server requested reconnect: {0}")]
    Refresh(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Posts a handler's reply back to the interaction's `response_url`.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn respond(
        &self,
        response_url: &str,
        message: &MessageTemplate,
    ) -> Result<(), MessagingError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    responder: Option<Arc<dyn ResponseSink>>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, responder: None, reconnect_policy }
    }

    pub fn with_responder(mut self, responder: Arc<dyn ResponseSink>) -> Self {
        self.responder = Some(responder);
        self
    }

    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut connected = false;
            let transport_error = match self.connect_and_pump(attempt, &mut connected).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => transport_error,
            };
            // A connection that came up and later dropped starts a fresh retry budget.
            if connected {
                attempt = 0;
            }

            if let TransportError::Refresh(reason) = &transport_error {
                info!(
                    event_name = "ingress.slack.refresh",
                    reason = %reason,
                    "socket mode connection refresh requested"
                );
                if let Err(error) = self.transport.disconnect().await {
                    debug!(error = %error, "closing refreshed socket failed");
                }
                continue;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %transport_error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        connected: &mut bool,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        *connected = true;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (actor_id, request_id) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                actor_id = actor_id.unwrap_or("unknown"),
                request_id = request_id.unwrap_or("unknown"),
                "received slack envelope"
            );

            // Slack retries any envelope not acknowledged within three seconds.
            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(message)) => {
                    self.deliver(&envelope, &message).await;
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        actor_id = actor_id.unwrap_or("unknown"),
                        request_id = request_id.unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            }
        }
    }

    async fn deliver(&self, envelope: &SlackEnvelope, message: &MessageTemplate) {
        let (Some(responder), Some(response_url)) =
            (self.responder.as_ref(), envelope.event.response_url())
        else {
            debug!(
                event_name = "ingress.slack.response_dropped",
                correlation_id = %envelope.envelope_id,
                "no response channel for handler reply"
            );
            return;
        };

        if let Err(error) = responder.respond(response_url, message).await {
            warn!(
                event_name = "ingress.slack.response_failed",
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to deliver handler reply"
            );
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::SlashCommand(payload) => (Some(payload.user_id.as_str()), None),
        SlackEvent::BlockAction(event) => (Some(event.user_id.as_str()), event.value.as_deref()),
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use requesty_core::ports::MessagingError;
    use tokio::sync::Mutex;

    use super::{ReconnectPolicy, ResponseSink, SocketModeRunner, SocketTransport, TransportError};
    use crate::blocks::MessageTemplate;
    use crate::commands::SlashCommandPayload;
    use crate::events::{BlockActionEvent, EventDispatcher, SlackEnvelope, SlackEvent};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        replies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn respond(
            &self,
            response_url: &str,
            message: &MessageTemplate,
        ) -> Result<(), MessagingError> {
            self.replies
                .lock()
                .await
                .push((response_url.to_owned(), message.fallback_text.clone()));
            Ok(())
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn refresh_requests_reconnect_without_spending_retries() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Refresh("refresh_requested".to_owned())),
                Err(TransportError::Refresh("warning".to_owned())),
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-3".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(0));

        runner.start().await.expect("runner");

        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.acknowledgements().await, vec!["env-3"]);
        assert_eq!(transport.disconnect_calls().await, 3);
    }

    #[tokio::test]
    async fn dropped_connection_gets_a_fresh_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(()), Ok(())],
            vec![
                Err(TransportError::Receive("socket closed".to_owned())),
                Err(TransportError::Receive("socket closed".to_owned())),
                Ok(None),
            ],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(1));

        runner.start().await.expect("runner");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner =
            SocketModeRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handler_replies_are_posted_to_response_url() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(SlackEnvelope {
                envelope_id: "env-7".to_owned(),
                event: SlackEvent::SlashCommand(SlashCommandPayload {
                    command: "/request".to_owned(),
                    text: "help".to_owned(),
                    channel_id: "C1".to_owned(),
                    user_id: "U1".to_owned(),
                    trigger_id: "T1".to_owned(),
                    request_id: "env-7".to_owned(),
                    response_url: Some("https://hooks.slack.test/commands/7".to_owned()),
                }),
            }))],
        ));
        let sink = Arc::new(RecordingSink::default());

        #[derive(Clone)]
        struct HelpOnly;

        #[async_trait]
        impl crate::events::EventHandler for HelpOnly {
            fn event_type(&self) -> crate::events::SlackEventType {
                crate::events::SlackEventType::SlashCommand
            }

            async fn handle(
                &self,
                _envelope: &SlackEnvelope,
                _ctx: &crate::events::EventContext,
            ) -> Result<crate::events::HandlerResult, crate::events::EventHandlerError> {
                Ok(crate::events::HandlerResult::Responded(crate::blocks::help_message()))
            }
        }

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(HelpOnly);
        let runner = SocketModeRunner::new(transport, dispatcher, no_delay(0))
            .with_responder(sink.clone());

        runner.start().await.expect("runner");

        let replies = sink.replies.lock().await;
        assert_eq!(
            *replies,
            vec![(
                "https://hooks.slack.test/commands/7".to_owned(),
                "Request command help".to_owned()
            )]
        );
    }

    #[test]
    fn extracts_actor_and_request_correlation_fields() {
        let envelope = SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::BlockAction(BlockActionEvent {
                channel_id: "C1".to_owned(),
                message_ts: None,
                user_id: "U1".to_owned(),
                action_id: crate::blocks::ACCEPT_ACTION_ID.to_owned(),
                value: Some("REQ-9".to_owned()),
                response_url: None,
            }),
        };

        let (actor_id, request_id) = super::correlation_fields(&envelope);
        assert_eq!(actor_id, Some("U1"));
        assert_eq!(request_id, Some("REQ-9"));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }
}
