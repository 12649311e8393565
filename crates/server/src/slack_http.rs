//! Signed HTTP endpoints for Slack slash commands and interactivity.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use requesty_slack::blocks::{self, MessageTemplate};
use requesty_slack::events::{
    parse_interaction_form, parse_slash_command_form, EventContext, EventDispatcher,
    HandlerResult, SlackEnvelope, SlackEvent,
};
use requesty_slack::signature::{
    SignatureError, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use requesty_slack::socket::ResponseSink;

#[derive(Clone)]
pub struct SlackHttpState {
    dispatcher: Arc<EventDispatcher>,
    verifier: SignatureVerifier,
    responder: Arc<dyn ResponseSink>,
}

impl SlackHttpState {
    pub fn new(
        dispatcher: EventDispatcher,
        verifier: SignatureVerifier,
        responder: Arc<dyn ResponseSink>,
    ) -> Self {
        Self { dispatcher: Arc::new(dispatcher), verifier, responder }
    }
}

pub fn router(state: SlackHttpState) -> Router {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .route("/slack/interactions", post(interaction))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or_default()
}

fn verify(state: &SlackHttpState, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    state.verifier.verify(
        header(headers, TIMESTAMP_HEADER),
        header(headers, SIGNATURE_HEADER),
        body,
        Utc::now().timestamp(),
    )
}

fn unauthorized(correlation_id: &str, error: &SignatureError) -> Response {
    warn!(
        event_name = "ingress.slack.signature_rejected",
        correlation_id = %correlation_id,
        error = %error,
        "rejected unsigned slack request"
    );
    StatusCode::UNAUTHORIZED.into_response()
}

/// Slash command replies are returned in the response body, which Slack shows
/// to the invoking user only.
fn ephemeral(message: &MessageTemplate) -> Response {
    match serde_json::to_value(message) {
        Ok(mut body) => {
            body["response_type"] = Value::String("ephemeral".to_owned());
            Json(body).into_response()
        }
        Err(encode_error) => {
            error!(error = %encode_error, "failed to encode slack reply");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn slash_command(
    State(state): State<SlackHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Err(signature_error) = verify(&state, &headers, &body) {
        return unauthorized(&correlation_id, &signature_error);
    }

    let payload = match parse_slash_command_form(&body, &correlation_id) {
        Ok(payload) => payload,
        Err(payload_error) => {
            warn!(
                event_name = "ingress.slack.payload_rejected",
                correlation_id = %correlation_id,
                error = %payload_error,
                "malformed slash command body"
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!(
        event_name = "ingress.slack.command_received",
        correlation_id = %correlation_id,
        actor_id = %payload.user_id,
        command = %payload.command,
        "received slash command over http"
    );

    let envelope = SlackEnvelope {
        envelope_id: correlation_id.clone(),
        event: SlackEvent::SlashCommand(payload),
    };
    let context = EventContext { correlation_id: correlation_id.clone() };
    match state.dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(message)) => ephemeral(&message),
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => StatusCode::OK.into_response(),
        Err(dispatch_error) => {
            warn!(
                correlation_id = %correlation_id,
                error = %dispatch_error,
                "slash command dispatch failed"
            );
            ephemeral(&blocks::error_message(&dispatch_error.to_string(), &correlation_id))
        }
    }
}

/// Acknowledges at once and delivers the reply through `response_url`, since
/// a transition may take longer than Slack's three second window.
pub async fn interaction(
    State(state): State<SlackHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Err(signature_error) = verify(&state, &headers, &body) {
        return unauthorized(&correlation_id, &signature_error);
    }

    let event = match parse_interaction_form(&body) {
        Ok(event) => event,
        Err(payload_error) => {
            warn!(
                event_name = "ingress.slack.payload_rejected",
                correlation_id = %correlation_id,
                error = %payload_error,
                "malformed interaction body"
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let envelope = SlackEnvelope { envelope_id: correlation_id, event };
    tokio::spawn(dispatch_interaction(state, envelope));
    StatusCode::OK.into_response()
}

async fn dispatch_interaction(state: SlackHttpState, envelope: SlackEnvelope) {
    let correlation_id = envelope.envelope_id.clone();
    let context = EventContext { correlation_id: correlation_id.clone() };
    let message = match state.dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(message)) => message,
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => return,
        Err(dispatch_error) => {
            warn!(
                correlation_id = %correlation_id,
                error = %dispatch_error,
                "interaction dispatch failed"
            );
            blocks::error_message(&dispatch_error.to_string(), &correlation_id)
        }
    };

    let Some(response_url) = envelope.event.response_url() else {
        debug!(correlation_id = %correlation_id, "interaction carried no response_url");
        return;
    };
    if let Err(delivery_error) = state.responder.respond(response_url, &message).await {
        warn!(
            event_name = "egress.slack.response_failed",
            correlation_id = %correlation_id,
            error = %delivery_error,
            "failed to deliver interaction reply"
        );
    }
}
