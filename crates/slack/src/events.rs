use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use requesty_core::authorization::RequestAction;
use requesty_core::errors::InterfaceError;

use crate::{
    blocks::{self, MessageTemplate, ACCEPT_ACTION_ID, COMPLETE_ACTION_ID, REJECT_ACTION_ID},
    commands::{
        normalize_request_command, CommandEnvelope, CommandParseError, CommandRouteError,
        CommandRouter, RequestCommandService, SlashCommandPayload,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn response_url(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => payload.response_url.as_deref(),
            Self::BlockAction(event) => event.response_url.as_deref(),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    BlockAction,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: Option<String>,
    pub user_id: String,
    pub action_id: String,
    pub value: Option<String>,
    pub response_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("block action `{action_id}` carried no request id")]
    MissingActionValue { action_id: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed slack payload: {0}")]
    Malformed(String),
    #[error("slack payload is missing `{0}`")]
    MissingField(&'static str),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers the slash command and button handlers over one command service.
pub fn request_dispatcher<S>(service: S) -> EventDispatcher
where
    S: RequestCommandService + Clone + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service.clone()));
    dispatcher.register(BlockActionHandler::new(service));
    dispatcher
}

/// Renders a service failure for the acting user. Storage and internal
/// failures keep their detail out of chat.
pub fn interface_error_message(error: &InterfaceError) -> MessageTemplate {
    let summary = match error {
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            error.user_message().to_owned()
        }
        _ => format!("{} {}", error.user_message(), error.message()),
    };
    blocks::error_message(&summary, error.correlation_id())
}

async fn route_to_result<S>(
    router: &CommandRouter<S>,
    envelope: CommandEnvelope,
) -> Result<HandlerResult, EventHandlerError>
where
    S: RequestCommandService,
{
    let correlation_id = envelope.request_id.clone();
    match router.route(envelope).await {
        Ok(message) => Ok(HandlerResult::Responded(message)),
        Err(CommandRouteError::Interface(error)) => {
            warn!(
                event_name = "ingress.slack.command_failed",
                correlation_id = %correlation_id,
                error = %error,
                "request command failed"
            );
            Ok(HandlerResult::Responded(interface_error_message(&error)))
        }
    }
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: RequestCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: RequestCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let normalized = normalize_request_command(payload.clone())?;
        route_to_result(&self.router, normalized).await
    }
}

pub fn request_action_for(action_id: &str) -> Option<RequestAction> {
    match action_id {
        ACCEPT_ACTION_ID => Some(RequestAction::Accept),
        REJECT_ACTION_ID => Some(RequestAction::Reject),
        COMPLETE_ACTION_ID => Some(RequestAction::Complete),
        _ => None,
    }
}

/// Handles the request card buttons. Rejecting needs a reason, which a button
/// cannot carry, so the reject button answers with the command to run.
pub struct BlockActionHandler<S> {
    router: CommandRouter<S>,
}

impl<S> BlockActionHandler<S>
where
    S: RequestCommandService,
{
    pub fn new(service: S) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: RequestCommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(action) = request_action_for(&event.action_id) else {
            return Ok(HandlerResult::Ignored);
        };
        let request_id = event
            .value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| EventHandlerError::MissingActionValue {
                action_id: event.action_id.clone(),
            })?;

        if action == RequestAction::Reject {
            return Ok(HandlerResult::Responded(blocks::notice_message(format!(
                "A reason is required to reject `{request_id}`. Run `/request reject {request_id} <reason>`."
            ))));
        }

        let command = CommandEnvelope {
            verb: action.as_str().to_owned(),
            args: request_id.to_owned(),
            channel_id: event.channel_id.clone(),
            user_id: event.user_id.clone(),
            trigger_id: event.message_ts.clone().unwrap_or_default(),
            request_id: ctx.correlation_id.clone(),
        };
        route_to_result(&self.router, command).await
    }
}

#[derive(Debug, Deserialize)]
struct SlashCommandFields {
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    trigger_id: String,
    response_url: Option<String>,
}

impl SlashCommandFields {
    fn into_payload(self, correlation_id: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: self.command,
            text: self.text,
            channel_id: self.channel_id,
            user_id: self.user_id,
            trigger_id: self.trigger_id,
            request_id: correlation_id.to_owned(),
            response_url: self.response_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InteractionContainer {
    message_ts: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionAction {
    action_id: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    user: IdRef,
    channel: Option<IdRef>,
    container: Option<InteractionContainer>,
    #[serde(default)]
    actions: Vec<InteractionAction>,
    response_url: Option<String>,
}

impl InteractionPayload {
    fn into_event(self) -> Result<SlackEvent, PayloadError> {
        if self.kind != "block_actions" {
            return Ok(SlackEvent::Unsupported { event_type: self.kind });
        }

        let action = self.actions.into_iter().next().ok_or(PayloadError::MissingField("actions"))?;
        let container_channel = self.container.as_ref().and_then(|c| c.channel_id.clone());
        let channel_id = self
            .channel
            .map(|channel| channel.id)
            .or(container_channel)
            .ok_or(PayloadError::MissingField("channel"))?;

        Ok(SlackEvent::BlockAction(BlockActionEvent {
            channel_id,
            message_ts: self.container.and_then(|container| container.message_ts),
            user_id: self.user.id,
            action_id: action.action_id,
            value: action.value,
            response_url: self.response_url,
        }))
    }
}

fn form_to_json(body: &[u8]) -> serde_json::Value {
    let map = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), serde_json::Value::String(value.into_owned())))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

/// Parses the `application/x-www-form-urlencoded` body Slack posts for a
/// slash command.
pub fn parse_slash_command_form(
    body: &[u8],
    correlation_id: &str,
) -> Result<SlashCommandPayload, PayloadError> {
    let fields: SlashCommandFields = serde_json::from_value(form_to_json(body))
        .map_err(|error| PayloadError::Malformed(error.to_string()))?;
    Ok(fields.into_payload(correlation_id))
}

/// Parses an interactivity callback, whose JSON document arrives in the
/// `payload` form field.
pub fn parse_interaction_form(body: &[u8]) -> Result<SlackEvent, PayloadError> {
    let raw = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
        .ok_or(PayloadError::MissingField("payload"))?;
    let payload: InteractionPayload =
        serde_json::from_str(&raw).map_err(|error| PayloadError::Malformed(error.to_string()))?;
    payload.into_event()
}

#[derive(Debug, Deserialize)]
struct SocketMessage {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    payload: Option<serde_json::Value>,
}

/// Parses one Socket Mode frame. Control frames (`hello`, `disconnect`) carry
/// no envelope and yield `None`.
pub fn parse_socket_message(text: &str) -> Result<Option<SlackEnvelope>, PayloadError> {
    let message: SocketMessage =
        serde_json::from_str(text).map_err(|error| PayloadError::Malformed(error.to_string()))?;
    let Some(envelope_id) = message.envelope_id else {
        return Ok(None);
    };
    let payload = message.payload.ok_or(PayloadError::MissingField("payload"))?;
    let malformed = |error: serde_json::Error| PayloadError::Malformed(error.to_string());

    let event = match message.kind.as_str() {
        "slash_commands" => {
            let fields: SlashCommandFields = serde_json::from_value(payload).map_err(malformed)?;
            SlackEvent::SlashCommand(fields.into_payload(&envelope_id))
        }
        "interactive" => {
            let interaction: InteractionPayload =
                serde_json::from_value(payload).map_err(malformed)?;
            interaction.into_event()?
        }
        other => SlackEvent::Unsupported { event_type: other.to_owned() },
    };

    Ok(Some(SlackEnvelope { envelope_id, event }))
}
