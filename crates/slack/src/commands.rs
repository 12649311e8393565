use async_trait::async_trait;
use thiserror::Error;

use requesty_core::authorization::RequestAction;
use requesty_core::domain::recipient::RequestRecipient;
use requesty_core::domain::request::RequestStatus;
use requesty_core::errors::InterfaceError;

use crate::blocks::{self, MessageTemplate};

pub const SLASH_COMMAND: &str = "/request";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    pub request_id: String,
    pub response_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub verb: String,
    pub args: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
    /// Correlation id of the inbound interaction, echoed in error messages.
    pub request_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestListing {
    /// Requests the caller created.
    Mine,
    /// Requests addressed to the caller directly or accepted by them.
    Inbox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueRole {
    Admin,
    Member,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RosterOp {
    Add,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestCommand {
    New { recipient: RequestRecipient, title: String, description: String },
    List { listing: RequestListing },
    Show { request_id: String },
    Respond { action: RequestAction, request_id: String, reason: Option<String> },
    Queues,
    Queue { queue_id: String, statuses: Vec<RequestStatus> },
    NewQueue { name: String, description: String },
    Roster { role: QueueRole, op: RosterOp, queue_id: String, user_id: String },
    Help,
    Usage { usage: &'static str },
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

pub fn normalize_request_command(
    payload: SlashCommandPayload,
) -> Result<CommandEnvelope, CommandParseError> {
    if payload.command != SLASH_COMMAND {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let text = payload.text.trim();
    let (verb, args) = match text.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None if text.is_empty() => ("help", ""),
        None => (text, ""),
    };

    Ok(CommandEnvelope {
        verb: verb.to_ascii_lowercase(),
        args: args.to_owned(),
        channel_id: payload.channel_id,
        user_id: payload.user_id,
        trigger_id: payload.trigger_id,
        request_id: payload.request_id,
    })
}

const NEW_USAGE: &str = "/request new <@user|#channel|queue:ID> <title> [| description]";
const SHOW_USAGE: &str = "/request show <request-id>";
const ACCEPT_USAGE: &str = "/request accept <request-id>";
const REJECT_USAGE: &str = "/request reject <request-id> <reason>";
const COMPLETE_USAGE: &str = "/request complete <request-id>";
const QUEUE_USAGE: &str = "/request queue <queue-id> [pending,accepted,rejected,completed]";
const NEW_QUEUE_USAGE: &str = "/request new-queue <name> [| description]";
const ADMIN_USAGE: &str = "/request admin add|remove <queue-id> <@user>";
const MEMBER_USAGE: &str = "/request member add|remove <queue-id> <@user>";

fn classify(verb: &str, args: &str) -> RequestCommand {
    let usage = |usage| RequestCommand::Usage { usage };

    match verb {
        "new" | "create" => {
            let Some((token, rest)) = args.split_once(char::is_whitespace) else {
                return usage(NEW_USAGE);
            };
            let Some(recipient) = parse_recipient_token(token) else {
                return usage(NEW_USAGE);
            };
            let (title, description) = split_description(rest);
            if title.is_empty() {
                return usage(NEW_USAGE);
            }
            RequestCommand::New { recipient, title, description }
        }
        "mine" => RequestCommand::List { listing: RequestListing::Mine },
        "inbox" => RequestCommand::List { listing: RequestListing::Inbox },
        "show" => match first_token(args) {
            Some(id) => RequestCommand::Show { request_id: id.to_owned() },
            None => usage(SHOW_USAGE),
        },
        "accept" => respond(RequestAction::Accept, args, ACCEPT_USAGE),
        "complete" => respond(RequestAction::Complete, args, COMPLETE_USAGE),
        "reject" => respond(RequestAction::Reject, args, REJECT_USAGE),
        "queues" => RequestCommand::Queues,
        "queue" => {
            let mut tokens = args.split_whitespace();
            let Some(queue_id) = tokens.next() else {
                return usage(QUEUE_USAGE);
            };
            let statuses = tokens
                .flat_map(|token| token.split(','))
                .filter(|token| !token.is_empty())
                .map(str::parse::<RequestStatus>)
                .collect::<Result<Vec<_>, _>>();
            match statuses {
                Ok(statuses) => RequestCommand::Queue { queue_id: queue_id.to_owned(), statuses },
                Err(_) => usage(QUEUE_USAGE),
            }
        }
        "new-queue" => {
            let (name, description) = split_description(args);
            if name.is_empty() {
                return usage(NEW_QUEUE_USAGE);
            }
            RequestCommand::NewQueue { name, description }
        }
        "admin" => roster(QueueRole::Admin, args, ADMIN_USAGE),
        "member" => roster(QueueRole::Member, args, MEMBER_USAGE),
        "help" => RequestCommand::Help,
        _ => RequestCommand::Unknown { verb: verb.to_owned() },
    }
}

fn respond(action: RequestAction, args: &str, usage: &'static str) -> RequestCommand {
    let (id, rest) = match args.split_once(char::is_whitespace) {
        Some((id, rest)) => (id, rest.trim()),
        None => (args, ""),
    };
    if id.is_empty() {
        return RequestCommand::Usage { usage };
    }

    let reason = match action {
        RequestAction::Reject if rest.is_empty() => return RequestCommand::Usage { usage },
        RequestAction::Reject => Some(rest.to_owned()),
        RequestAction::Accept | RequestAction::Complete => None,
    };
    RequestCommand::Respond { action, request_id: id.to_owned(), reason }
}

fn roster(role: QueueRole, args: &str, usage: &'static str) -> RequestCommand {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [op, queue_id, user] = tokens.as_slice() else {
        return RequestCommand::Usage { usage };
    };
    let op = match op.to_ascii_lowercase().as_str() {
        "add" => RosterOp::Add,
        "remove" | "rm" => RosterOp::Remove,
        _ => return RequestCommand::Usage { usage },
    };
    match parse_user_token(user) {
        Some(user_id) => RequestCommand::Roster {
            role,
            op,
            queue_id: (*queue_id).to_owned(),
            user_id,
        },
        None => RequestCommand::Usage { usage },
    }
}

fn first_token(args: &str) -> Option<&str> {
    args.split_whitespace().next()
}

fn split_description(text: &str) -> (String, String) {
    match text.split_once('|') {
        Some((head, tail)) => (head.trim().to_owned(), tail.trim().to_owned()),
        None => (text.trim().to_owned(), String::new()),
    }
}

/// Accepts Slack mention escapes (`<@U1>`, `<@U1|name>`, `<#C1|name>`) and
/// explicit `kind:id` tokens.
pub fn parse_recipient_token(token: &str) -> Option<RequestRecipient> {
    if let Some(inner) = token.strip_prefix("<@").and_then(|rest| rest.strip_suffix('>')) {
        return non_empty(escape_id(inner)).map(RequestRecipient::user);
    }
    if let Some(inner) = token.strip_prefix("<#").and_then(|rest| rest.strip_suffix('>')) {
        return non_empty(escape_id(inner)).map(RequestRecipient::channel);
    }

    let (kind, id) = token.split_once(':')?;
    RequestRecipient::parse(kind, id).ok()
}

pub fn parse_user_token(token: &str) -> Option<String> {
    let id = match token.strip_prefix("<@").and_then(|rest| rest.strip_suffix('>')) {
        Some(inner) => escape_id(inner),
        None => token.trim_start_matches('@'),
    };
    non_empty(id).map(str::to_owned)
}

fn escape_id(inner: &str) -> &str {
    inner.split('|').next().unwrap_or(inner).trim()
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: RequestCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn route(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        match classify(&envelope.verb, &envelope.args) {
            RequestCommand::New { recipient, title, description } => {
                self.service.create_request(recipient, title, description, &envelope).await
            }
            RequestCommand::List { listing } => {
                self.service.list_requests(listing, &envelope).await
            }
            RequestCommand::Show { request_id } => {
                self.service.show_request(&request_id, &envelope).await
            }
            RequestCommand::Respond { action, request_id, reason } => {
                self.service.respond(action, &request_id, reason, &envelope).await
            }
            RequestCommand::Queues => self.service.list_queues(&envelope).await,
            RequestCommand::Queue { queue_id, statuses } => {
                self.service.show_queue(&queue_id, &statuses, &envelope).await
            }
            RequestCommand::NewQueue { name, description } => {
                self.service.create_queue(name, description, &envelope).await
            }
            RequestCommand::Roster { role, op, queue_id, user_id } => {
                self.service.update_roster(role, op, &queue_id, &user_id, &envelope).await
            }
            RequestCommand::Help => Ok(blocks::help_message()),
            RequestCommand::Usage { usage } => Ok(blocks::error_message(
                &format!("Usage: `{usage}`"),
                &envelope.request_id,
            )),
            RequestCommand::Unknown { verb } => Ok(blocks::error_message(
                &format!("Unsupported command `/request {verb}`. Try `/request help`."),
                &envelope.request_id,
            )),
        }
    }
}

/// Backend for `/request`. Implementations translate to the core services and
/// render the result as a Block Kit message.
#[async_trait]
pub trait RequestCommandService: Send + Sync {
    async fn create_request(
        &self,
        recipient: RequestRecipient,
        title: String,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn list_requests(
        &self,
        listing: RequestListing,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn show_request(
        &self,
        request_id: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn respond(
        &self,
        action: RequestAction,
        request_id: &str,
        reason: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn list_queues(&self, envelope: &CommandEnvelope)
        -> Result<MessageTemplate, CommandRouteError>;

    async fn show_queue(
        &self,
        queue_id: &str,
        statuses: &[RequestStatus],
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn create_queue(
        &self,
        name: String,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;

    async fn update_roster(
        &self,
        role: QueueRole,
        op: RosterOp,
        queue_id: &str,
        user_id: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError>;
}
