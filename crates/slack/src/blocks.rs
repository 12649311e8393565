use serde::Serialize;

use requesty_core::authorization::Permissions;
use requesty_core::domain::queue::Queue;
use requesty_core::domain::recipient::{RecipientKind, RequestRecipient};
use requesty_core::domain::request::{Request, RequestStatus};

pub const ACCEPT_ACTION_ID: &str = "request.accept.v1";
pub const REJECT_ACTION_ID: &str = "request.reject.v1";
pub const COMPLETE_ACTION_ID: &str = "request.complete.v1";

/// Lists are cut off here; Slack rejects messages above fifty blocks.
pub const MAX_LISTED_ITEMS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { block_id: String, text: TextObject },
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
    Divider { block_id: String },
}

impl Block {
    pub fn block_id(&self) -> &str {
        match self {
            Self::Header { block_id, .. }
            | Self::Section { block_id, .. }
            | Self::Actions { block_id, .. }
            | Self::Context { block_id, .. }
            | Self::Divider { block_id } => block_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn find(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.block_id() == block_id)
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn header(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { block_id: block_id.into(), text: TextObject::plain(text) });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    /// Skipped entirely when the closure adds no buttons; Slack refuses empty
    /// actions blocks.
    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        let elements = builder.build();
        if !elements.is_empty() {
            self.blocks.push(Block::Actions { block_id: block_id.into(), elements });
        }
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(" "))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn recipient_mention(recipient: &RequestRecipient) -> String {
    match recipient.kind {
        RecipientKind::User => format!("<@{}>", recipient.id),
        RecipientKind::Channel => format!("<#{}>", recipient.id),
        RecipientKind::Queue => format!("queue `{}`", recipient.id),
    }
}

fn status_badge(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => ":hourglass_flowing_sand: Pending",
        RequestStatus::Accepted => ":raised_hand: Accepted",
        RequestStatus::Rejected => ":no_entry: Rejected",
        RequestStatus::Completed => ":white_check_mark: Completed",
    }
}

/// Interactive card for a single request. Buttons are shown only for the
/// transitions `permissions` allows and the current status can take.
pub fn request_card(request: &Request, permissions: Permissions) -> MessageTemplate {
    let id = request.id.0.as_str();
    let mut builder = MessageBuilder::new(format!("Request {id}: {}", request.title))
        .header("request.card.header.v1", request.title.clone())
        .section("request.card.summary.v1", |section| {
            let mut text = format!(
                "*From:* <@{}>\n*To:* {}\n*Status:* {}",
                request.created_by_id,
                recipient_mention(&request.recipient),
                status_badge(request.status)
            );
            if let Some(acceptor) = &request.accepted_by_id {
                text.push_str(&format!("\n*Accepted by:* <@{acceptor}>"));
            }
            if let Some(reason) = &request.rejection_reason {
                text.push_str(&format!("\n*Reason:* {reason}"));
            }
            section.mrkdwn(text);
        });

    if !request.description.is_empty() {
        builder = builder.section("request.card.description.v1", |section| {
            section.plain(request.description.clone());
        });
    }

    builder
        .actions("request.card.actions.v1", |actions| {
            if request.status == RequestStatus::Pending && permissions.can_accept {
                actions.button(
                    ButtonElement::new(ACCEPT_ACTION_ID, "Accept")
                        .style(ButtonStyle::Primary)
                        .value(id),
                );
            }
            if request.status == RequestStatus::Accepted && permissions.can_complete {
                actions.button(
                    ButtonElement::new(COMPLETE_ACTION_ID, "Complete")
                        .style(ButtonStyle::Primary)
                        .value(id),
                );
            }
            if !request.status.is_terminal() && permissions.can_reject {
                actions.button(
                    ButtonElement::new(REJECT_ACTION_ID, "Reject")
                        .style(ButtonStyle::Danger)
                        .value(id),
                );
            }
        })
        .context("request.card.context.v1", |context| {
            context.mrkdwn(format!(
                "`{id}` · opened {}",
                request.created_at.format("%Y-%m-%d %H:%M UTC")
            ));
        })
        .build()
}

/// Card posted to recipients before anyone has acted. Responders are not known
/// yet, so Accept and Reject are offered and authorization happens on click.
/// Complete only makes sense once someone has accepted.
pub fn new_request_notification(request: &Request) -> MessageTemplate {
    request_card(request, Permissions { can_accept: true, can_reject: true, can_complete: false })
}

pub fn request_list_message(title: &str, requests: &[Request]) -> MessageTemplate {
    if requests.is_empty() {
        return MessageBuilder::new(title.to_owned())
            .section("request.list.header.v1", |section| {
                section.mrkdwn(format!("*{title}*"));
            })
            .section("request.list.empty.v1", |section| {
                section.plain("Nothing here yet.");
            })
            .build();
    }

    let lines = requests
        .iter()
        .take(MAX_LISTED_ITEMS)
        .map(|request| {
            format!(
                "• `{}` *{}* → {} · {}",
                request.id,
                request.title,
                recipient_mention(&request.recipient),
                request.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new(title.to_owned())
        .section("request.list.header.v1", |section| {
            section.mrkdwn(format!("*{title}*"));
        })
        .section("request.list.items.v1", |section| {
            section.mrkdwn(lines);
        })
        .context("request.list.context.v1", |context| {
            context.plain(format!(
                "Showing {} of {}. Use `/request show <id>` for details.",
                requests.len().min(MAX_LISTED_ITEMS),
                requests.len()
            ));
        })
        .build()
}

pub fn queue_list_message(queues: &[Queue]) -> MessageTemplate {
    let body = if queues.is_empty() {
        "No queues exist yet. Create one with `/request new-queue <name>`.".to_owned()
    } else {
        queues
            .iter()
            .take(MAX_LISTED_ITEMS)
            .map(|queue| {
                let channel =
                    queue.channel_id.as_deref().map(|c| format!(" in <#{c}>")).unwrap_or_default();
                format!(
                    "• `{}` *{}*{channel} · {} admins, {} members",
                    queue.id.0,
                    queue.name,
                    queue.admin_ids.len(),
                    queue.member_ids.len()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    MessageBuilder::new("Request queues")
        .section("queue.list.items.v1", |section| {
            section.mrkdwn(format!("*Queues*\n{body}"));
        })
        .build()
}

pub fn queue_detail_message(queue: &Queue, requests: &[Request]) -> MessageTemplate {
    let mentions = |ids: &std::collections::BTreeSet<String>| {
        if ids.is_empty() {
            "none".to_owned()
        } else {
            ids.iter().map(|id| format!("<@{id}>")).collect::<Vec<_>>().join(", ")
        }
    };
    let header = format!("Queue: {}", queue.name);

    let mut builder = MessageBuilder::new(header.clone())
        .header("queue.detail.header.v1", header)
        .section("queue.detail.people.v1", |section| {
            section.mrkdwn(format!(
                "*Admins:* {}\n*Members:* {}",
                mentions(&queue.admin_ids),
                mentions(&queue.member_ids)
            ));
        });

    if !queue.description.is_empty() {
        builder = builder.section("queue.detail.description.v1", |section| {
            section.plain(queue.description.clone());
        });
    }

    let listing = request_list_message("Requests", requests);
    builder = builder.divider("queue.detail.divider.v1");
    let mut template = builder.build();
    template.blocks.extend(listing.blocks);
    template
}

pub fn notice_message(text: impl Into<String>) -> MessageTemplate {
    let text = text.into();
    MessageBuilder::new(text.clone())
        .section("request.notice.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("request.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("request.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Request command help")
        .section("request.help.summary.v1", |section| {
            section.mrkdwn(
                "*Requests*\n\
                 • `/request new <@user|#channel|queue:ID> <title> [| description]`\n\
                 • `/request mine` · `/request inbox` · `/request show <id>`\n\
                 • `/request accept <id>` · `/request complete <id>`\n\
                 • `/request reject <id> <reason>`",
            );
        })
        .section("request.help.queues.v1", |section| {
            section.mrkdwn(
                "*Queues*\n\
                 • `/request queues` · `/request queue <id> [pending,accepted,...]`\n\
                 • `/request new-queue <name>`\n\
                 • `/request admin add|remove <queue> <@user>`\n\
                 • `/request member add|remove <queue> <@user>`",
            );
        })
        .build()
}

#[cfg(test)]
mod tests {
    use requesty_core::authorization::Permissions;
    use requesty_core::domain::queue::{Queue, QueueId};
    use requesty_core::domain::recipient::RequestRecipient;
    use requesty_core::domain::request::{Request, RequestId};

    use super::{
        error_message, new_request_notification, queue_detail_message, request_card,
        request_list_message, Block, ButtonStyle, MessageBuilder, TextObject, ACCEPT_ACTION_ID,
        COMPLETE_ACTION_ID, REJECT_ACTION_ID,
    };

    fn request() -> Request {
        Request::new(RequestId("REQ-1".to_owned()), "Laptop", "U1", RequestRecipient::user("U2"))
            .expect("valid")
    }

    fn action_ids(block: Option<&Block>) -> Vec<String> {
        match block {
            Some(Block::Actions { elements, .. }) => {
                elements.iter().map(|element| element.action_id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("request.summary.v1", |section| {
                section.mrkdwn("*Summary*");
            })
            .actions("request.summary.actions.v1", |actions| {
                actions.button(super::ButtonElement::new("request.confirm.v1", "Confirm"));
            })
            .actions("request.empty.actions.v1", |_| {})
            .build();

        assert_eq!(message.blocks.len(), 2, "empty actions block must be dropped");
        assert!(matches!(
            &message.blocks[0],
            Block::Section { block_id, text: TextObject::Mrkdwn { .. } } if block_id == "request.summary.v1"
        ));
    }

    #[test]
    fn pending_card_for_recipient_offers_accept_and_reject() {
        let permissions = Permissions { can_accept: true, can_reject: true, can_complete: false };
        let card = request_card(&request(), permissions);

        let actions = card.find("request.card.actions.v1");
        assert_eq!(action_ids(actions), vec![ACCEPT_ACTION_ID, REJECT_ACTION_ID]);
        if let Some(Block::Actions { elements, .. }) = actions {
            assert_eq!(elements[1].style, Some(ButtonStyle::Danger));
            assert_eq!(elements[0].value.as_deref(), Some("REQ-1"));
        }
    }

    #[test]
    fn accepted_card_offers_complete_to_acceptor() {
        let mut request = request();
        request.accept("U2").expect("accept");
        let permissions = Permissions { can_accept: false, can_reject: true, can_complete: true };

        let card = request_card(&request, permissions);
        assert_eq!(
            action_ids(card.find("request.card.actions.v1")),
            vec![COMPLETE_ACTION_ID, REJECT_ACTION_ID]
        );
        let summary = card.find("request.card.summary.v1");
        assert!(matches!(
            summary,
            Some(Block::Section { text: TextObject::Mrkdwn { text }, .. }) if text.contains("*Accepted by:* <@U2>")
        ));
    }

    #[test]
    fn terminal_or_unauthorized_cards_have_no_buttons() {
        let mut done = request();
        done.reject("duplicate").expect("reject");
        let everything = Permissions { can_accept: true, can_reject: true, can_complete: true };
        assert!(request_card(&done, everything).find("request.card.actions.v1").is_none());

        assert!(request_card(&request(), Permissions::default())
            .find("request.card.actions.v1")
            .is_none());
    }

    #[test]
    fn notification_card_serializes_as_block_kit() {
        let json = serde_json::to_value(new_request_notification(&request())).expect("serialize");
        assert_eq!(json["text"], "Request REQ-1: Laptop");
        assert_eq!(json["blocks"][0]["type"], "header");
        assert_eq!(json["blocks"][0]["text"]["type"], "plain_text");
        let actions = json["blocks"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|block| block["type"] == "actions"))
            .expect("actions block");
        assert_eq!(actions["elements"][0]["type"], "button");
        assert_eq!(actions["elements"][0]["action_id"], ACCEPT_ACTION_ID);
        let offered: Vec<&str> = actions["elements"]
            .as_array()
            .expect("elements")
            .iter()
            .filter_map(|element| element["action_id"].as_str())
            .collect();
        assert_eq!(offered, vec![ACCEPT_ACTION_ID, REJECT_ACTION_ID]);
    }

    #[test]
    fn request_list_handles_empty_and_populated() {
        let empty = request_list_message("Your requests", &[]);
        assert!(empty.find("request.list.empty.v1").is_some());

        let listed = request_list_message("Your requests", &[request()]);
        assert!(matches!(
            listed.find("request.list.items.v1"),
            Some(Block::Section { text, .. }) if text.text().contains("`REQ-1` *Laptop* → <@U2> · pending")
        ));
    }

    #[test]
    fn queue_detail_lists_people_and_requests() {
        let mut queue = Queue::new(QueueId("Q-1".to_owned()), "Facilities", "U1");
        queue.add_member("U4").expect("member");

        let message = queue_detail_message(&queue, &[]);
        assert!(matches!(
            message.find("queue.detail.people.v1"),
            Some(Block::Section { text, .. }) if text.text() == "*Admins:* <@U1>\n*Members:* <@U4>"
        ));
        assert!(message.find("request.list.empty.v1").is_some());
    }

    #[test]
    fn error_template_contains_correlation_id() {
        let message = error_message("Cannot process request", "req-123");
        assert!(matches!(
            message.find("request.error.context.v1"),
            Some(Block::Context { elements, .. })
                if matches!(elements.first(), Some(TextObject::Plain { text }) if text.contains("req-123"))
        ));
    }
}
