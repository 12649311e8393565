use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use requesty_core::authorization::{Permissions, RequestAction};
use requesty_core::domain::recipient::{RecipientKind, RequestRecipient};
use requesty_core::domain::request::{Request, RequestStatus};
use requesty_core::errors::ApplicationError;
use requesty_core::services::{
    NewQueue, NewRequest, QueueService, RequestIntakeService, RequestResponseService,
};
use requesty_slack::blocks::{self, MessageTemplate};
use requesty_slack::commands::{
    CommandEnvelope, CommandRouteError, QueueRole, RequestCommandService, RequestListing,
    RosterOp,
};

/// Backs `/request` and the card buttons with the core services.
#[derive(Clone)]
pub struct RequestCommandHandler {
    intake: Arc<RequestIntakeService>,
    responses: Arc<RequestResponseService>,
    queues: Arc<QueueService>,
}

impl RequestCommandHandler {
    pub fn new(
        intake: Arc<RequestIntakeService>,
        responses: Arc<RequestResponseService>,
        queues: Arc<QueueService>,
    ) -> Self {
        Self { intake, responses, queues }
    }

    /// Requests addressed to the user, accepted by them, or still pending in
    /// one of their queues. Newest first, without duplicates.
    async fn inbox(&self, user_id: &str) -> Result<Vec<Request>, ApplicationError> {
        let mut requests =
            self.responses.list_recipient_requests(user_id, RecipientKind::User).await?;
        requests.extend(self.responses.list_accepted_requests(user_id).await?);
        for queue in self.queues.list_user_queues(user_id).await? {
            requests.extend(
                self.queues.get_queue_requests(&queue.id.0, &[RequestStatus::Pending]).await?,
            );
        }

        let mut seen = HashSet::new();
        requests.retain(|request| seen.insert(request.id.0.clone()));
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }
}

fn failed(envelope: &CommandEnvelope) -> impl FnOnce(ApplicationError) -> CommandRouteError {
    let correlation_id = envelope.request_id.clone();
    move |error| CommandRouteError::Interface(error.into_interface(correlation_id))
}

/// Buttons left for the actor once their own transition has gone through.
fn permissions_after(action: RequestAction) -> Permissions {
    match action {
        RequestAction::Accept => {
            Permissions { can_accept: false, can_reject: true, can_complete: true }
        }
        RequestAction::Reject | RequestAction::Complete => Permissions::default(),
    }
}

#[async_trait]
impl RequestCommandService for RequestCommandHandler {
    async fn create_request(
        &self,
        recipient: RequestRecipient,
        title: String,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let request = self
            .intake
            .create_request(NewRequest {
                title,
                description,
                created_by_id: envelope.user_id.clone(),
                recipient,
            })
            .await
            .map_err(failed(envelope))?;

        let mut message = blocks::notice_message(format!(
            ":incoming_envelope: Request `{}` sent to {}.",
            request.id,
            blocks::recipient_mention(&request.recipient)
        ));
        message.blocks.extend(blocks::request_card(&request, Permissions::default()).blocks);
        Ok(message)
    }

    async fn list_requests(
        &self,
        listing: RequestListing,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let (title, requests) = match listing {
            RequestListing::Mine => (
                "Requests you opened",
                self.responses.list_user_requests(&envelope.user_id).await,
            ),
            RequestListing::Inbox => ("Your inbox", self.inbox(&envelope.user_id).await),
        };
        let requests = requests.map_err(failed(envelope))?;
        debug!(
            correlation_id = %envelope.request_id,
            actor_id = %envelope.user_id,
            count = requests.len(),
            "rendering request listing"
        );
        Ok(blocks::request_list_message(title, &requests))
    }

    async fn show_request(
        &self,
        request_id: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let (request, permissions) = self
            .responses
            .request_permissions(request_id, &envelope.user_id)
            .await
            .map_err(failed(envelope))?;
        Ok(blocks::request_card(&request, permissions))
    }

    async fn respond(
        &self,
        action: RequestAction,
        request_id: &str,
        reason: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let actor_id = envelope.user_id.as_str();
        let outcome = match action {
            RequestAction::Accept => self.responses.accept_request(request_id, actor_id).await,
            RequestAction::Reject => {
                let reason = reason.unwrap_or_default();
                self.responses.reject_request(request_id, actor_id, &reason).await
            }
            RequestAction::Complete => self.responses.complete_request(request_id, actor_id).await,
        };
        let request = outcome.map_err(failed(envelope))?;

        let mut message = blocks::notice_message(format!(
            "You {} `{}`.",
            action.past_tense(),
            request.id
        ));
        message.blocks.extend(blocks::request_card(&request, permissions_after(action)).blocks);
        Ok(message)
    }

    async fn list_queues(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let queues = self.queues.list_queues().await.map_err(failed(envelope))?;
        Ok(blocks::queue_list_message(&queues))
    }

    async fn show_queue(
        &self,
        queue_id: &str,
        statuses: &[RequestStatus],
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let queue = self.queues.get_queue(queue_id).await.map_err(failed(envelope))?;
        let requests = self
            .queues
            .get_queue_requests(&queue.id.0, statuses)
            .await
            .map_err(failed(envelope))?;
        Ok(blocks::queue_detail_message(&queue, &requests))
    }

    async fn create_queue(
        &self,
        name: String,
        description: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let queue = self
            .queues
            .create_queue(NewQueue {
                name,
                description,
                channel_id: Some(envelope.channel_id.clone()),
                created_by_id: envelope.user_id.clone(),
                ..NewQueue::default()
            })
            .await
            .map_err(failed(envelope))?;

        Ok(blocks::notice_message(format!(
            "Queue *{}* created as `{}`. Send requests to it with `/request new queue:{} <title>`.",
            queue.name, queue.id.0, queue.id.0
        )))
    }

    async fn update_roster(
        &self,
        role: QueueRole,
        op: RosterOp,
        queue_id: &str,
        user_id: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let actor_id = envelope.user_id.as_str();
        let outcome = match (role, op) {
            (QueueRole::Admin, RosterOp::Add) => {
                self.queues.add_queue_admin(queue_id, user_id, actor_id).await
            }
            (QueueRole::Admin, RosterOp::Remove) => {
                self.queues.remove_queue_admin(queue_id, user_id, actor_id).await
            }
            (QueueRole::Member, RosterOp::Add) => {
                self.queues.add_queue_member(queue_id, user_id, actor_id).await
            }
            (QueueRole::Member, RosterOp::Remove) => {
                self.queues.remove_queue_member(queue_id, user_id, actor_id).await
            }
        };
        let queue = outcome.map_err(failed(envelope))?;

        let role = match role {
            QueueRole::Admin => "an admin",
            QueueRole::Member => "a member",
        };
        let text = match op {
            RosterOp::Add => format!("<@{user_id}> is now {role} of *{}*.", queue.name),
            RosterOp::Remove => format!("<@{user_id}> is no longer {role} of *{}*.", queue.name),
        };
        Ok(blocks::notice_message(text))
    }
}
