use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::domain::queue::QueueId;
use crate::domain::recipient::{RecipientKind, RequestRecipient};
use crate::domain::request::{Request, RequestId};
use crate::errors::ApplicationError;
use crate::ports::{NotificationTarget, QueueRepository, RequestNotifier, RequestRepository};
use crate::services::{next_id, require};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub created_by_id: String,
    pub recipient: RequestRecipient,
}

pub struct RequestIntakeService {
    requests: Arc<dyn RequestRepository>,
    queues: Arc<dyn QueueRepository>,
    notifier: Arc<dyn RequestNotifier>,
}

impl RequestIntakeService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        queues: Arc<dyn QueueRepository>,
        notifier: Arc<dyn RequestNotifier>,
    ) -> Self {
        Self { requests, queues, notifier }
    }

    /// Persists a new pending request and posts its card to the recipient.
    pub async fn create_request(&self, input: NewRequest) -> Result<Request, ApplicationError> {
        require(&input.title, "title")?;
        require(&input.created_by_id, "creator id")?;

        let mut request = Request::new(
            RequestId(next_id("REQ")),
            input.title.trim(),
            input.created_by_id,
            input.recipient,
        )?;
        request.description = input.description.trim().to_owned();

        let target = self.resolve_target(&request.recipient).await?;

        if let Err(storage_error) = self.requests.save(&request).await {
            error!(
                event_name = "request.intake.persist_failed",
                request_id = %request.id,
                error = %storage_error,
                "failed to save new request"
            );
            return Err(storage_error.into());
        }

        info!(
            event_name = "request.created",
            request_id = %request.id,
            created_by_id = %request.created_by_id,
            recipient_kind = %request.recipient.kind,
            recipient_id = %request.recipient.id,
            "request created"
        );

        match target {
            Some(target) => {
                if let Err(messaging_error) =
                    self.notifier.post_request_notification(&target, &request).await
                {
                    error!(
                        event_name = "request.notification.failed",
                        request_id = %request.id,
                        error = %messaging_error,
                        "failed to post new request card"
                    );
                }
            }
            None => debug!(
                request_id = %request.id,
                "queue has no channel attached; request card not posted"
            ),
        }

        Ok(request)
    }

    async fn resolve_target(
        &self,
        recipient: &RequestRecipient,
    ) -> Result<Option<NotificationTarget>, ApplicationError> {
        if recipient.kind != RecipientKind::Queue {
            return Ok(NotificationTarget::for_recipient(recipient));
        }

        let queue = self
            .queues
            .get_by_id(&QueueId(recipient.id.clone()))
            .await?
            .ok_or_else(|| ApplicationError::QueueNotFound(recipient.id.clone()))?;
        Ok(queue.channel_id.map(NotificationTarget::Channel))
    }
}
