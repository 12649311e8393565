use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::queue::{Queue, QueueError, QueueId};
use crate::domain::recipient::RecipientKind;
use crate::domain::request::{Request, RequestStatus};
use crate::errors::ApplicationError;
use crate::ports::{QueueRepository, RequestRepository};
use crate::services::{next_id, require};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueue {
    pub name: String,
    pub description: String,
    pub channel_id: Option<String>,
    pub created_by_id: String,
    #[serde(default)]
    pub admin_ids: Vec<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueueMutation {
    AddAdmin,
    RemoveAdmin,
    AddMember,
    RemoveMember,
}

impl QueueMutation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::AddAdmin => "add_admin",
            Self::RemoveAdmin => "remove_admin",
            Self::AddMember => "add_member",
            Self::RemoveMember => "remove_member",
        }
    }

    fn apply(&self, queue: &mut Queue, user_id: &str) -> Result<(), QueueError> {
        match self {
            Self::AddAdmin => queue.add_admin(user_id),
            Self::RemoveAdmin => queue.remove_admin(user_id),
            Self::AddMember => queue.add_member(user_id),
            Self::RemoveMember => queue.remove_member(user_id),
        }
    }

    /// Members may leave a queue on their own; everything else needs an admin.
    fn is_permitted(&self, queue: &Queue, user_id: &str, actor_id: &str) -> bool {
        queue.can_be_modified_by(actor_id) || (*self == Self::RemoveMember && user_id == actor_id)
    }
}

pub struct QueueService {
    queues: Arc<dyn QueueRepository>,
    requests: Arc<dyn RequestRepository>,
}

impl QueueService {
    pub fn new(queues: Arc<dyn QueueRepository>, requests: Arc<dyn RequestRepository>) -> Self {
        Self { queues, requests }
    }

    pub async fn create_queue(&self, input: NewQueue) -> Result<Queue, ApplicationError> {
        require(&input.name, "queue name")?;
        require(&input.created_by_id, "creator id")?;

        let mut queue =
            Queue::new(QueueId(next_id("Q")), input.name.trim(), input.created_by_id.clone());
        queue.description = input.description.trim().to_owned();
        queue.channel_id = input.channel_id.filter(|channel| !channel.trim().is_empty());

        for admin_id in input.admin_ids.iter().filter(|id| **id != input.created_by_id) {
            if let Err(queue_error) = queue.add_admin(admin_id) {
                warn!(queue_id = %queue.id.0, user_id = %admin_id, error = %queue_error, "skipping admin");
            }
        }
        for member_id in &input.member_ids {
            if let Err(queue_error) = queue.add_member(member_id) {
                warn!(queue_id = %queue.id.0, user_id = %member_id, error = %queue_error, "skipping member");
            }
        }

        self.persist(&queue, "create").await?;
        info!(
            event_name = "queue.created",
            queue_id = %queue.id.0,
            created_by_id = %queue.created_by_id,
            channel_id = queue.channel_id.as_deref().unwrap_or(""),
            admin_count = queue.admin_ids.len(),
            "queue created"
        );
        Ok(queue)
    }

    pub async fn get_queue(&self, queue_id: &str) -> Result<Queue, ApplicationError> {
        require(queue_id, "queue id")?;
        self.queues
            .get_by_id(&QueueId(queue_id.to_owned()))
            .await?
            .ok_or_else(|| ApplicationError::QueueNotFound(queue_id.to_owned()))
    }

    pub async fn list_queues(&self) -> Result<Vec<Queue>, ApplicationError> {
        let queues = self.queues.find_all().await?;
        debug!(count = queues.len(), "listed queues");
        Ok(queues)
    }

    pub async fn list_queues_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Queue>, ApplicationError> {
        require(channel_id, "channel id")?;
        let queues = self.queues.find_by_channel_id(channel_id).await?;
        debug!(channel_id = %channel_id, count = queues.len(), "listed queues by channel");
        Ok(queues)
    }

    /// Queues the user can respond for, as admin or member.
    pub async fn list_user_queues(&self, user_id: &str) -> Result<Vec<Queue>, ApplicationError> {
        require(user_id, "user id")?;
        let queues = self.queues.find_all().await?;
        Ok(queues.into_iter().filter(|queue| queue.can_respond_to_requests(user_id)).collect())
    }

    /// Requests addressed to the queue; an empty `statuses` slice means all.
    pub async fn get_queue_requests(
        &self,
        queue_id: &str,
        statuses: &[RequestStatus],
    ) -> Result<Vec<Request>, ApplicationError> {
        require(queue_id, "queue id")?;
        let requests = self
            .requests
            .find_by_recipient_and_statuses(queue_id, RecipientKind::Queue, statuses)
            .await?;
        debug!(
            queue_id = %queue_id,
            status_count = statuses.len(),
            count = requests.len(),
            "listed queue requests"
        );
        Ok(requests)
    }

    pub async fn update_queue_details(
        &self,
        queue_id: &str,
        name: &str,
        description: &str,
        actor_id: &str,
    ) -> Result<Queue, ApplicationError> {
        require(name, "queue name")?;
        require(actor_id, "user id")?;
        let mut queue = self.get_queue(queue_id).await?;
        if !queue.can_be_modified_by(actor_id) {
            return Err(self.unauthorized(&queue, actor_id, "update"));
        }

        queue.rename(name.trim(), description.trim());
        self.persist(&queue, "update").await?;
        info!(event_name = "queue.updated", queue_id = %queue.id.0, actor_id = %actor_id, "queue updated");
        Ok(queue)
    }

    pub async fn add_queue_admin(
        &self,
        queue_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<Queue, ApplicationError> {
        self.mutate(queue_id, user_id, actor_id, QueueMutation::AddAdmin).await
    }

    pub async fn remove_queue_admin(
        &self,
        queue_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<Queue, ApplicationError> {
        self.mutate(queue_id, user_id, actor_id, QueueMutation::RemoveAdmin).await
    }

    pub async fn add_queue_member(
        &self,
        queue_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<Queue, ApplicationError> {
        self.mutate(queue_id, user_id, actor_id, QueueMutation::AddMember).await
    }

    pub async fn remove_queue_member(
        &self,
        queue_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<Queue, ApplicationError> {
        self.mutate(queue_id, user_id, actor_id, QueueMutation::RemoveMember).await
    }

    async fn mutate(
        &self,
        queue_id: &str,
        user_id: &str,
        actor_id: &str,
        mutation: QueueMutation,
    ) -> Result<Queue, ApplicationError> {
        require(user_id, "user id")?;
        require(actor_id, "requesting user id")?;
        let mut queue = self.get_queue(queue_id).await?;

        if !mutation.is_permitted(&queue, user_id, actor_id) {
            return Err(self.unauthorized(&queue, actor_id, mutation.as_str()));
        }

        mutation.apply(&mut queue, user_id)?;
        self.persist(&queue, mutation.as_str()).await?;

        info!(
            event_name = "queue.membership.changed",
            mutation = mutation.as_str(),
            queue_id = %queue.id.0,
            user_id = %user_id,
            actor_id = %actor_id,
            "queue membership changed"
        );
        Ok(queue)
    }

    fn unauthorized(&self, queue: &Queue, actor_id: &str, operation: &str) -> ApplicationError {
        warn!(
            event_name = "queue.modification.unauthorized",
            operation,
            queue_id = %queue.id.0,
            actor_id = %actor_id,
            "unauthorized attempt to modify queue"
        );
        ApplicationError::Unauthorized {
            actor_id: actor_id.to_owned(),
            action: format!("modify queue {}", queue.id.0),
        }
    }

    async fn persist(&self, queue: &Queue, operation: &str) -> Result<(), ApplicationError> {
        if let Err(storage_error) = self.queues.save(queue).await {
            error!(
                event_name = "queue.persist_failed",
                operation,
                queue_id = %queue.id.0,
                error = %storage_error,
                "failed to save queue"
            );
            return Err(storage_error.into());
        }
        Ok(())
    }
}
