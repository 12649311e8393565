use std::collections::HashMap;

use tokio::sync::RwLock;

use requesty_core::domain::queue::{Queue, QueueId};
use requesty_core::domain::recipient::RecipientKind;
use requesty_core::domain::request::{Request, RequestId, RequestStatus};
use requesty_core::ports::{QueueRepository, RequestRepository, StorageError};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

impl InMemoryRequestRepository {
    async fn collect(&self, predicate: impl Fn(&Request) -> bool) -> Vec<Request> {
        let requests = self.requests.read().await;
        let mut found: Vec<Request> =
            requests.values().filter(|request| predicate(request)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn save(&self, request: &Request) -> Result<(), StorageError> {
        let mut requests = self.requests.write().await;
        if let Some(stored) = requests.get(&request.id.0) {
            if stored.version + 1 != request.version {
                return Err(StorageError::Conflict(request.id.0.clone()));
            }
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &RequestId) -> Result<Option<Request>, StorageError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn find_by_created_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError> {
        Ok(self.collect(|request| request.created_by_id == user_id).await)
    }

    async fn find_by_accepted_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError> {
        Ok(self.collect(|request| request.accepted_by_id.as_deref() == Some(user_id)).await)
    }

    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
    ) -> Result<Vec<Request>, StorageError> {
        self.find_by_recipient_and_statuses(recipient_id, kind, &[]).await
    }

    async fn find_by_recipient_and_statuses(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
        statuses: &[RequestStatus],
    ) -> Result<Vec<Request>, StorageError> {
        Ok(self
            .collect(|request| {
                request.recipient.id == recipient_id
                    && request.recipient.kind == kind
                    && (statuses.is_empty() || statuses.contains(&request.status))
            })
            .await)
    }
}

#[derive(Default)]
pub struct InMemoryQueueRepository {
    queues: RwLock<HashMap<String, Queue>>,
}

impl InMemoryQueueRepository {
    async fn collect(&self, predicate: impl Fn(&Queue) -> bool) -> Vec<Queue> {
        let queues = self.queues.read().await;
        let mut found: Vec<Queue> = queues.values().filter(|queue| predicate(queue)).cloned().collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

#[async_trait::async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn save(&self, queue: &Queue) -> Result<(), StorageError> {
        let mut queues = self.queues.write().await;
        queues.insert(queue.id.0.clone(), queue.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &QueueId) -> Result<Option<Queue>, StorageError> {
        let queues = self.queues.read().await;
        Ok(queues.get(&id.0).cloned())
    }

    async fn find_by_channel_id(&self, channel_id: &str) -> Result<Vec<Queue>, StorageError> {
        Ok(self.collect(|queue| queue.channel_id.as_deref() == Some(channel_id)).await)
    }

    async fn find_all(&self) -> Result<Vec<Queue>, StorageError> {
        Ok(self.collect(|_| true).await)
    }
}
