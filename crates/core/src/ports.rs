//! Collaborator traits the services depend on. Storage and chat adapters live
//! in `requesty-db` and `requesty-slack`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::queue::{Queue, QueueId};
use crate::domain::recipient::{RecipientKind, RequestRecipient};
use crate::domain::request::{Request, RequestId, RequestStatus};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    /// The stored row moved on since the caller loaded it.
    #[error("record `{0}` was modified concurrently")]
    Conflict(String),
}

impl From<StorageError> for ApplicationError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(id) => Self::ConcurrentUpdate(id),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("chat platform rejected the call: {0}")]
    Rejected(String),
    #[error("chat platform unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Inserts a new request, or replaces the stored one when `request.version`
    /// is exactly one past it. Any other version yields
    /// [`StorageError::Conflict`] and leaves the stored row untouched.
    async fn save(&self, request: &Request) -> Result<(), StorageError>;
    async fn get_by_id(&self, id: &RequestId) -> Result<Option<Request>, StorageError>;
    async fn find_by_created_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError>;
    async fn find_by_accepted_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError>;
    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
    ) -> Result<Vec<Request>, StorageError>;

    /// An empty `statuses` slice matches every status.
    async fn find_by_recipient_and_statuses(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
        statuses: &[RequestStatus],
    ) -> Result<Vec<Request>, StorageError>;
}

#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn save(&self, queue: &Queue) -> Result<(), StorageError>;
    async fn get_by_id(&self, id: &QueueId) -> Result<Option<Queue>, StorageError>;
    async fn find_by_channel_id(&self, channel_id: &str) -> Result<Vec<Queue>, StorageError>;
    async fn find_all(&self) -> Result<Vec<Queue>, StorageError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel_id: String,
    pub message_ts: String,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_direct_message(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, MessagingError>;

    async fn send_channel_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<String, MessagingError>;
}

/// Where an interactive request card is posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationTarget {
    DirectMessage(String),
    Channel(String),
}

impl NotificationTarget {
    /// Default destination for a freshly created request. Queue recipients
    /// resolve through the queue's channel, so they are handled by the caller.
    pub fn for_recipient(recipient: &RequestRecipient) -> Option<Self> {
        match recipient.kind {
            RecipientKind::User => Some(Self::DirectMessage(recipient.id.clone())),
            RecipientKind::Channel => Some(Self::Channel(recipient.id.clone())),
            RecipientKind::Queue => None,
        }
    }
}

#[async_trait]
pub trait RequestNotifier: Send + Sync {
    async fn post_request_notification(
        &self,
        target: &NotificationTarget,
        request: &Request,
    ) -> Result<DeliveryReceipt, MessagingError>;
}
