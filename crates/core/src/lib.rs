pub mod authorization;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod services;

pub use authorization::{AuthorizationContext, Permissions, RequestAction};
pub use domain::queue::{Queue, QueueError, QueueId};
pub use domain::recipient::{RecipientKind, RequestRecipient};
pub use domain::request::{Request, RequestId, RequestStatus, TransitionError};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ports::{
    DeliveryReceipt, Messenger, MessagingError, NotificationTarget, QueueRepository,
    RequestNotifier, RequestRepository, StorageError,
};
pub use services::{
    NewQueue, NewRequest, QueueService, RequestIntakeService, RequestResponseService,
};
