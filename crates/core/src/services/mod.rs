//! Application services: request intake, responses, and queue management.

pub mod intake;
pub mod queues;
pub mod response;

pub use intake::{NewRequest, RequestIntakeService};
pub use queues::{NewQueue, QueueService};
pub use response::RequestResponseService;

use uuid::Uuid;

use crate::errors::ApplicationError;

pub(crate) fn require(value: &str, name: &'static str) -> Result<(), ApplicationError> {
    if value.trim().is_empty() {
        return Err(ApplicationError::MissingArgument(name));
    }
    Ok(())
}

/// Short, typeable identifiers such as `REQ-3f9a1c07d2e4`.
pub(crate) fn next_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &raw[..12])
}
