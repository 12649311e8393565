use thiserror::Error;

use crate::domain::{queue::QueueError, request::TransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("{0} is required")]
    MissingArgument(&'static str),
    #[error("request `{0}` not found")]
    RequestNotFound(String),
    #[error("queue `{0}` not found")]
    QueueNotFound(String),
    #[error("user `{actor_id}` is not authorized to {action}")]
    Unauthorized { actor_id: String, action: String },
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("request `{0}` was changed by someone else; reload it and try again")]
    ConcurrentUpdate(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<QueueError> for ApplicationError {
    fn from(value: QueueError) -> Self {
        Self::Domain(DomainError::Queue(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The request or queue you referenced does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Operator-facing detail; safe to echo back to the acting user in chat.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::MissingArgument(_)
            | ApplicationError::InvalidTransition(_)
            | ApplicationError::ConcurrentUpdate(_)
            | ApplicationError::Domain(_) => Self::BadRequest { message, correlation_id },
            ApplicationError::Unauthorized { .. } => Self::Forbidden { message, correlation_id },
            ApplicationError::RequestNotFound(_) | ApplicationError::QueueNotFound(_) => {
                Self::NotFound { message, correlation_id }
            }
            ApplicationError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::queue::QueueError;
    use crate::domain::request::{RequestStatus, TransitionError};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvalidRecipient(
            "user recipient requires a non-empty id".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn transition_error_keeps_its_detail() {
        let interface = ApplicationError::from(TransitionError::InvalidStateForComplete {
            status: RequestStatus::Pending,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.message(), "request cannot be completed while pending");
    }

    #[test]
    fn queue_error_lifts_through_domain_error() {
        let error = ApplicationError::from(QueueError::CannotRemoveCreator {
            user_id: "U1".to_owned(),
        });
        assert!(matches!(error, ApplicationError::Domain(DomainError::Queue(_))));
    }

    #[test]
    fn unauthorized_maps_to_forbidden() {
        let interface = ApplicationError::Unauthorized {
            actor_id: "U3".to_owned(),
            action: "accept this request".to_owned(),
        }
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.message(), "user `U3` is not authorized to accept this request");
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn missing_entities_map_to_not_found() {
        let interface = ApplicationError::QueueNotFound("Q9".to_owned()).into_interface("req-4");
        assert!(matches!(interface, InterfaceError::NotFound { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn concurrent_update_asks_the_user_to_retry() {
        let interface = ApplicationError::ConcurrentUpdate("R1".to_owned()).into_interface("req-7");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(
            interface.message(),
            "request `R1` was changed by someone else; reload it and try again"
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid app token".to_owned()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
