use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::recipient::RequestRecipient;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown request status `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("request cannot be accepted while {status}")]
    InvalidStateForAccept { status: RequestStatus },
    #[error("request cannot be rejected while {status}")]
    InvalidStateForReject { status: RequestStatus },
    #[error("request cannot be completed while {status}")]
    InvalidStateForComplete { status: RequestStatus },
    #[error("request creator `{user_id}` cannot accept their own request")]
    SelfAcceptanceForbidden { user_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub created_by_id: String,
    pub recipient: RequestRecipient,
    pub status: RequestStatus,
    pub accepted_by_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by every transition. Storage only accepts a save whose version
    /// is exactly one past the stored row.
    pub version: u32,
}

impl Request {
    pub fn new(
        id: RequestId,
        title: impl Into<String>,
        created_by_id: impl Into<String>,
        recipient: RequestRecipient,
    ) -> Result<Self, DomainError> {
        if !recipient.is_valid() {
            return Err(DomainError::InvalidRecipient(format!(
                "{} recipient requires a non-empty id",
                recipient.kind
            )));
        }

        let created_by_id = created_by_id.into();
        if created_by_id.is_empty() {
            return Err(DomainError::InvariantViolation(
                "request creator id must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            title: title.into(),
            description: String::new(),
            created_by_id,
            recipient,
            status: RequestStatus::Pending,
            accepted_by_id: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    pub fn accept(&mut self, user_id: &str) -> Result<(), TransitionError> {
        if self.status != RequestStatus::Pending {
            return Err(TransitionError::InvalidStateForAccept { status: self.status });
        }
        if user_id == self.created_by_id {
            return Err(TransitionError::SelfAcceptanceForbidden { user_id: user_id.to_owned() });
        }

        self.status = RequestStatus::Accepted;
        self.accepted_by_id = Some(user_id.to_owned());
        self.touch();
        Ok(())
    }

    /// Declines the request. An accepted request that is not yet completed
    /// can still be rejected.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        if !matches!(self.status, RequestStatus::Pending | RequestStatus::Accepted) {
            return Err(TransitionError::InvalidStateForReject { status: self.status });
        }

        self.status = RequestStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        if self.status != RequestStatus::Accepted {
            return Err(TransitionError::InvalidStateForComplete { status: self.status });
        }

        self.status = RequestStatus::Completed;
        self.touch();
        Ok(())
    }

    /// The acceptor finishes the work; the creator may also confirm completion.
    pub fn can_be_completed_by(&self, user_id: &str) -> bool {
        self.status == RequestStatus::Accepted
            && (self.accepted_by_id.as_deref() == Some(user_id) || self.created_by_id == user_id)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}
