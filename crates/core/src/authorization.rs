//! Request authorization.
//!
//! Every (recipient kind, transition) decision lives here so the full matrix
//! can be read in one place:
//!
//! | kind    | accept                      | complete             | reject               |
//! |---------|-----------------------------|----------------------|----------------------|
//! | user    | actor is the recipient      | acceptor or creator  | accept or complete   |
//! | channel | anyone but the creator      | acceptor or creator  | accept or complete   |
//! | queue   | queue admin or member       | acceptor or creator  | accept or complete   |
//!
//! The creator can never accept their own request, whatever the kind.

use serde::{Deserialize, Serialize};

use crate::domain::queue::Queue;
use crate::domain::recipient::RecipientKind;
use crate::domain::request::Request;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Accept,
    Reject,
    Complete,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Complete => "complete",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Accept => "accepted",
            Self::Reject => "rejected",
            Self::Complete => "completed",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub can_accept: bool,
    pub can_reject: bool,
    pub can_complete: bool,
}

impl Permissions {
    pub fn any(&self) -> bool {
        self.can_accept || self.can_reject || self.can_complete
    }
}

/// Inputs for a single authorization decision. `queue` is the resolved queue
/// for queue-addressed requests and `None` otherwise (or when lookup failed).
#[derive(Clone, Copy, Debug)]
pub struct AuthorizationContext<'a> {
    pub request: &'a Request,
    pub queue: Option<&'a Queue>,
    pub actor_id: &'a str,
}

impl<'a> AuthorizationContext<'a> {
    pub fn new(request: &'a Request, queue: Option<&'a Queue>, actor_id: &'a str) -> Self {
        Self { request, queue, actor_id }
    }

    pub fn can_accept(&self) -> bool {
        if self.actor_id.is_empty() || self.actor_id == self.request.created_by_id {
            return false;
        }

        match self.request.recipient.kind {
            RecipientKind::User => self.request.recipient.id == self.actor_id,
            // Channel membership is enforced by the chat platform.
            RecipientKind::Channel => true,
            RecipientKind::Queue => {
                self.queue.is_some_and(|queue| queue.can_respond_to_requests(self.actor_id))
            }
        }
    }

    pub fn can_complete(&self) -> bool {
        !self.actor_id.is_empty() && self.request.can_be_completed_by(self.actor_id)
    }

    pub fn can_reject(&self) -> bool {
        self.can_accept() || self.can_complete()
    }

    pub fn permits(&self, action: RequestAction) -> bool {
        match action {
            RequestAction::Accept => self.can_accept(),
            RequestAction::Reject => self.can_reject(),
            RequestAction::Complete => self.can_complete(),
        }
    }

    pub fn permissions(&self) -> Permissions {
        Permissions {
            can_accept: self.can_accept(),
            can_reject: self.can_reject(),
            can_complete: self.can_complete(),
        }
    }
}
