use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Who a request is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    User,
    Channel,
    Queue,
}

impl RecipientKind {
    pub const ALL: [RecipientKind; 3] = [Self::User, Self::Channel, Self::Queue];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
            Self::Queue => "queue",
        }
    }
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "channel" => Ok(Self::Channel),
            "queue" => Ok(Self::Queue),
            other => Err(DomainError::InvalidRecipient(format!(
                "unsupported recipient kind `{other}` (expected user|channel|queue)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestRecipient {
    pub id: String,
    pub kind: RecipientKind,
}

impl RequestRecipient {
    pub fn new(kind: RecipientKind, id: impl Into<String>) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(RecipientKind::User, id)
    }

    pub fn channel(id: impl Into<String>) -> Self {
        Self::new(RecipientKind::Channel, id)
    }

    pub fn queue(id: impl Into<String>) -> Self {
        Self::new(RecipientKind::Queue, id)
    }

    /// Parses a raw kind/id pair coming from storage or a form submission.
    pub fn parse(kind: &str, id: &str) -> Result<Self, DomainError> {
        let recipient = Self::new(kind.parse()?, id.trim());
        if !recipient.is_valid() {
            return Err(DomainError::InvalidRecipient(format!(
                "{} recipient requires a non-empty id",
                recipient.kind
            )));
        }
        Ok(recipient)
    }

    // The kind is a closed enum, so only the id can make a recipient invalid.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }
}

impl fmt::Display for RequestRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::{RecipientKind, RequestRecipient};
    use crate::errors::DomainError;

    #[test]
    fn recipient_with_id_is_valid_for_every_kind() {
        for kind in RecipientKind::ALL {
            assert!(RequestRecipient::new(kind, "X1").is_valid(), "{kind} should be valid");
        }
    }

    #[test]
    fn recipient_without_id_is_invalid() {
        assert!(!RequestRecipient::user("").is_valid());
        assert!(!RequestRecipient::queue(String::new()).is_valid());
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let error = RequestRecipient::parse("group", "G1").expect_err("group is not a kind");
        assert!(matches!(error, DomainError::InvalidRecipient(ref message) if message.contains("group")));
    }

    #[test]
    fn parse_rejects_blank_id() {
        let error = RequestRecipient::parse("channel", "   ").expect_err("blank id");
        assert!(matches!(error, DomainError::InvalidRecipient(_)));
    }

    #[test]
    fn parse_normalizes_kind_case() {
        let recipient = RequestRecipient::parse(" Queue ", "Q1").expect("parse");
        assert_eq!(recipient, RequestRecipient::queue("Q1"));
        assert_eq!(recipient.to_string(), "queue:Q1");
    }
}
