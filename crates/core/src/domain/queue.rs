use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("user `{user_id}` is already an admin of this queue")]
    AlreadyAdmin { user_id: String },
    #[error("user `{user_id}` is not an admin of this queue")]
    NotAnAdmin { user_id: String },
    #[error("the queue creator `{user_id}` cannot be removed from the admins")]
    CannotRemoveCreator { user_id: String },
    #[error("user `{user_id}` is already a member of this queue")]
    AlreadyMember { user_id: String },
    #[error("user `{user_id}` is not a member of this queue")]
    NotAMember { user_id: String },
}

/// A named group whose admins and members respond to requests addressed to it.
///
/// Adminship and membership are independent sets; a user may be in both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub name: String,
    pub description: String,
    pub channel_id: Option<String>,
    pub created_by_id: String,
    pub admin_ids: BTreeSet<String>,
    pub member_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    /// Creates a queue with its creator already admitted as an admin.
    pub fn new(id: QueueId, name: impl Into<String>, created_by_id: impl Into<String>) -> Self {
        let created_by_id = created_by_id.into();
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: String::new(),
            channel_id: None,
            admin_ids: BTreeSet::from([created_by_id.clone()]),
            member_ids: BTreeSet::new(),
            created_by_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_admin(&mut self, user_id: &str) -> Result<(), QueueError> {
        if !self.admin_ids.insert(user_id.to_owned()) {
            return Err(QueueError::AlreadyAdmin { user_id: user_id.to_owned() });
        }
        self.touch();
        Ok(())
    }

    pub fn remove_admin(&mut self, user_id: &str) -> Result<(), QueueError> {
        if user_id == self.created_by_id {
            return Err(QueueError::CannotRemoveCreator { user_id: user_id.to_owned() });
        }
        if !self.admin_ids.remove(user_id) {
            return Err(QueueError::NotAnAdmin { user_id: user_id.to_owned() });
        }
        self.touch();
        Ok(())
    }

    pub fn add_member(&mut self, user_id: &str) -> Result<(), QueueError> {
        if !self.member_ids.insert(user_id.to_owned()) {
            return Err(QueueError::AlreadyMember { user_id: user_id.to_owned() });
        }
        self.touch();
        Ok(())
    }

    pub fn remove_member(&mut self, user_id: &str) -> Result<(), QueueError> {
        if !self.member_ids.remove(user_id) {
            return Err(QueueError::NotAMember { user_id: user_id.to_owned() });
        }
        self.touch();
        Ok(())
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.contains(user_id)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.contains(user_id)
    }

    pub fn can_respond_to_requests(&self, user_id: &str) -> bool {
        self.is_admin(user_id) || self.is_member(user_id)
    }

    /// Gate for admin and member mutations. The queue does not enforce it itself.
    pub fn can_be_modified_by(&self, user_id: &str) -> bool {
        self.is_admin(user_id)
    }

    pub fn rename(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.name = name.into();
        self.description = description.into();
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::{Queue, QueueError, QueueId};

    fn queue() -> Queue {
        Queue::new(QueueId("Q1".to_string()), "IT Helpdesk", "U1")
    }

    #[test]
    fn creator_is_admin_from_creation() {
        let queue = queue();
        assert!(queue.is_admin("U1"));
        assert_eq!(queue.admin_ids.len(), 1);
        assert!(queue.member_ids.is_empty());
    }

    #[test]
    fn admin_management_scenario() {
        let mut queue = queue();
        queue.add_admin("U2").expect("add U2");
        assert_eq!(queue.admin_ids.iter().cloned().collect::<Vec<_>>(), vec!["U1", "U2"]);

        let error = queue.remove_admin("U1").expect_err("creator must stay admin");
        assert_eq!(error, QueueError::CannotRemoveCreator { user_id: "U1".to_string() });
        assert!(queue.is_admin("U1"));
    }

    #[test]
    fn creator_cannot_be_removed_regardless_of_admin_count() {
        let mut queue = queue();
        for admin in ["U2", "U3", "U4"] {
            queue.add_admin(admin).expect("add admin");
        }

        assert!(matches!(queue.remove_admin("U1"), Err(QueueError::CannotRemoveCreator { .. })));
        assert_eq!(queue.admin_ids.len(), 4);
    }

    #[test]
    fn adding_admin_twice_fails_and_keeps_cardinality() {
        let mut queue = queue();
        queue.add_admin("U2").expect("first add");
        let before = queue.admin_ids.len();

        let error = queue.add_admin("U2").expect_err("second add");
        assert_eq!(error, QueueError::AlreadyAdmin { user_id: "U2".to_string() });
        assert_eq!(queue.admin_ids.len(), before);
    }

    #[test]
    fn removing_unknown_admin_fails() {
        let mut queue = queue();
        assert_eq!(
            queue.remove_admin("U9"),
            Err(QueueError::NotAnAdmin { user_id: "U9".to_string() })
        );
    }

    #[test]
    fn membership_is_presence_guarded() {
        let mut queue = queue();
        queue.add_member("U5").expect("add member");
        assert_eq!(
            queue.add_member("U5"),
            Err(QueueError::AlreadyMember { user_id: "U5".to_string() })
        );

        queue.remove_member("U5").expect("remove member");
        assert_eq!(
            queue.remove_member("U5"),
            Err(QueueError::NotAMember { user_id: "U5".to_string() })
        );
    }

    #[test]
    fn membership_and_adminship_are_independent() {
        let mut queue = queue();
        queue.add_member("U1").expect("creator can also be a member");
        assert!(queue.is_admin("U1"));
        assert!(queue.is_member("U1"));

        queue.add_member("U3").expect("add member");
        assert!(queue.can_respond_to_requests("U3"));
        assert!(!queue.can_be_modified_by("U3"));
        assert!(!queue.can_respond_to_requests("U7"));
    }

    #[test]
    fn successful_mutation_touches_updated_at() {
        let mut queue = queue();
        let before = queue.updated_at;
        queue.add_member("U2").expect("add member");
        assert!(queue.updated_at >= before);

        let after_add = queue.updated_at;
        let _ = queue.add_member("U2");
        assert_eq!(queue.updated_at, after_add, "failed mutation must not touch the queue");
    }
}
