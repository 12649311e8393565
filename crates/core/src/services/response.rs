use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::authorization::{AuthorizationContext, Permissions, RequestAction};
use crate::domain::queue::{Queue, QueueId};
use crate::domain::recipient::RecipientKind;
use crate::domain::request::{Request, RequestId};
use crate::errors::ApplicationError;
use crate::ports::{Messenger, QueueRepository, RequestRepository, StorageError};
use crate::services::require;

/// Accept, reject, and complete requests on behalf of an acting user.
///
/// Every transition runs the same pipeline: load the request, resolve its
/// queue when it is queue-addressed, authorize, transition, persist, and then
/// notify. Notification is best effort; a persisted transition is never
/// reported as failed because a message could not be delivered.
pub struct RequestResponseService {
    requests: Arc<dyn RequestRepository>,
    queues: Arc<dyn QueueRepository>,
    messenger: Arc<dyn Messenger>,
}

impl RequestResponseService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        queues: Arc<dyn QueueRepository>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self { requests, queues, messenger }
    }

    pub async fn accept_request(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> Result<Request, ApplicationError> {
        let mut request = self.load_authorized(request_id, actor_id, RequestAction::Accept).await?;

        request.accept(actor_id)?;
        self.persist(&request, RequestAction::Accept).await?;

        info!(
            event_name = "request.accepted",
            request_id = %request.id,
            actor_id = %actor_id,
            created_by_id = %request.created_by_id,
            "request accepted"
        );

        self.notify_creator(&request, RequestAction::Accept).await;
        Ok(request)
    }

    pub async fn reject_request(
        &self,
        request_id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<Request, ApplicationError> {
        require(reason, "rejection reason")?;
        let mut request = self.load_authorized(request_id, actor_id, RequestAction::Reject).await?;

        request.reject(reason.trim())?;
        self.persist(&request, RequestAction::Reject).await?;

        info!(
            event_name = "request.rejected",
            request_id = %request.id,
            actor_id = %actor_id,
            created_by_id = %request.created_by_id,
            "request rejected"
        );

        self.notify_creator(&request, RequestAction::Reject).await;
        Ok(request)
    }

    pub async fn complete_request(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> Result<Request, ApplicationError> {
        let mut request =
            self.load_authorized(request_id, actor_id, RequestAction::Complete).await?;

        request.complete()?;
        self.persist(&request, RequestAction::Complete).await?;

        info!(
            event_name = "request.completed",
            request_id = %request.id,
            actor_id = %actor_id,
            created_by_id = %request.created_by_id,
            accepted_by_id = request.accepted_by_id.as_deref().unwrap_or(""),
            "request completed"
        );

        self.notify_stakeholders(&request, RequestAction::Complete, actor_id).await;
        Ok(request)
    }

    pub async fn get_request_details(&self, request_id: &str) -> Result<Request, ApplicationError> {
        require(request_id, "request id")?;
        self.requests
            .get_by_id(&RequestId(request_id.to_owned()))
            .await?
            .ok_or_else(|| ApplicationError::RequestNotFound(request_id.to_owned()))
    }

    /// What `actor_id` may do with the request right now. A queue that can no
    /// longer be found yields no queue-based rights rather than an error.
    pub async fn request_permissions(
        &self,
        request_id: &str,
        actor_id: &str,
    ) -> Result<(Request, Permissions), ApplicationError> {
        let request = self.get_request_details(request_id).await?;
        let queue = match request.recipient.kind {
            RecipientKind::Queue => {
                self.queues.get_by_id(&QueueId(request.recipient.id.clone())).await?
            }
            _ => None,
        };
        let permissions =
            AuthorizationContext::new(&request, queue.as_ref(), actor_id).permissions();
        Ok((request, permissions))
    }

    pub async fn list_user_requests(&self, user_id: &str) -> Result<Vec<Request>, ApplicationError> {
        require(user_id, "user id")?;
        let requests = self.requests.find_by_created_by_id(user_id).await?;
        debug!(user_id = %user_id, count = requests.len(), "listed requests created by user");
        Ok(requests)
    }

    pub async fn list_accepted_requests(
        &self,
        user_id: &str,
    ) -> Result<Vec<Request>, ApplicationError> {
        require(user_id, "user id")?;
        let requests = self.requests.find_by_accepted_by_id(user_id).await?;
        debug!(user_id = %user_id, count = requests.len(), "listed requests accepted by user");
        Ok(requests)
    }

    pub async fn list_recipient_requests(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
    ) -> Result<Vec<Request>, ApplicationError> {
        require(recipient_id, "recipient id")?;
        let requests = self.requests.find_by_recipient(recipient_id, kind).await?;
        debug!(
            recipient_id = %recipient_id,
            recipient_kind = %kind,
            count = requests.len(),
            "listed requests addressed to recipient"
        );
        Ok(requests)
    }

    async fn load_authorized(
        &self,
        request_id: &str,
        actor_id: &str,
        action: RequestAction,
    ) -> Result<Request, ApplicationError> {
        require(request_id, "request id")?;
        require(actor_id, "user id")?;

        let request = self
            .requests
            .get_by_id(&RequestId(request_id.to_owned()))
            .await?
            .ok_or_else(|| ApplicationError::RequestNotFound(request_id.to_owned()))?;

        let queue = self.resolve_queue(&request).await?;
        let context = AuthorizationContext::new(&request, queue.as_ref(), actor_id);
        if !context.permits(action) {
            warn!(
                event_name = "request.response.unauthorized",
                action = action.as_str(),
                request_id = %request.id,
                actor_id = %actor_id,
                recipient_kind = %request.recipient.kind,
                recipient_id = %request.recipient.id,
                "unauthorized attempt to respond to request"
            );
            return Err(ApplicationError::Unauthorized {
                actor_id: actor_id.to_owned(),
                action: format!("{} request {}", action.as_str(), request.id),
            });
        }

        Ok(request)
    }

    async fn resolve_queue(&self, request: &Request) -> Result<Option<Queue>, ApplicationError> {
        if request.recipient.kind != RecipientKind::Queue {
            return Ok(None);
        }

        let queue_id = QueueId(request.recipient.id.clone());
        match self.queues.get_by_id(&queue_id).await? {
            Some(queue) => Ok(Some(queue)),
            None => Err(ApplicationError::QueueNotFound(queue_id.0)),
        }
    }

    async fn persist(&self, request: &Request, action: RequestAction) -> Result<(), ApplicationError> {
        match self.requests.save(request).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict(_)) => {
                warn!(
                    event_name = "request.response.conflict",
                    action = action.as_str(),
                    request_id = %request.id,
                    "request changed since it was loaded; transition dropped"
                );
                Err(ApplicationError::ConcurrentUpdate(request.id.0.clone()))
            }
            Err(storage_error) => {
                error!(
                    event_name = "request.response.persist_failed",
                    action = action.as_str(),
                    request_id = %request.id,
                    error = %storage_error,
                    "failed to save request after transition"
                );
                Err(storage_error.into())
            }
        }
    }

    async fn notify_creator(&self, request: &Request, action: RequestAction) {
        let text = format!("Your request '{}' has been {}", request.title, action.past_tense());
        self.notify(&request.created_by_id, &text, request).await;
    }

    async fn notify_stakeholders(&self, request: &Request, action: RequestAction, actor_id: &str) {
        if actor_id != request.created_by_id {
            self.notify_creator(request, action).await;
        }

        if let Some(acceptor) = request.accepted_by_id.as_deref().filter(|id| *id != actor_id) {
            let text = format!(
                "The request '{}' you accepted has been {}",
                request.title,
                action.past_tense()
            );
            self.notify(acceptor, &text, request).await;
        }
    }

    async fn notify(&self, user_id: &str, text: &str, request: &Request) {
        if let Err(messaging_error) = self.messenger.send_direct_message(user_id, text).await {
            error!(
                event_name = "request.notification.failed",
                request_id = %request.id,
                user_id = %user_id,
                error = %messaging_error,
                "failed to notify user about request update"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::RequestResponseService;
    use crate::domain::queue::{Queue, QueueId};
    use crate::domain::recipient::{RecipientKind, RequestRecipient};
    use crate::domain::request::{Request, RequestId, RequestStatus, TransitionError};
    use crate::errors::ApplicationError;
    use crate::services::testing::{FakeMessenger, FakeQueues, FakeRequests};

    struct Harness {
        requests: Arc<FakeRequests>,
        messenger: Arc<FakeMessenger>,
        service: RequestResponseService,
    }

    fn harness(requests: Vec<Request>, queues: Vec<Queue>, messenger: FakeMessenger) -> Harness {
        let requests = Arc::new(FakeRequests::with(requests));
        let queues = Arc::new(FakeQueues::with(queues));
        let messenger = Arc::new(messenger);
        let service = RequestResponseService::new(requests.clone(), queues, messenger.clone());
        Harness { requests, messenger, service }
    }

    fn request(id: &str, recipient: RequestRecipient) -> Request {
        let mut request =
            Request::new(RequestId(id.to_owned()), "New monitor", "U1", recipient).expect("valid");
        request.description = "27 inch".to_owned();
        request
    }

    fn finance_queue() -> Queue {
        let mut queue = Queue::new(QueueId("Q1".to_owned()), "Finance", "U9");
        queue.add_admin("U2").expect("admin");
        queue
    }

    #[tokio::test]
    async fn queue_addressed_request_accepted_by_admin() {
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q1"))],
            vec![finance_queue()],
            FakeMessenger::default(),
        );

        let updated = h.service.accept_request("R1", "U2").await.expect("accept");
        assert_eq!(updated.status, RequestStatus::Accepted);

        let stored = h.requests.stored("R1").expect("persisted");
        assert_eq!(stored.status, RequestStatus::Accepted);
        assert_eq!(stored.accepted_by_id.as_deref(), Some("U2"));
        assert_eq!(
            h.messenger.sent(),
            vec![("U1".to_owned(), "Your request 'New monitor' has been accepted".to_owned())]
        );
    }

    #[tokio::test]
    async fn outsider_is_rejected_without_persisting() {
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q1"))],
            vec![finance_queue()],
            FakeMessenger::default(),
        );

        let error = h.service.accept_request("R1", "U3").await.expect_err("outsider");
        assert!(matches!(error, ApplicationError::Unauthorized { ref actor_id, .. } if actor_id == "U3"));
        assert_eq!(h.requests.stored("R1").expect("present").status, RequestStatus::Pending);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_queue_is_reported() {
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q404"))],
            vec![],
            FakeMessenger::default(),
        );

        let error = h.service.accept_request("R1", "U2").await.expect_err("no queue");
        assert_eq!(error, ApplicationError::QueueNotFound("Q404".to_owned()));
    }

    #[tokio::test]
    async fn unknown_request_and_blank_arguments_fail_early() {
        let h = harness(vec![], vec![], FakeMessenger::default());

        assert_eq!(
            h.service.accept_request("R404", "U2").await,
            Err(ApplicationError::RequestNotFound("R404".to_owned()))
        );
        assert_eq!(
            h.service.complete_request("", "U2").await,
            Err(ApplicationError::MissingArgument("request id"))
        );
        assert_eq!(
            h.service.accept_request("R1", " ").await,
            Err(ApplicationError::MissingArgument("user id"))
        );
        assert_eq!(
            h.service.reject_request("R1", "U2", "").await,
            Err(ApplicationError::MissingArgument("rejection reason"))
        );
    }

    #[tokio::test]
    async fn persistence_failure_is_fatal_and_skips_notification() {
        let h = harness(
            vec![request("R1", RequestRecipient::user("U2"))],
            vec![],
            FakeMessenger::default(),
        );
        h.requests.fail_saves.store(true, Ordering::SeqCst);

        let error = h.service.accept_request("R1", "U2").await.expect_err("save fails");
        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_is_swallowed() {
        let h = harness(
            vec![request("R1", RequestRecipient::user("U2"))],
            vec![],
            FakeMessenger::failing(),
        );

        let updated = h.service.accept_request("R1", "U2").await.expect("accept still succeeds");
        assert_eq!(updated.status, RequestStatus::Accepted);
        assert_eq!(h.requests.stored("R1").expect("stored").status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn invalid_transition_surfaces_domain_error() {
        let h = harness(
            vec![request("R1", RequestRecipient::user("U2"))],
            vec![],
            FakeMessenger::default(),
        );
        h.service.accept_request("R1", "U2").await.expect("first accept");

        // U2 is still the direct recipient, so authorization passes and the state guard fires.
        let error = h.service.accept_request("R1", "U2").await.expect_err("second accept");
        assert!(matches!(error, ApplicationError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn completion_by_acceptor_notifies_creator_only() {
        let mut accepted = request("R1", RequestRecipient::channel("C1"));
        accepted.accept("U2").expect("accept");
        let h = harness(vec![accepted], vec![], FakeMessenger::default());

        h.service.complete_request("R1", "U2").await.expect("complete");

        assert_eq!(
            h.messenger.sent(),
            vec![("U1".to_owned(), "Your request 'New monitor' has been completed".to_owned())]
        );
    }

    #[tokio::test]
    async fn completion_by_creator_notifies_acceptor_only() {
        let mut accepted = request("R1", RequestRecipient::channel("C1"));
        accepted.accept("U2").expect("accept");
        let h = harness(vec![accepted], vec![], FakeMessenger::default());

        h.service.complete_request("R1", "U1").await.expect("creator completes");

        assert_eq!(
            h.messenger.sent(),
            vec![(
                "U2".to_owned(),
                "The request 'New monitor' you accepted has been completed".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn reject_stores_trimmed_reason_and_notifies_creator() {
        let h = harness(
            vec![request("R1", RequestRecipient::channel("C1"))],
            vec![],
            FakeMessenger::default(),
        );

        h.service.reject_request("R1", "U5", "  out of budget ").await.expect("reject");

        let stored = h.requests.stored("R1").expect("stored");
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("out of budget"));
        assert_eq!(h.messenger.sent()[0].1, "Your request 'New monitor' has been rejected");
    }

    #[tokio::test]
    async fn completed_request_cannot_be_rejected() {
        let mut completed = request("R1", RequestRecipient::user("U2"));
        completed.accept("U2").expect("accept");
        completed.complete().expect("complete");
        let h = harness(vec![completed], vec![], FakeMessenger::default());

        let error = h.service.reject_request("R1", "U2", "too late").await.expect_err("terminal");
        assert_eq!(
            error,
            ApplicationError::InvalidTransition(TransitionError::InvalidStateForReject {
                status: RequestStatus::Completed
            })
        );
        assert_eq!(h.requests.stored("R1").expect("stored").status, RequestStatus::Completed);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn bystander_cannot_complete_an_accepted_request() {
        let mut accepted = request("R1", RequestRecipient::user("U2"));
        accepted.accept("U2").expect("accept");
        let h = harness(vec![accepted], vec![], FakeMessenger::default());

        let error = h.service.complete_request("R1", "U3").await.expect_err("bystander");
        assert!(matches!(error, ApplicationError::Unauthorized { ref actor_id, .. } if actor_id == "U3"));
        assert_eq!(h.requests.stored("R1").expect("stored").status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn accept_that_loses_the_race_is_not_persisted() {
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q1"))],
            vec![finance_queue()],
            FakeMessenger::default(),
        );
        let mut winner = h.requests.stored("R1").expect("stored");
        winner.accept("U9").expect("queue creator accepts");
        *h.requests.lands_first.lock().expect("lock") = Some(winner);

        let error = h.service.accept_request("R1", "U2").await.expect_err("lost the race");
        assert_eq!(error, ApplicationError::ConcurrentUpdate("R1".to_owned()));

        let stored = h.requests.stored("R1").expect("stored");
        assert_eq!(stored.accepted_by_id.as_deref(), Some("U9"));
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn stale_reject_leaves_a_completed_request_alone() {
        let mut accepted = request("R1", RequestRecipient::user("U2"));
        accepted.accept("U2").expect("accept");
        let mut completed = accepted.clone();
        completed.complete().expect("complete");
        let h = harness(vec![accepted], vec![], FakeMessenger::default());
        *h.requests.lands_first.lock().expect("lock") = Some(completed);

        let error = h.service.reject_request("R1", "U2", "never mind").await.expect_err("stale");
        assert_eq!(error, ApplicationError::ConcurrentUpdate("R1".to_owned()));
        assert_eq!(h.requests.stored("R1").expect("stored").status, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn permissions_reflect_the_actor() {
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q1"))],
            vec![finance_queue()],
            FakeMessenger::default(),
        );

        let (_, admin) = h.service.request_permissions("R1", "U2").await.expect("admin");
        assert!(admin.can_accept && admin.can_reject && !admin.can_complete);

        let (_, creator) = h.service.request_permissions("R1", "U1").await.expect("creator");
        assert!(!creator.any());
    }

    #[tokio::test]
    async fn listings_filter_by_role() {
        let mut accepted = request("R2", RequestRecipient::channel("C1"));
        accepted.accept("U2").expect("accept");
        let h = harness(
            vec![request("R1", RequestRecipient::queue("Q1")), accepted],
            vec![],
            FakeMessenger::default(),
        );

        assert_eq!(h.service.list_user_requests("U1").await.expect("mine").len(), 2);
        let accepted = h.service.list_accepted_requests("U2").await.expect("accepted");
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id.0, "R2");
        let queued =
            h.service.list_recipient_requests("Q1", RecipientKind::Queue).await.expect("queue");
        assert_eq!(queued.len(), 1);
        assert_eq!(
            h.service.get_request_details("R404").await,
            Err(ApplicationError::RequestNotFound("R404".to_owned()))
        );
    }
}
