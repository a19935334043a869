use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::complaint::{Complaint, ComplaintResponse, ComplaintStatus, CreateComplaintRequest, Verdict};
use crate::models::session::{Identity, Role, Session};
use crate::services::api::ApiError;
use crate::services::lifecycle::{self, Action, Controls, LifecycleState, Party, TransitionError};
use crate::services::session::{Access, Route, SessionStore};

/// Minimum description length accepted by the new-complaint form.
pub const MIN_DESCRIPTION_CHARS: usize = 50;

/// A complaint together with what the current session may do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintView {
    pub complaint: Complaint,
    /// `None` when the backend record is inconsistent; such complaints are
    /// read-only.
    pub state: Option<LifecycleState>,
    pub controls: Controls,
}

impl ComplaintView {
    pub fn new(complaint: Complaint, session: Option<&Session>) -> Self {
        let state = LifecycleState::of(&complaint).ok();
        let controls = lifecycle::controls_for(&complaint, session);
        Self {
            complaint,
            state,
            controls,
        }
    }
}

/// A mutable backend resource that can have at most one mutation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Complaint(i64),
    Response(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum ComplaintError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("this action requires a {expected} session, current session is {actual}")]
    WrongRole { expected: Role, actual: Role },
    /// The backend rejected the token; the session has already been reset.
    #[error("session expired")]
    SessionExpired(Route),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("complaint #{0} has no response to finalize")]
    NoResponse(i64),
    #[error("another submission for {0:?} is still in progress")]
    InFlight(Resource),
    /// The backend accepted the change but the follow-up read failed. The
    /// caller must reload instead of submitting again.
    #[error("the change was saved but the complaint could not be reloaded")]
    Committed {
        complaint_id: Option<i64>,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Api(ApiError),
}

impl ComplaintError {
    /// Text to show next to the action that failed.
    pub fn user_message(&self, generic: &str) -> String {
        match self {
            ComplaintError::Api(e) => e.server_message().unwrap_or(generic).to_string(),
            ComplaintError::SessionExpired(_) => "Session expired. Please log in again.".into(),
            ComplaintError::Validation(msg) => msg.clone(),
            ComplaintError::Committed { complaint_id: Some(id), .. } => {
                format!("Saved. Reload complaint #{id} to see its current state.")
            }
            ComplaintError::Committed { complaint_id: None, .. } => {
                "Saved. Reload your complaints to see the new one.".into()
            }
            other => other.to_string(),
        }
    }

    /// Whether the same action may simply be submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ComplaintError::Api(_) | ComplaintError::InFlight(_))
    }
}

/// Marks a resource busy for as long as the guard lives.
struct InFlightGuard {
    registry: Arc<Mutex<HashSet<Resource>>>,
    resource: Resource,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.resource);
    }
}

pub struct ComplaintService {
    session: Arc<SessionStore>,
    in_flight: Arc<Mutex<HashSet<Resource>>>,
}

impl ComplaintService {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_in_flight(&self, resource: Resource) -> bool {
        self.in_flight.lock().contains(&resource)
    }

    fn acquire(&self, resource: Resource) -> Result<InFlightGuard, ComplaintError> {
        let mut busy = self.in_flight.lock();
        if !busy.insert(resource) {
            return Err(ComplaintError::InFlight(resource));
        }
        Ok(InFlightGuard {
            registry: self.in_flight.clone(),
            resource,
        })
    }

    fn require(&self, role: Role) -> Result<Session, ComplaintError> {
        match self.session.require_role(role) {
            Access::Granted(session) => Ok(session),
            Access::RedirectToLogin => Err(ComplaintError::NotLoggedIn),
            Access::Denied { expected, actual } => Err(ComplaintError::WrongRole { expected, actual }),
        }
    }

    async fn api_error(&self, err: ApiError) -> ComplaintError {
        match self.session.handle_api_error(&err).await {
            Some(route) => ComplaintError::SessionExpired(route),
            None => ComplaintError::Api(err),
        }
    }

    /// Fetch a complaint and evaluate it for the current session.
    pub async fn load(&self, id: i64) -> Result<ComplaintView, ComplaintError> {
        let session = self.session.current().ok_or(ComplaintError::NotLoggedIn)?;
        match self.session.api().get_complaint(id).await {
            Ok(complaint) => Ok(ComplaintView::new(complaint, Some(&session))),
            Err(e) => Err(self.api_error(e).await),
        }
    }

    /// Company answers an open complaint. On success returns the complaint as
    /// the backend now reports it.
    pub async fn respond(&self, complaint: &Complaint, text: &str) -> Result<ComplaintView, ComplaintError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ComplaintError::Validation("The response cannot be empty.".into()));
        }

        let session = self.require(Role::Company)?;
        self.check(&session, complaint, Action::SubmitResponse)?;

        let _guard = self.acquire(Resource::Complaint(complaint.id))?;
        tracing::info!("submitting response to complaint #{}", complaint.id);
        if let Err(e) = self.session.api().respond(complaint.id, text).await {
            tracing::warn!("response to complaint #{} failed: {}", complaint.id, e);
            return Err(self.api_error(e).await);
        }

        self.refetch_committed(complaint.id, &session).await
    }

    /// Owning consumer rules on the company's response, closing the complaint.
    pub async fn finalize(&self, complaint: &Complaint, verdict: Verdict) -> Result<ComplaintView, ComplaintError> {
        let response_id = complaint
            .response
            .as_ref()
            .map(|r| r.id)
            .ok_or(ComplaintError::NoResponse(complaint.id))?;

        let session = self.require(Role::Consumer)?;
        self.check(&session, complaint, Action::Finalize(verdict))?;

        let _guard = self.acquire(Resource::Response(response_id))?;
        tracing::info!("finalizing complaint #{} as {}", complaint.id, verdict);
        let reply = match self.session.api().finalize(response_id, verdict).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("finalizing complaint #{} failed: {}", complaint.id, e);
                return Err(self.api_error(e).await);
            }
        };

        // If the reload fails, the PATCH reply is the server's own account of
        // the closed response.
        match (self.refetch_committed(complaint.id, &session).await, reply) {
            (Err(ComplaintError::Committed { .. }), Some(reply)) if reply.resolution_status == verdict.resolution() => {
                Ok(closed_with(complaint, reply, &session))
            }
            (view, _) => view,
        }
    }

    /// Consumer files a new complaint against a company.
    pub async fn create(&self, title: &str, company_id: i64, description: &str) -> Result<ComplaintView, ComplaintError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(ComplaintError::Validation("A title is required.".into()));
        }
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Err(ComplaintError::Validation(format!(
                "The description must have at least {MIN_DESCRIPTION_CHARS} characters."
            )));
        }

        let session = self.require(Role::Consumer)?;
        let body = CreateComplaintRequest {
            title: title.to_string(),
            description: description.to_string(),
            company_id,
        };
        match self.session.api().create_complaint(&body).await {
            Ok(complaint) => {
                tracing::info!("created complaint #{}", complaint.id);
                Ok(ComplaintView::new(complaint, Some(&session)))
            }
            // A 2xx whose body cannot be read still created the complaint.
            Err(e @ ApiError::Decode(_)) => {
                tracing::warn!("complaint created but the reply was unreadable: {}", e);
                Err(ComplaintError::Committed { complaint_id: None, source: e })
            }
            Err(e) => Err(self.api_error(e).await),
        }
    }

    fn check(&self, session: &Session, complaint: &Complaint, action: Action) -> Result<(), ComplaintError> {
        let state = LifecycleState::of(complaint)?;
        let party = Party::of(&session.identity, complaint);
        lifecycle::transition(state, action, party)?;
        Ok(())
    }

    /// Reload a complaint after the backend accepted a mutation on it.
    async fn refetch_committed(&self, id: i64, session: &Session) -> Result<ComplaintView, ComplaintError> {
        match self.session.api().get_complaint(id).await {
            Ok(complaint) => Ok(ComplaintView::new(complaint, Some(session))),
            Err(e) => match self.api_error(e).await {
                ComplaintError::Api(source) => {
                    tracing::warn!("complaint #{} changed but reload failed: {}", id, source);
                    Err(ComplaintError::Committed { complaint_id: Some(id), source })
                }
                other => Err(other),
            },
        }
    }
}

fn closed_with(complaint: &Complaint, reply: ComplaintResponse, session: &Session) -> ComplaintView {
    let mut closed = complaint.clone();
    closed.status = ComplaintStatus::Closed;
    closed.response = Some(reply);
    ComplaintView::new(closed, Some(session))
}

/// The identity a complaint view is evaluated against, for display.
pub fn describe_party(identity: &Identity, complaint: &Complaint) -> &'static str {
    if !Party::is_determinable(identity, complaint) {
        return "cannot tell whether this complaint is yours: it carries no account id and your profile has no name, so it is read-only";
    }
    match Party::of(identity, complaint) {
        Party::OwnerConsumer => "you filed this complaint",
        Party::OtherConsumer => "filed by another consumer",
        Party::TargetCompany => "addressed to your company",
        Party::OtherCompany => "addressed to another company",
    }
}
