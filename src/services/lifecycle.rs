//! Complaint lifecycle: derived states, the transition table, and the
//! controls a front end may offer for a given session.
//!
//! The backend stays the authority. This module only keeps the client from
//! offering or sending actions the backend is guaranteed to reject.

use crate::models::complaint::{Complaint, ComplaintStatus, ResolutionStatus, Verdict};
use crate::models::session::{Identity, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No response yet.
    Open,
    /// Company responded; consumer has not ruled on it.
    Answered,
    ClosedResolved,
    ClosedUnresolved,
}

impl LifecycleState {
    pub fn is_closed(self) -> bool {
        matches!(self, LifecycleState::ClosedResolved | LifecycleState::ClosedUnresolved)
    }

    /// Derive the state from a backend record. Fails for combinations the
    /// lifecycle cannot produce, e.g. a closed complaint with no response.
    pub fn of(complaint: &Complaint) -> Result<Self, TransitionError> {
        let resolution = complaint.response.as_ref().map(|r| r.resolution_status);
        match (complaint.status, resolution) {
            (ComplaintStatus::Open, None) => Ok(LifecycleState::Open),
            (ComplaintStatus::Open, Some(ResolutionStatus::UnderReview)) => Ok(LifecycleState::Answered),
            (_, Some(ResolutionStatus::Resolved)) => Ok(LifecycleState::ClosedResolved),
            (_, Some(ResolutionStatus::Unresolved)) => Ok(LifecycleState::ClosedUnresolved),
            (ComplaintStatus::Closed, _) => Err(TransitionError::Inconsistent {
                complaint_id: complaint.id,
            }),
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Open => "open",
            LifecycleState::Answered => "answered",
            LifecycleState::ClosedResolved => "closed (resolved)",
            LifecycleState::ClosedUnresolved => "closed (unresolved)",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SubmitResponse,
    Finalize(Verdict),
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::SubmitResponse => write!(f, "submit response"),
            Action::Finalize(v) => write!(f, "finalize as {v}"),
        }
    }
}

/// How the acting session relates to one complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    OwnerConsumer,
    OtherConsumer,
    TargetCompany,
    OtherCompany,
}

impl Party {
    /// Match by id when the complaint carries it, else by display name.
    pub fn of(identity: &Identity, complaint: &Complaint) -> Self {
        match identity {
            Identity::Consumer(consumer) => {
                let owns = match complaint.consumer_id {
                    Some(id) => id == consumer.id,
                    None => names_match(consumer.name.as_deref(), complaint.consumer_name.as_deref()),
                };
                if owns {
                    Party::OwnerConsumer
                } else {
                    Party::OtherConsumer
                }
            }
            Identity::Company(company) => {
                let targeted = match complaint.company_id {
                    Some(id) => id == company.company_id,
                    None => names_match(company.name.as_deref(), complaint.company_name.as_deref()),
                };
                if targeted {
                    Party::TargetCompany
                } else {
                    Party::OtherCompany
                }
            }
        }
    }
    /// Whether `of` had anything to compare. When false the viewer is
    /// treated as unrelated, so the complaint is read-only for them.
    pub fn is_determinable(identity: &Identity, complaint: &Complaint) -> bool {
        let (id, ours, theirs) = match identity {
            Identity::Consumer(c) => (complaint.consumer_id, c.name.as_deref(), complaint.consumer_name.as_deref()),
            Identity::Company(c) => (complaint.company_id, c.name.as_deref(), complaint.company_name.as_deref()),
        };
        id.is_some() || (ours.is_some_and(|n| !n.trim().is_empty()) && theirs.is_some())
    }
}

fn names_match(ours: Option<&str>, theirs: Option<&str>) -> bool {
    match (ours, theirs) {
        (Some(a), Some(b)) => !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("complaint is already {0}")]
    Terminal(LifecycleState),
    #[error("cannot {action} while the complaint is {state}")]
    InvalidForState { state: LifecycleState, action: Action },
    #[error("{party:?} may not {action}")]
    NotPermitted { party: Party, action: Action },
    #[error("complaint #{complaint_id} has an inconsistent status")]
    Inconsistent { complaint_id: i64 },
}

/// The whole transition table.
pub fn transition(state: LifecycleState, action: Action, party: Party) -> Result<LifecycleState, TransitionError> {
    if state.is_closed() {
        return Err(TransitionError::Terminal(state));
    }

    match (state, action) {
        (LifecycleState::Open, Action::SubmitResponse) => match party {
            Party::TargetCompany => Ok(LifecycleState::Answered),
            _ => Err(TransitionError::NotPermitted { party, action }),
        },
        (LifecycleState::Answered, Action::Finalize(verdict)) => match party {
            Party::OwnerConsumer => Ok(match verdict {
                Verdict::Resolved => LifecycleState::ClosedResolved,
                Verdict::Unresolved => LifecycleState::ClosedUnresolved,
            }),
            _ => Err(TransitionError::NotPermitted { party, action }),
        },
        _ => Err(TransitionError::InvalidForState { state, action }),
    }
}

/// What the front end shows for one complaint. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controls {
    Respond,
    Finalize,
    ReadOnly,
}

pub fn controls(state: LifecycleState, party: Party) -> Controls {
    match (state, party) {
        (LifecycleState::Open, Party::TargetCompany) => Controls::Respond,
        (LifecycleState::Answered, Party::OwnerConsumer) => Controls::Finalize,
        _ => Controls::ReadOnly,
    }
}

/// Controls for a complaint as seen by an optional session.
pub fn controls_for(complaint: &Complaint, session: Option<&Session>) -> Controls {
    let (Ok(state), Some(session)) = (LifecycleState::of(complaint), session) else {
        return Controls::ReadOnly;
    };
    controls(state, Party::of(&session.identity, complaint))
}
