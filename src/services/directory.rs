use std::sync::Arc;

use crate::models::directory::{Company, ConsumerProfile, ProfileUpdate};
use crate::models::session::Role;
use crate::services::api::ApiError;
use crate::services::session::{Access, Route, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("profiles are only available to {expected} accounts, current session is {actual}")]
    WrongRole { expected: Role, actual: Role },
    #[error("session expired")]
    SessionExpired(Route),
    #[error("no profile found for this account")]
    NotFound,
    #[error(transparent)]
    Api(ApiError),
}

impl DirectoryError {
    pub fn user_message(&self) -> String {
        match self {
            DirectoryError::Api(ApiError::Rejected { status, .. }) if status.as_u16() == 403 => {
                "You do not have permission to access this profile.".into()
            }
            DirectoryError::Api(ApiError::Network(_)) => {
                "The request failed. Check your internet connection.".into()
            }
            DirectoryError::Api(e) => e
                .server_message()
                .unwrap_or("Failed to load profile data.")
                .to_string(),
            other => other.to_string(),
        }
    }
}

/// Company listing and consumer profile pages.
pub struct DirectoryService {
    session: Arc<SessionStore>,
}

impl DirectoryService {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    async fn api_error(&self, err: ApiError) -> DirectoryError {
        match self.session.handle_api_error(&err).await {
            Some(route) => DirectoryError::SessionExpired(route),
            None => DirectoryError::Api(err),
        }
    }

    /// Every registered company. Anonymous callers are allowed.
    pub async fn list_companies(&self) -> Result<Vec<Company>, DirectoryError> {
        match self.session.api().list_companies().await {
            Ok(companies) => Ok(companies),
            Err(e) => Err(self.api_error(e).await),
        }
    }

    /// The logged-in consumer's profile, looked up by the session email.
    pub async fn own_profile(&self) -> Result<ConsumerProfile, DirectoryError> {
        let session = match self.session.require_role(Role::Consumer) {
            Access::Granted(session) => session,
            Access::RedirectToLogin => return Err(DirectoryError::NotLoggedIn),
            Access::Denied { expected, actual } => return Err(DirectoryError::WrongRole { expected, actual }),
        };

        let email = session.identity.email();
        match self.session.api().find_consumers_by_email(email).await {
            Ok(profiles) => profiles.into_iter().next().ok_or(DirectoryError::NotFound),
            Err(e) => Err(self.api_error(e).await),
        }
    }

    /// Save profile edits and return the profile as stored by the backend.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<ConsumerProfile, DirectoryError> {
        let current = self.own_profile().await?;
        if let Err(e) = self.session.api().update_consumer(current.display_id, update).await {
            tracing::warn!("profile update for consumer {} failed: {}", current.display_id, e);
            return Err(self.api_error(e).await);
        }

        match self.session.api().find_consumers_by_email(&update.email).await {
            Ok(profiles) => profiles.into_iter().next().ok_or(DirectoryError::NotFound),
            Err(e) => Err(self.api_error(e).await),
        }
    }
}
