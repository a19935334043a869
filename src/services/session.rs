use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::session::{Identity, Registration, Role, Session, StoredUserInfo};
use crate::services::api::{ApiClient, ApiError};
use crate::storage::{KeyValueStore, StoreError};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_TYPE_KEY: &str = "userType";
pub const USER_INFO_KEY: &str = "userInfo";

const SESSION_KEYS: [&str; 3] = [AUTH_TOKEN_KEY, USER_TYPE_KEY, USER_INFO_KEY];

/// Where the front end should navigate after a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    ConsumerDashboard,
    CompanyDashboard,
}

impl Route {
    pub fn dashboard(role: Role) -> Self {
        match role {
            Role::Consumer => Route::ConsumerDashboard,
            Role::Company => Route::CompanyDashboard,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::ConsumerDashboard => "/usuario/dashboard",
            Route::CompanyDashboard => "/empresa/dashboard",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of a role guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(Session),
    /// Nobody is logged in.
    RedirectToLogin,
    /// Logged in, but as the other role. Shown to the user, never redirected.
    Denied { expected: Role, actual: Role },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not persist session: {0}")]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("login response did not include a usable {0} profile")]
    MalformedProfile(Role),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| "Authentication failed. Please try again.".into()),
            SessionError::Storage(_) => "Could not save your session on this device.".into(),
            SessionError::MalformedProfile(_) => {
                "The server returned an incomplete profile. Please try again.".into()
            }
        }
    }
}

/// The single in-process owner of "who is logged in".
///
/// Persistent storage is parsed once by [`SessionStore::restore`]; afterwards
/// readers only see the in-memory copy, which changes only through
/// [`SessionStore::login`] and [`SessionStore::logout`].
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    api: ApiClient,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, api: ApiClient) -> Self {
        Self {
            storage,
            api,
            current: RwLock::new(None),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Rehydrate from persistent storage. Anything short of a complete,
    /// well-formed session is treated as logged out and wiped.
    pub fn restore(&self) -> Option<Session> {
        match self.read_persisted() {
            Ok(Some(session)) => {
                self.api.set_token(&session.token);
                *self.current.write() = Some(session.clone());
                tracing::debug!("restored {} session", session.role());
                Some(session)
            }
            Ok(None) => {
                self.reset_local();
                None
            }
            Err(reason) => {
                tracing::warn!("discarding persisted session: {}", reason);
                self.reset_local();
                None
            }
        }
    }

    fn read_persisted(&self) -> Result<Option<Session>, String> {
        let token = self.storage.get(AUTH_TOKEN_KEY).map_err(|e| e.to_string())?;
        let user_type = self.storage.get(USER_TYPE_KEY).map_err(|e| e.to_string())?;
        let user_info = self.storage.get(USER_INFO_KEY).map_err(|e| e.to_string())?;

        let (token, user_type, user_info) = match (token, user_type, user_info) {
            (None, None, None) => return Ok(None),
            (Some(t), Some(r), Some(i)) if !t.is_empty() => (t, r, i),
            _ => return Err("incomplete session keys".into()),
        };

        let role: Role = user_type.parse().map_err(|e: anyhow::Error| e.to_string())?;
        let stored: StoredUserInfo =
            serde_json::from_str(&user_info).map_err(|e| format!("userInfo: {e}"))?;
        let identity = Identity::from_stored(role, stored)
            .ok_or_else(|| format!("userInfo does not describe a {role}"))?;

        Ok(Some(Session { token, identity }))
    }

    /// Start a session, replacing any previous one wholesale. The role is the
    /// identity's variant. Returns the role's dashboard.
    pub fn login(&self, token: &str, identity: Identity) -> Result<Route, SessionError> {
        let role = identity.role();
        let user_info = serde_json::to_string(&identity.to_stored())
            .map_err(|e| SessionError::Storage(StoreError::Format(e)))?;

        self.storage.set_many(&[
            (AUTH_TOKEN_KEY, token.to_string()),
            (USER_TYPE_KEY, role.to_string()),
            (USER_INFO_KEY, user_info),
        ])?;

        self.api.set_token(token);
        *self.current.write() = Some(Session {
            token: token.to_string(),
            identity,
        });
        tracing::info!("logged in as {}", role);
        Ok(Route::dashboard(role))
    }

    /// End the session. The backend call is best effort; local state is
    /// always cleared and the result is always the login page.
    pub async fn logout(&self) -> Route {
        let role = self.current.read().as_ref().map(Session::role);

        if let Some(role) = role {
            if let Err(e) = self.api.logout(role).await {
                tracing::warn!("logout call failed, clearing local session anyway: {}", e);
            }
        }

        self.reset_local();
        tracing::info!("logged out");
        Route::Login
    }

    fn reset_local(&self) {
        if let Err(e) = self.storage.remove_many(&SESSION_KEYS) {
            tracing::warn!("failed to clear persisted session: {}", e);
        }
        self.api.clear_token();
        *self.current.write() = None;
    }

    pub fn require_role(&self, expected: Role) -> Access {
        match self.current() {
            None => Access::RedirectToLogin,
            Some(session) if session.role() == expected => Access::Granted(session),
            Some(session) => Access::Denied {
                expected,
                actual: session.role(),
            },
        }
    }

    /// Call-site contract for every data fetch: a 401 forces logout. Returns
    /// the redirect when the session was reset.
    pub async fn handle_api_error(&self, err: &ApiError) -> Option<Route> {
        if err.is_unauthorized() {
            tracing::info!("backend rejected token, forcing logout");
            Some(self.logout().await)
        } else {
            None
        }
    }

    pub async fn sign_in(&self, role: Role, email: &str, password: &str) -> Result<Route, SessionError> {
        let auth = self.api.login(role, email, password).await?;
        let identity = auth
            .profile_for(role)
            .and_then(|profile| Identity::from_login_profile(role, profile))
            .ok_or(SessionError::MalformedProfile(role))?;
        self.login(&auth.token, identity)
    }

    pub async fn sign_up(&self, registration: &Registration) -> Result<Route, SessionError> {
        let role = registration.role();
        let auth = self.api.signup(registration).await?;
        let identity = auth
            .profile_for(role)
            .and_then(|profile| Identity::from_login_profile(role, profile))
            .ok_or(SessionError::MalformedProfile(role))?;
        self.login(&auth.token, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{CompanyIdentity, CompanySignup, ConsumerIdentity};
    use crate::storage::MemoryStore;
    use httpmock::prelude::*;
    use reqwest::Url;
    use std::time::Duration;

    fn consumer() -> Identity {
        Identity::Consumer(ConsumerIdentity {
            id: 1,
            email: "a@b.com".into(),
            name: None,
        })
    }

    fn company() -> Identity {
        Identity::Company(CompanyIdentity {
            id: 9,
            email: "sac@acme.com".into(),
            name: Some("ACME".into()),
            company_id: 5,
        })
    }

    fn offline_api() -> ApiClient {
        let base = Url::parse("http://127.0.0.1:9/api/").unwrap();
        ApiClient::new(base, Duration::from_millis(500)).unwrap()
    }

    fn api_for(server: &MockServer) -> ApiClient {
        let base = Url::parse(&format!("{}/api/", server.base_url())).unwrap();
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_login_then_restore_yields_same_identity() {
        let storage: Arc<MemoryStore> = Arc::new(MemoryStore::new());

        for identity in [consumer(), company()] {
            let store = SessionStore::new(storage.clone(), offline_api());
            let route = store.login("abc123", identity.clone()).unwrap();
            assert_eq!(route, Route::dashboard(identity.role()));

            // A fresh store over the same storage simulates a reload.
            let reloaded = SessionStore::new(storage.clone(), offline_api());
            let session = reloaded.restore().unwrap();
            assert_eq!(session.role(), identity.role());
            assert_eq!(session.identity, identity);
            assert!(reloaded.api().has_token());
        }
    }

    #[test]
    fn test_login_persists_wire_keys() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::new(storage.clone(), offline_api());
        store.login("abc123", consumer()).unwrap();

        assert_eq!(storage.get(AUTH_TOKEN_KEY).unwrap().as_deref(), Some("abc123"));
        assert_eq!(storage.get(USER_TYPE_KEY).unwrap().as_deref(), Some("user"));
        let info: serde_json::Value =
            serde_json::from_str(&storage.get(USER_INFO_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(info["usuario"]["email"], "a@b.com");
    }

    #[test]
    fn test_login_overwrites_previous_session() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::new(storage.clone(), offline_api());
        store.login("company-token", company()).unwrap();
        store.login("abc123", consumer()).unwrap();

        let session = store.current().unwrap();
        assert_eq!(session.token, "abc123");
        assert_eq!(session.role(), Role::Consumer);
        let info = storage.get(USER_INFO_KEY).unwrap().unwrap();
        assert!(!info.contains("companyId"));
    }

    #[test]
    fn test_partial_persisted_state_is_logged_out() {
        let complete = [
            (AUTH_TOKEN_KEY, "abc123".to_string()),
            (USER_TYPE_KEY, "user".to_string()),
            (
                USER_INFO_KEY,
                r#"{"usuario":{"id":1,"email":"a@b.com"}}"#.to_string(),
            ),
        ];

        for missing in 0..complete.len() {
            let entries: Vec<(&str, String)> = complete
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != missing)
                .map(|(_, e)| e.clone())
                .collect();
            let storage = Arc::new(MemoryStore::with_entries(entries));
            let store = SessionStore::new(storage.clone(), offline_api());

            assert!(store.restore().is_none());
            assert!(!store.is_authenticated());
            assert!(storage.is_empty());
        }
    }

    #[test]
    fn test_corrupt_persisted_state_is_logged_out() {
        let cases = [
            ("user", "{not json"),
            ("admin", r#"{"usuario":{"id":1,"email":"a@b.com"}}"#),
            ("company", r#"{"usuario":{"id":1,"email":"a@b.com"}}"#),
        ];
        for (user_type, user_info) in cases {
            let storage = Arc::new(MemoryStore::with_entries([
                (AUTH_TOKEN_KEY, "abc123"),
                (USER_TYPE_KEY, user_type),
                (USER_INFO_KEY, user_info),
            ]));
            let store = SessionStore::new(storage.clone(), offline_api());
            assert!(store.restore().is_none());
            assert!(storage.is_empty());
            assert!(!store.api().has_token());
        }
    }

    #[tokio::test]
    async fn test_logout_survives_network_failure() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::new(storage.clone(), offline_api());
        store.login("abc123", consumer()).unwrap();
        assert_eq!(store.current().unwrap().role().to_string(), "user");

        let route = store.logout().await;

        assert_eq!(route, Route::Login);
        assert!(!store.is_authenticated());
        assert!(storage.is_empty());
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_logout_calls_role_endpoint_with_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/empresas/logout/")
                    .header("Authorization", "Token company-token");
                then.status(200);
            })
            .await;

        let store = SessionStore::new(Arc::new(MemoryStore::new()), api_for(&server));
        store.login("company-token", company()).unwrap();
        store.logout().await;

        mock.assert_async().await;
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_require_role() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), offline_api());
        assert_eq!(store.require_role(Role::Company), Access::RedirectToLogin);

        store.login("abc123", consumer()).unwrap();
        assert_eq!(
            store.require_role(Role::Company),
            Access::Denied {
                expected: Role::Company,
                actual: Role::Consumer
            }
        );
        assert!(matches!(store.require_role(Role::Consumer), Access::Granted(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_error_forces_logout() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), offline_api());
        store.login("abc123", consumer()).unwrap();

        let rejected = ApiError::Rejected {
            status: reqwest::StatusCode::BAD_REQUEST,
            message: None,
        };
        assert_eq!(store.handle_api_error(&rejected).await, None);
        assert!(store.is_authenticated());

        assert_eq!(store.handle_api_error(&ApiError::Unauthorized).await, Some(Route::Login));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_in_stores_normalized_identity() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/consumidores/login/")
                    .json_body(serde_json::json!({ "email": "a@b.com", "password": "teste123" }));
                then.status(200).json_body(serde_json::json!({
                    "token": "abc123",
                    "usuario_consumidor": {
                        "display_id": 1,
                        "display_email": "a@b.com",
                        "display_nome": "Ana"
                    }
                }));
            })
            .await;

        let store = SessionStore::new(Arc::new(MemoryStore::new()), api_for(&server));
        let route = store.sign_in(Role::Consumer, "a@b.com", "teste123").await.unwrap();

        assert_eq!(route, Route::ConsumerDashboard);
        assert_eq!(store.current().unwrap().identity.display_name(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_sign_in_with_missing_profile_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/empresas/login/");
                then.status(200).json_body(serde_json::json!({ "token": "abc123" }));
            })
            .await;

        let store = SessionStore::new(Arc::new(MemoryStore::new()), api_for(&server));
        let err = store.sign_in(Role::Company, "sac@acme.com", "x").await.unwrap_err();

        assert!(matches!(err, SessionError::MalformedProfile(Role::Company)));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_company_signup_is_anonymous_with_stale_consumer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/empresas/cadastro/")
                    .header_missing("Authorization");
                then.status(201).json_body(serde_json::json!({
                    "token": "company-token",
                    "usuario_empresa": {
                        "id": 5,
                        "usuario": { "id": 9, "email": "sac@acme.com", "nome": "ACME" }
                    }
                }));
            })
            .await;

        let storage = Arc::new(MemoryStore::with_entries([
            (AUTH_TOKEN_KEY, "stale"),
            (USER_TYPE_KEY, "user"),
            (USER_INFO_KEY, r#"{"usuario":{"id":1,"email":"a@b.com"}}"#),
        ]));
        let store = SessionStore::new(storage, api_for(&server));
        assert!(store.restore().is_some());

        let route = store
            .sign_up(&Registration::Company(CompanySignup {
                razao_social: "ACME LTDA".into(),
                nome_social: None,
                cnpj: "00.000.000/0001-00".into(),
                email: "sac@acme.com".into(),
                password: "segredo".into(),
            }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(route, Route::CompanyDashboard);
        assert_eq!(store.current().unwrap().identity, company());
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn set_many(&self, _entries: &[(&str, String)]) -> Result<(), StoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }

        fn remove_many(&self, _keys: &[&str]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_login_write_leaves_memory_untouched() {
        let store = SessionStore::new(Arc::new(ReadOnlyStore), offline_api());

        let result = store.login("abc123", consumer());

        assert!(matches!(result, Err(SessionError::Storage(StoreError::Io(_)))));
        assert!(!store.is_authenticated());
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_logout_without_session_skips_backend() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let store = SessionStore::new(Arc::new(MemoryStore::new()), api_for(&server));
        assert_eq!(store.logout().await, Route::Login);
        mock.assert_calls_async(0).await;
    }
}
