use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::models::complaint::{
    Complaint, ComplaintResponse, CreateComplaintRequest, FinalizeRequest, RespondRequest, Verdict,
};
use crate::models::directory::{Company, ConsumerProfile, Page, ProfileUpdate};
use crate::models::session::{AuthResponse, LoginRequest, Registration, Role};

/// Endpoints that must stay anonymous even when a token is cached.
const SIGNUP_ENDPOINTS: [&str; 2] = ["consumidores/cadastro/", "empresas/cadastro/"];

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP 401: the cached credential is no longer accepted.
    #[error("session expired or token rejected")]
    Unauthorized,
    #[error("request rejected with {status}")]
    Rejected {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("network failure: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid endpoint {0}")]
    Url(String),
}

impl ApiError {
    /// The backend's own explanation, when it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e)
        }
    }
}

/// HTTP client for the complaint portal backend.
///
/// Cloning is cheap and clones share the cached credential, so setting or
/// clearing the token is seen by every holder.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), config.http_timeout)
    }

    pub fn set_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Matches with or without a leading `/`, so the raw path and the joined
    /// URL path agree.
    fn is_signup(path: &str) -> bool {
        SIGNUP_ENDPOINTS.iter().any(|endpoint| path.contains(endpoint))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Url(format!("{path}: {e}")))?;
        let anonymous = Self::is_signup(url.path());

        let mut builder = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");

        if !anonymous {
            if let Some(token) = self.token.read().as_deref() {
                builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
            }
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!("backend rejected request with {}: {}", status, body);
        Err(ApiError::Rejected {
            status,
            message: extract_message(&body),
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::POST, path)?.json(body);
        self.json(builder).await
    }

    // Auth

    pub async fn login(&self, role: Role, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let path = format!("/{}/login/", role.api_segment());
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json(&path, &body).await
    }

    pub async fn signup(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        let path = format!("/{}/cadastro/", registration.role().api_segment());
        match registration {
            Registration::Consumer(body) => self.post_json(&path, body).await,
            Registration::Company(body) => self.post_json(&path, body).await,
        }
    }

    pub async fn logout(&self, role: Role) -> Result<(), ApiError> {
        let path = format!("/{}/logout/", role.api_segment());
        self.send(self.request(Method::POST, &path)?).await?;
        Ok(())
    }

    // Complaints

    pub async fn get_complaint(&self, id: i64) -> Result<Complaint, ApiError> {
        let path = format!("/reclamacoes/{id}/");
        self.json(self.request(Method::GET, &path)?).await
    }

    pub async fn create_complaint(&self, body: &CreateComplaintRequest) -> Result<Complaint, ApiError> {
        self.post_json("/reclamacoes/", body).await
    }

    pub async fn respond(&self, complaint_id: i64, description: &str) -> Result<(), ApiError> {
        let path = format!("/reclamacoes/{complaint_id}/responder/");
        let builder = self
            .request(Method::POST, &path)?
            .json(&RespondRequest { descricao: description });
        self.send(builder).await?;
        Ok(())
    }

    pub async fn finalize(&self, response_id: i64, verdict: Verdict) -> Result<Option<ComplaintResponse>, ApiError> {
        let path = format!("/respostas-reclamacao/{response_id}/status/");
        let builder = self
            .request(Method::PATCH, &path)?
            .json(&FinalizeRequest { status_resolucao: verdict });
        let response = self.send(builder).await?;
        let body = response.text().await.unwrap_or_default();
        // The backend's reply body varies; the caller refetches anyway.
        Ok(serde_json::from_str(&body).ok())
    }

    // Directory

    pub async fn list_companies(&self) -> Result<Vec<Company>, ApiError> {
        let page: Page<Company> = self.json(self.request(Method::GET, "/empresas/")?).await?;
        Ok(page.results)
    }

    pub async fn find_consumers_by_email(&self, email: &str) -> Result<Vec<ConsumerProfile>, ApiError> {
        let builder = self
            .request(Method::GET, "/consumidores/")?
            .query(&[("email", email)]);
        let page: Page<ConsumerProfile> = self.json(builder).await?;
        Ok(page.results)
    }

    pub async fn update_consumer(&self, display_id: i64, update: &ProfileUpdate) -> Result<(), ApiError> {
        let path = format!("/consumidores/{display_id}/");
        self.send(self.request(Method::PATCH, &path)?.json(update)).await?;
        Ok(())
    }
}

/// Pull a human-readable message out of a DRF-style error body.
///
/// Checks `detail`, `descricao`, `message`, `error` and `non_field_errors`
/// in that order; each may be a string or a list of strings.
pub fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "descricao", "message", "error", "non_field_errors"]
        .iter()
        .find_map(|key| value.get(key).and_then(as_message))
}

fn as_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}
