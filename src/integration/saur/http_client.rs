//! SAUR HTTP client.
//! This is the lower level client for the SAUR API: session handling, retries and circuit breaking.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use async_lock::RwLock;
use failsafe::{
    backoff::{self, Constant},
    failure_policy::{self, ConsecutiveFailures},
    futures::CircuitBreaker,
};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use super::schemas::{AuthRequest, AuthResponse};
use super::{Error, Result};

const AUTH_PATH: &str = "admin/v2/auth";

/// Placeholder replaced by the session section id in endpoint templates.
pub const SECTION_PLACEHOLDER: &str = "{section}";

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub section_id: String,
}

pub struct HttpClient {
    client: Client,
    base_url: Url,
    login: String,
    password: String,
    section_override: Option<String>,
    session: RwLock<Option<Session>>,
    circuit_breaker: failsafe::StateMachine<ConsecutiveFailures<Constant>, ()>,
}

impl HttpClient {
    /// Creates a new instance of `HttpClient`.
    /// `section_id` overrides the default section returned at authentication.
    pub fn new(url: Url, login: String, password: String, section_id: Option<String>) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        HttpClient {
            client,
            base_url: url,
            login,
            password,
            section_override: section_id,
            session: RwLock::new(None),
            circuit_breaker: Self::circuit_breaker(),
        }
    }

    /// Reuse a token obtained earlier, skipping the authentication round-trip.
    pub async fn restore_session(&self, access_token: String, section_id: String) {
        *self.session.write().await = Some(Session {
            access_token,
            section_id,
        });
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    /// Authenticate with the configured credentials, replacing any current session.
    pub async fn authenticate(&self) -> Result<Session> {
        self.resilient(|| self.refresh_session()).await
    }

    /// GET a JSON document. `template` may contain the section placeholder.
    /// An empty body is returned as `Value::Null`.
    pub async fn get(&self, template: &str, query: &[(&str, String)]) -> Result<Value> {
        self.resilient(|| self.request_get(template, query)).await
    }

    /// Private methods --------------------------------------------------------

    async fn resilient<T, F, Fut>(&self, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let circuit_breaker = &self.circuit_breaker;
        RetryIf::spawn(
            Self::retry_strategy(),
            || {
                let request = action();
                async move {
                    circuit_breaker
                        .call_with(Self::is_recorded_error, request)
                        .await
                        .map_err(|err| match err {
                            failsafe::Error::Rejected => Error::RequestRejected,
                            failsafe::Error::Inner(e) => e,
                        })
                }
            },
            Self::is_retryable_error,
        )
        .await
    }

    async fn refresh_session(&self) -> Result<Session> {
        let mut session = self.session.write().await;
        let fresh = self.request_auth().await?;
        *session = Some(fresh.clone());
        Ok(fresh)
    }

    /// Get the session if it exists, otherwise authenticate.
    async fn get_session(&self) -> Result<Session> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }
        self.refresh_session().await
    }

    /// Clear the session if its token matches the provided one.
    async fn clear_token(&self, token: &str) {
        let mut session = self.session.write().await;
        if session
            .as_ref()
            .is_some_and(|current| current.access_token == token)
        {
            *session = None;
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Internal method to request a new access token.
    async fn request_auth(&self) -> Result<Session> {
        log::debug!("Sending authentication request for '{}'", self.login);
        let response = self
            .client
            .post(self.endpoint(AUTH_PATH))
            .json(&AuthRequest::new(&self.login, &self.password))
            .send()
            .await?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = response.text().await.unwrap_or_default();
            log::debug!("Authentication rejected with {status}: {body}");
            return Err(Error::AuthenticationFailed(format!("{status} {body}")));
        }
        let text = response.error_for_status()?.text().await?;
        let auth: AuthResponse = serde_json::from_str(&text)?;
        let section_id = self
            .section_override
            .clone()
            .or(auth.default_section_id)
            .ok_or_else(|| {
                Error::ValueParseError("Missing section id in authentication response".into())
            })?;
        log::debug!("Authentication successful for section {section_id}");
        Ok(Session {
            access_token: auth.token.access_token,
            section_id,
        })
    }

    /// Internal method to perform an authenticated GET.
    async fn request_get(&self, template: &str, query: &[(&str, String)]) -> Result<Value> {
        let session = self.get_session().await?;
        let path = template.replace(SECTION_PLACEHOLDER, &session.section_id);
        log::debug!("Sending GET request {path} {query:?}");
        let response = self
            .client
            .get(self.endpoint(&path))
            .bearer_auth(&session.access_token)
            .query(query)
            .send()
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            log::debug!("Access denied on {path}, clearing token");
            self.clear_token(&session.access_token).await;
            return Err(Error::AccessDenied);
        }
        let text = response.error_for_status()?.text().await?;
        log::debug!("Response for {path}: {text}");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Creates a circuit breaker with a failure policy that allows up to 5 consecutive failures and will retry after 60 seconds.
    fn circuit_breaker() -> failsafe::StateMachine<ConsecutiveFailures<Constant>, ()> {
        let backoff = backoff::constant(Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(5, backoff);
        failsafe::Config::new().failure_policy(policy).build()
    }

    /// Create a retry strategy with exponential backoff starting at 10 milliseconds, with jitter, and a maximum of 3 retries.
    fn retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(10).map(jitter).take(3)
    }

    /// Check if the error is a HTTP 4xx client error.
    fn is_client_error(error: &reqwest::Error) -> bool {
        error
            .status()
            .map(|status_code| StatusCode::is_client_error(&status_code))
            .unwrap_or(false)
    }

    // Predicate function for the retry strategy to determine if an error is retryable.
    fn is_retryable_error(error: &Error) -> bool {
        match error {
            Error::RequestFailed(err) => !HttpClient::is_client_error(err),
            Error::AccessDenied => true, // Token expired, retry with a fresh one
            Error::AuthenticationFailed(_) => false,
            Error::RequestRejected => false,
            Error::ResponseJsonError(_) => false,
            Error::ValueParseError(_) => false,
        }
    }

    /// Predicate function for the circuit breaker to record errors that are not client errors.
    fn is_recorded_error(error: &Error) -> bool {
        match error {
            Error::RequestFailed(err) => !HttpClient::is_client_error(err),
            Error::AccessDenied => false,
            Error::AuthenticationFailed(_) => false,
            Error::RequestRejected => false,
            Error::ResponseJsonError(_) => false,
            Error::ValueParseError(_) => false,
        }
    }
}
