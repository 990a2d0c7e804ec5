//! Home Assistant HTTP client.
//! This is the lower level client for Home Assistant devices.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use failsafe::{
    backoff::{self, Constant},
    failure_policy::{self, ConsecutiveFailures},
    futures::CircuitBreaker,
};
use reqwest::{Client, StatusCode, Url};
use serde_json::{self};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

use super::schemas::{StateCreateOrUpdate, StatisticsImport};
use super::{Error, Result};

pub struct HttpClient {
    client: Client,
    token: String,
    base_url: Url,
    circuit_breaker: failsafe::StateMachine<ConsecutiveFailures<Constant>, ()>,
}

impl HttpClient {
    /// Creates a new instance of `HttpClient`.
    pub fn new(url: Url, token: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30)) // 30 seconds idle timeout
            .pool_max_idle_per_host(2) // Maximum 2 idle connections per host
            .timeout(Duration::from_secs(10)) // statistics imports can be large
            .build()
            .expect("Failed to create HTTP client");
        HttpClient {
            client,
            token,
            base_url: url,
            circuit_breaker: Self::circuit_breaker(),
        }
    }

    /// Creates or updates a state in Home Assistant.
    pub async fn set_state(&self, entity_id: &str, state: &StateCreateOrUpdate) -> Result<()> {
        let body = serde_json::to_string(state)?;
        self.post_with_retry(&format!("api/states/{entity_id}"), &body)
            .await
    }

    /// Imports external statistics through the recorder service.
    pub async fn import_statistics(&self, import: &StatisticsImport) -> Result<()> {
        let body = serde_json::to_string(import)?;
        self.post_with_retry("api/services/recorder/import_statistics", &body)
            .await
    }

    async fn post_with_retry(&self, path: &str, body: &str) -> Result<()> {
        RetryIf::spawn(
            Self::retry_strategy(),
            || async {
                self.circuit_breaker
                    .call_with(Self::is_recorded_error, self.request_post(path, body))
                    .await
                    .map_err(|err| match err {
                        failsafe::Error::Rejected => Error::RequestRejected,
                        failsafe::Error::Inner(e) => e,
                    })
            },
            Self::is_retryable_error,
        )
        .await?;
        Ok(())
    }

    /// Internal method to post a JSON body to Home Assistant.
    async fn request_post(&self, path: &str, body: &str) -> Result<()> {
        log::debug!("Sending post request to '{path}': {body}");
        self.client
            .post(self.endpoint(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Join `path` to the base URL, which may itself carry a path prefix.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
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
            Error::RequestRejected => false,
            Error::JsonSerializationFailed(_) => false,
        }
    }

    /// Predicate function for the circuit breaker to record errors that are not client errors.
    fn is_recorded_error(error: &Error) -> bool {
        match error {
            Error::RequestFailed(err) => !HttpClient::is_client_error(err),
            Error::RequestRejected => false,
            Error::JsonSerializationFailed(_) => false,
        }
    }
}
