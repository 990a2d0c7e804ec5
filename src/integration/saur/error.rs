//! Error handling for the SAUR API client.
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Authorization failed: access denied (token not allowed or expired)")]
    AccessDenied,

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Request rejected: circuit breaker open")]
    RequestRejected,

    #[error("Response JSON error: {0}")]
    ResponseJsonError(#[from] serde_json::Error),
    #[error("Value parse error: {0}")]
    ValueParseError(String),
}

/// Coarse classification used by callers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimited,
    NotFound,
    TransientNetwork,
    Unknown,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AuthenticationFailed(_) | Error::AccessDenied => ErrorKind::Auth,
            Error::RequestRejected => ErrorKind::TransientNetwork,
            Error::RequestFailed(err) => match err.status() {
                Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => ErrorKind::Auth,
                Some(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::RateLimited,
                Some(StatusCode::NOT_FOUND) => ErrorKind::NotFound,
                Some(_) => ErrorKind::Unknown,
                None if err.is_connect() || err.is_timeout() || err.is_request() => {
                    ErrorKind::TransientNetwork
                }
                None => Self::kind_from_message(&err.to_string()),
            },
            Error::ResponseJsonError(_) | Error::ValueParseError(_) => {
                Self::kind_from_message(&self.to_string())
            }
        }
    }

    /// Last resort for errors without a status code.
    fn kind_from_message(message: &str) -> ErrorKind {
        if message.to_lowercase().contains("unauthorized") {
            ErrorKind::Auth
        } else {
            ErrorKind::Unknown
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn status_error(status: StatusCode) -> Error {
        let response = http::Response::builder()
            .status(status)
            .body(Vec::new())
            .unwrap();
        Error::RequestFailed(
            reqwest::Response::from(response)
                .error_for_status()
                .unwrap_err(),
        )
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, ErrorKind::Auth)]
    #[case(StatusCode::FORBIDDEN, ErrorKind::Auth)]
    #[case(StatusCode::TOO_MANY_REQUESTS, ErrorKind::RateLimited)]
    #[case(StatusCode::NOT_FOUND, ErrorKind::NotFound)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Unknown)]
    fn test_kind_from_status(#[case] status: StatusCode, #[case] expected: ErrorKind) {
        assert_eq!(status_error(status).kind(), expected);
    }

    #[test]
    fn test_kind_of_local_errors() {
        assert_eq!(Error::AccessDenied.kind(), ErrorKind::Auth);
        assert_eq!(
            Error::AuthenticationFailed("bad password".into()).kind(),
            ErrorKind::Auth
        );
        assert_eq!(Error::RequestRejected.kind(), ErrorKind::TransientNetwork);
        assert_eq!(
            Error::ValueParseError("Unauthorized section".into()).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            Error::ValueParseError("missing field".into()).kind(),
            ErrorKind::Unknown
        );
    }
}
