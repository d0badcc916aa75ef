use thiserror::Error;

use crate::service::ServiceError;

/// Failures surfaced by the evaluation session.
///
/// `Validation` and `Precondition` are raised synchronously and never reach the
/// network. `Transport` and `Service` only arrive through the asynchronous
/// failure events and always leave prior inputs in place for a retry.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionError {
    /// Local input was rejected (bad mode name, malformed file, unknown variable).
    #[error("Invalid input: {0}")]
    Validation(String),
    /// The operation is not permitted in the current session state.
    #[error("Not allowed right now: {0}")]
    Precondition(String),
    /// The Evaluation Service could not be reached or did not answer in time.
    #[error("Evaluation service unreachable: {0}")]
    Transport(String),
    /// The Evaluation Service answered with an error or an unusable body.
    #[error("{}", service_message(.status, .message))]
    Service {
        /// HTTP status, when the failure came from a non-2xx response.
        status: Option<u16>,
        /// Error text reported by the service.
        message: String,
    },
    /// A discovery response lost the race against a newer request and was dropped.
    #[error("Response for request {token} was superseded by a newer request")]
    StaleResponseDiscarded {
        /// Token of the discarded response.
        token: u64,
    },
}

impl SessionError {
    /// True when the failure came from the remote side and a plain resubmit may succeed.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Service { .. })
    }
}

impl From<ServiceError> for SessionError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Transport(message) => Self::Transport(message),
            ServiceError::Timeout(message) => Self::Transport(format!("timed out: {message}")),
            ServiceError::Status { status, message } => Self::Service {
                status: Some(status),
                message,
            },
            ServiceError::InvalidResponse(message) => Self::Service {
                status: None,
                message: format!("invalid response: {message}"),
            },
        }
    }
}

fn service_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Evaluation service error (HTTP {status}): {message}"),
        None => format!("Evaluation service error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_failures_keep_code_and_message() {
        let err = SessionError::from(ServiceError::Status {
            status: 500,
            message: "Latitude and longitude coordinates not found in the data.".into(),
        });
        assert_eq!(
            err.to_string(),
            "Evaluation service error (HTTP 500): Latitude and longitude coordinates not found in the data."
        );
        assert!(err.is_remote());
    }

    #[test]
    fn timeouts_map_to_transport() {
        let err = SessionError::from(ServiceError::Timeout("read".into()));
        assert!(matches!(err, SessionError::Transport(ref msg) if msg.contains("timed out")));
    }

    #[test]
    fn local_errors_are_not_remote() {
        assert!(!SessionError::Validation("x".into()).is_remote());
        assert!(!SessionError::Precondition("x".into()).is_remote());
        assert!(!SessionError::StaleResponseDiscarded { token: 1 }.is_remote());
    }
}
