use thiserror::Error;

/// Failure of a single remote call.
///
/// None of these are fatal to the caller: the coordinator turns every one of
/// them into a queued mutation. `is_transient` decides whether the entry keeps
/// retrying forever or counts towards dead-lettering.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote call timed out")]
    Timeout,

    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to an error. 5xx and 429 mean "try later".
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            body.trim().to_string()
        };
        if status >= 500 || status == 429 {
            RemoteError::Unavailable(message)
        } else {
            RemoteError::Rejected { status, message }
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unavailable(_) | RemoteError::Timeout | RemoteError::Decode(_) => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            RemoteError::Timeout
        } else if error.is_decode() {
            RemoteError::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            RemoteError::from_status(status.as_u16(), &error.to_string())
        } else {
            RemoteError::Unavailable(error.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(error: serde_json::Error) -> Self {
        RemoteError::Decode(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(RemoteError::from_status(503, ""), RemoteError::Unavailable(_)));
        assert!(matches!(RemoteError::from_status(429, "slow down"), RemoteError::Unavailable(_)));
        assert_eq!(
            RemoteError::from_status(400, "  invalid input syntax for type uuid  "),
            RemoteError::rejected(400, "invalid input syntax for type uuid")
        );
        assert_eq!(RemoteError::from_status(409, ""), RemoteError::rejected(409, "HTTP 409"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Unavailable("offline".into()).is_transient());
        assert!(RemoteError::rejected(502, "bad gateway").is_transient());
        assert!(!RemoteError::rejected(422, "schema violation").is_transient());
        assert!(!RemoteError::rejected(401, "JWT expired").is_transient());
    }
}
