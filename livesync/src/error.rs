use thiserror::Error;

/// Why one request/response cycle against the backend produced no payload.
///
/// Background pollers never raise these to the view: they turn into
/// "no update this cycle" and the last good data stays on screen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never reached the server (DNS, connect, IO).
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint needs a user or trade id the caller did not supply.
    /// Nothing is sent.
    #[error("{0} requires a subject id")]
    MissingSubject(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error: status {status}")]
    Server { status: u16 },

    /// 2xx, but the envelope or payload did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::MissingSubject(_) => "missing_subject",
            FetchError::Timeout => "timeout",
            FetchError::Server { .. } => "server",
            FetchError::MalformedResponse(_) => "malformed",
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        FetchError::MalformedResponse(msg.into())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Server {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            FetchError::MalformedResponse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Failure of a user-initiated command (mark read, send message).
/// Unlike background polls these are returned to the caller.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("resource is not active")]
    Inactive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(FetchError::Network("x".into()).kind(), "network");
        assert_eq!(FetchError::MissingSubject("chat".into()).kind(), "missing_subject");
        assert_eq!(FetchError::Timeout.kind(), "timeout");
        assert_eq!(FetchError::Server { status: 503 }.kind(), "server");
        assert_eq!(FetchError::malformed("x").kind(), "malformed");
    }

    #[test]
    fn server_error_displays_status() {
        let e = FetchError::Server { status: 502 };
        assert_eq!(e.to_string(), "server error: status 502");
    }
}
