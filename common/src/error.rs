use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream API error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("parsing error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a non-2xx HTTP response into the error taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => Error::RateLimited(message),
            401 | 403 => Error::Auth(message),
            400..=499 => Error::Parameter(message),
            _ => Error::Upstream { status, message },
        }
    }

    /// Whether a bounded retry of the same request can succeed.
    ///
    /// Transport errors, rate limits and server-side upstream failures are
    /// retryable; auth and parameter errors are not, since resending an
    /// identical request cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited(_) => true,
            Error::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert!(matches!(
            Error::from_status(429, String::new()),
            Error::RateLimited(_)
        ));
        assert!(matches!(Error::from_status(401, String::new()), Error::Auth(_)));
        assert!(matches!(
            Error::from_status(400, String::new()),
            Error::Parameter(_)
        ));
        assert!(matches!(
            Error::from_status(503, String::new()),
            Error::Upstream { status: 503, .. }
        ));
    }

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(Error::RateLimited("slow down".into()).is_retryable());
        assert!(Error::Upstream { status: 502, message: String::new() }.is_retryable());
        assert!(!Error::Upstream { status: 200, message: String::new() }.is_retryable());
        assert!(!Error::Auth("bad key".into()).is_retryable());
        assert!(!Error::Parameter("bad symbol".into()).is_retryable());
    }
}
