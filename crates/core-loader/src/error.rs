use thiserror::Error;

/// Failure reported by a paged data source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("not signed in")]
    Unauthorized,
    #[error("request rejected ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
}

impl SourceError {
    /// Server-provided status code, when there is one.
    pub fn code(&self) -> Option<i64> {
        match self {
            SourceError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_codes() {
        let e = SourceError::Rejected {
            code: 401,
            message: "token expired".into(),
        };
        assert_eq!(e.to_string(), "request rejected (401): token expired");
        assert_eq!(e.code(), Some(401));
        assert_eq!(SourceError::Timeout.code(), None);
        assert_eq!(
            SourceError::Transport("reset by peer".into()).to_string(),
            "transport failure: reset by peer"
        );
    }
}
