use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The named snapshot has never been built (or was retired).
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed document '{path}': {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("No results matched query '{0}'")]
    NoMatches(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Retrieval failures that may succeed when the call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Backend(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failures() {
        assert!(Error::NotFound("demo".into()).is_not_found());
        assert!(!Error::NotFound("demo".into()).is_transient());
        assert!(Error::Backend(anyhow::anyhow!("io")).is_transient());
        assert!(!Error::NoMatches("q".into()).is_transient());
    }

    #[test]
    fn display_names_the_document() {
        let e = Error::MalformedDocument { path: "a.py".into(), reason: "empty".into() };
        assert_eq!(e.to_string(), "Malformed document 'a.py': empty");
    }
}
