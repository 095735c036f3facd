//! Classification of fetch failures into transient and permanent.
//!
//! The classifier is a keyword heuristic over the error text. An error whose
//! description contains none of the transient keywords is permanent: absence
//! of evidence means [`ErrorOutcome::Abort`].

use std::error::Error;

/// Keywords that mark an error description as transient.
pub const DEFAULT_RETRY_KEYWORDS: [&str; 6] = [
    "timeout",
    "connection",
    "network",
    "dns",
    "temporary failure",
    "service unavailable",
];

/// What the caller should do about a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOutcome {
    /// Transient failure; the caller may re-enter the rate check
    Retry,
    /// Permanent failure; surface it to the caller's caller
    Abort,
}

impl ErrorOutcome {
    /// Check if this outcome is Retry.
    pub fn is_retry(&self) -> bool {
        matches!(self, ErrorOutcome::Retry)
    }

    /// Check if this outcome is Abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, ErrorOutcome::Abort)
    }
}

/// Keyword-based error classifier.
///
/// # Example
/// ```
/// use fetch_governor::{ErrorClassifier, ErrorOutcome};
///
/// let classifier = ErrorClassifier::new();
/// assert_eq!(classifier.classify("Connection timed out"), ErrorOutcome::Retry);
/// assert_eq!(classifier.classify("404 Not Found"), ErrorOutcome::Abort);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    keywords: Vec<String>,
}

impl ErrorClassifier {
    /// Create a classifier with the default transient keywords.
    pub fn new() -> Self {
        Self {
            keywords: DEFAULT_RETRY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Add extra transient keywords.
    ///
    /// Keywords are matched case-insensitively; empty and duplicate keywords
    /// are ignored.
    pub fn with_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
        self
    }

    /// Classify an error description.
    pub fn classify(&self, description: &str) -> ErrorOutcome {
        let lowered = description.to_lowercase();
        if self.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            ErrorOutcome::Retry
        } else {
            ErrorOutcome::Abort
        }
    }

    /// Classify an error using its message and every error in its source chain.
    pub fn classify_error(&self, error: &(dyn Error + 'static)) -> ErrorOutcome {
        let mut current = Some(error);
        while let Some(err) = current {
            if self.classify(&err.to_string()).is_retry() {
                return ErrorOutcome::Retry;
            }
            current = err.source();
        }
        ErrorOutcome::Abort
    }

    /// The active keywords, lowercase.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::io;

    #[test]
    fn test_transient_descriptions() {
        let classifier = ErrorClassifier::new();

        for description in [
            "Connection timed out",
            "connection reset by peer",
            "Read TIMEOUT after 30s",
            "Network is unreachable",
            "DNS lookup failed",
            "Temporary failure in name resolution",
            "503 Service Unavailable",
        ] {
            assert_eq!(
                classifier.classify(description),
                ErrorOutcome::Retry,
                "{} should be transient",
                description
            );
        }
    }

    #[test]
    fn test_permanent_descriptions() {
        let classifier = ErrorClassifier::new();

        for description in [
            "404 Not Found",
            "403 Forbidden",
            "invalid URL",
            "",
            "500 Internal Server Error",
        ] {
            assert_eq!(
                classifier.classify(description),
                ErrorOutcome::Abort,
                "{:?} should be permanent",
                description
            );
        }
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = ErrorClassifier::new().with_keywords(["Too Many Requests", "", "dns"]);

        assert_eq!(classifier.classify("429 too many requests"), ErrorOutcome::Retry);
        assert_eq!(classifier.keywords().len(), DEFAULT_RETRY_KEYWORDS.len() + 1);
    }

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_classify_error_walks_sources() {
        let classifier = ErrorClassifier::new();

        let transient = Wrapped(io::Error::new(io::ErrorKind::Other, "connection refused"));
        assert_eq!(classifier.classify_error(&transient), ErrorOutcome::Retry);

        let permanent = Wrapped(io::Error::new(io::ErrorKind::Other, "bad certificate"));
        assert_eq!(classifier.classify_error(&permanent), ErrorOutcome::Abort);
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(ErrorOutcome::Retry.is_retry());
        assert!(!ErrorOutcome::Retry.is_abort());
        assert!(ErrorOutcome::Abort.is_abort());
    }
}
