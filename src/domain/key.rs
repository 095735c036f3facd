//! Request keys.
//!
//! A request key names one logical fetch (usually its URL). Keys are compared
//! and ordered by their canonical string, which gives the cache a deterministic
//! tie-break when two entries were inserted at the same instant.

use ahash::AHasher;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies one logical request.
///
/// # Example
/// ```
/// use fetch_governor::RequestKey;
///
/// let key = RequestKey::new("https://example.org/matches");
/// assert_eq!(key.as_str(), "https://example.org/matches");
/// assert_eq!(key.fingerprint(), RequestKey::from("https://example.org/matches").fingerprint());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Create a key from its canonical string.
    pub fn new(key: impl Into<String>) -> Self {
        RequestKey(key.into())
    }

    /// Build a key from several components, e.g. a URL and its query parameters.
    ///
    /// Components are joined with `|`. A `|` or `\` inside a component is
    /// escaped with `\`, so distinct component lists always produce distinct
    /// keys.
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut joined = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push('|');
            }
            for c in part.as_ref().chars() {
                if c == '|' || c == '\\' {
                    joined.push('\\');
                }
                joined.push(c);
            }
        }
        RequestKey(joined)
    }

    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable 64-bit fingerprint of the key.
    ///
    /// Used as a compact log field; not a cryptographic digest.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.0.hash(&mut hasher);
        hasher.finish()
    }

    /// Short hex identifier (12 characters) derived from the fingerprint.
    pub fn short_id(&self) -> String {
        let hex = format!("{:016x}", self.fingerprint());
        hex[..12].to_owned()
    }

    /// Consume the key and return the canonical string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(value: &str) -> Self {
        RequestKey::new(value)
    }
}

impl From<String> for RequestKey {
    fn from(value: String) -> Self {
        RequestKey(value)
    }
}

impl Borrow<str> for RequestKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
