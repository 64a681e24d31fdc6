//! Server identity fingerprints.
//!
//! A fingerprint keeps the exact text it was supplied with (so stores and
//! messages echo what a human typed) while equality and hashing use the
//! normalized form: colons stripped, ASCII upper-cased.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Hexadecimal server identity, compared case- and colon-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a fingerprint string exactly as supplied.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Render raw digest bytes as upper-case, colon-separated hex.
    #[must_use]
    pub fn from_digest(bytes: &[u8]) -> Self {
        let text = bytes
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        Self(text)
    }

    /// The fingerprint as originally supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Comparison form: colons removed, upper-cased.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0
            .chars()
            .filter(|ch| *ch != ':')
            .map(|ch| ch.to_ascii_uppercase())
            .collect()
    }

    /// Whether the fingerprint carries no hex digits at all.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.normalized().trim().is_empty()
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl Display for Fingerprint {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_case_and_colons() {
        let upper = Fingerprint::new("AA:BB");
        let lower = Fingerprint::new("aabb");
        let mixed = Fingerprint::new("AA:bb");
        assert_eq!(upper, lower);
        assert_eq!(lower, mixed);
        assert_eq!(upper, mixed);
        assert_ne!(upper, Fingerprint::new("AA:BC"));
    }

    #[test]
    fn display_preserves_supplied_text() {
        let fingerprint = Fingerprint::new("7d:fe:de");
        assert_eq!(fingerprint.to_string(), "7d:fe:de");
        assert_eq!(fingerprint.normalized(), "7DFEDE");
    }

    #[test]
    fn from_digest_renders_colon_hex() {
        let fingerprint = Fingerprint::from_digest(&[0x7d, 0x0a, 0xff]);
        assert_eq!(fingerprint.as_str(), "7D:0A:FF");
    }

    #[test]
    fn blank_detects_separator_only_input() {
        assert!(Fingerprint::new("").is_blank());
        assert!(Fingerprint::new(":::").is_blank());
        assert!(!Fingerprint::new("0A").is_blank());
    }

    #[test]
    fn serde_is_transparent() -> Result<(), serde_json::Error> {
        let fingerprint = Fingerprint::new("AA:BB");
        let json = serde_json::to_string(&fingerprint)?;
        assert_eq!(json, "\"AA:BB\"");
        let back: Fingerprint = serde_json::from_str(&json)?;
        assert_eq!(back.as_str(), "AA:BB");
        Ok(())
    }
}
