use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::DirectoryError;

fn license_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4,6}-[A-Z]{2}$").expect("license pattern compiles"))
}

/// A regulator-issued medical license identifier (CRM), e.g. `12345-SP`.
///
/// Always holds the normalized form: uppercase, no whitespace, a single ASCII hyphen
/// between the four-to-six digit number and the two-letter state code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseId(String);

impl LicenseId {
    /// Normalize raw user input: uppercase, fold en/em dashes into `-`, drop whitespace.
    pub fn normalize(raw: &str) -> String {
        raw.trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
                other => other,
            })
            .flat_map(char::to_uppercase)
            .collect()
    }

    pub fn parse(raw: &str) -> Result<Self, DirectoryError> {
        let normalized = Self::normalize(raw);

        if normalized.is_empty() {
            return Err(DirectoryError::Validation("License identifier is required".to_string()));
        }

        if !license_pattern().is_match(&normalized) {
            return Err(DirectoryError::Validation(format!(
                "Invalid license identifier '{}': use the format 12345-SP",
                raw.trim()
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-letter issuing state.
    pub fn state(&self) -> &str {
        &self.0[self.0.len() - 2..]
    }
}

impl TryFrom<String> for LicenseId {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LicenseId> for String {
    fn from(value: LicenseId) -> Self {
        value.0
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
