// 🪪 Identity Codes - {FirstInitial}{LastInitial}{6 digits}
//
// Format rules:
// - exactly 8 characters
// - two uppercase ASCII letters derived from the employee's initials
// - six-digit zero-padded sequence number, allocated per prefix
//
// Sequence allocation starts at 100001 for a fresh prefix and grows by one;
// global uniqueness is backed by the store's UNIQUE constraint on the code.
// Parsing enforces the same 100001..=999999 range as allocation: a stored
// low-suffix code would poison max-sequence scans for its prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// First sequence number handed out for a prefix
pub const SEQUENCE_START: u32 = 100_001;

/// Largest representable sequence; past this the prefix is exhausted
pub const SEQUENCE_MAX: u32 = 999_999;

// ============================================================================
// IDENTITY CODE
// ============================================================================

/// Validated employee identity code. Construction always goes through
/// `parse` or `new`, so a held value is known well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityCode {
    prefix: String,
    sequence: u32,
}

impl IdentityCode {
    /// Build a code from an already-derived prefix and sequence number.
    /// Returns None when either half is out of range.
    pub fn new(prefix: &str, sequence: u32) -> Option<Self> {
        if !is_valid_prefix(prefix) {
            return None;
        }
        if !(SEQUENCE_START..=SEQUENCE_MAX).contains(&sequence) {
            return None;
        }
        Some(IdentityCode {
            prefix: prefix.to_string(),
            sequence,
        })
    }

    /// Parse a raw string against the required pattern. Rejects sequences
    /// outside the allocatable range, keeping parse and `new` consistent.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != 8 {
            return None;
        }
        let (prefix, digits) = raw.split_at(2);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let sequence: u32 = digits.parse().ok()?;
        IdentityCode::new(prefix, sequence)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for IdentityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:06}", self.prefix, self.sequence)
    }
}

impl From<IdentityCode> for String {
    fn from(code: IdentityCode) -> String {
        code.to_string()
    }
}

impl TryFrom<String> for IdentityCode {
    type Error = CodeFormatError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        IdentityCode::parse(&raw).ok_or(CodeFormatError(raw))
    }
}

/// Raised when a persisted string does not match the code pattern
#[derive(Debug, Clone)]
pub struct CodeFormatError(pub String);

impl fmt::Display for CodeFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed identity code: {:?}", self.0)
    }
}

impl std::error::Error for CodeFormatError {}

// ============================================================================
// PREFIX DERIVATION
// ============================================================================

fn is_valid_prefix(prefix: &str) -> bool {
    prefix.len() == 2 && prefix.chars().all(|c| c.is_ascii_uppercase())
}

/// Derive the two-letter prefix from first/last name initials.
/// Returns None when either name is missing a usable ASCII initial.
pub fn derive_prefix(first_name: &str, last_name: &str) -> Option<String> {
    let f = first_name.trim().chars().next()?;
    let l = last_name.trim().chars().next()?;
    if !f.is_ascii_alphabetic() || !l.is_ascii_alphabetic() {
        return None;
    }
    Some(format!(
        "{}{}",
        f.to_ascii_uppercase(),
        l.to_ascii_uppercase()
    ))
}
