// 👤 Employee Entity - identity code as business key, UUID as identity
//
// The identity code is a VALUE (regenerated on name change), the UUID is
// IDENTITY (never changes). Grants and swipe events reference the UUID, so
// a name change never breaks audit history.
//
// Access state is never stored: ACTIVE vs EXPIRED is a pure function of the
// contract expiration date at read time.

use crate::identity::IdentityCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// EMPLOYEE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    /// Stable identity (UUID) - NEVER changes, even across renames
    pub id: String,

    /// Business key: {FirstInitial}{LastInitial}{6 digits}, unique store-wide
    pub identity_code: IdentityCode,

    pub first_name: String,
    pub last_name: String,

    /// Organizational placement (drives default access assignment)
    pub department_id: String,
    pub location_id: String,

    /// Contract end date; the employee is EXPIRED strictly after this day
    pub contract_expires: NaiveDate,

    /// Extensible metadata (can grow without schema changes)
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

impl Employee {
    /// Initials used to derive the identity-code prefix
    pub fn initials(&self) -> (Option<char>, Option<char>) {
        (
            self.first_name.chars().next(),
            self.last_name.chars().next(),
        )
    }

    /// Contract check only - grant existence is the engine's concern
    pub fn contract_active(&self, as_of: NaiveDate) -> bool {
        self.contract_expires >= as_of
    }
}

// ============================================================================
// NEW EMPLOYEE (onboarding draft)
// ============================================================================

/// Draft record for a hire that has not been persisted yet.
/// The identity code is optional here: when absent the engine derives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub department_id: String,
    pub location_id: String,
    pub contract_expires: NaiveDate,

    /// Proposed code supplied by an administrator; validated, never trusted
    #[serde(default)]
    pub proposed_code: Option<String>,
}

impl NewEmployee {
    /// Finalize the draft into a persistable Employee with a validated code
    pub fn into_employee(self, code: IdentityCode) -> Employee {
        Employee {
            id: uuid::Uuid::new_v4().to_string(),
            identity_code: code,
            first_name: self.first_name,
            last_name: self.last_name,
            department_id: self.department_id,
            location_id: self.location_id,
            contract_expires: self.contract_expires,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}
