// 🔑 Access Entities - Readers, Profiles, Rules, Grants
//
// Reader: physical entry point, belongs to exactly one location.
// AccessProfile: named clearance level scoped to one location, linked to
//                readers through a many-to-many junction.
// AccessRule: Department × Location → AccessProfile mapping used for
//             automatic default assignment.
// AccessGrant: Employee × AccessProfile junction. Default grants are created
//              only by the engine; revocation sets a timestamp, never deletes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// READER
// ============================================================================

/// Physical access-control device at one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reader {
    /// Stable identity (UUID)
    pub id: String,

    pub name: String,

    /// Exactly one location per reader
    pub location_id: String,
}

impl Reader {
    pub fn new(name: &str, location_id: &str) -> Self {
        Reader {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            location_id: location_id.to_string(),
        }
    }
}

// ============================================================================
// ACCESS PROFILE
// ============================================================================

/// Named clearance level, scoped to one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessProfile {
    /// Stable identity (UUID)
    pub id: String,

    pub name: String,

    /// A profile only ever opens readers at its own location
    pub location_id: String,
}

impl AccessProfile {
    pub fn new(name: &str, location_id: &str) -> Self {
        AccessProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            location_id: location_id.to_string(),
        }
    }
}

// ============================================================================
// ACCESS RULE
// ============================================================================

/// Default-assignment rule: employees placed in (department, location)
/// automatically receive a grant for this profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub department_id: String,
    pub location_id: String,
    pub profile_id: String,
}

// ============================================================================
// ACCESS GRANT
// ============================================================================

/// Junction linking an Employee to an AccessProfile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Stable identity (UUID)
    pub id: String,

    pub employee_id: String,
    pub profile_id: String,

    pub granted_at: DateTime<Utc>,

    /// "rule-engine" for default grants, an admin identifier otherwise
    pub granted_by: String,

    /// Revocation timestamp; None = grant is active
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    /// Create a default grant attributed to the rule engine
    pub fn default_grant(employee_id: &str, profile_id: &str) -> Self {
        AccessGrant {
            id: uuid::Uuid::new_v4().to_string(),
            employee_id: employee_id.to_string(),
            profile_id: profile_id.to_string(),
            granted_at: Utc::now(),
            granted_by: "rule-engine".to_string(),
            revoked_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grant_attribution() {
        let grant = AccessGrant::default_grant("emp-1", "profile-1");

        assert_eq!(grant.granted_by, "rule-engine");
        assert!(grant.is_active());
    }
}
