// 🏢 Organizational Reference Data - Departments and Locations
//
// Both are immutable once seeded: an employee references them by UUID,
// and renaming a department never rewrites employee rows.

use serde::{Deserialize, Serialize};

// ============================================================================
// DEPARTMENT
// ============================================================================

/// Department - immutable reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Department name, unique across the organization
    pub name: String,
}

impl Department {
    pub fn new(name: &str) -> Self {
        Department {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        }
    }
}

// ============================================================================
// LOCATION
// ============================================================================

/// Location - one physical site; readers and access profiles are scoped to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Site name, unique across the organization
    pub name: String,
}

impl Location {
    pub fn new(name: &str) -> Self {
        Location {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_data_has_stable_ids() {
        let its = Department::new("ITS");
        let boston = Location::new("Boston");

        assert_eq!(its.name, "ITS");
        assert_eq!(boston.name, "Boston");
        assert_ne!(its.id, boston.id);
        assert_eq!(its.id.len(), 36, "UUID should be 36 chars");
    }
}
