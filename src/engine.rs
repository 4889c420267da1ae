// ⚙️ Access Rule Engine - identity-code validation and default assignment
//
// The one place with conditional business logic. The engine is stateless
// between invocations: every operation reads the store it borrows, computes,
// and returns. Nothing is retried internally - retry policy on
// UniquenessConflict belongs to the caller (e.g. an onboarding workflow).
//
// Callers invoke these operations explicitly right after the corresponding
// store mutation. The guarantee: no employee exists for long without a
// validated code and, if a rule exists, a default grant.

use crate::db::{self, StoreError};
use crate::entities::{AccessGrant, Employee, NewEmployee};
use crate::identity::{self, IdentityCode, SEQUENCE_MAX, SEQUENCE_START};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::fmt;

// ============================================================================
// ENGINE ERROR
// ============================================================================

/// Recoverable engine failures. Each carries the offending field/value so the
/// caller can correct and retry; none of them touches unrelated records.
#[derive(Debug)]
pub enum EngineError {
    /// Supplied identity code does not match the required pattern
    InvalidFormat { value: String, reason: &'static str },

    /// Six-digit sequence space exhausted for a prefix
    CodeCollision { prefix: String },

    /// No access rule configured for a department/location pairing
    NoRuleDefined {
        department_id: String,
        location_id: String,
    },

    /// A concurrent writer won a race on a unique key; retry with new input
    UniquenessConflict { key: String },

    /// Persistence-layer fault; propagated, not handled here
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidFormat { value, reason } => {
                write!(f, "invalid identity code {:?}: {}", value, reason)
            }
            EngineError::CodeCollision { prefix } => {
                write!(f, "sequence space exhausted for prefix {}", prefix)
            }
            EngineError::NoRuleDefined {
                department_id,
                location_id,
            } => write!(
                f,
                "no access rule for department {} at location {}",
                department_id, location_id
            ),
            EngineError::UniquenessConflict { key } => {
                write!(f, "concurrent writer won the race on {}", key)
            }
            EngineError::Store(e) => write!(f, "store failure: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { key } => EngineError::UniquenessConflict { key },
            other => EngineError::Store(other),
        }
    }
}

// ============================================================================
// ACCESS RULE ENGINE
// ============================================================================

pub struct AccessRuleEngine<'a> {
    conn: &'a Connection,
}

impl<'a> AccessRuleEngine<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        AccessRuleEngine { conn }
    }

    /// Validate a proposed identity code, or derive one when absent.
    ///
    /// A supplied code must match {FirstInitial}{LastInitial}{6 digits} AND
    /// carry the prefix derived from this employee's initials. With no code
    /// supplied, the engine takes the next unused sequence for the derived
    /// prefix. Computes only - persisting the finalized code is the caller's
    /// job, and the store's UNIQUE column settles any concurrent race.
    pub fn validate_or_generate_identity_code(
        &self,
        draft: &NewEmployee,
    ) -> Result<IdentityCode, EngineError> {
        let prefix = derive_prefix_checked(&draft.first_name, &draft.last_name)?;

        match &draft.proposed_code {
            Some(raw) => {
                let code = IdentityCode::parse(raw).ok_or(EngineError::InvalidFormat {
                    value: raw.clone(),
                    reason: "expected two uppercase initials followed by a six-digit \
                             sequence between 100001 and 999999",
                })?;
                if code.prefix() != prefix {
                    return Err(EngineError::InvalidFormat {
                        value: raw.clone(),
                        reason: "prefix does not match the employee's initials",
                    });
                }
                Ok(code)
            }
            None => self.next_code_for_prefix(&prefix),
        }
    }

    /// Recompute the code after a first/last name change.
    ///
    /// Unchanged prefix -> the old code is returned untouched. New prefix ->
    /// the numeric suffix is preserved when still unused there, otherwise the
    /// next free suffix is allocated.
    pub fn regenerate_on_name_change(
        &self,
        employee: &Employee,
        old_code: &IdentityCode,
    ) -> Result<IdentityCode, EngineError> {
        let prefix = derive_prefix_checked(&employee.first_name, &employee.last_name)?;

        if prefix == old_code.prefix() {
            return Ok(old_code.clone());
        }

        // Suffix preservation keeps the code recognizable across a rename
        if let Some(candidate) = IdentityCode::new(&prefix, old_code.sequence()) {
            if !db::code_exists(self.conn, &candidate)? {
                return Ok(candidate);
            }
        }

        self.next_code_for_prefix(&prefix)
    }

    /// Create one grant per profile mapped for the employee's current
    /// department/location pairing, skipping profiles already granted.
    ///
    /// Idempotent: a second run creates nothing new, and a concurrent run
    /// losing the UNIQUE(employee, profile) race is treated as already
    /// granted rather than an error. Returns only the grants created by
    /// this call.
    pub fn assign_default_access(
        &self,
        employee: &Employee,
    ) -> Result<Vec<AccessGrant>, EngineError> {
        let profiles =
            db::profiles_for_rule(self.conn, &employee.department_id, &employee.location_id)?;

        if profiles.is_empty() {
            return Err(EngineError::NoRuleDefined {
                department_id: employee.department_id.clone(),
                location_id: employee.location_id.clone(),
            });
        }

        let existing: Vec<String> = db::grants_for_employee(self.conn, &employee.id)?
            .into_iter()
            .map(|g| g.profile_id)
            .collect();

        let mut created = Vec::new();
        for profile in profiles {
            // A grant may only reference a profile at the employee's location
            if profile.location_id != employee.location_id {
                return Err(EngineError::Store(StoreError::InvariantViolation {
                    message: format!(
                        "rule maps profile {} outside employee location {}",
                        profile.id, employee.location_id
                    ),
                }));
            }

            if existing.contains(&profile.id) {
                continue;
            }

            let grant = AccessGrant::default_grant(&employee.id, &profile.id);
            match db::insert_grant(self.conn, &grant) {
                Ok(()) => created.push(grant),
                // Concurrent caller granted the same pair first: same outcome
                Err(StoreError::UniqueViolation { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(created)
    }

    /// Pure read: true iff the contract runs through `as_of` (inclusive) and
    /// at least one non-revoked grant exists. ACTIVE vs EXPIRED is recomputed
    /// on every call; no transition is ever stored.
    pub fn is_access_currently_valid(
        &self,
        employee: &Employee,
        as_of: NaiveDate,
    ) -> Result<bool, EngineError> {
        if !employee.contract_active(as_of) {
            return Ok(false);
        }
        Ok(db::active_grant_count(self.conn, &employee.id)? > 0)
    }

    /// Next unused sequence for a prefix: one past the highest allocated,
    /// SEQUENCE_START for a fresh prefix.
    fn next_code_for_prefix(&self, prefix: &str) -> Result<IdentityCode, EngineError> {
        let next = match db::max_sequence_for_prefix(self.conn, prefix)? {
            Some(max) => max + 1,
            None => SEQUENCE_START,
        };

        if next > SEQUENCE_MAX {
            return Err(EngineError::CodeCollision {
                prefix: prefix.to_string(),
            });
        }

        // new() only fails on range, which the check above rules out
        IdentityCode::new(prefix, next).ok_or(EngineError::CodeCollision {
            prefix: prefix.to_string(),
        })
    }
}

fn derive_prefix_checked(first_name: &str, last_name: &str) -> Result<String, EngineError> {
    identity::derive_prefix(first_name, last_name).ok_or(EngineError::InvalidFormat {
        value: format!("{} {}", first_name, last_name),
        reason: "cannot derive two-letter prefix from these initials",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        get_department_by_name, get_location_by_name, insert_employee, seed_reference_data,
        setup_database,
    };

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        seed_reference_data(&conn).unwrap();
        conn
    }

    fn draft(conn: &Connection, first: &str, last: &str, dept: &str, loc: &str) -> NewEmployee {
        let dept = get_department_by_name(conn, dept).unwrap().unwrap();
        let loc = get_location_by_name(conn, loc).unwrap().unwrap();
        NewEmployee {
            first_name: first.to_string(),
            last_name: last.to_string(),
            department_id: dept.id,
            location_id: loc.id,
            contract_expires: NaiveDate::from_ymd_opt(2027, 12, 31).unwrap(),
            proposed_code: None,
        }
    }

    /// Hire through the same path a real caller uses: generate, persist
    fn hire(conn: &Connection, first: &str, last: &str, dept: &str, loc: &str) -> Employee {
        let engine = AccessRuleEngine::new(conn);
        let d = draft(conn, first, last, dept, loc);
        let code = engine.validate_or_generate_identity_code(&d).unwrap();
        let emp = d.into_employee(code);
        insert_employee(conn, &emp).unwrap();
        emp
    }

    #[test]
    fn test_generates_js100001_then_js100002() {
        let conn = test_conn();

        let first = hire(&conn, "John", "Smith", "ITS", "Boston");
        assert_eq!(first.identity_code.to_string(), "JS100001");

        let second = hire(&conn, "Jane", "Sanders", "ITS", "Boston");
        assert_eq!(second.identity_code.to_string(), "JS100002");
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        for bad in ["J1100004", "js100004", "JSM10004"] {
            let mut d = draft(&conn, "John", "Smith", "ITS", "Boston");
            d.proposed_code = Some(bad.to_string());

            match engine.validate_or_generate_identity_code(&d) {
                Err(EngineError::InvalidFormat { value, .. }) => assert_eq!(value, bad),
                other => panic!("{:?} should be InvalidFormat, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_low_suffix_proposed_code_rejected() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        // A suffix below the sequence origin must not enter the store: it
        // would make the next JS allocation collide spuriously
        let mut d = draft(&conn, "John", "Smith", "ITS", "Boston");
        d.proposed_code = Some("JS000004".to_string());

        match engine.validate_or_generate_identity_code(&d) {
            Err(EngineError::InvalidFormat { value, .. }) => assert_eq!(value, "JS000004"),
            other => panic!("expected InvalidFormat, got {:?}", other),
        }

        // Allocation for the prefix still starts at the origin afterwards
        let first = hire(&conn, "John", "Smith", "ITS", "Boston");
        assert_eq!(first.identity_code.to_string(), "JS100001");
        let second = hire(&conn, "Jane", "Sanders", "ITS", "Boston");
        assert_eq!(second.identity_code.to_string(), "JS100002");
    }

    #[test]
    fn test_proposed_code_must_match_initials() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let mut d = draft(&conn, "John", "Smith", "ITS", "Boston");
        d.proposed_code = Some("AB100001".to_string());

        assert!(matches!(
            engine.validate_or_generate_identity_code(&d),
            Err(EngineError::InvalidFormat { .. })
        ));

        d.proposed_code = Some("JS100005".to_string());
        let code = engine.validate_or_generate_identity_code(&d).unwrap();
        assert_eq!(code.to_string(), "JS100005");
    }

    #[test]
    fn test_rename_same_initials_keeps_code() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let mut emp = hire(&conn, "John", "Smith", "ITS", "Boston");
        let old_code = emp.identity_code.clone();

        // John Smith -> John Stevens: prefix is still JS
        emp.last_name = "Stevens".to_string();
        let new_code = engine.regenerate_on_name_change(&emp, &old_code).unwrap();

        assert_eq!(new_code, old_code);
    }

    #[test]
    fn test_rename_new_initials_preserves_suffix() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let mut emp = hire(&conn, "John", "Smith", "ITS", "Boston");
        let old_code = emp.identity_code.clone();

        emp.last_name = "Miller".to_string();
        let new_code = engine.regenerate_on_name_change(&emp, &old_code).unwrap();

        assert_eq!(new_code.to_string(), "JM100001");
    }

    #[test]
    fn test_rename_flow_persists_new_code() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let mut emp = hire(&conn, "John", "Smith", "ITS", "Boston");
        let old_code = emp.identity_code.clone();

        // Full rename path: recompute the code, then persist both together
        emp.last_name = "Miller".to_string();
        let new_code = engine.regenerate_on_name_change(&emp, &old_code).unwrap();
        db::update_employee_name(&conn, &emp.id, &emp.first_name, &emp.last_name, &new_code)
            .unwrap();

        let loaded = db::get_employee(&conn, &emp.id).unwrap().unwrap();
        assert_eq!(loaded.last_name, "Miller");
        assert_eq!(loaded.identity_code, new_code);
        assert_eq!(loaded.identity_code.to_string(), "JM100001");

        // The old code is free again
        assert!(!db::code_exists(&conn, &old_code).unwrap());
    }

    #[test]
    fn test_rename_suffix_taken_reallocates() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        // JM100001 is taken before the rename lands
        hire(&conn, "Julia", "Moore", "ITS", "Boston");

        let mut emp = hire(&conn, "John", "Smith", "ITS", "Boston");
        let old_code = emp.identity_code.clone();
        assert_eq!(old_code.to_string(), "JS100001");

        emp.last_name = "Miller".to_string();
        let new_code = engine.regenerate_on_name_change(&emp, &old_code).unwrap();

        assert_eq!(new_code.to_string(), "JM100002");
    }

    #[test]
    fn test_sequence_exhaustion_reports_collision() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        // Plant the last possible JS code
        let d = draft(&conn, "Jack", "Stone", "ITS", "Boston");
        let emp = d.into_employee(IdentityCode::parse("JS999999").unwrap());
        insert_employee(&conn, &emp).unwrap();

        let result =
            engine.validate_or_generate_identity_code(&draft(&conn, "John", "Smith", "ITS", "Boston"));

        match result {
            Err(EngineError::CodeCollision { prefix }) => assert_eq!(prefix, "JS"),
            other => panic!("expected CodeCollision, got {:?}", other),
        }
    }

    #[test]
    fn test_assign_default_access_idempotent() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let emp = hire(&conn, "John", "Smith", "ITS", "Boston");

        let first_run = engine.assign_default_access(&emp).unwrap();
        assert_eq!(first_run.len(), 2, "ITS x Boston maps two profiles");

        let second_run = engine.assign_default_access(&emp).unwrap();
        assert!(second_run.is_empty(), "re-run must not create duplicates");

        let grants = db::grants_for_employee(&conn, &emp.id).unwrap();
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.granted_by == "rule-engine"));
    }

    #[test]
    fn test_no_rule_defined_creates_nothing() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let emp = hire(&conn, "Fiona", "Jakarta", "Finance", "Jakarta");

        match engine.assign_default_access(&emp) {
            Err(EngineError::NoRuleDefined { .. }) => {}
            other => panic!("expected NoRuleDefined, got {:?}", other),
        }

        let grants = db::grants_for_employee(&conn, &emp.id).unwrap();
        assert!(grants.is_empty(), "no side effects on NoRuleDefined");
    }

    #[test]
    fn test_validity_boundary_dates() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let as_of = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();

        let d = draft(&conn, "John", "Smith", "ITS", "Boston");
        let mut expiring_today = d;
        expiring_today.contract_expires = as_of;
        let code = engine
            .validate_or_generate_identity_code(&expiring_today)
            .unwrap();
        let emp = expiring_today.into_employee(code);
        insert_employee(&conn, &emp).unwrap();
        engine.assign_default_access(&emp).unwrap();

        // Expiring exactly on as_of is still valid
        assert!(engine.is_access_currently_valid(&emp, as_of).unwrap());

        // Expired yesterday relative to as_of is not
        assert!(!engine
            .is_access_currently_valid(&emp, as_of.succ_opt().unwrap())
            .unwrap());
    }

    #[test]
    fn test_validity_requires_a_grant() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let as_of = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        let emp = hire(&conn, "John", "Smith", "ITS", "Boston");

        // Contract is fine but no grant exists yet
        assert!(!engine.is_access_currently_valid(&emp, as_of).unwrap());

        engine.assign_default_access(&emp).unwrap();
        assert!(engine.is_access_currently_valid(&emp, as_of).unwrap());

        // Revoking every grant flips it back
        for grant in db::grants_for_employee(&conn, &emp.id).unwrap() {
            db::revoke_grant(&conn, &grant.id).unwrap();
        }
        assert!(!engine.is_access_currently_valid(&emp, as_of).unwrap());
    }

    #[test]
    fn test_relocation_reassigns_at_new_site() {
        let conn = test_conn();
        let engine = AccessRuleEngine::new(&conn);

        let mut emp = hire(&conn, "John", "Smith", "ITS", "Boston");
        engine.assign_default_access(&emp).unwrap();

        // Move to Chicago; the caller updates placement then re-invokes
        let chicago = get_location_by_name(&conn, "Chicago").unwrap().unwrap();
        db::update_employee_placement(&conn, &emp.id, &emp.department_id, &chicago.id).unwrap();
        emp.location_id = chicago.id;

        let created = engine.assign_default_access(&emp).unwrap();
        assert_eq!(created.len(), 1, "Chicago Standard added");

        // Boston grants are untouched by the new assignment
        let grants = db::grants_for_employee(&conn, &emp.id).unwrap();
        assert_eq!(grants.len(), 3);
    }
}
