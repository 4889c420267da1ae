// 🗄️ SQLite Store Layer - schema, seed data, read/write interface
//
// All durable state lives here; the engine is stateless between calls.
// Uniqueness constraints are the concurrency backstop: a losing writer in a
// race (same identity code, same grant pair) gets a distinguishable
// StoreError::UniqueViolation instead of a generic fault, so the caller can
// retry with updated input.
//
// swipe_events is append-only: this module exposes insert and select for it,
// never UPDATE or DELETE.

use crate::entities::{
    AccessGrant, AccessProfile, AccessRule, Department, Employee, Location, Reader,
};
use crate::identity::IdentityCode;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

// ============================================================================
// STORE ERROR
// ============================================================================

/// Store-level failure. UniqueViolation is the catchable condition concurrent
/// writers race on; everything else is a plain persistence fault.
#[derive(Debug)]
pub enum StoreError {
    /// A UNIQUE constraint rejected the write; `key` names the offending value
    UniqueViolation { key: String },

    /// Cross-record invariant rejected the write (e.g. profile/location mismatch)
    InvariantViolation { message: String },

    /// Metadata column (de)serialization failure
    Json(serde_json::Error),

    Sqlite(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UniqueViolation { key } => {
                write!(f, "unique constraint violated for {}", key)
            }
            StoreError::InvariantViolation { message } => write!(f, "{}", message),
            StoreError::Json(e) => write!(f, "metadata encoding failed: {}", e),
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Json(e) => Some(e),
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Convert a write error, tagging uniqueness conflicts with the offending key
fn write_error(err: rusqlite::Error, key: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::UniqueViolation {
            key: key.to_string(),
        }
    } else {
        StoreError::Sqlite(err)
    }
}

// ============================================================================
// DATABASE SETUP
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS locations (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS readers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            location_id TEXT NOT NULL,
            UNIQUE(name, location_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS access_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            location_id TEXT NOT NULL,
            UNIQUE(name, location_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profile_readers (
            profile_id TEXT NOT NULL,
            reader_id TEXT NOT NULL,
            UNIQUE(profile_id, reader_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            identity_code TEXT UNIQUE NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            contract_expires TEXT NOT NULL,
            metadata TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS access_rules (
            department_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            profile_id TEXT NOT NULL,
            UNIQUE(department_id, location_id, profile_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS access_grants (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL,
            profile_id TEXT NOT NULL,
            granted_at TEXT NOT NULL,
            granted_by TEXT NOT NULL,
            revoked_at TEXT,
            UNIQUE(employee_id, profile_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS swipe_events (
            id TEXT PRIMARY KEY,
            idempotency_hash TEXT UNIQUE NOT NULL,
            employee_id TEXT NOT NULL,
            reader_id TEXT NOT NULL,
            swiped_at TEXT NOT NULL,
            outcome TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_employees_code ON employees(identity_code)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rules_pair ON access_rules(department_id, location_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grants_employee ON access_grants(employee_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_swipes_employee ON swipe_events(employee_id, swiped_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// REFERENCE DATA WRITES
// ============================================================================

pub fn insert_department(conn: &Connection, dept: &Department) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO departments (id, name) VALUES (?1, ?2)",
        params![dept.id, dept.name],
    )
    .map_err(|e| write_error(e, &format!("department name {:?}", dept.name)))?;
    Ok(())
}

pub fn insert_location(conn: &Connection, loc: &Location) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO locations (id, name) VALUES (?1, ?2)",
        params![loc.id, loc.name],
    )
    .map_err(|e| write_error(e, &format!("location name {:?}", loc.name)))?;
    Ok(())
}

pub fn insert_reader(conn: &Connection, reader: &Reader) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO readers (id, name, location_id) VALUES (?1, ?2, ?3)",
        params![reader.id, reader.name, reader.location_id],
    )
    .map_err(|e| write_error(e, &format!("reader {:?}", reader.name)))?;
    Ok(())
}

pub fn insert_access_profile(conn: &Connection, profile: &AccessProfile) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO access_profiles (id, name, location_id) VALUES (?1, ?2, ?3)",
        params![profile.id, profile.name, profile.location_id],
    )
    .map_err(|e| write_error(e, &format!("profile {:?}", profile.name)))?;
    Ok(())
}

/// Link a profile to a reader. Both must sit at the same location.
pub fn link_profile_reader(
    conn: &Connection,
    profile_id: &str,
    reader_id: &str,
) -> Result<(), StoreError> {
    let same_location: i64 = conn.query_row(
        "SELECT COUNT(*) FROM access_profiles p, readers r
         WHERE p.id = ?1 AND r.id = ?2 AND p.location_id = r.location_id",
        params![profile_id, reader_id],
        |row| row.get(0),
    )?;

    if same_location == 0 {
        return Err(StoreError::InvariantViolation {
            message: format!(
                "profile {} and reader {} are not at the same location",
                profile_id, reader_id
            ),
        });
    }

    conn.execute(
        "INSERT INTO profile_readers (profile_id, reader_id) VALUES (?1, ?2)",
        params![profile_id, reader_id],
    )
    .map_err(|e| write_error(e, &format!("profile/reader link {}:{}", profile_id, reader_id)))?;
    Ok(())
}

/// Register a default-assignment rule. The mapped profile must belong to the
/// rule's own location, otherwise default grants would cross sites.
pub fn insert_access_rule(conn: &Connection, rule: &AccessRule) -> Result<(), StoreError> {
    let profile_at_location: i64 = conn.query_row(
        "SELECT COUNT(*) FROM access_profiles
         WHERE id = ?1 AND location_id = ?2",
        params![rule.profile_id, rule.location_id],
        |row| row.get(0),
    )?;

    if profile_at_location == 0 {
        return Err(StoreError::InvariantViolation {
            message: format!(
                "profile {} does not belong to location {}",
                rule.profile_id, rule.location_id
            ),
        });
    }

    conn.execute(
        "INSERT INTO access_rules (department_id, location_id, profile_id) VALUES (?1, ?2, ?3)",
        params![rule.department_id, rule.location_id, rule.profile_id],
    )
    .map_err(|e| {
        write_error(
            e,
            &format!(
                "rule {}x{} -> {}",
                rule.department_id, rule.location_id, rule.profile_id
            ),
        )
    })?;
    Ok(())
}

// ============================================================================
// EMPLOYEE WRITES
// ============================================================================

pub fn insert_employee(conn: &Connection, emp: &Employee) -> Result<(), StoreError> {
    let metadata_json = serde_json::to_string(&emp.metadata)?;

    conn.execute(
        "INSERT INTO employees (
            id, identity_code, first_name, last_name,
            department_id, location_id, contract_expires, metadata, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            emp.id,
            emp.identity_code.to_string(),
            emp.first_name,
            emp.last_name,
            emp.department_id,
            emp.location_id,
            emp.contract_expires.format("%Y-%m-%d").to_string(),
            metadata_json,
            emp.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| write_error(e, &format!("identity code {}", emp.identity_code)))?;
    Ok(())
}

/// Rename an employee and store the (possibly regenerated) identity code
pub fn update_employee_name(
    conn: &Connection,
    employee_id: &str,
    first_name: &str,
    last_name: &str,
    code: &IdentityCode,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE employees SET first_name = ?1, last_name = ?2, identity_code = ?3 WHERE id = ?4",
        params![first_name, last_name, code.to_string(), employee_id],
    )
    .map_err(|e| write_error(e, &format!("identity code {}", code)))?;
    Ok(())
}

/// Relocate an employee (department and/or location change)
pub fn update_employee_placement(
    conn: &Connection,
    employee_id: &str,
    department_id: &str,
    location_id: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE employees SET department_id = ?1, location_id = ?2 WHERE id = ?3",
        params![department_id, location_id, employee_id],
    )?;
    Ok(())
}

// ============================================================================
// GRANT WRITES
// ============================================================================

pub fn insert_grant(conn: &Connection, grant: &AccessGrant) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO access_grants (
            id, employee_id, profile_id, granted_at, granted_by, revoked_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            grant.id,
            grant.employee_id,
            grant.profile_id,
            grant.granted_at.to_rfc3339(),
            grant.granted_by,
            grant.revoked_at.map(|dt| dt.to_rfc3339()),
        ],
    )
    .map_err(|e| {
        write_error(
            e,
            &format!("grant pair {}:{}", grant.employee_id, grant.profile_id),
        )
    })?;
    Ok(())
}

/// Revoke a grant. Sets the timestamp; rows are never deleted.
pub fn revoke_grant(conn: &Connection, grant_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE access_grants SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
        params![Utc::now().to_rfc3339(), grant_id],
    )?;
    Ok(())
}

// ============================================================================
// READS
// ============================================================================

pub fn get_department_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Department>, StoreError> {
    let dept = conn
        .query_row(
            "SELECT id, name FROM departments WHERE name = ?1",
            params![name],
            |row| {
                Ok(Department {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(dept)
}

pub fn get_location_by_name(conn: &Connection, name: &str) -> Result<Option<Location>, StoreError> {
    let loc = conn
        .query_row(
            "SELECT id, name FROM locations WHERE name = ?1",
            params![name],
            |row| {
                Ok(Location {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(loc)
}

fn employee_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
    let code_str: String = row.get(1)?;
    let expires_str: String = row.get(6)?;
    let metadata_json: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;

    let metadata = if let Some(json_str) = metadata_json {
        serde_json::from_str(&json_str).unwrap_or_default()
    } else {
        HashMap::new()
    };

    Ok(Employee {
        id: row.get(0)?,
        identity_code: IdentityCode::parse(&code_str).ok_or(rusqlite::Error::InvalidQuery)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        department_id: row.get(4)?,
        location_id: row.get(5)?,
        contract_expires: NaiveDate::parse_from_str(&expires_str, "%Y-%m-%d")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        metadata,
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

const EMPLOYEE_COLUMNS: &str = "id, identity_code, first_name, last_name,
        department_id, location_id, contract_expires, metadata, created_at";

pub fn get_employee(conn: &Connection, employee_id: &str) -> Result<Option<Employee>, StoreError> {
    let emp = conn
        .query_row(
            &format!("SELECT {} FROM employees WHERE id = ?1", EMPLOYEE_COLUMNS),
            params![employee_id],
            employee_from_row,
        )
        .optional()?;
    Ok(emp)
}

pub fn get_employee_by_code(
    conn: &Connection,
    code: &IdentityCode,
) -> Result<Option<Employee>, StoreError> {
    let emp = conn
        .query_row(
            &format!(
                "SELECT {} FROM employees WHERE identity_code = ?1",
                EMPLOYEE_COLUMNS
            ),
            params![code.to_string()],
            employee_from_row,
        )
        .optional()?;
    Ok(emp)
}

pub fn get_all_employees(conn: &Connection) -> Result<Vec<Employee>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM employees ORDER BY identity_code",
        EMPLOYEE_COLUMNS
    ))?;

    let employees = stmt
        .query_map([], employee_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(employees)
}

pub fn code_exists(conn: &Connection, code: &IdentityCode) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM employees WHERE identity_code = ?1",
        params![code.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Highest allocated sequence number for a prefix, if any code exists there.
/// Codes are fixed-width so lexicographic MAX equals numeric MAX.
pub fn max_sequence_for_prefix(conn: &Connection, prefix: &str) -> Result<Option<u32>, StoreError> {
    let max_code: Option<String> = conn.query_row(
        "SELECT MAX(identity_code) FROM employees WHERE substr(identity_code, 1, 2) = ?1",
        params![prefix],
        |row| row.get(0),
    )?;

    Ok(max_code
        .and_then(|raw| IdentityCode::parse(&raw))
        .map(|code| code.sequence()))
}

/// Profiles mapped for a department/location pairing by the rule table
pub fn profiles_for_rule(
    conn: &Connection,
    department_id: &str,
    location_id: &str,
) -> Result<Vec<AccessProfile>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.location_id
         FROM access_rules r
         JOIN access_profiles p ON p.id = r.profile_id
         WHERE r.department_id = ?1 AND r.location_id = ?2
         ORDER BY p.name",
    )?;

    let profiles = stmt
        .query_map(params![department_id, location_id], |row| {
            Ok(AccessProfile {
                id: row.get(0)?,
                name: row.get(1)?,
                location_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

fn grant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessGrant> {
    let granted_str: String = row.get(3)?;
    let revoked_str: Option<String> = row.get(5)?;

    Ok(AccessGrant {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        profile_id: row.get(2)?,
        granted_at: DateTime::parse_from_rfc3339(&granted_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
        granted_by: row.get(4)?,
        revoked_at: revoked_str
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| rusqlite::Error::InvalidQuery)
            })
            .transpose()?,
    })
}

pub fn grants_for_employee(
    conn: &Connection,
    employee_id: &str,
) -> Result<Vec<AccessGrant>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, employee_id, profile_id, granted_at, granted_by, revoked_at
         FROM access_grants
         WHERE employee_id = ?1
         ORDER BY granted_at",
    )?;

    let grants = stmt
        .query_map(params![employee_id], grant_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(grants)
}

pub fn active_grant_count(conn: &Connection, employee_id: &str) -> Result<i64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM access_grants WHERE employee_id = ?1 AND revoked_at IS NULL",
        params![employee_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// SEED DATA
// ============================================================================

/// Seed the default organization: departments, sites, readers, profiles and
/// the default-assignment rule table. No-op when departments already exist.
pub fn seed_reference_data(conn: &Connection) -> Result<(), StoreError> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))?;
    if existing > 0 {
        return Ok(());
    }

    let its = Department::new("ITS");
    let hr = Department::new("Human Resources");
    let finance = Department::new("Finance");
    let operations = Department::new("Operations");
    for dept in [&its, &hr, &finance, &operations] {
        insert_department(conn, dept)?;
    }

    let boston = Location::new("Boston");
    let chicago = Location::new("Chicago");
    let jakarta = Location::new("Jakarta");
    for loc in [&boston, &chicago, &jakarta] {
        insert_location(conn, loc)?;
    }

    // One lobby reader per site, plus the Boston server room
    let boston_lobby = Reader::new("Boston Lobby", &boston.id);
    let boston_server = Reader::new("Boston Server Room", &boston.id);
    let chicago_lobby = Reader::new("Chicago Lobby", &chicago.id);
    let jakarta_lobby = Reader::new("Jakarta Lobby", &jakarta.id);
    for reader in [&boston_lobby, &boston_server, &chicago_lobby, &jakarta_lobby] {
        insert_reader(conn, reader)?;
    }

    let boston_standard = AccessProfile::new("Boston Standard", &boston.id);
    let boston_restricted = AccessProfile::new("Boston Restricted", &boston.id);
    let chicago_standard = AccessProfile::new("Chicago Standard", &chicago.id);
    let jakarta_standard = AccessProfile::new("Jakarta Standard", &jakarta.id);
    for profile in [
        &boston_standard,
        &boston_restricted,
        &chicago_standard,
        &jakarta_standard,
    ] {
        insert_access_profile(conn, profile)?;
    }

    link_profile_reader(conn, &boston_standard.id, &boston_lobby.id)?;
    link_profile_reader(conn, &boston_restricted.id, &boston_lobby.id)?;
    link_profile_reader(conn, &boston_restricted.id, &boston_server.id)?;
    link_profile_reader(conn, &chicago_standard.id, &chicago_lobby.id)?;
    link_profile_reader(conn, &jakarta_standard.id, &jakarta_lobby.id)?;

    // Default-assignment rules. Finance x Jakarta has no rule: those hires
    // start with no access pending manual review.
    let rules = [
        (&its, &boston, &boston_standard),
        (&its, &boston, &boston_restricted),
        (&hr, &boston, &boston_standard),
        (&finance, &boston, &boston_standard),
        (&its, &chicago, &chicago_standard),
        (&operations, &chicago, &chicago_standard),
        (&hr, &jakarta, &jakarta_standard),
        (&operations, &jakarta, &jakarta_standard),
    ];
    for (dept, loc, profile) in rules {
        insert_access_rule(
            conn,
            &AccessRule {
                department_id: dept.id.clone(),
                location_id: loc.id.clone(),
                profile_id: profile.id.clone(),
            },
        )?;
    }

    Ok(())
}
