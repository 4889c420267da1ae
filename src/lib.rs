// Badge Access System - Core Library
// Identity-code validation and automatic access assignment over a SQLite store

pub mod audit;
pub mod db;
pub mod engine;
pub mod entities;
pub mod identity;
pub mod roster;

// Re-export commonly used types
pub use audit::{
    get_access_summaries, get_swipes_for_employee, record_swipe, record_swipe_batch, AccessSummary,
};
pub use db::{
    active_grant_count, code_exists, get_all_employees, get_department_by_name, get_employee,
    get_employee_by_code, get_location_by_name, grants_for_employee, insert_employee,
    open_database, revoke_grant, seed_reference_data, setup_database, StoreError,
};
pub use engine::{AccessRuleEngine, EngineError};
pub use entities::{
    AccessGrant, AccessProfile, AccessRule, Department, Employee, Location, NewEmployee, Reader,
    SwipeEvent, SwipeOutcome,
};
pub use identity::{derive_prefix, IdentityCode, SEQUENCE_MAX, SEQUENCE_START};
pub use roster::{import_roster, load_roster, ImportReport, RosterRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
