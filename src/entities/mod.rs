// Entity Models - persisted records for badge-based access control
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - Business keys (identity code, names) that are values and can change
// - Reference data (departments, locations) is immutable once seeded

pub mod access;
pub mod employee;
pub mod org;
pub mod swipe;

pub use access::{AccessGrant, AccessProfile, AccessRule, Reader};
pub use employee::{Employee, NewEmployee};
pub use org::{Department, Location};
pub use swipe::{SwipeEvent, SwipeOutcome};
