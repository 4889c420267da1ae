// 📼 Swipe Events - immutable audit trail of badge use
//
// Append-only: rows are never mutated or deleted. The idempotency hash lets
// a replayed reader feed be re-ingested without double-inserting audit rows.
// NOTE: the hash is for DEDUPLICATION, the UUID is IDENTITY.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// SWIPE OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwipeOutcome {
    Granted,
    Denied,
}

impl SwipeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeOutcome::Granted => "granted",
            SwipeOutcome::Denied => "denied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "granted" => Some(SwipeOutcome::Granted),
            "denied" => Some(SwipeOutcome::Denied),
            _ => None,
        }
    }
}

// ============================================================================
// SWIPE EVENT
// ============================================================================

/// One timestamped attempt by an employee to use a reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeEvent {
    /// Stable identity (UUID)
    pub id: String,

    pub employee_id: String,
    pub reader_id: String,
    pub swiped_at: DateTime<Utc>,
    pub outcome: SwipeOutcome,
}

impl SwipeEvent {
    pub fn new(
        employee_id: &str,
        reader_id: &str,
        swiped_at: DateTime<Utc>,
        outcome: SwipeOutcome,
    ) -> Self {
        SwipeEvent {
            id: uuid::Uuid::new_v4().to_string(),
            employee_id: employee_id.to_string(),
            reader_id: reader_id.to_string(),
            swiped_at,
            outcome,
        }
    }

    /// Hash for duplicate detection when re-ingesting a reader feed
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}{}{}",
            self.employee_id,
            self.reader_id,
            self.swiped_at.to_rfc3339()
        ));
        format!("{:x}", hasher.finalize())
    }
}
