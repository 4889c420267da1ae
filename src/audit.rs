// 📼 Audit Trail - swipe-event ingestion and per-employee summaries
//
// swipe_events is append-only. Ingestion is idempotent over replayed reader
// feeds: the sha2 hash on (employee, reader, timestamp) deduplicates, and a
// duplicate row is a skip, not an error. The engine only ever reads this
// table; writes come from the badge-reader feed path.

use crate::db::StoreError;
use crate::entities::{SwipeEvent, SwipeOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

// ============================================================================
// SWIPE INGESTION
// ============================================================================

/// Append one swipe event. Returns false when the feed row was already
/// ingested (same employee, reader and timestamp).
pub fn record_swipe(conn: &Connection, event: &SwipeEvent) -> Result<bool, StoreError> {
    let hash = event.compute_idempotency_hash();

    let result = conn.execute(
        "INSERT INTO swipe_events (
            id, idempotency_hash, employee_id, reader_id, swiped_at, outcome
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.id,
            hash,
            event.employee_id,
            event.reader_id,
            event.swiped_at.to_rfc3339(),
            event.outcome.as_str(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(StoreError::Sqlite(e)),
    }
}

/// Ingest a batch of feed rows; returns (inserted, duplicates)
pub fn record_swipe_batch(
    conn: &Connection,
    events: &[SwipeEvent],
) -> Result<(usize, usize), StoreError> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for event in events {
        if record_swipe(conn, event)? {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    Ok((inserted, duplicates))
}

// ============================================================================
// SWIPE READS
// ============================================================================

pub fn get_swipes_for_employee(
    conn: &Connection,
    employee_id: &str,
) -> Result<Vec<SwipeEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, employee_id, reader_id, swiped_at, outcome
         FROM swipe_events
         WHERE employee_id = ?1
         ORDER BY swiped_at DESC",
    )?;

    let events = stmt
        .query_map(params![employee_id], |row| {
            let swiped_str: String = row.get(3)?;
            let outcome_str: String = row.get(4)?;

            Ok(SwipeEvent {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                reader_id: row.get(2)?,
                swiped_at: DateTime::parse_from_rfc3339(&swiped_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                outcome: SwipeOutcome::from_str(&outcome_str)
                    .ok_or(rusqlite::Error::InvalidQuery)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

// ============================================================================
// ACCESS SUMMARY
// ============================================================================

/// Per-employee aggregate for the status report
#[derive(Debug, Clone)]
pub struct AccessSummary {
    pub employee_id: String,
    pub identity_code: String,
    pub full_name: String,
    pub department: String,
    pub location: String,
    pub contract_expires: NaiveDate,
    pub active_grants: i64,
    pub last_swipe: Option<DateTime<Utc>>,
    /// Contract runs through `as_of` and at least one active grant exists
    pub access_valid: bool,
}

/// One summary row per employee, validity computed as of the given date
pub fn get_access_summaries(
    conn: &Connection,
    as_of: NaiveDate,
) -> Result<Vec<AccessSummary>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT
            e.id,
            e.identity_code,
            e.first_name || ' ' || e.last_name,
            d.name,
            l.name,
            e.contract_expires,
            (SELECT COUNT(*) FROM access_grants g
             WHERE g.employee_id = e.id AND g.revoked_at IS NULL),
            (SELECT MAX(s.swiped_at) FROM swipe_events s WHERE s.employee_id = e.id)
         FROM employees e
         JOIN departments d ON d.id = e.department_id
         JOIN locations l ON l.id = e.location_id
         ORDER BY e.identity_code",
    )?;

    let summaries = stmt
        .query_map([], |row| {
            let expires_str: String = row.get(5)?;
            let last_swipe_str: Option<String> = row.get(7)?;

            let contract_expires = NaiveDate::parse_from_str(&expires_str, "%Y-%m-%d")
                .map_err(|_| rusqlite::Error::InvalidQuery)?;
            let active_grants: i64 = row.get(6)?;

            Ok(AccessSummary {
                employee_id: row.get(0)?,
                identity_code: row.get(1)?,
                full_name: row.get(2)?,
                department: row.get(3)?,
                location: row.get(4)?,
                contract_expires,
                active_grants,
                last_swipe: last_swipe_str
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                access_valid: contract_expires >= as_of && active_grants > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(summaries)
}
