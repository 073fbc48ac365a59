//! Lock and freeze.
//!
//! An event is locked once it has been started or its start time has
//! passed. The first snapshot read after that persists the roster and edges;
//! every later read returns the persisted copy unchanged.

use crate::error::EngineError;
use crate::store::TreeTx;
use crate::types::*;
use chrono::{DateTime, Utc};

/// Whether the tree is frozen at `now`.
pub fn is_locked(event: &Event, now: DateTime<Utc>) -> bool {
    event.started || now >= event.starts_at
}

/// Return the event's snapshot, freezing the tree on the first post-lock read.
///
/// Must run inside a store transaction; the transaction's write lock keeps two
/// first readers from computing different snapshots.
pub fn get_snapshot(
    tx: &TreeTx<'_>,
    event_id: EventId,
    now: DateTime<Utc>,
) -> Result<Snapshot, EngineError> {
    let event = tx.event(event_id)?.ok_or(EngineError::NotFound("event"))?;
    if !is_locked(&event, now) {
        return Err(EngineError::NotAvailable);
    }

    if let Some(json) = tx.snapshot_json(event.id)? {
        return Ok(serde_json::from_str(&json)?);
    }

    let snapshot = Snapshot {
        roster: tx.roster(event.id)?,
        edges: tx.edges(event.id)?,
        generated_at: now,
    };
    let json = serde_json::to_string(&snapshot)?;
    tx.store_snapshot(event.id, &json)?;

    tracing::info!(
        event_id = event.id,
        participants = snapshot.roster.len(),
        "Tree frozen"
    );
    Ok(snapshot)
}
