//! RSVP approval.
//!
//! An accepted participant is approved once one of its direct children is
//! itself accepted and approved; the terminal tier approves itself. The child
//! that satisfied the rule is recorded as the witness (`approved_by`).
//!
//! A status write re-evaluates the participant and then walks up the parent
//! chain while approval keeps changing. The walk is bounded by the tree depth.
//! An approved parent keeps its witness for as long as that witness stays
//! approved, so changes by other children never touch it.

use crate::error::EngineError;
use crate::freeze;
use crate::store::TreeTx;
use crate::tree;
use crate::types::*;
use chrono::{DateTime, Utc};

/// Write `status` for `participant_id` and propagate approval upward.
pub fn set_status(
    tx: &TreeTx<'_>,
    event: &Event,
    participant_id: ParticipantId,
    status: RsvpStatus,
    now: DateTime<Utc>,
) -> Result<Response, EngineError> {
    if freeze::is_locked(event, now) {
        return Err(EngineError::Locked);
    }
    let participant = tx
        .participant(event.id, participant_id)?
        .ok_or(EngineError::NotFound("participant"))?;
    let mut response = tx
        .response(participant.id)?
        .ok_or(EngineError::NotFound("response"))?;

    let was_approved = response.approved;
    response.status = status;
    let (approved, approved_by) = evaluate(tx, &participant, &response)?;
    response.approved = approved;
    response.approved_by = approved_by;
    response.updated_at = now;
    tx.update_response(&response)?;

    if response.approved != was_approved {
        propagate(tx, &participant, now)?;
    }
    Ok(response)
}

/// Compute `(approved, approved_by)` for a participant's current response.
fn evaluate(
    tx: &TreeTx<'_>,
    participant: &Participant,
    response: &Response,
) -> Result<(bool, Option<ParticipantId>), EngineError> {
    if response.status != RsvpStatus::Accepted {
        return Ok((false, None));
    }
    if participant.depth >= MAX_DEPTH {
        return Ok((true, None));
    }

    // Children come oldest first, so the fallback witness is the lowest id.
    let mut witnesses = Vec::new();
    for child in tree::get_children(tx, participant)? {
        if let Some(r) = tx.response(child.id)? {
            if r.status == RsvpStatus::Accepted && r.approved {
                witnesses.push(child.id);
            }
        }
    }
    let keep = response
        .approved_by
        .filter(|current| witnesses.contains(current));
    match keep.or_else(|| witnesses.first().copied()) {
        Some(child) => Ok((true, Some(child))),
        None => Ok((false, None)),
    }
}

/// Re-evaluate ancestors of `origin` whose approval may depend on it.
fn propagate(
    tx: &TreeTx<'_>,
    origin: &Participant,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let mut child_parent = origin.parent_id;
    // Each hop moves one level up, so depth bounds the walk.
    for _ in 0..origin.depth {
        let Some(parent_id) = child_parent else {
            break;
        };
        let parent = tx
            .participant(origin.event_id, parent_id)?
            .ok_or(EngineError::NotFound("parent"))?;
        let mut response = tx
            .response(parent.id)?
            .ok_or(EngineError::NotFound("response"))?;

        let (approved, approved_by) = evaluate(tx, &parent, &response)?;
        if approved == response.approved && approved_by == response.approved_by {
            break;
        }
        let flipped = approved != response.approved;
        response.approved = approved;
        response.approved_by = approved_by;
        response.updated_at = now;
        tx.update_response(&response)?;

        tracing::debug!(
            participant_id = parent.id,
            approved,
            ?approved_by,
            "Approval propagated"
        );
        if !flipped {
            break;
        }
        child_parent = parent.parent_id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TreeStore;
    use chrono::Duration;

    struct Chain {
        store: TreeStore,
        event: Event,
        /// Root, C1, G1, T1 ids by depth.
        ids: Vec<ParticipantId>,
    }

    fn chain() -> Chain {
        let store = TreeStore::open_memory().unwrap();
        let (event, ids) = store
            .transaction(|tx| {
                let now = Utc::now();
                let event = tx.insert_event("Gala", "Hall", now + Duration::days(3), now)?;
                let root = tree::create_root(tx, &event, "R", "+12025550100", now)?;
                let mut parent = root.participant;
                let mut ids = vec![parent.id];
                for (name, phone) in [
                    ("C1", "+12025550101"),
                    ("G1", "+12025550102"),
                    ("T1", "+12025550103"),
                ] {
                    let node = tree::create_child(tx, &event, &parent, name, phone, now)?;
                    ids.push(node.participant.id);
                    parent = node.participant;
                }
                Ok((event, ids))
            })
            .unwrap();
        Chain { store, event, ids }
    }

    impl Chain {
        fn set(&self, depth: usize, status: RsvpStatus) -> Response {
            self.store
                .transaction(|tx| set_status(tx, &self.event, self.ids[depth], status, Utc::now()))
                .unwrap()
        }

        fn response(&self, depth: usize) -> Response {
            self.store
                .transaction(|tx| tx.response(self.ids[depth]))
                .unwrap()
                .unwrap()
        }
    }

    #[test]
    fn terminal_tier_self_approves() {
        let c = chain();
        let t1 = c.set(3, RsvpStatus::Accepted);
        assert!(t1.approved);
        assert_eq!(t1.approved_by, None);
    }

    #[test]
    fn accepted_without_witness_stays_unapproved() {
        let c = chain();
        let c1 = c.set(1, RsvpStatus::Accepted);
        assert_eq!(c1.status, RsvpStatus::Accepted);
        assert!(!c1.approved);
        assert_eq!(c1.approved_by, None);
    }

    #[test]
    fn parent_accepting_later_finds_existing_witness() {
        let c = chain();
        c.set(3, RsvpStatus::Accepted);
        let g1 = c.set(2, RsvpStatus::Accepted);
        assert!(g1.approved);
        assert_eq!(g1.approved_by, Some(c.ids[3]));
    }

    #[test]
    fn approval_climbs_only_through_accepted_ancestors() {
        let c = chain();
        c.set(1, RsvpStatus::Accepted);
        c.set(3, RsvpStatus::Accepted);
        // G1 still pending, so nothing above it moves.
        assert!(!c.response(2).approved);
        assert!(!c.response(1).approved);

        c.set(2, RsvpStatus::Accepted);
        let c1 = c.response(1);
        assert!(c1.approved);
        assert_eq!(c1.approved_by, Some(c.ids[2]));
    }

    #[test]
    fn witness_is_lowest_approved_child() {
        let c = chain();
        let t2 = c
            .store
            .transaction(|tx| {
                let g1 = tx.participant(c.event.id, c.ids[2])?.unwrap();
                tree::create_child(tx, &c.event, &g1, "T2", "+12025550104", Utc::now())
            })
            .unwrap();
        c.store
            .transaction(|tx| {
                set_status(tx, &c.event, t2.participant.id, RsvpStatus::Accepted, Utc::now())
            })
            .unwrap();
        c.set(3, RsvpStatus::Declined);

        // Only T2 qualifies while T1 has declined.
        let g1 = c.set(2, RsvpStatus::Accepted);
        assert_eq!(g1.approved_by, Some(t2.participant.id));

        // T1 accepting later does not displace the current witness.
        c.set(3, RsvpStatus::Accepted);
        assert_eq!(c.response(2).approved_by, Some(t2.participant.id));

        // Re-evaluating from scratch picks the lowest qualifying id.
        c.set(2, RsvpStatus::Tentative);
        let g1 = c.set(2, RsvpStatus::Accepted);
        assert_eq!(g1.approved_by, Some(c.ids[3]));
    }

    #[test]
    fn non_accepted_status_clears_approval() {
        let c = chain();
        c.set(3, RsvpStatus::Accepted);
        let t1 = c.set(3, RsvpStatus::Tentative);
        assert!(!t1.approved);
        assert_eq!(t1.approved_by, None);
    }

    #[test]
    fn unknown_participant_is_not_found() {
        let c = chain();
        let result = c
            .store
            .transaction(|tx| set_status(tx, &c.event, 9_999, RsvpStatus::Accepted, Utc::now()));
        assert!(matches!(result, Err(EngineError::NotFound("participant"))));
    }

    #[test]
    fn locked_event_rejects_status() {
        let c = chain();
        let after_start = c.event.starts_at + Duration::minutes(1);
        let result = c.store.transaction(|tx| {
            set_status(tx, &c.event, c.ids[3], RsvpStatus::Accepted, after_start)
        });
        assert!(matches!(result, Err(EngineError::Locked)));
        assert_eq!(c.response(3).status, RsvpStatus::Pending);
    }
}
