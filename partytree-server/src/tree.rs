//! Tree construction: the root at event creation, children on join.
//!
//! Every participant is created together with its pending response, and
//! every participant that may invite gets an invite link immediately.

use crate::error::EngineError;
use crate::freeze;
use crate::invite;
use crate::store::{NewParticipant, TreeTx};
use crate::types::*;
use chrono::{DateTime, Utc};

/// A freshly created participant with its response and, unless terminal,
/// its invite link.
#[derive(Debug, Clone)]
pub struct Node {
    pub participant: Participant,
    pub response: Response,
    pub credential: Option<Credential>,
}

/// Create the depth-0 host of `event`.
pub fn create_root(
    tx: &TreeTx<'_>,
    event: &Event,
    name: &str,
    contact: &str,
    now: DateTime<Utc>,
) -> Result<Node, EngineError> {
    let participant = tx.insert_participant(
        NewParticipant {
            event_id: event.id,
            name,
            role: Role::Root,
            parent_id: None,
            depth: 0,
            contact,
        },
        now,
    )?;
    let response = tx.insert_response(participant.id, now)?;
    let credential = invite::mint(tx, &participant, now)?;
    Ok(Node {
        participant,
        response,
        credential: Some(credential),
    })
}

/// Attach a new participant under `parent`.
pub fn create_child(
    tx: &TreeTx<'_>,
    event: &Event,
    parent: &Participant,
    name: &str,
    contact: &str,
    now: DateTime<Utc>,
) -> Result<Node, EngineError> {
    if freeze::is_locked(event, now) {
        return Err(EngineError::Locked);
    }
    if parent.event_id != event.id {
        return Err(EngineError::NotFound("parent"));
    }
    if !parent.can_invite {
        return Err(EngineError::NotEligible(parent.id));
    }
    if tx.identity_taken(event.id, name, contact)? {
        return Err(EngineError::DuplicateIdentity);
    }

    let participant = tx.insert_participant(
        NewParticipant {
            event_id: event.id,
            name,
            role: Role::Member,
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            contact,
        },
        now,
    )?;
    let response = tx.insert_response(participant.id, now)?;
    let credential = if participant.can_invite {
        Some(invite::mint(tx, &participant, now)?)
    } else {
        None
    };

    tracing::debug!(
        event_id = event.id,
        participant_id = participant.id,
        parent_id = parent.id,
        depth = participant.depth,
        "Participant attached"
    );
    Ok(Node {
        participant,
        response,
        credential,
    })
}

/// Direct children of `participant`, oldest first.
pub fn get_children(
    tx: &TreeTx<'_>,
    participant: &Participant,
) -> Result<Vec<Participant>, EngineError> {
    tx.children(participant.event_id, participant.id)
}
