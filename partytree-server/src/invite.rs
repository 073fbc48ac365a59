//! Invitation minting and redemption.
//!
//! A credential is an unguessable token bound to one issuer. Redeeming it
//! yields the issuer, to whom the caller attaches the new child. Tokens are
//! not invalidated on use: one link may be shared with several invitees, and
//! the per-event name/contact uniqueness is what keeps each joiner distinct.

use crate::error::EngineError;
use crate::freeze;
use crate::store::TreeTx;
use crate::types::*;
use base64::Engine;
use chrono::{DateTime, Utc};

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Mint a new invite link for `issuer`.
pub fn mint(
    tx: &TreeTx<'_>,
    issuer: &Participant,
    now: DateTime<Utc>,
) -> Result<Credential, EngineError> {
    if !can_invite(issuer.depth) {
        return Err(EngineError::NotEligible(issuer.id));
    }
    let credential = Credential {
        token: generate_token(),
        event_id: issuer.event_id,
        issuer_id: issuer.id,
        created_at: now,
    };
    tx.insert_credential(&credential)?;
    Ok(credential)
}

/// Resolve `token` to its issuer within `event`. Read-only.
///
/// `Expired` reaches only direct callers; `PartyEngine::join` checks the lock
/// first and reports `Locked`.
pub fn consume(
    tx: &TreeTx<'_>,
    token: &str,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<Participant, EngineError> {
    let credential = tx
        .credential(token)?
        .filter(|c| c.event_id == event.id)
        .ok_or(EngineError::InvalidCredential)?;
    if freeze::is_locked(event, now) {
        return Err(EngineError::Expired);
    }
    tx.participant(event.id, credential.issuer_id)?
        .ok_or(EngineError::InvalidCredential)
}

/// URL-safe random token.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
