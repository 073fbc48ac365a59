//! Party engine: the operations the HTTP layer calls.
//!
//! Each public method is one store transaction. Lock state is evaluated
//! inside that transaction with a single `now`, so a mutation and the freeze
//! can never disagree about whether the event had started.

use crate::approval;
use crate::error::EngineError;
use crate::freeze;
use crate::identity::ContactNormalizer;
use crate::invite;
use crate::store::TreeStore;
use crate::tree::{self, Node};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The invite-tree engine.
pub struct PartyEngine {
    store: TreeStore,
    contacts: ContactNormalizer,
}

/// Input for creating an event and its host.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub host_name: String,
    pub host_contact: String,
}

/// A new event with its root participant.
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub event: Event,
    pub root: Node,
}

/// Result of a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsvpOutcome {
    Updated(Response),
    /// The event had already started; nothing was written.
    Locked,
}

/// Result of a snapshot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotView {
    NotStarted,
    Started(Snapshot),
}

/// What a participant sees about themselves.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub participant: Participant,
    pub response: Response,
    /// Name of the child whose acceptance approved this participant.
    pub unlocker_name: Option<String>,
    pub credential: Option<Credential>,
    pub locked: bool,
}

/// What an invite link's landing page shows.
#[derive(Debug, Clone, Serialize)]
pub struct InvitePreview {
    pub event: Event,
    pub inviter_name: String,
    pub locked: bool,
}

impl PartyEngine {
    pub fn new(store: TreeStore, contacts: ContactNormalizer) -> Self {
        PartyEngine { store, contacts }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    // ─── Tree lifecycle ──────────────────────────────────────────────────

    /// Create an event with its root participant and the root's invite link.
    pub fn create_event(&self, req: NewEvent) -> Result<CreatedEvent, EngineError> {
        let title = required(&req.title, "title")?;
        let location = required(&req.location, "location")?;
        let host_name = required(&req.host_name, "host name")?;
        let contact = self.contacts.normalize(&req.host_contact)?;
        let now = Utc::now();

        let created = self.store.transaction(|tx| {
            let event = tx.insert_event(title, location, req.starts_at, now)?;
            let root = tree::create_root(tx, &event, host_name, &contact, now)?;
            Ok(CreatedEvent { event, root })
        })?;

        tracing::info!(
            event_id = created.event.id,
            root_id = created.root.participant.id,
            starts_at = %created.event.starts_at,
            "Event created"
        );
        Ok(created)
    }

    /// Join `event_id` through the invite link `token`.
    pub fn join(
        &self,
        event_id: EventId,
        token: &str,
        name: &str,
        contact: &str,
    ) -> Result<Node, EngineError> {
        let name = required(name, "name")?;
        let contact = self.contacts.normalize(contact)?;
        let now = Utc::now();

        let node = self.store.transaction(|tx| {
            let event = tx.event(event_id)?.ok_or(EngineError::NotFound("event"))?;
            if freeze::is_locked(&event, now) {
                return Err(EngineError::Locked);
            }
            let issuer = invite::consume(tx, token, &event, now)?;
            tree::create_child(tx, &event, &issuer, name, &contact, now)
        })?;

        tracing::info!(
            event_id,
            participant_id = node.participant.id,
            depth = node.participant.depth,
            "Participant joined"
        );
        Ok(node)
    }

    /// Set a participant's RSVP. Returns `Locked` rather than an error once
    /// the event has started.
    pub fn set_status(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
        status: RsvpStatus,
    ) -> Result<RsvpOutcome, EngineError> {
        let now = Utc::now();
        let result = self.store.transaction(|tx| {
            let event = tx.event(event_id)?.ok_or(EngineError::NotFound("event"))?;
            approval::set_status(tx, &event, participant_id, status, now)
        });
        match result {
            Ok(response) => {
                tracing::info!(
                    event_id,
                    participant_id,
                    %status,
                    approved = response.approved,
                    "RSVP updated"
                );
                Ok(RsvpOutcome::Updated(response))
            }
            Err(EngineError::Locked) => Ok(RsvpOutcome::Locked),
            Err(e) => Err(e),
        }
    }

    /// Read the frozen tree, freezing it on the first read after lock.
    pub fn snapshot(&self, event_id: EventId) -> Result<SnapshotView, EngineError> {
        let now = Utc::now();
        match self
            .store
            .transaction(|tx| freeze::get_snapshot(tx, event_id, now))
        {
            Ok(snapshot) => Ok(SnapshotView::Started(snapshot)),
            Err(EngineError::NotAvailable) => Ok(SnapshotView::NotStarted),
            Err(e) => Err(e),
        }
    }

    /// Start the event now. Idempotent; locks the tree for good.
    pub fn start_event(&self, event_id: EventId) -> Result<Event, EngineError> {
        let event = self.store.transaction(|tx| {
            let mut event = tx.event(event_id)?.ok_or(EngineError::NotFound("event"))?;
            if !event.started {
                tx.mark_started(event.id)?;
                event.started = true;
            }
            Ok(event)
        })?;
        tracing::info!(event_id, "Event started");
        Ok(event)
    }

    // ─── Query ───────────────────────────────────────────────────────────

    pub fn get_event(&self, event_id: EventId) -> Result<Event, EngineError> {
        self.store
            .transaction(|tx| tx.event(event_id)?.ok_or(EngineError::NotFound("event")))
    }

    /// A participant's own view: response, who unlocked them, their link.
    pub fn member_view(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> Result<MemberView, EngineError> {
        let now = Utc::now();
        self.store.transaction(|tx| {
            let event = tx.event(event_id)?.ok_or(EngineError::NotFound("event"))?;
            let participant = tx
                .participant(event_id, participant_id)?
                .ok_or(EngineError::NotFound("participant"))?;
            let response = tx
                .response(participant.id)?
                .ok_or(EngineError::NotFound("response"))?;
            let unlocker_name = match response.approved_by {
                Some(child_id) => tx.participant(event_id, child_id)?.map(|c| c.name),
                None => None,
            };
            let credential = if participant.can_invite {
                tx.latest_credential(participant.id)?
            } else {
                None
            };
            Ok(MemberView {
                participant,
                response,
                unlocker_name,
                credential,
                locked: freeze::is_locked(&event, now),
            })
        })
    }

    /// Look up who issued an invite link, for the landing page.
    pub fn preview_invite(&self, token: &str) -> Result<InvitePreview, EngineError> {
        let now = Utc::now();
        self.store.transaction(|tx| {
            let credential = tx.credential(token)?.ok_or(EngineError::InvalidCredential)?;
            let event = tx
                .event(credential.event_id)?
                .ok_or(EngineError::InvalidCredential)?;
            let inviter = tx
                .participant(event.id, credential.issuer_id)?
                .ok_or(EngineError::InvalidCredential)?;
            let locked = freeze::is_locked(&event, now);
            Ok(InvitePreview {
                event,
                inviter_name: inviter.name,
                locked,
            })
        })
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EngineError::Validation(format!("{field} required")))
    } else {
        Ok(trimmed)
    }
}
