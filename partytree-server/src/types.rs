//! Core data structures for the invite tree.
//!
//! These types are shared by the store, the engine and the HTTP API.
//! Identifiers are SQLite rowids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EventId = i64;
pub type ParticipantId = i64;

/// Depth at which a participant can no longer invite anyone.
///
/// Depths 0, 1 and 2 hold invite links; depth 3 is the terminal tier and
/// self-approves on acceptance.
pub const MAX_DEPTH: u32 = 3;

/// Whether a participant at `depth` may hold an invite link.
pub fn can_invite(depth: u32) -> bool {
    depth < MAX_DEPTH
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One instance of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    /// Set manually by the host, or implicitly by the first post-lock snapshot read.
    pub started: bool,
    pub created_at: DateTime<Utc>,
}

// ─── Participants ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Role::Root),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A node in the invite tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub event_id: EventId,
    pub name: String,
    pub role: Role,
    /// `None` only for the root.
    pub parent_id: Option<ParticipantId>,
    pub depth: u32,
    pub can_invite: bool,
    /// Normalized contact identity (E.164 phone number).
    pub contact: String,
    pub created_at: DateTime<Utc>,
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// A participant's RSVP.
///
/// The wire also accepts the `yes` / `no` / `maybe` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Pending,
    #[serde(alias = "yes")]
    Accepted,
    #[serde(alias = "no")]
    Declined,
    #[serde(alias = "maybe")]
    Tentative,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RsvpStatus::Pending => "pending",
            RsvpStatus::Accepted => "accepted",
            RsvpStatus::Declined => "declined",
            RsvpStatus::Tentative => "tentative",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RsvpStatus::Pending),
            "accepted" | "yes" => Ok(RsvpStatus::Accepted),
            "declined" | "no" => Ok(RsvpStatus::Declined),
            "tentative" | "maybe" => Ok(RsvpStatus::Tentative),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Exactly one per participant, created alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub participant_id: ParticipantId,
    pub status: RsvpStatus,
    /// Only ever true while `status` is `Accepted`.
    pub approved: bool,
    /// The child whose approved acceptance satisfied this one; `None` when
    /// unapproved or self-approved at the terminal tier.
    pub approved_by: Option<ParticipantId>,
    pub updated_at: DateTime<Utc>,
}

// ─── Credentials ─────────────────────────────────────────────────────────────

/// An invite link bound to its issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub token: String,
    pub event_id: EventId,
    pub issuer_id: ParticipantId,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    /// Relative URL of the landing page for this invite.
    pub fn url(&self) -> String {
        format!("/{}/invite/{}", self.event_id, self.token)
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One roster line of a frozen tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub depth: u32,
    pub status: RsvpStatus,
    pub approved: bool,
    pub approved_by: Option<ParticipantId>,
}

/// A parent → child invitation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent_id: ParticipantId,
    pub child_id: ParticipantId,
}

/// The immutable record of a tree taken at lock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub roster: Vec<RosterEntry>,
    pub edges: Vec<Edge>,
    pub generated_at: DateTime<Utc>,
}
