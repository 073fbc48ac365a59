//! SQLite storage for events, participants, responses and invite links.
//!
//! Every engine operation runs inside [`TreeStore::transaction`], which opens
//! a `BEGIN IMMEDIATE` transaction. SQLite takes its write lock up front, so
//! read-then-write sequences (duplicate check then insert, children scan then
//! approval update, snapshot check then freeze) cannot interleave.

use crate::error::EngineError;
use crate::types::*;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PARTICIPANT_COLUMNS: &str =
    "id, event_id, name, role, parent_id, depth, can_invite, contact, created_at";

pub struct TreeStore {
    db: Mutex<Connection>,
}

impl TreeStore {
    /// Open or create the database at `path`.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = TreeStore {
            db: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        let db = self.db.lock();
        db.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                title         TEXT NOT NULL,
                location      TEXT NOT NULL,
                starts_at     TEXT NOT NULL,
                started       INTEGER NOT NULL DEFAULT 0,
                snapshot_json TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS participants (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id   INTEGER NOT NULL REFERENCES events(id),
                name       TEXT NOT NULL,
                role       TEXT NOT NULL,
                parent_id  INTEGER REFERENCES participants(id),
                depth      INTEGER NOT NULL,
                can_invite INTEGER NOT NULL,
                contact    TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(event_id, name),
                UNIQUE(event_id, contact)
            );

            CREATE INDEX IF NOT EXISTS idx_participants_parent ON participants(parent_id);

            CREATE TABLE IF NOT EXISTS responses (
                participant_id INTEGER PRIMARY KEY REFERENCES participants(id),
                status         TEXT NOT NULL DEFAULT 'pending',
                approved       INTEGER NOT NULL DEFAULT 0,
                approved_by    INTEGER REFERENCES participants(id),
                updated_at     TEXT NOT NULL,
                CHECK (approved = 0 OR status = 'accepted')
            );

            CREATE TABLE IF NOT EXISTS credentials (
                token      TEXT PRIMARY KEY,
                event_id   INTEGER NOT NULL REFERENCES events(id),
                issuer_id  INTEGER NOT NULL REFERENCES participants(id),
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_credentials_issuer ON credentials(issuer_id);
            ",
        )?;
        Ok(())
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. A busy database
    /// gets exactly one retry; `f` may therefore run twice and must not have
    /// side effects outside the transaction.
    pub fn transaction<T, F>(&self, mut f: F) -> Result<T, EngineError>
    where
        F: FnMut(&TreeTx<'_>) -> Result<T, EngineError>,
    {
        match self.attempt(&mut f) {
            Err(EngineError::Busy) => {
                tracing::warn!("Store busy, retrying transaction once");
                self.attempt(&mut f)
            }
            other => other,
        }
    }

    fn attempt<T, F>(&self, f: &mut F) -> Result<T, EngineError>
    where
        F: FnMut(&TreeTx<'_>) -> Result<T, EngineError>,
    {
        let mut conn = self.db.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let scoped = TreeTx { tx };
        let value = f(&scoped)?;
        scoped.tx.commit()?;
        Ok(value)
    }
}

/// Row-level access within an open transaction.
pub struct TreeTx<'c> {
    tx: Transaction<'c>,
}

/// Fields for a participant insert; `can_invite` is derived from `depth`.
#[derive(Debug, Clone, Copy)]
pub struct NewParticipant<'a> {
    pub event_id: EventId,
    pub name: &'a str,
    pub role: Role,
    pub parent_id: Option<ParticipantId>,
    pub depth: u32,
    pub contact: &'a str,
}

impl TreeTx<'_> {
    // ─── Events ──────────────────────────────────────────────────────────

    pub fn insert_event(
        &self,
        title: &str,
        location: &str,
        starts_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Event, EngineError> {
        self.tx.execute(
            "INSERT INTO events (title, location, starts_at, started, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![title, location, starts_at, now],
        )?;
        Ok(Event {
            id: self.tx.last_insert_rowid(),
            title: title.to_string(),
            location: location.to_string(),
            starts_at,
            started: false,
            created_at: now,
        })
    }

    pub fn event(&self, id: EventId) -> Result<Option<Event>, EngineError> {
        let event = self
            .tx
            .query_row(
                "SELECT id, title, location, starts_at, started, created_at
                 FROM events WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Event {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        location: row.get(2)?,
                        starts_at: row.get(3)?,
                        started: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(event)
    }

    pub fn mark_started(&self, id: EventId) -> Result<(), EngineError> {
        self.tx
            .execute("UPDATE events SET started = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// The persisted snapshot, if the event has been frozen.
    pub fn snapshot_json(&self, id: EventId) -> Result<Option<String>, EngineError> {
        let json: Option<Option<String>> = self
            .tx
            .query_row(
                "SELECT snapshot_json FROM events WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.flatten())
    }

    /// Persist the snapshot and mark the event started. Never overwrites.
    pub fn store_snapshot(&self, id: EventId, json: &str) -> Result<(), EngineError> {
        let n = self.tx.execute(
            "UPDATE events SET snapshot_json = ?2, started = 1
             WHERE id = ?1 AND snapshot_json IS NULL",
            params![id, json],
        )?;
        if n == 0 {
            return Err(EngineError::Storage(format!(
                "snapshot for event {id} already persisted"
            )));
        }
        Ok(())
    }

    // ─── Participants ────────────────────────────────────────────────────

    /// Insert a participant. Uniqueness violations surface as `DuplicateIdentity`.
    pub fn insert_participant(
        &self,
        new: NewParticipant<'_>,
        now: DateTime<Utc>,
    ) -> Result<Participant, EngineError> {
        let can_invite = can_invite(new.depth);
        let inserted = self.tx.execute(
            "INSERT INTO participants
                (event_id, name, role, parent_id, depth, can_invite, contact, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.event_id,
                new.name,
                new.role,
                new.parent_id,
                new.depth,
                can_invite,
                new.contact,
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                return Err(EngineError::DuplicateIdentity);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Participant {
            id: self.tx.last_insert_rowid(),
            event_id: new.event_id,
            name: new.name.to_string(),
            role: new.role,
            parent_id: new.parent_id,
            depth: new.depth,
            can_invite,
            contact: new.contact.to_string(),
            created_at: now,
        })
    }

    /// Whether `name` or `contact` is already taken in the event.
    pub fn identity_taken(
        &self,
        event_id: EventId,
        name: &str,
        contact: &str,
    ) -> Result<bool, EngineError> {
        let taken = self.tx.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM participants
                WHERE event_id = ?1 AND (name = ?2 OR contact = ?3)
             )",
            params![event_id, name, contact],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    pub fn participant(
        &self,
        event_id: EventId,
        id: ParticipantId,
    ) -> Result<Option<Participant>, EngineError> {
        let participant = self
            .tx
            .query_row(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE event_id = ?1 AND id = ?2"
                ),
                params![event_id, id],
                participant_from_row,
            )
            .optional()?;
        Ok(participant)
    }

    /// Direct children of a participant, oldest first.
    pub fn children(
        &self,
        event_id: EventId,
        parent_id: ParticipantId,
    ) -> Result<Vec<Participant>, EngineError> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE event_id = ?1 AND parent_id = ?2 ORDER BY id ASC"
        ))?;
        let children = stmt
            .query_map(params![event_id, parent_id], participant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children)
    }

    // ─── Responses ───────────────────────────────────────────────────────

    pub fn insert_response(
        &self,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Response, EngineError> {
        self.tx.execute(
            "INSERT INTO responses (participant_id, status, approved, approved_by, updated_at)
             VALUES (?1, 'pending', 0, NULL, ?2)",
            params![participant_id, now],
        )?;
        Ok(Response {
            participant_id,
            status: RsvpStatus::Pending,
            approved: false,
            approved_by: None,
            updated_at: now,
        })
    }

    pub fn response(&self, participant_id: ParticipantId) -> Result<Option<Response>, EngineError> {
        let response = self
            .tx
            .query_row(
                "SELECT participant_id, status, approved, approved_by, updated_at
                 FROM responses WHERE participant_id = ?1",
                params![participant_id],
                |row| {
                    Ok(Response {
                        participant_id: row.get(0)?,
                        status: row.get(1)?,
                        approved: row.get(2)?,
                        approved_by: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(response)
    }

    pub fn update_response(&self, response: &Response) -> Result<(), EngineError> {
        let n = self.tx.execute(
            "UPDATE responses
             SET status = ?2, approved = ?3, approved_by = ?4, updated_at = ?5
             WHERE participant_id = ?1",
            params![
                response.participant_id,
                response.status,
                response.approved,
                response.approved_by,
                response.updated_at,
            ],
        )?;
        if n == 0 {
            return Err(EngineError::NotFound("response"));
        }
        Ok(())
    }

    // ─── Credentials ─────────────────────────────────────────────────────

    pub fn insert_credential(&self, credential: &Credential) -> Result<(), EngineError> {
        self.tx.execute(
            "INSERT INTO credentials (token, event_id, issuer_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                credential.token,
                credential.event_id,
                credential.issuer_id,
                credential.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn credential(&self, token: &str) -> Result<Option<Credential>, EngineError> {
        let credential = self
            .tx
            .query_row(
                "SELECT token, event_id, issuer_id, created_at FROM credentials WHERE token = ?1",
                params![token],
                credential_from_row,
            )
            .optional()?;
        Ok(credential)
    }

    /// Most recently minted invite link of a participant.
    pub fn latest_credential(
        &self,
        issuer_id: ParticipantId,
    ) -> Result<Option<Credential>, EngineError> {
        let credential = self
            .tx
            .query_row(
                "SELECT token, event_id, issuer_id, created_at FROM credentials
                 WHERE issuer_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![issuer_id],
                credential_from_row,
            )
            .optional()?;
        Ok(credential)
    }

    // ─── Snapshot inputs ─────────────────────────────────────────────────

    pub fn roster(&self, event_id: EventId) -> Result<Vec<RosterEntry>, EngineError> {
        let mut stmt = self.tx.prepare(
            "SELECT p.id, p.name, p.role, p.depth, r.status, r.approved, r.approved_by
             FROM participants p
             JOIN responses r ON r.participant_id = p.id
             WHERE p.event_id = ?1
             ORDER BY p.id ASC",
        )?;
        let roster = stmt
            .query_map(params![event_id], |row| {
                Ok(RosterEntry {
                    participant_id: row.get(0)?,
                    name: row.get(1)?,
                    role: row.get(2)?,
                    depth: row.get(3)?,
                    status: row.get(4)?,
                    approved: row.get(5)?,
                    approved_by: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roster)
    }

    pub fn edges(&self, event_id: EventId) -> Result<Vec<Edge>, EngineError> {
        let mut stmt = self.tx.prepare(
            "SELECT parent_id, id FROM participants
             WHERE event_id = ?1 AND parent_id IS NOT NULL
             ORDER BY id ASC",
        )?;
        let edges = stmt
            .query_map(params![event_id], |row| {
                Ok(Edge {
                    parent_id: row.get(0)?,
                    child_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        parent_id: row.get(4)?,
        depth: row.get(5)?,
        can_invite: row.get(6)?,
        contact: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        token: row.get(0)?,
        event_id: row.get(1)?,
        issuer_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl ToSql for RsvpStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for RsvpStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}
