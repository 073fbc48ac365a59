//! HTTP API endpoints.
//!
//! Thin JSON adapter over [`PartyEngine`]. Engine errors become structured
//! bodies; a locked tree on RSVP and a not-yet-started snapshot are ordinary
//! 200 responses because they are expected end states.

use crate::engine::{NewEvent, PartyEngine, RsvpOutcome, SnapshotView};
use crate::error::EngineError;
use crate::tree::Node;
use crate::types::{
    Credential, Event, EventId, Participant, ParticipantId, Role, RsvpStatus, Snapshot,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build the party API router.
pub fn routes() -> Router<Arc<PartyEngine>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/parties", post(create_party))
        .route("/api/v1/parties/{event_id}", get(get_party))
        .route("/api/v1/parties/{event_id}/rsvp", post(set_rsvp))
        .route("/api/v1/parties/{event_id}/snapshot", get(get_snapshot))
        .route("/api/v1/parties/{event_id}/start", post(start_party))
        .route(
            "/api/v1/parties/{event_id}/members/{member_id}",
            get(get_member),
        )
        .route("/api/v1/join/{event_id}/{token}", post(join_party))
        .route("/api/v1/invites/{token}", get(preview_invite))
}

/// Router with state applied, ready to serve.
pub fn router(engine: Arc<PartyEngine>) -> Router {
    routes().with_state(engine)
}

// ─── Request/Response Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreatePartyRequest {
    title: String,
    location: String,
    /// RFC 3339 with an explicit offset.
    starts_at: DateTime<Utc>,
    host_name: String,
    host_phone: String,
}

#[derive(Debug, Serialize)]
struct CreatePartyResponse {
    party: Event,
    host_member: Participant,
    host_rsvp: crate::types::Response,
    host_invite: Option<InviteLink>,
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    name: String,
    phone: String,
}

#[derive(Debug, Serialize)]
struct JoinResponse {
    member: Participant,
    rsvp: crate::types::Response,
    my_invite: Option<InviteLink>,
}

#[derive(Debug, Deserialize)]
struct RsvpRequest {
    member_id: ParticipantId,
    status: RsvpStatus,
}

#[derive(Debug, Serialize)]
struct RsvpResponse {
    rsvp: Option<crate::types::Response>,
    locked: bool,
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    started: bool,
    #[serde(flatten)]
    snapshot: Option<Snapshot>,
}

#[derive(Debug, Serialize)]
struct MemberResponse {
    member: MemberProfile,
    rsvp: crate::types::Response,
    unlocker_name: Option<String>,
    my_invite: Option<InviteLink>,
    locked: bool,
}

/// A participant as the unauthenticated member page shows it: no contact.
#[derive(Debug, Serialize)]
struct MemberProfile {
    id: ParticipantId,
    event_id: EventId,
    name: String,
    role: Role,
    parent_id: Option<ParticipantId>,
    depth: u32,
    can_invite: bool,
}

impl From<Participant> for MemberProfile {
    fn from(p: Participant) -> Self {
        MemberProfile {
            id: p.id,
            event_id: p.event_id,
            name: p.name,
            role: p.role,
            parent_id: p.parent_id,
            depth: p.depth,
            can_invite: p.can_invite,
        }
    }
}

#[derive(Debug, Serialize)]
struct InviteLink {
    token: String,
    url: String,
}

impl From<Credential> for InviteLink {
    fn from(c: Credential) -> Self {
        InviteLink {
            url: c.url(),
            token: c.token,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn error_response(e: EngineError) -> axum::response::Response {
    let status = match &e {
        EngineError::InvalidIdentity(_) | EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotEligible(_) => StatusCode::FORBIDDEN,
        EngineError::InvalidCredential | EngineError::NotFound(_) | EngineError::NotAvailable => {
            StatusCode::NOT_FOUND
        }
        EngineError::Expired => StatusCode::GONE,
        EngineError::DuplicateIdentity => StatusCode::CONFLICT,
        EngineError::Locked => StatusCode::LOCKED,
        EngineError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let error = if e.is_storage() {
        tracing::error!("Request failed in store: {e}");
        "internal error".to_string()
    } else {
        e.to_string()
    };
    (status, Json(ErrorBody { error })).into_response()
}

/// Malformed or mistyped request bodies get the same `{"error": ...}` shape.
fn rejection_response(rejection: JsonRejection) -> axum::response::Response {
    (
        rejection.status(),
        Json(ErrorBody {
            error: rejection.body_text(),
        }),
    )
        .into_response()
}

fn node_parts(node: Node) -> (Participant, crate::types::Response, Option<InviteLink>) {
    (
        node.participant,
        node.response,
        node.credential.map(InviteLink::from),
    )
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn create_party(
    State(engine): State<Arc<PartyEngine>>,
    body: Result<Json<CreatePartyRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let new_event = NewEvent {
        title: req.title,
        location: req.location,
        starts_at: req.starts_at,
        host_name: req.host_name,
        host_contact: req.host_phone,
    };
    match engine.create_event(new_event) {
        Ok(created) => {
            let (host_member, host_rsvp, host_invite) = node_parts(created.root);
            (
                StatusCode::CREATED,
                Json(CreatePartyResponse {
                    party: created.event,
                    host_member,
                    host_rsvp,
                    host_invite,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn get_party(
    State(engine): State<Arc<PartyEngine>>,
    Path(event_id): Path<EventId>,
) -> impl IntoResponse {
    match engine.get_event(event_id) {
        Ok(event) => Json(event).into_response(),
        Err(e) => error_response(e),
    }
}

async fn join_party(
    State(engine): State<Arc<PartyEngine>>,
    Path((event_id, token)): Path<(EventId, String)>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    match engine.join(event_id, &token, &req.name, &req.phone) {
        Ok(node) => {
            let (member, rsvp, my_invite) = node_parts(node);
            (
                StatusCode::CREATED,
                Json(JoinResponse {
                    member,
                    rsvp,
                    my_invite,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn set_rsvp(
    State(engine): State<Arc<PartyEngine>>,
    Path(event_id): Path<EventId>,
    body: Result<Json<RsvpRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    match engine.set_status(event_id, req.member_id, req.status) {
        Ok(RsvpOutcome::Updated(rsvp)) => Json(RsvpResponse {
            rsvp: Some(rsvp),
            locked: false,
        })
        .into_response(),
        Ok(RsvpOutcome::Locked) => Json(RsvpResponse {
            rsvp: None,
            locked: true,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_snapshot(
    State(engine): State<Arc<PartyEngine>>,
    Path(event_id): Path<EventId>,
) -> impl IntoResponse {
    match engine.snapshot(event_id) {
        Ok(SnapshotView::NotStarted) => Json(SnapshotResponse {
            started: false,
            snapshot: None,
        })
        .into_response(),
        Ok(SnapshotView::Started(snapshot)) => Json(SnapshotResponse {
            started: true,
            snapshot: Some(snapshot),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn start_party(
    State(engine): State<Arc<PartyEngine>>,
    Path(event_id): Path<EventId>,
) -> impl IntoResponse {
    match engine.start_event(event_id) {
        Ok(event) => Json(event).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_member(
    State(engine): State<Arc<PartyEngine>>,
    Path((event_id, member_id)): Path<(EventId, ParticipantId)>,
) -> impl IntoResponse {
    match engine.member_view(event_id, member_id) {
        Ok(view) => Json(MemberResponse {
            member: view.participant.into(),
            rsvp: view.response,
            unlocker_name: view.unlocker_name,
            my_invite: view.credential.map(InviteLink::from),
            locked: view.locked,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn preview_invite(
    State(engine): State<Arc<PartyEngine>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match engine.preview_invite(&token) {
        Ok(preview) => Json(preview).into_response(),
        Err(e) => error_response(e),
    }
}
