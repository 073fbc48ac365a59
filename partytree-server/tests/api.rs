//! HTTP API tests.
//!
//! Drives the axum router in-process with `oneshot`, covering the four
//! operation groups plus the member view, invite preview and manual start.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use partytree_server::identity::ContactNormalizer;
use partytree_server::{api, PartyEngine, TreeStore};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let engine = PartyEngine::new(TreeStore::open_memory().unwrap(), ContactNormalizer::default());
    api::router(Arc::new(engine))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_party(app: &Router, starts_in: Duration) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/parties",
        Some(json!({
            "title": "Launch Night",
            "location": "Warehouse 9",
            "starts_at": (Utc::now() + starts_in).to_rfc3339(),
            "host_name": "Hana",
            "host_phone": "202-555-0100",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn join(app: &Router, event_id: i64, token: &str, name: &str, phone: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/join/{event_id}/{token}"),
        Some(json!({ "name": name, "phone": phone })),
    )
    .await
}

async fn rsvp(app: &Router, event_id: i64, member_id: i64, status: &str) -> Value {
    let (code, body) = send(
        app,
        Method::POST,
        &format!("/api/v1/parties/{event_id}/rsvp"),
        Some(json!({ "member_id": member_id, "status": status })),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn health_check() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn create_join_and_approve() {
    let app = app();
    let party = create_party(&app, Duration::days(7)).await;
    let event_id = party["party"]["id"].as_i64().unwrap();
    assert_eq!(party["host_member"]["depth"], 0);
    assert_eq!(party["host_member"]["role"], "root");
    assert_eq!(party["host_member"]["contact"], "+12025550100");
    assert_eq!(party["host_rsvp"]["status"], "pending");

    let mut token = party["host_invite"]["token"].as_str().unwrap().to_string();
    let url = party["host_invite"]["url"].as_str().unwrap();
    assert_eq!(url, format!("/{event_id}/invite/{token}"));

    let mut ids = vec![party["host_member"]["id"].as_i64().unwrap()];
    for (depth, (name, phone)) in [("Cal", "202-555-0101"), ("Gus", "202-555-0102"), ("Tia", "202-555-0103")]
        .into_iter()
        .enumerate()
    {
        let (status, body) = join(&app, event_id, &token, name, phone).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["member"]["depth"], depth as i64 + 1);
        ids.push(body["member"]["id"].as_i64().unwrap());
        if depth < 2 {
            token = body["my_invite"]["token"].as_str().unwrap().to_string();
        } else {
            assert!(body["my_invite"].is_null());
            assert_eq!(body["member"]["can_invite"], false);
        }
    }

    rsvp(&app, event_id, ids[2], "yes").await;
    let body = rsvp(&app, event_id, ids[3], "accepted").await;
    assert_eq!(body["locked"], false);
    assert_eq!(body["rsvp"]["approved"], true);
    assert!(body["rsvp"]["approved_by"].is_null());

    let (status, member) = send(
        &app,
        Method::GET,
        &format!("/api/v1/parties/{event_id}/members/{}", ids[2]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(member["rsvp"]["approved"], true);
    assert_eq!(member["rsvp"]["approved_by"], ids[3]);
    assert_eq!(member["unlocker_name"], "Tia");
    assert_eq!(member["member"]["name"], "Gus");
    assert!(member["member"].get("contact").is_none());
}

#[tokio::test]
async fn join_errors_map_to_statuses() {
    let app = app();
    let party = create_party(&app, Duration::days(7)).await;
    let event_id = party["party"]["id"].as_i64().unwrap();
    let token = party["host_invite"]["token"].as_str().unwrap();

    let (status, body) = join(&app, event_id, "bogus", "Ivy", "202-555-0111").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = join(&app, event_id, token, "Ivy", "not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = join(&app, event_id, token, "Ivy", "202-555-0111").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = join(&app, event_id, token, "Ivo", "(202) 555-0111").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn late_join_is_locked() {
    let app = app();
    let party = create_party(&app, Duration::minutes(-10)).await;
    let event_id = party["party"]["id"].as_i64().unwrap();
    let token = party["host_invite"]["token"].as_str().unwrap();

    let (status, _) = join(&app, event_id, token, "Late", "202-555-0140").await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn snapshot_lifecycle() {
    let app = app();
    let party = create_party(&app, Duration::days(7)).await;
    let event_id = party["party"]["id"].as_i64().unwrap();
    let host_id = party["host_member"]["id"].as_i64().unwrap();
    let token = party["host_invite"]["token"].as_str().unwrap();
    let (_, guest) = join(&app, event_id, token, "Ivy", "202-555-0111").await;
    let guest_id = guest["member"]["id"].as_i64().unwrap();

    let snapshot_uri = format!("/api/v1/parties/{event_id}/snapshot");
    let (status, body) = send(&app, Method::GET, &snapshot_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "started": false }));

    let (status, event) = send(&app, Method::POST, &format!("/api/v1/parties/{event_id}/start"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["started"], true);

    let body = rsvp(&app, event_id, host_id, "yes").await;
    assert_eq!(body, json!({ "rsvp": null, "locked": true }));

    let (_, first) = send(&app, Method::GET, &snapshot_uri, None).await;
    let (_, second) = send(&app, Method::GET, &snapshot_uri, None).await;
    assert_eq!(first, second);
    assert_eq!(first["started"], true);
    assert_eq!(first["roster"].as_array().unwrap().len(), 2);
    assert_eq!(
        first["edges"],
        json!([{ "parent_id": host_id, "child_id": guest_id }])
    );
    assert!(first["generated_at"].is_string());
}

#[tokio::test]
async fn invite_preview_and_unknown_routes() {
    let app = app();
    let party = create_party(&app, Duration::days(7)).await;
    let token = party["host_invite"]["token"].as_str().unwrap();

    let (status, preview) = send(&app, Method::GET, &format!("/api/v1/invites/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["inviter_name"], "Hana");
    assert_eq!(preview["event"]["title"], "Launch Night");
    assert_eq!(preview["locked"], false);

    let (status, _) = send(&app, Method::GET, "/api/v1/invites/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/parties/999/snapshot", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/parties/999/members/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rsvp_rejects_unknown_status() {
    let app = app();
    let party = create_party(&app, Duration::days(7)).await;
    let event_id = party["party"]["id"].as_i64().unwrap();
    let host_id = party["host_member"]["id"].as_i64().unwrap();
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/parties/{event_id}/rsvp"),
        Some(json!({ "member_id": host_id, "status": "perhaps" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/parties")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}
