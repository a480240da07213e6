//! HTTP-level tests for the approval API, running the router against the
//! in-memory store.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use approval_plane::models::{NewTicket, Verdict};
use approval_plane::store::{MemoryTicketStore, TicketStore};
use approval_plane::{app, AppState};

fn harness() -> (axum::Router, Arc<MemoryTicketStore>) {
    let store = Arc::new(MemoryTicketStore::new());
    let state = Arc::new(AppState::new(store.clone()));
    (app(state), store)
}

async fn seed_buy(store: &MemoryTicketStore, asx_code: &str, price: f64) -> String {
    let ticket = store
        .create(NewTicket {
            company_id: Some("company-1".to_string()),
            announcement_id: Some("ann-1".to_string()),
            asx_code: asx_code.to_string(),
            verdict: Verdict::Buy,
            sentiment: Some("BULLISH".to_string()),
            confidence: 0.8,
            reasoning: "strong results".to_string(),
            price_at_decision: Decimal::from_f64(price),
            task_id: Some("task-1".to_string()),
        })
        .await
        .unwrap();
    ticket.ticket_id
}

fn post_approve(ticket_id: &str, approved: bool, notes: Option<&str>) -> Request<Body> {
    let body = json!({ "ticketId": ticket_id, "approved": approved, "notes": notes });
    Request::post("/approve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = harness();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn approving_a_pending_ticket_executes_the_paper_trade() {
    let (app, store) = harness();
    let ticket_id = seed_buy(&store, "BHP", 12.50).await;

    let response = app
        .oneshot(post_approve(&ticket_id, true, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "executed");
    let details = &body["details"];
    assert_eq!(details["ticketId"], ticket_id.as_str());
    assert_eq!(
        Decimal::from_str(details["quantity"].as_str().unwrap()).unwrap(),
        Decimal::from(100)
    );
    assert_eq!(
        Decimal::from_str(details["tradeAmount"].as_str().unwrap()).unwrap(),
        Decimal::from(1250)
    );

    // approver identity comes from the API, not the caller
    let resolved = store.history(10).await.unwrap();
    assert_eq!(resolved[0].approved_by.as_deref(), Some("human_via_web_ui"));
}

#[tokio::test]
async fn rejecting_records_feedback_without_executing() {
    let (app, store) = harness();
    let ticket_id = seed_buy(&store, "WBC", 25.0).await;

    let response = app
        .oneshot(post_approve(&ticket_id, false, Some("thin volume")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "rejected");
    assert!(body["message"].as_str().unwrap().contains("thin volume"));

    let resolved = store.history(10).await.unwrap();
    assert!(!resolved[0].executed);
}

#[tokio::test]
async fn second_decision_is_reported_as_already_resolved() {
    let (app, store) = harness();
    let ticket_id = seed_buy(&store, "CBA", 100.0).await;

    let first = app
        .clone()
        .oneshot(post_approve(&ticket_id, true, None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_approve(&ticket_id, false, Some("changed my mind")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let body = body_json(second).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["details"]["reason"], "already_resolved");
    assert_eq!(body["details"]["executed"], true);
}

#[tokio::test]
async fn unknown_ticket_is_a_404() {
    let (app, _) = harness();
    let response = app
        .oneshot(post_approve("trade-000000000000", true, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["details"]["reason"], "not_found");
}

#[tokio::test]
async fn pending_list_shrinks_as_tickets_resolve() {
    let (app, store) = harness();
    let first = seed_buy(&store, "BHP", 10.0).await;
    let _second = seed_buy(&store, "RIO", 20.0).await;

    let response = app
        .clone()
        .oneshot(Request::get("/pending").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert!(listed[0]["ticketId"].is_string());
    assert!(listed[0]["priceAtDecision"].is_string());

    app.clone()
        .oneshot(post_approve(&first, false, None))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::get("/pending").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}
