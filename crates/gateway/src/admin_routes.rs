use {
    axum::{
        Json,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    courier_delivery::Disposition,
    courier_pipeline::AdminService,
    courier_routing::Toggle,
    serde::Deserialize,
};

use crate::server::AppState;

/// Build the operator router with all `/api/admin/*` routes.
pub fn admin_router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/status", get(status_handler))
        .route("/rules", get(rules_handler))
        .route("/fallback", get(fallback_handler))
        .route("/toggles", post(toggle_handler))
        .route("/priority", post(priority_handler))
        .route("/blocklist", post(blocklist_handler))
        .route("/groups", post(groups_handler))
        .route("/privileged", post(privileged_handler))
        .route("/reset", post(reset_handler))
        .route("/flush", post(flush_handler))
}

fn bad_request(message: impl ToString) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.to_string() })),
    )
        .into_response()
}

fn changed(changed: bool) -> Response {
    Json(serde_json::json!({ "changed": changed })).into_response()
}

async fn status_handler(State(admin): State<AdminService>) -> impl IntoResponse {
    Json(admin.status())
}

async fn rules_handler(State(admin): State<AdminService>) -> impl IntoResponse {
    Json(admin.export_rules())
}

#[derive(Debug, Deserialize)]
struct FallbackQuery {
    disposition: Option<String>,
    limit: Option<u32>,
}

async fn fallback_handler(
    State(admin): State<AdminService>,
    Query(query): Query<FallbackQuery>,
) -> Response {
    let disposition = match query.disposition.as_deref().map(str::parse::<Disposition>) {
        None => None,
        Some(Ok(d)) => Some(d),
        Some(Err(e)) => return bad_request(e),
    };
    match admin
        .recent_fallback(disposition, query.limit.unwrap_or(50).min(500))
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    toggle: String,
    enabled: bool,
    chat_id: Option<i64>,
}

async fn toggle_handler(
    State(admin): State<AdminService>,
    Json(req): Json<ToggleRequest>,
) -> Response {
    let toggle = match req.toggle.parse::<Toggle>() {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    match admin.set_toggle(toggle, req.enabled, req.chat_id) {
        Ok(c) => changed(c),
        Err(e) => bad_request(e),
    }
}

#[derive(Debug, Deserialize)]
struct PriorityRequest {
    enabled: bool,
}

async fn priority_handler(
    State(admin): State<AdminService>,
    Json(req): Json<PriorityRequest>,
) -> Response {
    changed(admin.set_priority_enabled(req.enabled))
}

#[derive(Debug, Deserialize)]
struct BlocklistRequest {
    sender_id: Option<i64>,
    chat_id: Option<i64>,
    blocked: bool,
}

async fn blocklist_handler(
    State(admin): State<AdminService>,
    Json(req): Json<BlocklistRequest>,
) -> Response {
    match (req.sender_id, req.chat_id) {
        (Some(sender), None) => changed(admin.set_sender_blocked(sender, req.blocked)),
        (None, Some(chat)) => changed(admin.set_chat_blocked(chat, req.blocked)),
        _ => bad_request("exactly one of sender_id or chat_id is required"),
    }
}

#[derive(Debug, Deserialize)]
struct GroupRequest {
    chat_id: i64,
    allowed: bool,
}

async fn groups_handler(
    State(admin): State<AdminService>,
    Json(req): Json<GroupRequest>,
) -> Response {
    changed(admin.set_group_allowed(req.chat_id, req.allowed))
}

#[derive(Debug, Deserialize)]
struct PrivilegedRequest {
    sender_id: Option<i64>,
}

async fn privileged_handler(
    State(admin): State<AdminService>,
    Json(req): Json<PrivilegedRequest>,
) -> Response {
    let previous = admin.rotate_privileged(req.sender_id);
    Json(serde_json::json!({
        "previous": previous,
        "current": req.sender_id,
    }))
    .into_response()
}

async fn reset_handler(State(admin): State<AdminService>) -> Response {
    admin.emergency_reset();
    Json(serde_json::json!({ "reset": true })).into_response()
}

async fn flush_handler(State(admin): State<AdminService>) -> Response {
    let flushed = admin.force_flush().await;
    Json(serde_json::json!({ "flushed": flushed })).into_response()
}
