use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    },
    courier_channels::{ChatOutbound, Error as ChannelError},
    courier_config::ServerConfig,
    courier_pipeline::AdminService,
    serde::Deserialize,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::admin_routes::admin_router;

#[derive(Clone)]
pub struct AppState {
    pub outbound: Arc<dyn ChatOutbound>,
    pub admin: AdminService,
}

impl axum::extract::FromRef<AppState> for AdminService {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

/// Build the router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/send", post(send_handler))
        .nest("/api/admin", admin_router())
        .with_state(state)
}

/// Bind and serve until `cancel` fires.
pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "http server listening");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    info!("http server stopped");
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    chat_id: i64,
    message: String,
}

async fn send_handler(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> impl IntoResponse {
    match state.outbound.send_text(req.chat_id, &req.message).await {
        Ok(sent) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "chat_id": sent.chat_id,
                "message_ids": sent.message_ids,
            })),
        ),
        Err(e) => {
            warn!(chat_id = req.chat_id, error = %e, "send failed");
            let status = match e {
                ChannelError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
                ChannelError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                })),
            )
        },
    }
}
