//! HTTP IPC surface for the daemon.
//!
//! Thin collaborator layer over the supervisor: bot CRUD plus the four
//! supervision operations. Ownership checks and authentication are the
//! caller's concern — the daemon binds to loopback and trusts that the
//! caller has already authorized the action.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::bot::{current_timestamp, Bot};
use crate::inject::{sanitize_source, validate_credential};
use crate::language::Language;
use crate::supervisor::error::SupervisorError;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBotRequest {
    pub name: String,
    #[serde(default)]
    pub language: Language,
    pub source: String,
    pub credential: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBotRequest {
    pub name: Option<String>,
    pub language: Option<Language>,
    pub source: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatusResponse {
    pub id: String,
    pub running: bool,
    pub uptime_seconds: u64,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotListResponse {
    pub bots: Vec<Bot>,
}

/// IPC server state.
#[derive(Clone)]
pub struct IpcServer {
    pub supervisor: Arc<RwLock<Supervisor>>,
    pub listen_addr: String,
}

impl IpcServer {
    pub fn new(supervisor: Arc<RwLock<Supervisor>>, listen_addr: &str) -> Self {
        Self {
            supervisor,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/bots", get(list_bots).post(create_bot))
            .route(
                "/api/bots/:id",
                get(get_bot).patch(update_bot).delete(delete_bot),
            )
            .route("/api/bots/:id/start", post(start_bot))
            .route("/api/bots/:id/stop", post(stop_bot))
            .route("/api/bots/:id/status", get(bot_status))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        tracing::info!("IPC HTTP server starting on {}", self.listen_addr);
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// GET /api/bots
async fn list_bots(State(state): State<IpcServer>) -> impl IntoResponse {
    let supervisor = state.supervisor.read().await;
    let bots = supervisor.store.list().to_vec();
    Json(BotListResponse { bots })
}

/// POST /api/bots
async fn create_bot(
    State(state): State<IpcServer>,
    Json(req): Json<CreateBotRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    if !validate_credential(&req.credential) {
        return Err(SupervisorError::InvalidCredential);
    }

    let bot = Bot::new(
        &req.name,
        req.language,
        &sanitize_source(&req.source),
        &req.credential,
    );

    let mut supervisor = state.supervisor.write().await;
    supervisor
        .store
        .add(bot.clone())
        .map_err(SupervisorError::Internal)?;
    tracing::info!("Bot created: '{}' ({})", bot.name, bot.id);

    Ok((StatusCode::CREATED, Json(bot)))
}

/// GET /api/bots/:id — reconciles this bot before answering.
async fn get_bot(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let bot = supervisor.reconcile_bot(&id).await?;
    Ok(Json(bot))
}

/// PATCH /api/bots/:id — rejected while the bot is running.
async fn update_bot(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
    Json(req): Json<UpdateBotRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;

    let mut bot = supervisor.reconcile_bot(&id).await?;
    if bot.running {
        return Err(SupervisorError::BotRunning(id));
    }

    if let Some(name) = req.name {
        bot.name = name;
    }
    if let Some(language) = req.language {
        bot.language = language;
    }
    if let Some(source) = req.source {
        bot.source = sanitize_source(&source);
    }
    if let Some(credential) = req.credential {
        if !validate_credential(&credential) {
            return Err(SupervisorError::InvalidCredential);
        }
        bot.credential = credential;
    }
    bot.updated_at = current_timestamp();

    supervisor
        .store
        .update(&id, bot.clone())
        .map_err(SupervisorError::Internal)?;
    Ok(Json(bot))
}

/// DELETE /api/bots/:id — rejected while the bot is running. The CRUD
/// surface owns working-file cleanup, so the injected source and any stop
/// sentinel are removed here.
async fn delete_bot(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;

    let bot = supervisor.reconcile_bot(&id).await?;
    if bot.running {
        return Err(SupervisorError::BotRunning(id));
    }

    let work_file = supervisor.working_dir().join(bot.working_file_name());
    let sentinel = supervisor.working_dir().join(bot.sentinel_file_name());
    let _ = std::fs::remove_file(work_file);
    let _ = std::fs::remove_file(sentinel);

    supervisor
        .store
        .remove(&id)
        .map_err(SupervisorError::Internal)?;
    tracing::info!("Bot deleted: '{}' ({})", bot.name, id);

    Ok(Json(json!({ "success": true })))
}

/// POST /api/bots/:id/start
async fn start_bot(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    supervisor.launch(&id).await?;
    Ok(Json(json!({ "success": true, "message": "Bot started" })))
}

/// POST /api/bots/:id/stop
async fn stop_bot(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    supervisor.stop(&id).await?;
    Ok(Json(json!({ "success": true, "message": "Bot stopped" })))
}

/// GET /api/bots/:id/status — reconciles this bot before answering.
async fn bot_status(
    Path(id): Path<String>,
    State(state): State<IpcServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let bot = supervisor.reconcile_bot(&id).await?;
    let pid = supervisor.registry.pid(&id).ok();
    Ok(Json(BotStatusResponse {
        id: bot.id,
        running: bot.running,
        uptime_seconds: bot.uptime_seconds,
        pid,
    }))
}
