use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_chat_core::embeddings::EmbeddingProvider;
use pdf_chat_core::generation::GenerationProvider;
use pdf_chat_core::{ChatError, SessionId, SessionRegistry, SourceDocument, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub const SESSION_HEADER: &str = "x-session-id";
pub const NO_SESSION_MESSAGE: &str = "No PDFs processed yet.";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

type SharedRegistry<E, G> = Arc<SessionRegistry<E, G>>;

/// Builds the API. Request bodies larger than `max_upload_bytes` are rejected with 413.
pub fn router<E, G>(registry: SharedRegistry<E, G>, max_upload_bytes: usize) -> Router
where
    E: EmbeddingProvider + 'static,
    G: GenerationProvider + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload::<E, G>))
        .route("/ask", post(handle_ask::<E, G>))
        .route("/history", get(handle_history::<E, G>))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(registry)
}

/// Serves the API until ctrl-c, sweeping idle sessions in the background.
pub async fn serve<E, G>(
    registry: SharedRegistry<E, G>,
    bind_addr: &str,
    max_upload_bytes: usize,
) -> anyhow::Result<()>
where
    E: EmbeddingProvider + 'static,
    G: GenerationProvider + 'static,
{
    if let Some(ttl) = registry.limits().idle_ttl {
        let sweeper = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ttl.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                sweeper.evict_expired().await;
            }
        });
    }

    let app = router(registry, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, max_upload_bytes, "pdf-chat api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

fn session_id(headers: &HeaderMap) -> SessionId {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
        .unwrap_or_default()
}

// ============ Error response ============

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    kind: String,
    message: String,
}

impl AppError {
    /// Keeps multipart's own status, so an oversized body stays a 413.
    fn invalid_upload(error: MultipartError) -> Self {
        Self {
            status: error.status(),
            kind: "invalid_upload".to_string(),
            message: error.body_text(),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(error: ChatError) -> Self {
        let status = if error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if error.is_provider_error() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            status,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ POST /upload ============

async fn handle_upload<E, G>(
    State(registry): State<SharedRegistry<E, G>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<StatusCode, AppError>
where
    E: EmbeddingProvider + 'static,
    G: GenerationProvider + 'static,
{
    let id = session_id(&headers);
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::invalid_upload)?
    {
        if !matches!(field.name(), Some("files") | Some("file")) {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}.pdf", documents.len() + 1));
        let bytes = field.bytes().await.map_err(AppError::invalid_upload)?;

        documents.push(SourceDocument::new(name, bytes.to_vec()));
    }

    info!(session = %id, documents = documents.len(), "upload received");

    match registry.ingest(&id, documents).await {
        Ok(chunks) => {
            info!(session = %id, chunks, "upload processed");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(error) => {
            warn!(session = %id, kind = error.kind(), %error, "upload rejected");
            Err(error.into())
        }
    }
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AskResponse {
    Answer { answer: String },
    NotReady { error: String },
}

async fn handle_ask<E, G>(
    State(registry): State<SharedRegistry<E, G>>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError>
where
    E: EmbeddingProvider + 'static,
    G: GenerationProvider + 'static,
{
    let id = session_id(&headers);

    match registry.ask(&id, &request.question).await {
        Ok(answer) => Ok(Json(AskResponse::Answer { answer })),
        Err(ChatError::NoSession) => Ok(Json(AskResponse::NotReady {
            error: NO_SESSION_MESSAGE.to_string(),
        })),
        Err(error) => Err(error.into()),
    }
}

// ============ GET /history ============

#[derive(Debug, Serialize)]
struct HistoryResponse {
    turns: Vec<Turn>,
}

async fn handle_history<E, G>(
    State(registry): State<SharedRegistry<E, G>>,
    headers: HeaderMap,
) -> Json<HistoryResponse>
where
    E: EmbeddingProvider + 'static,
    G: GenerationProvider + 'static,
{
    let turns = registry.history(&session_id(&headers)).await;
    Json(HistoryResponse { turns })
}

// ============ GET /health ============

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
