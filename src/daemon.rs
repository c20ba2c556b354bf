use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::YellowTracker;
use crate::config::Config;
use crate::domains::ledger::{Holding, Message};
use crate::error::{Result, YellowTrackerError};
use crate::interfaces::providers::AssetClass;
use crate::services::conversation::{InboundMessage, TurnReply, TurnStatus};

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<YellowTracker>,
    pub token: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct WelcomeResponse {
    text: String,
}

#[derive(Deserialize)]
struct TextRequest {
    user_id: String,
    text: String,
}

#[derive(Deserialize)]
struct VoiceRequest {
    user_id: String,
    /// Base64 audio.
    audio: String,
    format: Option<String>,
}

#[derive(Deserialize)]
struct PhotoRequest {
    user_id: String,
    /// Base64 image.
    image: String,
    caption: Option<String>,
}

#[derive(Serialize)]
struct ReplyResponse {
    text: String,
    status: &'static str,
    applied: usize,
    skipped: usize,
    failed: usize,
}

impl From<TurnReply> for ReplyResponse {
    fn from(reply: TurnReply) -> Self {
        let status = match reply.status {
            TurnStatus::Structured => "structured",
            TurnStatus::Unstructured => "unstructured",
            TurnStatus::TranslationFailed => "translation_failed",
            TurnStatus::TranscriptionFailed => "transcription_failed",
        };
        Self {
            text: reply.text,
            status,
            applied: reply.report.applied,
            skipped: reply.report.skipped,
            failed: reply.report.failures.len(),
        }
    }
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct HoldingsResponse {
    holdings: Vec<Holding>,
}

#[derive(Deserialize)]
struct PriceQuery {
    ticker: String,
    asset_type: Option<String>,
}

#[derive(Serialize)]
struct PriceResponse {
    ticker: String,
    price: Option<Decimal>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/welcome", get(welcome))
        .route("/messages/text", post(message_text))
        .route("/messages/voice", post(message_voice))
        .route("/messages/photo", post(message_photo))
        .route("/history", get(history))
        .route("/holdings", get(holdings))
        .route("/price", get(price))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn welcome(State(state): State<AppState>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        text: state.tracker.welcome().to_string(),
    })
}

async fn message_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TextRequest>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let message = InboundMessage::Text(payload.text);
    reply(state.tracker.process(&payload.user_id, message).await)
}

async fn message_voice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VoiceRequest>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let bytes = match decode_base64(&payload.audio) {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };
    let message = InboundMessage::Voice {
        bytes,
        format: payload.format.unwrap_or_else(|| "ogg".to_string()),
    };
    reply(state.tracker.process(&payload.user_id, message).await)
}

async fn message_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PhotoRequest>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let bytes = match decode_base64(&payload.image) {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };
    let message = InboundMessage::Photo {
        bytes,
        caption: payload.caption,
    };
    reply(state.tracker.process(&payload.user_id, message).await)
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.tracker.history(&query.user_id, limit).await {
        Ok(messages) => (StatusCode::OK, Json(HistoryResponse { messages })).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn holdings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    match state.tracker.holdings(&query.user_id).await {
        Ok(holdings) => (StatusCode::OK, Json(HoldingsResponse { holdings })).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn price(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PriceQuery>,
) -> Response {
    if let Err(err) = authorize(&headers, &state.token) {
        return err.into_response();
    }
    let class = AssetClass::from_asset_type(query.asset_type.as_deref().unwrap_or("stock"));
    let price = state.tracker.price(&query.ticker, class).await;
    (
        StatusCode::OK,
        Json(PriceResponse {
            ticker: query.ticker,
            price,
        }),
    )
        .into_response()
}

fn reply(result: Result<TurnReply>) -> Response {
    match result {
        Ok(reply) => (StatusCode::OK, Json(ReplyResponse::from(reply))).into_response(),
        Err(err) => internal_error(err),
    }
}

fn internal_error(err: YellowTrackerError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn decode_base64(raw: &str) -> std::result::Result<Vec<u8>, (StatusCode, Json<ErrorResponse>)> {
    general_purpose::STANDARD.decode(raw.trim()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid base64 payload: {e}"),
            }),
        )
    })
}

fn authorize(
    headers: &HeaderMap,
    token: &str,
) -> std::result::Result<(), (StatusCode, Json<ErrorResponse>)> {
    let header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let bearer = header.strip_prefix("Bearer ").unwrap_or("");

    if bearer == token || api_key == token {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ))
    }
}

pub async fn run(host: &str, port: u16, config: Config, token: &str) -> Result<()> {
    run_with_shutdown(host, port, config, token, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(
    host: &str,
    port: u16,
    config: Config,
    token: &str,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let tracker = Arc::new(YellowTracker::from_config(config).await?);
    let state = AppState {
        tracker,
        token: token.to_string(),
    };
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;
    info!(%addr, "yellow tracker daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| YellowTrackerError::Runtime(e.to_string()))?;

    info!("yellow tracker daemon stopped");
    Ok(())
}
