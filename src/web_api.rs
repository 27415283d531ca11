use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, Query, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::auth::{extract_bearer_token, CallerInfo};
use crate::botx::{CallbackRegistry, CallbackVerifier, DeliveryReport};
use crate::commands::{status_response, CommandHandler, CommandRequest, StatusQuery};
use crate::errors::GatewayError;
use crate::pipeline::GatewayPipeline;
use crate::types::{DispatchMode, DispatchOutcome, ResultResponse};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: GatewayPipeline,
    pub commands: CommandHandler,
    /// Absent when the platform client does not deliver notification callbacks.
    pub callbacks: Option<Arc<CallbackRegistry>>,
    pub platform_auth: CallbackVerifier,
}

impl AppState {
    pub fn new(
        pipeline: GatewayPipeline,
        commands: CommandHandler,
        callbacks: Option<Arc<CallbackRegistry>>,
        platform_auth: CallbackVerifier,
    ) -> Self {
        Self {
            pipeline,
            commands,
            callbacks,
            platform_auth,
        }
    }
}

impl<S> FromRequestParts<S> for CallerInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(CallerInfo::capture(&parts.headers, peer))
    }
}

fn result_response(status: StatusCode, result: impl Into<String>) -> Response {
    (status, Json(ResultResponse::new(result))).into_response()
}

fn error_to_http(err: GatewayError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!(%status, error = %err, "request failed");
    } else {
        tracing::info!(%status, error = %err, "request rejected");
    }
    result_response(status, err.to_string())
}

async fn dispatch(state: AppState, caller: CallerInfo, body: Bytes, mode: DispatchMode) -> Response {
    match state.pipeline.handle(&caller, &body, mode).await {
        Ok(DispatchOutcome::Accepted { .. }) => result_response(StatusCode::ACCEPTED, "OK"),
        Ok(DispatchOutcome::Created { .. }) => result_response(StatusCode::CREATED, "OK"),
        Err(e) => error_to_http(e),
    }
}

async fn send_message(
    State(state): State<AppState>,
    caller: CallerInfo,
    body: Bytes,
) -> impl IntoResponse {
    dispatch(state, caller, body, DispatchMode::Async).await
}

async fn send_message_with_status(
    State(state): State<AppState>,
    caller: CallerInfo,
    body: Bytes,
) -> impl IntoResponse {
    dispatch(state, caller, body, DispatchMode::Sync).await
}

async fn bot_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    tracing::debug!(
        chat_id = %req.from.group_chat_id,
        command = %req.command.body,
        "command received"
    );
    let commands = state.commands.clone();
    tokio::spawn(async move { commands.handle(req).await });
    result_response(StatusCode::ACCEPTED, "accepted")
}

async fn bot_status(Query(query): Query<StatusQuery>) -> impl IntoResponse {
    Json(status_response(&query))
}

async fn notification_callback(
    State(state): State<AppState>,
    Json(report): Json<DeliveryReport>,
) -> impl IntoResponse {
    match &state.callbacks {
        Some(callbacks) => {
            tracing::debug!(sync_id = %report.sync_id, status = %report.status, "delivery report");
            callbacks.complete(report);
        }
        None => tracing::debug!(sync_id = %report.sync_id, "delivery report ignored"),
    }
    result_response(StatusCode::ACCEPTED, "accepted")
}

async fn require_platform_signature(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(extract_bearer_token)
        .unwrap_or_default();
    if let Err(e) = state.platform_auth.verify(token) {
        tracing::warn!(path = %req.uri().path(), error = %e, "rejected platform callback");
        return result_response(StatusCode::UNAUTHORIZED, "invalid platform signature");
    }
    next.run(req).await
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    result_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/v0/message", post(send_message))
        .route("/v0/message/with-status", post(send_message_with_status))
        .layer(TraceLayer::new_for_http());

    let botapi = Router::new()
        .route("/command", post(bot_command))
        .route("/status", get(bot_status))
        .route("/notification/callback", post(notification_callback))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_platform_signature,
        ));

    Router::new()
        .nest("/api", api)
        .nest("/botapi", botapi)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

pub async fn run_http_server(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}
