use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    protocol::{DiagnoseRequest, DiagnoseResponse, ErrorResponse, HealthResponse},
    service::DiagnosisService,
};

const SERVICE_NAME: &str = "dx-server";

#[derive(Clone, Debug)]
pub struct AppState {
    pub service: Arc<DiagnosisService>,
    pub static_dir: PathBuf,
    pub collection: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8000, static_dir: PathBuf::from("static") }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/diagnose", post(diagnose))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(
    config: ServerConfig,
    service: Arc<DiagnosisService>,
    collection: String,
) -> anyhow::Result<()> {
    let state = AppState { service, static_dir: config.static_dir.clone(), collection };
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid host/port '{}:{}'", config.host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("dx-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Response {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "index page unavailable");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: format!("{} not found", path.display()) }),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        collection: state.collection.clone(),
    })
}

async fn diagnose(
    State(state): State<AppState>,
    request: Result<Json<DiagnoseRequest>, JsonRejection>,
) -> (StatusCode, Json<DiagnoseResponse>) {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            error!(stage = "request", error = %rejection.body_text(), "malformed diagnose request");
            return (rejection.status(), Json(DiagnoseResponse::empty()));
        }
    };

    let diagnoses = state.service.diagnose(&request.symptoms).await;
    (StatusCode::OK, Json(DiagnoseResponse::from(diagnoses)))
}
