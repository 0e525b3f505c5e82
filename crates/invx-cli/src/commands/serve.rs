//! Serve command - expose batch analysis over HTTP.
//!
//! `POST /api/analyze` takes a multipart form with one or more `files`
//! fields (plus optional `prompt` and `structure` text fields) and returns
//! `{"result": "<analysis text>"}`. `GET /api/health` reports liveness.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use invx_core::invx_genai::GenerativeBackend;
use invx_core::{AnalysisOptions, HealthStatus, InvoicePipeline, InvxError, UploadedFile};

use super::{build_pipeline, load_config};

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Origin allowed by CORS
    #[arg(long, default_value = "http://localhost:3000")]
    allow_origin: String,

    /// Maximum request body size in megabytes
    #[arg(long, default_value = "50")]
    max_upload_mb: usize,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    result: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(error: &InvxError) -> StatusCode {
    match error {
        InvxError::Precondition(_) | InvxError::MalformedResponse(_) => StatusCode::BAD_REQUEST,
        InvxError::RemoteProcessing { .. } | InvxError::Remote(_) => StatusCode::BAD_GATEWAY,
        InvxError::ReadyTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        InvxError::Config(_) | InvxError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the HTTP router over a pipeline.
pub fn router<B>(pipeline: Arc<InvoicePipeline<B>>, cors: CorsLayer, body_limit: usize) -> Router
where
    B: GenerativeBackend + 'static,
{
    Router::new()
        .route("/api/analyze", post(analyze::<B>))
        .route("/api/health", get(health::<B>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(pipeline)
}

async fn health<B>(State(pipeline): State<Arc<InvoicePipeline<B>>>) -> Json<HealthStatus>
where
    B: GenerativeBackend + 'static,
{
    Json(pipeline.health())
}

async fn analyze<B>(
    State(pipeline): State<Arc<InvoicePipeline<B>>>,
    mut multipart: Multipart,
) -> Response
where
    B: GenerativeBackend + 'static,
{
    let mut uploads = Vec::new();
    let mut options = AnalysisOptions::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart request: {}", e);
                return error_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("document.pdf").to_string();
                match field.bytes().await {
                    Ok(bytes) => uploads.push(UploadedFile {
                        name: filename,
                        bytes: bytes.to_vec(),
                    }),
                    Err(e) => {
                        warn!("Failed to read upload bytes: {}", e);
                        return error_response(StatusCode::BAD_REQUEST, "Failed to read file data.");
                    }
                }
            }
            "prompt" => options.prompt = field.text().await.ok().filter(|t| !t.is_empty()),
            "structure" => {
                options.output_structure = field.text().await.ok().filter(|t| !t.is_empty())
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files were uploaded.");
    }

    info!("Analyzing {} uploaded files", uploads.len());

    let result = tokio::task::spawn_blocking(move || pipeline.process_uploads(&uploads, &options))
        .await;

    match result {
        Ok(Ok(result)) => Json(AnalyzeResponse { result }).into_response(),
        Ok(Err(e)) => {
            error!("Analysis failed: {}", e);
            error_response(status_for(&e), e.to_string())
        }
        Err(e) => {
            error!("Analysis task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Analysis task failed.")
        }
    }
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let origin: HeaderValue = args
        .allow_origin
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid CORS origin: {}", args.allow_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    let pipeline = Arc::new(tokio::task::spawn_blocking(move || build_pipeline(config)).await??);

    let app = router(Arc::clone(&pipeline), cors, args.max_upload_mb * 1024 * 1024);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!(
        "{} Listening on http://{}",
        style("✓").green(),
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    // The blocking HTTP client must not be dropped on a runtime thread.
    tokio::task::spawn_blocking(move || drop(pipeline)).await?;

    Ok(())
}
