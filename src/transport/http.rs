//! HTTP transport: an upload form and a small JSON API.
//!
//! Routes:
//! - `GET /` upload form
//! - `GET /api/databases` configured databases
//! - `POST /api/databases` add a database for the lifetime of the process
//! - `POST /api/query` multipart `database`, `sql`, `file`; responds with the xlsx

use crate::error::{AppError, AppResult};
use crate::models::AddDatabaseRequest;
use crate::service::{QueryReport, QueryService};
use crate::transport::Transport;
use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const ROW_COUNT_HEADER: &str = "x-row-count";
pub const CHUNK_COUNT_HEADER: &str = "x-chunk-count";

const INDEX_HTML: &str = include_str!("index.html");

/// HTTP transport serving the upload form and API.
pub struct HttpTransport {
    service: Arc<QueryService>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(service: Arc<QueryService>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build the application router.
pub fn router(service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/databases", get(list_databases).post(add_database))
        .route("/api/query", post(run_query))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

impl Transport for HttpTransport {
    async fn run(&self) -> AppResult<()> {
        let bind_addr = self.bind_addr();
        let app = router(self.service.clone());

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            AppError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        info!("Serving upload form on http://{}", bind_addr);

        // A request stuck on a slow database may hold the server open; force
        // exit once this elapses after the first signal.
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(AppError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for running queries to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn list_databases(State(service): State<Arc<QueryService>>) -> Response {
    Json(service.registry().list().await).into_response()
}

async fn add_database(
    State(service): State<Arc<QueryService>>,
    payload: Result<Json<AddDatabaseRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::configuration(format!("Invalid request body: {}", e.body_text())))?;
    let summary = service.registry().add(request).await?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

/// Fields of the query form.
#[derive(Debug, Default)]
struct QueryForm {
    database: Option<String>,
    sql: Option<String>,
    file: Option<Vec<u8>>,
}

impl QueryForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("database") => form.database = Some(field.text().await.map_err(multipart_error)?),
                Some("sql") => form.sql = Some(field.text().await.map_err(multipart_error)?),
                Some("file") => form.file = Some(field.bytes().await.map_err(multipart_error)?.to_vec()),
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_parts(self) -> AppResult<(String, String, Vec<u8>)> {
        let database = self
            .database
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| AppError::input("Select a database"))?;
        let sql = self.sql.unwrap_or_default();
        let file = self
            .file
            .filter(|f| !f.is_empty())
            .ok_or_else(|| AppError::input("Upload an .xlsx file with a SERVICENAME column"))?;
        Ok((database, sql, file))
    }
}

async fn run_query(
    State(service): State<Arc<QueryService>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (database, sql, file) = QueryForm::read(multipart).await?.into_parts()?;
    match service.run(database.trim(), &sql, &file).await {
        Ok(report) => Ok(download(report)),
        Err(e) => {
            warn!(database = %database, code = e.code(), error = %e, "Query failed");
            Err(e)
        }
    }
}

/// Turn a report into an attachment response.
fn download(report: QueryReport) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, report.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report.file_name),
            ),
            (
                HeaderName::from_static(ROW_COUNT_HEADER),
                report.row_count.to_string(),
            ),
            (
                HeaderName::from_static(CHUNK_COUNT_HEADER),
                report.chunk_count.to_string(),
            ),
        ],
        report.bytes,
    )
        .into_response()
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::input(format!("Invalid form upload: {}", err.body_text()))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
