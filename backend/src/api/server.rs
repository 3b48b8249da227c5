//! HTTP server for the KPI report API.
//!
//! # API Endpoints
//!
//! | Method | Path           | Description                                  |
//! |--------|----------------|----------------------------------------------|
//! | GET    | `/health`      | Health check                                 |
//! | GET    | `/api/kpis`    | KPI catalog in use                           |
//! | POST   | `/api/report`  | Upload spreadsheet, download report file     |
//! | POST   | `/api/preview` | Upload spreadsheet, JSON summary + first rows|
//! | GET    | `/api/logs`    | SSE stream of pipeline logs                  |
//!
//! Upload endpoints take `multipart/form-data` with a `file` part and optional
//! text parts: `preset`, `level`, `granularity`, `hour`, `sheet`, `all_sheets`,
//! `format`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, KpiListResponse, PreviewResponse};
use crate::config::ServerConfig;
use crate::error::PipelineError;
use crate::export::{export, ExportFormat};
use crate::kpi::KpiCatalog;
use crate::parser::SheetSelection;
use crate::transform::pipeline::{build_report_from_bytes, load_catalog, Preset, ReportOptions, ReportOutput};

type ApiError = (StatusCode, Json<Value>);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<KpiCatalog>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(catalog: KpiCatalog, config: ServerConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/kpis", get(list_kpis))
        .route("/api/report", post(download_report))
        .route("/api/preview", post(preview_report))
        .route("/api/logs", get(sse_logs))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(config.catalog_path.as_deref())?;
    let port = config.port;

    println!("🚀 KPI report server running on http://localhost:{}", port);
    println!("   POST /api/report  - Upload spreadsheet, download report");
    println!("   POST /api/preview - Upload spreadsheet, JSON preview");
    println!("   GET  /api/kpis    - KPI catalog ({} KPIs)", catalog.len());
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();

    let app = router(AppState::new(catalog, config));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kpireport",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "report": "POST /api/report",
            "preview": "POST /api/preview",
            "kpis": "GET /api/kpis",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn list_kpis(State(state): State<AppState>) -> Json<KpiListResponse> {
    Json(KpiListResponse::from(state.catalog.as_ref()))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(LOG_BROADCASTER.subscribe()).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // Lagged receiver: drop the gap
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn download_report(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let request = read_upload(multipart).await?;
    let format = request.format;
    let (output, bytes) = run_pipeline(&state, request, move |output| {
        export(&output.report, format).map_err(PipelineError::from)
    })
    .await?;

    let headers = [
        (header::CONTENT_TYPE, format.mime_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", output.file_name(format)),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn preview_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>, ApiError> {
    let request = read_upload(multipart).await?;
    let format = request.format;
    let preview_rows = state.config.preview_rows;
    let (_, preview) = run_pipeline(&state, request, move |output| {
        Ok(PreviewResponse::from_output(output, format, preview_rows))
    })
    .await?;

    Ok(Json(preview))
}

// =============================================================================
// Upload handling
// =============================================================================

/// A parsed multipart upload
struct UploadRequest {
    bytes: Vec<u8>,
    file_name: Option<String>,
    options: ReportOptions,
    format: ExportFormat,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Read error: {}", e)))?;
            file_data = Some(data.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| bad_request(format!("Read error in field '{}': {}", name, e)))?;
            fields.insert(name, value);
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;
    let (options, format) = options_from_fields(&fields).map_err(bad_request)?;

    Ok(UploadRequest {
        bytes,
        file_name,
        options,
        format,
    })
}

/// Form fields to report options. A preset is applied first, explicit fields override it.
fn options_from_fields(fields: &HashMap<String, String>) -> Result<(ReportOptions, ExportFormat), String> {
    let field = |name: &str| fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    let mut options = match field("preset") {
        Some(p) => ReportOptions::preset(p.parse::<Preset>()?),
        None => ReportOptions::default(),
    };

    if let Some(level) = field("level") {
        options.level = level.parse()?;
    }
    if let Some(granularity) = field("granularity") {
        options.granularity = granularity.parse()?;
    }
    if let Some(hour) = field("hour") {
        options.hour = match hour.to_lowercase().as_str() {
            "all" | "none" => None,
            h => Some(
                h.parse::<u8>()
                    .ok()
                    .filter(|h| *h <= 23)
                    .ok_or_else(|| format!("hour must be between 0 and 23, got '{}'", hour))?,
            ),
        };
    }

    let all_sheets = field("all_sheets").is_some_and(|v| matches!(v, "1" | "true" | "on" | "yes"));
    options.sheet = match (all_sheets, field("sheet")) {
        (true, _) => SheetSelection::All,
        (false, Some(name)) => SheetSelection::Named(name.to_string()),
        (false, None) => SheetSelection::First,
    };

    let format = match field("format") {
        Some(f) => f.parse()?,
        None => ExportFormat::default(),
    };

    Ok((options, format))
}

/// Run the blocking pipeline off the async runtime, then `finish` on its output.
async fn run_pipeline<T, F>(state: &AppState, request: UploadRequest, finish: F) -> Result<(ReportOutput, T), ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ReportOutput) -> Result<T, PipelineError> + Send + 'static,
{
    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        request.file_name.as_deref().unwrap_or("unknown"),
        request.bytes.len()
    ));

    let catalog = Arc::clone(&state.catalog);
    let result = tokio::task::spawn_blocking(move || {
        let output = build_report_from_bytes(
            &request.bytes,
            request.file_name.as_deref(),
            &request.options,
            &catalog,
        )?;
        let extra = finish(&output)?;
        Ok::<_, PipelineError>((output, extra))
    })
    .await
    .map_err(|e| {
        log_error(format!("Worker failed: {}", e));
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response("Report worker failed")),
        )
    })?;

    result.map_err(pipeline_error)
}

fn bad_request(message: impl Into<String>) -> ApiError {
    let message: String = message.into();
    (StatusCode::BAD_REQUEST, Json(error_response(&message)))
}

fn pipeline_error(err: PipelineError) -> ApiError {
    log_error(err.to_string());
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(error_response(&err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExportError, KpiError};
    use crate::models::{Granularity, ReportLevel};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "kpireport-test-boundary";
    const UPLOAD: &[u8] = b"Period start time;RNC name;WBTS name;CS Traffic\n2025-01-15 00:00;RNC01;SITE_A;1\n";

    /// Multipart body with text fields and an optional `file` part.
    fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(uri: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(multipart(fields, file)))
            .unwrap()
    }

    async fn send(request: Request<Body>) -> Response {
        let app = router(AppState::new(KpiCatalog::default(), ServerConfig::default()));
        app.oneshot(request).await.unwrap()
    }

    fn header_value(response: &Response, name: header::HeaderName) -> String {
        response.headers()[name].to_str().unwrap().to_string()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_report_download_csv() {
        let response = send(upload("/api/report", &[], Some(("raw.csv", UPLOAD)))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, header::CONTENT_TYPE), "text/csv");
        assert_eq!(
            header_value(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"3G_Day_Site_Level_KPIs_output.csv\""
        );

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert_eq!(body.lines().next(), Some("RNC name,WBTS name,KPI NAME,2025-01-15"));
    }

    #[tokio::test]
    async fn test_report_download_xlsx_hourly() {
        let response = send(upload(
            "/api/report",
            &[("granularity", "hour"), ("format", "xlsx")],
            Some(("raw.csv", UPLOAD)),
        ))
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_value(&response, header::CONTENT_TYPE),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(
            header_value(&response, header::CONTENT_DISPOSITION),
            "attachment; filename=\"3G_Hour_Site_Level_KPIs_output.xlsx\""
        );
        assert!(body_bytes(response).await.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_report_without_file_is_bad_request() {
        let response = send(upload("/api/report", &[("preset", "bbh")], None)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_report_missing_key_column_is_bad_request() {
        let csv: &[u8] = b"Period start time;RNC name;CS Traffic\n2025-01-15 00:00;RNC01;1\n";
        let response = send(upload("/api/report", &[], Some(("raw.csv", csv)))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().contains("WBTS name"), "{}", body);
    }

    #[tokio::test]
    async fn test_report_invalid_option_is_bad_request() {
        let response = send(upload("/api/report", &[("hour", "25")], Some(("raw.csv", UPLOAD)))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_preview_returns_header_and_rows() {
        let response = send(upload("/api/preview", &[], Some(("raw.csv", UPLOAD)))).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["fileName"], "3G_Day_Site_Level_KPIs_output.csv");
        assert_eq!(body["header"][2], "KPI NAME");
        assert!(!body["rows"].as_array().unwrap().is_empty());
        assert_eq!(body["metadata"]["input"]["rowCount"], 1);
    }

    #[tokio::test]
    async fn test_kpi_list() {
        let request = Request::builder().uri("/api/kpis").body(Body::empty()).unwrap();
        let response = send(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["kpis"].as_array().unwrap().len(), 14);
    }

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_fields() {
        let (options, format) = options_from_fields(&fields(&[])).unwrap();
        assert_eq!(options, ReportOptions::default());
        assert_eq!(format, ExportFormat::Csv);
    }

    #[test]
    fn test_preset_then_overrides() {
        let (options, format) = options_from_fields(&fields(&[
            ("preset", "continue"),
            ("granularity", "hour"),
            ("hour", "7"),
            ("format", "xlsx"),
        ]))
        .unwrap();

        assert_eq!(options.level, ReportLevel::Cell);
        assert_eq!(options.granularity, Granularity::Hour);
        assert_eq!(options.hour, Some(7));
        assert_eq!(format, ExportFormat::Xlsx);
    }

    #[test]
    fn test_hour_all_clears_preset_filter() {
        let (options, _) = options_from_fields(&fields(&[("preset", "continue"), ("hour", "all")])).unwrap();
        assert_eq!(options.hour, None);

        let (options, _) = options_from_fields(&fields(&[("preset", "continue"), ("hour", " ")])).unwrap();
        assert_eq!(options.hour, Some(0));
    }

    #[test]
    fn test_sheet_selection_fields() {
        let (options, _) = options_from_fields(&fields(&[("sheet", "BBH")])).unwrap();
        assert_eq!(options.sheet, SheetSelection::Named("BBH".into()));

        let (options, _) = options_from_fields(&fields(&[("sheet", "BBH"), ("all_sheets", "true")])).unwrap();
        assert_eq!(options.sheet, SheetSelection::All);
    }

    #[test]
    fn test_invalid_fields_rejected() {
        for pairs in [
            [("preset", "weekly")],
            [("level", "rnc")],
            [("granularity", "month")],
            [("hour", "24")],
            [("format", "pdf")],
        ] {
            assert!(options_from_fields(&fields(&pairs)).is_err(), "{:?}", pairs);
        }
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = pipeline_error(PipelineError::Kpi(KpiError::MissingColumns {
            columns: vec!["WBTS name".into()],
        }));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["status"], "error");

        let (status, _) = pipeline_error(PipelineError::Export(ExportError::InvalidReport("x".into())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
