// Regional Statistics Reconciler - Web Server
// JSON API for the dashboard; every request is one fresh pipeline run

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use regional_stats::{
    DashboardReport, DataLoadError, EnrichedObservation, PipelineError, Reconciler, ReconcilerConfig,
    SelectionError, Selections,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regional-stats-server", about = "Dashboard JSON API", version)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state (configuration only, no cached data)
#[derive(Clone)]
struct AppState {
    reconciler: Arc<Reconciler>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Raw `?year=&category=` parameters, as an HTML form sends them
#[derive(Debug, Default, Deserialize)]
struct SelectionQuery {
    year: Option<String>,
    category: Option<String>,
}

impl SelectionQuery {
    /// Empty fields mean "use the default selection"
    fn parse(self) -> Result<(Option<i32>, Option<String>), SelectionError> {
        let year = match self.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .map_err(|_| SelectionError::InvalidYear(raw.to_string()))?,
            ),
            None => None,
        };
        let category = self.category.filter(|c| !c.trim().is_empty());

        Ok((year, category))
    }
}

#[derive(Serialize)]
struct RegionResponse {
    region_name: String,
    observations: Vec<EnrichedObservation>,
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Load(DataLoadError::MissingFile { .. }) => StatusCode::NOT_FOUND,
        PipelineError::Load(DataLoadError::MalformedInput { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Selection(SelectionError::UnknownRegion(_)) => StatusCode::NOT_FOUND,
        PipelineError::Selection(_) => StatusCode::BAD_REQUEST,
    }
}

fn error_response(err: PipelineError) -> Response {
    tracing::error!(error = %err, "request failed");
    (status_for(&err), Json(ApiResponse::<()>::err(err.to_string()))).into_response()
}

/// Run one pipeline invocation off the async runtime
async fn run_blocking<T, F>(state: &AppState, job: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Reconciler) -> Result<T, PipelineError> + Send + 'static,
{
    let reconciler = Arc::clone(&state.reconciler);

    match tokio::task::spawn_blocking(move || job(&*reconciler)).await {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_err) => {
            tracing::error!(error = %join_err, "pipeline task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::err("internal error".to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/selections - Available years and categories
async fn get_selections(State(state): State<AppState>) -> Response {
    run_blocking(&state, |reconciler| -> Result<Selections, PipelineError> {
        Ok(reconciler.load_snapshot()?.selections())
    })
    .await
}

/// GET /api/dashboard?year=&category= - Full dashboard report
async fn get_dashboard(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Response {
    let (year, category) = match query.parse() {
        Ok(parsed) => parsed,
        Err(err) => return error_response(err.into()),
    };

    run_blocking(&state, move |reconciler| -> Result<DashboardReport, PipelineError> {
        reconciler.run(year, category.as_deref())
    })
    .await
}

/// GET /api/map?year=&category= - Joined boundaries as GeoJSON
async fn get_map(State(state): State<AppState>, Query(query): Query<SelectionQuery>) -> Response {
    let (year, category) = match query.parse() {
        Ok(parsed) => parsed,
        Err(err) => return error_response(err.into()),
    };

    run_blocking(&state, move |reconciler| -> Result<serde_json::Value, PipelineError> {
        let snapshot = reconciler.load_snapshot()?;
        let selection = snapshot.resolve_selection(year, category.as_deref())?;
        Ok(reconciler.map_geojson(&snapshot, &selection))
    })
    .await
}

/// GET /api/regions/:name - All observations of one region
async fn get_region(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    // Decode URL-encoded region name
    let decoded_name = urlencoding::decode(&name)
        .unwrap_or_else(|_| name.clone().into())
        .into_owned();

    run_blocking(&state, move |reconciler| -> Result<RegionResponse, PipelineError> {
        let snapshot = reconciler.load_snapshot()?;
        let canonical = reconciler.config().aliases.resolve(&decoded_name).to_string();
        let observations = snapshot.region_history(&canonical);

        if observations.is_empty() {
            return Err(SelectionError::UnknownRegion(canonical).into());
        }

        Ok(RegionResponse {
            region_name: canonical,
            observations,
        })
    })
    .await
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🌐 Regional Statistics Reconciler - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ReconcilerConfig::from_file(path)?,
        None => ReconcilerConfig::default(),
    };
    println!("✓ Data: {}", config.data_path.display());
    println!("✓ Boundaries: {}", config.boundary_archive_path.display());

    let state = AppState {
        reconciler: Arc::new(Reconciler::new(config)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/selections", get(get_selections))
        .route("/dashboard", get(get_dashboard))
        .route("/map", get(get_map))
        .route("/regions/:name", get(get_region))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API: http://{}/api/dashboard", args.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    fn query(uri: &str) -> SelectionQuery {
        let uri: Uri = uri.parse().unwrap();
        Query::<SelectionQuery>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn test_empty_form_fields_select_defaults() {
        let parsed = query("/api/dashboard?year=&category=").parse().unwrap();
        assert_eq!(parsed, (None, None));

        let parsed = query("/api/map").parse().unwrap();
        assert_eq!(parsed, (None, None));
    }

    #[test]
    fn test_explicit_selection() {
        let parsed = query("/api/dashboard?year=2021&category=%EC%B4%9D%EC%9D%B8%EA%B5%AC%EC%88%98")
            .parse()
            .unwrap();
        assert_eq!(parsed, (Some(2021), Some("총인구수".to_string())));
    }

    #[test]
    fn test_bad_year_is_bad_request() {
        let err = query("/api/dashboard?year=twenty").parse().unwrap_err();
        assert_eq!(err, SelectionError::InvalidYear("twenty".to_string()));
        assert_eq!(status_for(&PipelineError::from(err)), StatusCode::BAD_REQUEST);
    }
}
