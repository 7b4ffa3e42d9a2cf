use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::classify::TickReport;
use crate::monitor::{ApplyError, Monitor};
use crate::poll::PollState;
use crate::settings::order::MoveDirection;
use crate::settings::{Settings, SettingsDraft};
use crate::variables::ComparisonRule;
use crate::version::VersionAdvisory;

#[derive(Clone)]
pub struct ApiState {
    monitor: Arc<Monitor>,
    latest: watch::Receiver<Option<TickReport>>,
    version: watch::Receiver<Option<VersionAdvisory>>,
    running_version: String,
}

impl ApiState {
    pub fn new(
        monitor: Arc<Monitor>,
        latest: watch::Receiver<Option<TickReport>>,
        version: watch::Receiver<Option<VersionAdvisory>>,
        running_version: impl Into<String>,
    ) -> Self {
        Self {
            monitor,
            latest,
            version,
            running_version: running_version.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl From<ApplyError> for ApiError {
    fn from(error: ApplyError) -> Self {
        match error {
            ApplyError::Invalid(error) => Self::bad_request(error.to_string()),
            ApplyError::Persist(error) => Self::internal(format!("{error:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    polling: PollState,
    waiting: bool,
    headline: String,
    report: Option<TickReport>,
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    settings: Settings,
    poll_interval_recommended: bool,
}

#[derive(Debug, Serialize)]
struct VariableEntry {
    position: usize,
    id: String,
    display_prefix: String,
    setting_label: String,
    rule: ComparisonRule,
    selected: bool,
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    id: String,
    direction: MoveDirection,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    running: String,
    advisory: Option<VersionAdvisory>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/settings", get(show_settings).post(update_settings))
        .route("/v1/variables", get(variables))
        .route("/v1/variables/move", post(move_variable))
        .route("/v1/version", get(version))
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(state: ApiState, bind: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("control API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

async fn health(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: state.running_version,
    })
}

async fn status(State(state): State<ApiState>) -> Json<ApiResponse<StatusResponse>> {
    let report = state.latest.borrow().clone();
    let headline = match &report {
        Some(report) => report.system.headline(),
        None => "Waiting for first poll".to_string(),
    };
    ok(StatusResponse {
        polling: state.monitor.state(),
        waiting: report.is_none(),
        headline,
        report,
    })
}

fn settings_response(settings: &Settings) -> SettingsResponse {
    SettingsResponse {
        poll_interval_recommended: settings.poll_interval_is_recommended(),
        settings: settings.clone(),
    }
}

async fn show_settings(State(state): State<ApiState>) -> Json<ApiResponse<SettingsResponse>> {
    ok(settings_response(&state.monitor.settings()))
}

async fn update_settings(
    State(state): State<ApiState>,
    Json(draft): Json<SettingsDraft>,
) -> ApiResult<SettingsResponse> {
    if draft.is_empty() {
        return Err(ApiError::bad_request("no settings fields provided"));
    }
    let saved = state.monitor.apply(draft).map_err(|error| {
        warn!("settings update rejected: {error}");
        ApiError::from(error)
    })?;
    Ok(ok(settings_response(&saved)))
}

fn variable_entries(monitor: &Monitor) -> Vec<VariableEntry> {
    let settings = monitor.settings();
    let registry = monitor.registry();
    settings
        .variable_display_order
        .iter()
        .filter_map(|id| registry.by_id(id))
        .enumerate()
        .map(|(idx, variable)| VariableEntry {
            position: idx + 1,
            selected: settings.selected_variable_ids.contains(&variable.id),
            id: variable.id.clone(),
            display_prefix: variable.display_prefix.clone(),
            setting_label: variable.setting_label.clone(),
            rule: variable.rule,
        })
        .collect()
}

async fn variables(State(state): State<ApiState>) -> Json<ApiResponse<Vec<VariableEntry>>> {
    ok(variable_entries(&state.monitor))
}

async fn move_variable(
    State(state): State<ApiState>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Vec<VariableEntry>> {
    if !state.monitor.registry().contains(&request.id) {
        return Err(ApiError::bad_request(format!(
            "unknown variable id: {}",
            request.id
        )));
    }
    state
        .monitor
        .move_variable(&request.id, request.direction)
        .map_err(ApiError::from)?;
    Ok(ok(variable_entries(&state.monitor)))
}

async fn version(State(state): State<ApiState>) -> Json<ApiResponse<VersionResponse>> {
    let advisory = state.version.borrow().clone();
    ok(VersionResponse {
        running: state.running_version,
        advisory,
    })
}
