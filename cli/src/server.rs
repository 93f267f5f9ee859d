use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use larder_core::PlanError;
use larder_core::export::{ExportFormat, render_grocery};
use larder_core::grid::GridDay;
use larder_core::models::{MealPlanEntry, MealSlot, PlannedMeal, Recipe, parse_date};
use larder_core::range::{DateRange, ViewMode};
use larder_core::service::Planner;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    planner: Arc<Planner>,
    /// Bearer token to owner id. `None` disables auth and serves `owner_id`.
    tokens: Option<Arc<HashMap<String, i64>>>,
    owner_id: i64,
}

/// Owner the current request acts for, set by [`require_auth`].
#[derive(Clone, Copy)]
struct Owner(i64);

// --- Request / Response types ---

#[derive(Deserialize)]
struct PlanQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    anchor: Option<String>,
    view: Option<String>,
    format: Option<String>,
}

impl PlanQuery {
    /// `start_date`/`end_date` when either is given, otherwise the week or
    /// month around `anchor` (default: today).
    fn range(&self) -> Result<DateRange, PlanError> {
        if self.start_date.is_some() || self.end_date.is_some() {
            let start = required_date("start_date", self.start_date.as_deref())?;
            let end = required_date("end_date", self.end_date.as_deref())?;
            return DateRange::new(start, end);
        }
        let view: ViewMode = match self.view.as_deref() {
            Some(v) => v.parse()?,
            None => ViewMode::Week,
        };
        let anchor = match self.anchor.as_deref() {
            Some(a) => parse_date("anchor", a)?,
            None => Local::now().date_naive(),
        };
        DateRange::resolve(anchor, view)
    }
}

fn required_date(field: &'static str, value: Option<&str>) -> Result<chrono::NaiveDate, PlanError> {
    let value = value.ok_or_else(|| PlanError::validation(field, "is required"))?;
    parse_date(field, value)
}

#[derive(Deserialize)]
struct ScheduleRequest {
    recipe_id: i64,
    date: String,
    slot: String,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct ReassignRequest {
    recipe_id: i64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    /// A renderer failed; the message is safe to show.
    Export(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Export(msg) => {
                error!("Export failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Validation { .. } => Self::BadRequest(err.to_string()),
            PlanError::NotFound(_) | PlanError::InvalidReference(_) => {
                Self::NotFound(err.to_string())
            }
            PlanError::Forbidden(msg) => Self::Forbidden(msg),
            PlanError::Export { .. } => Self::Export(err.to_string()),
            PlanError::Storage(e) => Self::Internal(e.into()),
            PlanError::Internal(e) => Self::Internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let owner = match &state.tokens {
        None => Some(state.owner_id),
        Some(tokens) => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| tokens.get(token).copied()),
    };

    let Some(owner) = owner else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or missing API key".to_string(),
            }),
        )
            .into_response();
    };
    request.extensions_mut().insert(Owner(owner));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

fn attachment(format: ExportFormat, body: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", format.file_name());
    (
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

// --- Handlers ---

async fn list_meal_plans(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<Vec<PlannedMeal>>, ApiError> {
    let range = query.range()?;
    let meals = state.planner.list_planned(owner, range).await?;
    Ok(Json(meals))
}

async fn schedule_meal(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<MealPlanEntry>), ApiError> {
    let date = parse_date("date", &req.date)?;
    let slot: MealSlot = req.slot.parse()?;

    let scheduled = state
        .planner
        .schedule(owner, date, slot, req.recipe_id, req.notes)
        .await?;

    let status = if scheduled.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(scheduled.entry)))
}

async fn reassign_meal(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<i64>,
    Json(req): Json<ReassignRequest>,
) -> Result<Json<MealPlanEntry>, ApiError> {
    let entry = state.planner.reassign(owner, id, req.recipe_id).await?;
    Ok(Json(entry))
}

async fn delete_meal_plan(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.planner.unschedule(owner, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn meal_plan_grid(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<Vec<GridDay>>, ApiError> {
    let range = query.range()?;
    Ok(Json(state.planner.grid(owner, range).await?))
}

async fn export_ical(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<PlanQuery>,
) -> Result<Response, ApiError> {
    let range = query.range()?;
    let calendar = state.planner.export_ical(owner, range).await?;
    Ok(attachment(ExportFormat::Ics, calendar.into_bytes()))
}

/// The list is computed inside the request future; a client that goes away
/// drops the in-flight recipe lookups with it.
async fn grocery_list(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Query(query): Query<PlanQuery>,
) -> Result<Response, ApiError> {
    let range = query.range()?;
    let format: ExportFormat = match query.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::Json,
    };
    if format == ExportFormat::Ics {
        return Err(ApiError::BadRequest(
            "Invalid format: ics is only available from /api/meal-plans/export-ical".to_string(),
        ));
    }

    let list = state.planner.grocery_list(owner, range).await?;
    if !list.warnings.is_empty() {
        warn!(
            owner_id = owner,
            skipped = list.warnings.len(),
            "grocery list built with unresolved recipes"
        );
    }

    if format == ExportFormat::Json {
        return Ok(Json(list).into_response());
    }
    let body = render_grocery(&list, format)?;
    Ok(attachment(format, body))
}

async fn list_recipes(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    Ok(Json(state.planner.list_catalog(owner)?))
}

async fn get_recipe(
    State(state): State<AppState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    Ok(Json(state.planner.visible_recipe(owner, id).await?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/meal-plans",
            get(list_meal_plans).post(schedule_meal),
        )
        .route("/api/meal-plans/grid", get(meal_plan_grid))
        .route("/api/meal-plans/export-ical", get(export_ical))
        .route(
            "/api/meal-plans/{id}",
            put(reassign_meal).delete(delete_meal_plan),
        )
        .route("/api/grocery-list", get(grocery_list))
        .route("/api/recipes", get(list_recipes))
        .route("/api/recipes/{id}", get(get_recipe))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    planner: Arc<Planner>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    owner_id: i64,
) -> anyhow::Result<()> {
    let tokens = api_key
        .as_ref()
        .map(|key| Arc::new(HashMap::from([(key.clone(), owner_id)])));
    let app = build_router(AppState {
        planner,
        tokens,
        owner_id,
    });

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!(%bind, port, owner_id, "listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
