use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use common::models::{
    AggregatedHistoricalPoint, AggregatedVolume, BackfillReport, ExchangeVolumeInfo, Platform,
};
use common::Error as CommonError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::ApiConfig;
use crate::service::AggregationService;

pub struct AppState {
    pub service: AggregationService,
    pub config: ApiConfig,
}

type SharedState = Arc<AppState>;

// Wrapper so common::Error can cross the axum boundary
pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            CommonError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            CommonError::Parameter(msg) => (StatusCode::BAD_REQUEST, msg),
            CommonError::Parse(msg) => (StatusCode::BAD_GATEWAY, msg),
            CommonError::Auth(msg) => (StatusCode::BAD_GATEWAY, msg),
            CommonError::RateLimited(msg) => (StatusCode::BAD_GATEWAY, msg),
            CommonError::Upstream { status, message } => (
                StatusCode::BAD_GATEWAY,
                format!("upstream API error ({}): {}", status, message),
            ),
            CommonError::Http(e) => (
                StatusCode::BAD_GATEWAY,
                format!("External API request failed: {}", e),
            ),
            CommonError::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            CommonError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            CommonError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// Current aggregated 24h volume across all platforms
pub async fn get_current_volume(
    State(state): State<SharedState>,
) -> Result<Json<AggregatedVolume>, ApiError> {
    let aggregate = state.service.current_aggregate().await?;
    Ok(Json(aggregate))
}

// Current 24h volume for one platform
pub async fn get_current_platform_volume(
    State(state): State<SharedState>,
    Path(platform): Path<String>,
) -> Result<Json<ExchangeVolumeInfo>, ApiError> {
    let platform: Platform = platform.parse()?;
    let info = state.service.current_for_platform(platform).await?;
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// Aggregated historical daily volume for a date range
pub async fn get_historical_volume(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AggregatedHistoricalPoint>>, ApiError> {
    debug!("historical volume requested for {}..{}", query.start, query.end);
    let points = state
        .service
        .historical_aggregate(query.start, query.end)
        .await?;
    Ok(Json(points))
}

#[derive(Debug, Deserialize)]
pub struct BackfillQuery {
    pub platform: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

// Trigger a historical backfill for one platform or all of them.
// Defaults to the configured trailing window ending yesterday.
pub async fn trigger_backfill(
    State(state): State<SharedState>,
    Query(query): Query<BackfillQuery>,
) -> Result<Json<Vec<BackfillReport>>, ApiError> {
    let platform = match query.platform.as_deref() {
        Some(raw) => Some(raw.parse::<Platform>()?),
        None => None,
    };
    let end = query
        .end
        .unwrap_or_else(|| (Utc::now() - ChronoDuration::days(1)).date_naive());
    let start = query
        .start
        .unwrap_or_else(|| end - ChronoDuration::days(state.config.historical_fetch_days));

    let reports = state
        .service
        .fetch_and_store_historical(platform, start, end)
        .await?;
    Ok(Json(reports))
}
