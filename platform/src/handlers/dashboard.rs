// ============================================================================
// Module: platform/src/handlers/dashboard.rs
// Description: Dashboard Aggregator endpoints, spec §4.13
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, NaiveDate};
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::Result;
use serde::Deserialize;

use crate::models::{DashboardAlerts, DashboardBucket, DashboardMetric, DashboardSummary, TimeSeriesPoint};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/platform/dashboard/summary", get(summary))
        .route("/platform/dashboard/time-series", get(time_series))
        .route("/platform/dashboard/alerts", get(alerts))
        .with_state(state)
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
) -> Result<Json<DashboardSummary>> {
    Ok(Json(state.dashboard.summary(&ctx.tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    pub metric: DashboardMetric,
    pub bucket: DashboardBucket,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

async fn time_series(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Query(query): Query<TimeSeriesQuery>,
) -> Result<Json<Vec<TimeSeriesPoint>>> {
    Ok(Json(state.dashboard.time_series(&ctx.tenant, query.metric, query.bucket, query.from, query.to).await?))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default = "default_stale_hours")]
    pub stale_after_hours: i64,
}

fn default_stale_hours() -> i64 {
    48
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<DatabaseContext>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<DashboardAlerts>> {
    Ok(Json(state.dashboard.alerts(&ctx.tenant, Duration::hours(query.stale_after_hours)).await?))
}
