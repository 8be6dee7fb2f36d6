//! `GET /usage` (§4.7): the caller's current quota-window standing.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::error::OrchestratorResult;
use crate::domains::identity::{window_expired, User};
use crate::server::app::AppState;
use crate::server::middleware::ExternalSubject;

/// Field names are the literal snake_case contract of §6.1's `/usage` row,
/// unlike the camelCase the other list/detail endpoints use.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub annual_limit: i32,
    pub annual_usage_count: i32,
    pub annual_period_start: Option<DateTime<Utc>>,
    pub remaining: i32,
}

pub async fn get_usage(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
) -> OrchestratorResult<Json<UsageResponse>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let usage_count = if window_expired(user.annual_period_start) { 0 } else { user.annual_usage_count };
    Ok(Json(UsageResponse {
        annual_limit: user.annual_limit,
        annual_usage_count: usage_count,
        annual_period_start: user.annual_period_start,
        remaining: (user.annual_limit - usage_count).max(0),
    }))
}
