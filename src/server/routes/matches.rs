//! `POST/GET /matches`, `GET /matches/:id` (§6.1, §4.7).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::entity_ids::{JobDescriptionId, MatchJobId, ResumeId};
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::identity::User;
use crate::domains::job::{self, JobDescription};
use crate::domains::matching::{MatchJob, MatchResult, QuotaEnforcer};
use crate::domains::resume::{self, Resume};
use crate::domains::status::{MatchJobStatus, ParseStatus};
use crate::domains::workers::ComputeMatchCommand;
use crate::server::app::AppState;
use crate::server::middleware::ExternalSubject;

/// A non-standard, undocumented header a trusted upstream billing proxy
/// sets for callers on the paid tier. Kept as a literal header check rather
/// than promoted to a user-table column (§9 open question).
const PRO_MEMBER_HEADER: &str = "x-pro-member";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    pub resume_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchListItem {
    pub id: MatchJobId,
    pub resume_id: ResumeId,
    pub job_id: JobDescriptionId,
    pub status: MatchJobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MatchJob> for MatchListItem {
    fn from(m: MatchJob) -> Self {
        Self {
            id: m.id,
            resume_id: m.resume_id,
            job_id: m.job_id,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultDto {
    pub score: f64,
    pub summary: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetail {
    pub id: MatchJobId,
    pub resume_id: ResumeId,
    pub job_id: JobDescriptionId,
    pub status: MatchJobStatus,
    pub error: Option<String>,
    #[serde(rename = "match")]
    pub match_result: Option<MatchResultDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn is_privileged(headers: &HeaderMap) -> bool {
    headers.get(PRO_MEMBER_HEADER).and_then(|v| v.to_str().ok()) == Some("1")
}

pub async fn create_match(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    headers: HeaderMap,
    Json(body): Json<CreateMatchRequest>,
) -> OrchestratorResult<(StatusCode, Json<MatchDetail>)> {
    let pool = &state.deps.db_pool;
    let user = User::ensure(pool, &subject, None).await?;

    let (resume_id, job_id) = match (body.resume_id, body.job_id) {
        (Some(r), Some(j)) => (ResumeId::from_uuid(r), JobDescriptionId::from_uuid(j)),
        _ => return Err(OrchestratorError::InvalidInput { field: "resumeId_and_jobId" }),
    };

    let resume = Resume::get_for_user(pool, resume_id, user.id)
        .await?
        .ok_or(OrchestratorError::NamedNotFound { code: "resume_not_found" })?
        .0;
    let job_desc = JobDescription::get_for_user(pool, job_id, user.id)
        .await?
        .ok_or(OrchestratorError::NamedNotFound { code: "job_not_found" })?
        .0;

    if resume.status != ParseStatus::Ready {
        return Err(resume::not_ready_error(resume.status));
    }
    if job_desc.status != ParseStatus::Ready {
        return Err(job::not_ready_error());
    }

    QuotaEnforcer::enforce(pool, &user, is_privileged(&headers)).await?;

    let match_job_id = MatchJobId::new();
    let match_job = MatchJob::create(pool, match_job_id, user.id, resume_id, job_id).await?;

    state
        .deps
        .job_queue
        .enqueue(&ComputeMatchCommand { match_job_id })
        .await
        .map_err(OrchestratorError::Upstream)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MatchDetail {
            id: match_job.id,
            resume_id: match_job.resume_id,
            job_id: match_job.job_id,
            status: match_job.status,
            error: match_job.error_message,
            match_result: None,
            created_at: match_job.created_at,
            updated_at: match_job.updated_at,
        }),
    ))
}

pub async fn list_matches(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
) -> OrchestratorResult<Json<Vec<MatchListItem>>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let matches = MatchJob::list_for_user(&state.deps.db_pool, user.id).await?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

pub async fn get_match(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    Path(id): Path<Uuid>,
) -> OrchestratorResult<Json<MatchDetail>> {
    let pool = &state.deps.db_pool;
    let user = User::ensure(pool, &subject, None).await?;
    let match_job = MatchJob::get_for_user(pool, MatchJobId::from_uuid(id), user.id)
        .await?
        .ok_or(OrchestratorError::NamedNotFound { code: "match_not_found" })?;

    let match_result = match match_job.result_id {
        Some(result_id) => MatchResult::get_by_id(pool, result_id)
            .await?
            .map(|r| MatchResultDto { score: r.score, summary: r.summary }),
        None => None,
    };

    Ok(Json(MatchDetail {
        id: match_job.id,
        resume_id: match_job.resume_id,
        job_id: match_job.job_id,
        status: match_job.status,
        error: match_job.error_message,
        match_result,
        created_at: match_job.created_at,
        updated_at: match_job.updated_at,
    }))
}
