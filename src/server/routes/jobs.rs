//! `POST/GET /jobs`, `GET/DELETE /jobs/:id` (§6.1, §6.4).

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::entity_ids::JobDescriptionId;
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::identity::User;
use crate::domains::job::{JobDescription, JobSource, NewJob, Requirement, SoftSkill};
use crate::domains::status::ParseStatus;
use crate::domains::workers::ParseJobCommand;
use crate::server::app::AppState;
use crate::server::middleware::ExternalSubject;
use crate::server::validation::{derive_extension, is_allowed_mime, is_json_content_type, read_field_capped};

/// Body shape for the JSON form of `POST /jobs` (§6.1 scenario 2):
/// `multipart/form-data` is still accepted for file uploads, but a plain
/// `{title, text}` body must also produce a `202`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobJson {
    title: String,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    pub id: JobDescriptionId,
    pub title: String,
    pub source: JobSource,
    pub status: ParseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobDescription> for JobListItem {
    fn from(j: JobDescription) -> Self {
        Self {
            id: j.id,
            title: j.title,
            source: j.source,
            status: j.status,
            created_at: j.created_at,
            updated_at: j.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementDto {
    pub skill: String,
    pub importance: f64,
    pub inferred: bool,
}

impl From<Requirement> for RequirementDto {
    fn from(r: Requirement) -> Self {
        Self { skill: r.skill, importance: r.importance, inferred: r.inferred }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftSkillDto {
    pub skill: String,
    pub value: String,
}

impl From<SoftSkill> for SoftSkillDto {
    fn from(s: SoftSkill) -> Self {
        Self { skill: s.skill, value: s.value }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub id: JobDescriptionId,
    pub title: String,
    pub source: JobSource,
    pub status: ParseStatus,
    pub raw_text: Option<String>,
    pub parsed_data: Option<serde_json::Value>,
    pub requirements: Vec<RequirementDto>,
    pub soft_skills: Vec<SoftSkillDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<(JobDescription, Vec<Requirement>, Vec<SoftSkill>)> for JobDetail {
    fn from((j, requirements, soft_skills): (JobDescription, Vec<Requirement>, Vec<SoftSkill>)) -> Self {
        Self {
            id: j.id,
            title: j.title,
            source: j.source,
            status: j.status,
            raw_text: j.raw_text,
            parsed_data: j.parsed_summary,
            requirements: requirements.into_iter().map(Into::into).collect(),
            soft_skills: soft_skills.into_iter().map(Into::into).collect(),
            created_at: j.created_at,
            updated_at: j.updated_at,
        }
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    request: Request,
) -> OrchestratorResult<(StatusCode, Json<JobDetail>)> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;

    let mut title: Option<String> = None;
    let mut text: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    if is_json_content_type(request.headers()) {
        let Json(body) = Json::<CreateJobJson>::from_request(request, &state)
            .await
            .map_err(|_| OrchestratorError::InvalidInput { field: "body" })?;
        title = Some(body.title);
        text = Some(body.text);
    } else {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|_| OrchestratorError::InvalidInput { field: "body" })?;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| OrchestratorError::Upstream(anyhow::anyhow!(e)))?
        {
            match field.name() {
                Some("title") => {
                    title =
                        Some(field.text().await.map_err(|e| OrchestratorError::Upstream(anyhow::anyhow!(e)))?);
                }
                Some("text") => {
                    text = Some(field.text().await.map_err(|e| OrchestratorError::Upstream(anyhow::anyhow!(e)))?);
                }
                Some("file") => {
                    filename = field.file_name().map(|s| s.to_string());
                    mime_type = field.content_type().map(|s| s.to_string());
                    bytes = Some(read_field_capped(&mut field).await?);
                }
                _ => {}
            }
        }
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or(OrchestratorError::InvalidInput { field: "title" })?;

    let id = JobDescriptionId::new();
    let job = if let Some(bytes) = bytes {
        let mime_type = mime_type.unwrap_or_else(|| "application/octet-stream".to_string());
        if !is_allowed_mime(&mime_type) {
            return Err(OrchestratorError::UnsupportedMediaType);
        }
        let filename = filename.unwrap_or_else(|| "job".to_string());
        let ext = derive_extension(Some(&filename), &mime_type);
        let storage_key = format!("jobs/{id}{ext}");

        state
            .deps
            .object_storage
            .put_object(&storage_key, bytes, &mime_type)
            .await
            .map_err(OrchestratorError::Upstream)?;

        JobDescription::create(
            &state.deps.db_pool,
            id,
            user.id,
            &title,
            NewJob::File { filename: &filename, mime_type: &mime_type, storage_key: &storage_key },
        )
        .await?
    } else if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        JobDescription::create(&state.deps.db_pool, id, user.id, &title, NewJob::Text { raw_text: &text })
            .await?
    } else {
        return Err(OrchestratorError::InvalidInput { field: "file_or_text" });
    };

    state
        .deps
        .job_queue
        .enqueue(&ParseJobCommand { job_id: id })
        .await
        .map_err(OrchestratorError::Upstream)?;

    Ok((StatusCode::ACCEPTED, Json(JobDetail::from((job, vec![], vec![])))))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
) -> OrchestratorResult<Json<Vec<JobListItem>>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let jobs = JobDescription::list_for_user(&state.deps.db_pool, user.id).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    Path(id): Path<Uuid>,
) -> OrchestratorResult<Json<JobDetail>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let found =
        JobDescription::get_for_user(&state.deps.db_pool, JobDescriptionId::from_uuid(id), user.id).await?;
    let detail = found.ok_or(OrchestratorError::NamedNotFound { code: "job_not_found" })?;
    Ok(Json(JobDetail::from(detail)))
}

pub async fn delete_job(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    Path(id): Path<Uuid>,
) -> OrchestratorResult<StatusCode> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let deleted =
        JobDescription::soft_delete(&state.deps.db_pool, JobDescriptionId::from_uuid(id), user.id).await?;
    if !deleted {
        return Err(OrchestratorError::NamedNotFound { code: "job_not_found" });
    }
    Ok(StatusCode::NO_CONTENT)
}
