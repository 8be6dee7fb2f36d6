//! `POST/GET /resumes`, `GET/DELETE /resumes/:id` (§6.1, §6.4).

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::common::entity_ids::ResumeId;
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::identity::User;
use crate::domains::resume::Resume;
use crate::domains::status::ParseStatus;
use crate::domains::workers::ParseResumeCommand;
use crate::server::app::AppState;
use crate::server::middleware::ExternalSubject;
use crate::server::validation::{derive_extension, is_allowed_mime, read_field_capped};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeListItem {
    pub id: ResumeId,
    pub filename: String,
    pub mime_type: String,
    pub status: ParseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Resume> for ResumeListItem {
    fn from(r: Resume) -> Self {
        Self {
            id: r.id,
            filename: r.filename,
            mime_type: r.mime_type,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSkillDto {
    pub skill: String,
    pub experience_years: Option<f64>,
    pub proficiency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeDetail {
    pub id: ResumeId,
    pub filename: String,
    pub mime_type: String,
    pub status: ParseStatus,
    pub parsed_data: Option<serde_json::Value>,
    pub skills: Vec<CandidateSkillDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<(Resume, Vec<crate::domains::resume::CandidateSkill>)> for ResumeDetail {
    fn from((r, skills): (Resume, Vec<crate::domains::resume::CandidateSkill>)) -> Self {
        Self {
            id: r.id,
            filename: r.filename,
            mime_type: r.mime_type,
            status: r.status,
            parsed_data: r.parsed_summary,
            skills: skills
                .into_iter()
                .map(|s| CandidateSkillDto {
                    skill: s.skill,
                    experience_years: s.experience_years,
                    proficiency: s.proficiency,
                })
                .collect(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub async fn create_resume(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    mut multipart: Multipart,
) -> OrchestratorResult<(StatusCode, Json<ResumeDetail>)> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;

    let mut filename: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| OrchestratorError::Upstream(anyhow::anyhow!(e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            mime_type = field.content_type().map(|s| s.to_string());
            bytes = Some(read_field_capped(&mut field).await?);
        }
    }

    let bytes = bytes.ok_or(OrchestratorError::InvalidInput { field: "file" })?;
    let mime_type = mime_type.unwrap_or_else(|| "application/octet-stream".to_string());
    if !is_allowed_mime(&mime_type) {
        return Err(OrchestratorError::UnsupportedMediaType);
    }
    let filename = filename.unwrap_or_else(|| "resume".to_string());

    let id = ResumeId::new();
    let ext = derive_extension(Some(&filename), &mime_type);
    let storage_key = format!("resumes/{id}{ext}");

    state
        .deps
        .object_storage
        .put_object(&storage_key, bytes, &mime_type)
        .await
        .map_err(OrchestratorError::Upstream)?;

    let resume = Resume::create(&state.deps.db_pool, id, user.id, &filename, &mime_type, &storage_key)
        .await?;

    state
        .deps
        .job_queue
        .enqueue(&ParseResumeCommand { resume_id: id })
        .await
        .map_err(OrchestratorError::Upstream)?;

    Ok((StatusCode::ACCEPTED, Json(ResumeDetail::from((resume, vec![])))))
}

pub async fn list_resumes(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
) -> OrchestratorResult<Json<Vec<ResumeListItem>>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let resumes = Resume::list_for_user(&state.deps.db_pool, user.id).await?;
    Ok(Json(resumes.into_iter().map(Into::into).collect()))
}

pub async fn get_resume(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    Path(id): Path<Uuid>,
) -> OrchestratorResult<Json<ResumeDetail>> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let found = Resume::get_for_user(&state.deps.db_pool, ResumeId::from_uuid(id), user.id).await?;
    let (resume, skills) =
        found.ok_or(OrchestratorError::NamedNotFound { code: "resume_not_found" })?;
    Ok(Json(ResumeDetail::from((resume, skills))))
}

pub async fn delete_resume(
    State(state): State<AppState>,
    axum::extract::Extension(ExternalSubject(subject)): axum::extract::Extension<ExternalSubject>,
    Path(id): Path<Uuid>,
) -> OrchestratorResult<StatusCode> {
    let user = User::ensure(&state.deps.db_pool, &subject, None).await?;
    let deleted = Resume::soft_delete(&state.deps.db_pool, ResumeId::from_uuid(id), user.id).await?;
    if !deleted {
        return Err(OrchestratorError::NamedNotFound { code: "resume_not_found" });
    }
    Ok(StatusCode::NO_CONTENT)
}
