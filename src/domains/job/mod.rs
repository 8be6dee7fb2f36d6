//! Job-description entity repository (§3, §4.2). Owns `Requirement` and
//! `SoftSkill` children, wholly replaced by a successful parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::entity_ids::{JobDescriptionId, UserId};
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::status::ParseStatus;
use crate::kernel::event_bus::{DomainEvent, EventBus};
use crate::kernel::nlp_client::{NlpRequirement, NlpSoftSkill};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    File,
    Text,
}

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: JobDescriptionId,
    user_id: UserId,
    title: String,
    source: JobSource,
    filename: Option<String>,
    mime_type: String,
    storage_key: Option<String>,
    raw_text: Option<String>,
    status: ParseStatus,
    parsed_summary: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobDescription {
    pub id: JobDescriptionId,
    pub user_id: UserId,
    pub title: String,
    pub source: JobSource,
    pub filename: Option<String>,
    pub mime_type: String,
    pub storage_key: Option<String>,
    pub raw_text: Option<String>,
    pub status: ParseStatus,
    pub parsed_summary: Option<serde_json::Value>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRow> for JobDescription {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            source: row.source,
            filename: row.filename,
            mime_type: row.mime_type,
            storage_key: row.storage_key,
            raw_text: row.raw_text,
            status: row.status,
            parsed_summary: row.parsed_summary.and_then(|s| serde_json::from_str(&s).ok()),
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Requirement {
    pub id: Uuid,
    pub job_id: JobDescriptionId,
    pub skill: String,
    pub importance: f64,
    pub inferred: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SoftSkill {
    pub id: Uuid,
    pub job_id: JobDescriptionId,
    pub skill: String,
    pub value: String,
}

const JOB_COLUMNS: &str = "id, user_id, title, source, filename, mime_type, storage_key, \
     raw_text, status, parsed_summary, is_deleted, created_at, updated_at";

/// Create arguments distinguishing the two ingestion branches of §6.1
/// `POST /jobs`.
pub enum NewJob<'a> {
    File { filename: &'a str, mime_type: &'a str, storage_key: &'a str },
    Text { raw_text: &'a str },
}

impl JobDescription {
    pub async fn create(
        pool: &PgPool,
        id: JobDescriptionId,
        user_id: UserId,
        title: &str,
        payload: NewJob<'_>,
    ) -> OrchestratorResult<Self> {
        let (source, filename, mime_type, storage_key, raw_text) = match payload {
            NewJob::File { filename, mime_type, storage_key } => {
                (JobSource::File, Some(filename), mime_type, Some(storage_key), None)
            }
            NewJob::Text { raw_text } => (JobSource::Text, None, "text/plain", None, Some(raw_text)),
        };

        let inserted = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO job_descriptions \
                 (id, user_id, title, source, filename, mime_type, storage_key, raw_text, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'queued') \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(source)
        .bind(filename)
        .bind(mime_type)
        .bind(storage_key)
        .bind(raw_text)
        .fetch_optional(pool)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => sqlx::query_as::<_, JobRow>(&format!(
                "SELECT {JOB_COLUMNS} FROM job_descriptions WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(pool)
            .await?,
        };
        Ok(row.into())
    }

    pub async fn get_for_user(
        pool: &PgPool,
        id: JobDescriptionId,
        user_id: UserId,
    ) -> OrchestratorResult<Option<(Self, Vec<Requirement>, Vec<SoftSkill>)>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM job_descriptions \
             WHERE id = $1 AND user_id = $2 AND is_deleted = false"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let requirements = sqlx::query_as::<_, Requirement>(
            "SELECT id, job_id, skill, importance, inferred FROM requirements \
             WHERE job_id = $1 ORDER BY importance DESC, skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        let soft_skills = sqlx::query_as::<_, SoftSkill>(
            "SELECT id, job_id, skill, value FROM job_soft_skills \
             WHERE job_id = $1 ORDER BY skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some((row.into(), requirements, soft_skills)))
    }

    /// Same fetch as `get_for_user` but without the ownership check — for
    /// job handlers, which only carry the entity id picked off a queued
    /// command, not the caller's identity.
    pub async fn get_for_user_unchecked(
        pool: &PgPool,
        id: JobDescriptionId,
    ) -> OrchestratorResult<Option<(Self, Vec<Requirement>, Vec<SoftSkill>)>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM job_descriptions WHERE id = $1 AND is_deleted = false"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let requirements = sqlx::query_as::<_, Requirement>(
            "SELECT id, job_id, skill, importance, inferred FROM requirements \
             WHERE job_id = $1 ORDER BY importance DESC, skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        let soft_skills = sqlx::query_as::<_, SoftSkill>(
            "SELECT id, job_id, skill, value FROM job_soft_skills \
             WHERE job_id = $1 ORDER BY skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some((row.into(), requirements, soft_skills)))
    }

    pub async fn list_for_user(pool: &PgPool, user_id: UserId) -> OrchestratorResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM job_descriptions \
             WHERE user_id = $1 AND is_deleted = false ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn soft_delete(
        pool: &PgPool,
        id: JobDescriptionId,
        user_id: UserId,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE job_descriptions SET is_deleted = true, deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND is_deleted = false",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Gated on `expected_prior` for the same reason as
    /// `Resume::update_status` (§8 P2): a redelivered `parse_job` run must
    /// not be able to push the row backward.
    pub async fn update_status(
        pool: &PgPool,
        event_bus: &EventBus,
        id: JobDescriptionId,
        expected_prior: ParseStatus,
        status: ParseStatus,
        parsed_summary: Option<&serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let summary_text = parsed_summary.map(|v| v.to_string());
        let result = sqlx::query(
            "UPDATE job_descriptions SET status = $1, \
             parsed_summary = COALESCE($2, parsed_summary), updated_at = NOW() \
             WHERE id = $3 AND is_deleted = false AND status = $4",
        )
        .bind(status)
        .bind(summary_text)
        .bind(id)
        .bind(expected_prior)
        .execute(pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            event_bus.publish(DomainEvent::new(
                DomainEvent::JOB_STATUS_CHANGED,
                id.into_uuid(),
                status.as_str(),
            ));
        }
        Ok(updated)
    }

    pub async fn replace_requirements(
        pool: &PgPool,
        job_id: JobDescriptionId,
        requirements: &[NlpRequirement],
    ) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM requirements WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;

        for requirement in requirements {
            sqlx::query(
                "INSERT INTO requirements (job_id, skill, importance, inferred) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(job_id)
            .bind(&requirement.skill)
            .bind(requirement.importance.clamp(0.0, 1.0))
            .bind(requirement.inferred)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    pub async fn replace_soft_skills(
        pool: &PgPool,
        job_id: JobDescriptionId,
        soft_skills: &[NlpSoftSkill],
    ) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM job_soft_skills WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;

        for soft_skill in soft_skills {
            sqlx::query("INSERT INTO job_soft_skills (job_id, skill, value) VALUES ($1, $2, $3)")
                .bind(job_id)
                .bind(&soft_skill.skill)
                .bind(&soft_skill.value)
                .execute(pool)
                .await?;
        }
        Ok(())
    }
}

pub fn not_ready_error() -> OrchestratorError {
    OrchestratorError::PreconditionFailed { code: "job_not_ready" }
}
