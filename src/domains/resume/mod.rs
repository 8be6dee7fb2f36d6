//! Résumé entity repository (§3, §4.2). Owns `CandidateSkill` children,
//! wholly replaced by a successful parse (invariant 3).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::entity_ids::{ResumeId, UserId};
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::status::ParseStatus;
use crate::kernel::event_bus::{DomainEvent, EventBus};
use crate::kernel::nlp_client::NlpSkill;

#[derive(Debug, Clone, FromRow)]
struct ResumeRow {
    id: ResumeId,
    user_id: UserId,
    filename: String,
    mime_type: String,
    storage_key: String,
    status: ParseStatus,
    parsed_summary: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resume {
    pub id: ResumeId,
    pub user_id: UserId,
    pub filename: String,
    pub mime_type: String,
    pub storage_key: String,
    pub status: ParseStatus,
    pub parsed_summary: Option<serde_json::Value>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ResumeRow> for Resume {
    fn from(row: ResumeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            filename: row.filename,
            mime_type: row.mime_type,
            storage_key: row.storage_key,
            status: row.status,
            parsed_summary: row
                .parsed_summary
                .and_then(|s| serde_json::from_str(&s).ok()),
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidateSkill {
    pub id: Uuid,
    pub resume_id: ResumeId,
    pub skill: String,
    pub experience_years: Option<f64>,
    pub proficiency: Option<String>,
}

const RESUME_COLUMNS: &str = "id, user_id, filename, mime_type, storage_key, status, \
     parsed_summary, is_deleted, created_at, updated_at";

impl Resume {
    /// Idempotent on primary key (§8 P4): a re-submit with the same id is a
    /// no-op that returns the original row.
    pub async fn create(
        pool: &PgPool,
        id: ResumeId,
        user_id: UserId,
        filename: &str,
        mime_type: &str,
        storage_key: &str,
    ) -> OrchestratorResult<Self> {
        let inserted = sqlx::query_as::<_, ResumeRow>(&format!(
            "INSERT INTO resumes (id, user_id, filename, mime_type, storage_key, status) \
             VALUES ($1, $2, $3, $4, $5, 'queued') \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {RESUME_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(filename)
        .bind(mime_type)
        .bind(storage_key)
        .fetch_optional(pool)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => sqlx::query_as::<_, ResumeRow>(&format!(
                "SELECT {RESUME_COLUMNS} FROM resumes WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(pool)
            .await?,
        };
        Ok(row.into())
    }

    /// Returns `None` if missing, owned by someone else, or soft-deleted —
    /// these collapse to the same outcome so callers can't distinguish them
    /// (§4.2 `NotOwned` folds into `NotFound`).
    pub async fn get_for_user(
        pool: &PgPool,
        id: ResumeId,
        user_id: UserId,
    ) -> OrchestratorResult<Option<(Self, Vec<CandidateSkill>)>> {
        let row = sqlx::query_as::<_, ResumeRow>(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes \
             WHERE id = $1 AND user_id = $2 AND is_deleted = false"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let skills = sqlx::query_as::<_, CandidateSkill>(
            "SELECT id, resume_id, skill, experience_years, proficiency \
             FROM candidate_skills WHERE resume_id = $1 ORDER BY skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some((row.into(), skills)))
    }

    /// Same fetch as `get_for_user` but without the ownership check — for
    /// job handlers, which only carry the entity id picked off a queued
    /// command, not the caller's identity.
    pub async fn get_for_user_unchecked(
        pool: &PgPool,
        id: ResumeId,
    ) -> OrchestratorResult<Option<(Self, Vec<CandidateSkill>)>> {
        let row = sqlx::query_as::<_, ResumeRow>(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE id = $1 AND is_deleted = false"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let skills = sqlx::query_as::<_, CandidateSkill>(
            "SELECT id, resume_id, skill, experience_years, proficiency \
             FROM candidate_skills WHERE resume_id = $1 ORDER BY skill ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(Some((row.into(), skills)))
    }

    pub async fn list_for_user(pool: &PgPool, user_id: UserId) -> OrchestratorResult<Vec<Self>> {
        let rows = sqlx::query_as::<_, ResumeRow>(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes \
             WHERE user_id = $1 AND is_deleted = false ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft delete is irreversible in the core (§3 invariant 5).
    pub async fn soft_delete(
        pool: &PgPool,
        id: ResumeId,
        user_id: UserId,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE resumes SET is_deleted = true, deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND is_deleted = false",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Writes the authoritative row, then emits `resume.status.changed` —
    /// emission happens only after a successful write, and only if the row
    /// still existed (a concurrent soft delete makes this a silent no-op
    /// per §5's suspension-point contract). The write is gated on
    /// `expected_prior` so a redelivered job that already completed can't
    /// drive the row backward (§8 P2): under at-least-once delivery a worker
    /// may be invoked twice for the same job, and the second run's earlier
    /// transitions must become no-ops instead of regressing `ready`/`error`
    /// back to `processing`.
    pub async fn update_status(
        pool: &PgPool,
        event_bus: &EventBus,
        id: ResumeId,
        expected_prior: ParseStatus,
        status: ParseStatus,
        parsed_summary: Option<&serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let summary_text = parsed_summary.map(|v| v.to_string());
        let result = sqlx::query(
            "UPDATE resumes SET status = $1, parsed_summary = COALESCE($2, parsed_summary), \
             updated_at = NOW() WHERE id = $3 AND is_deleted = false AND status = $4",
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
                DomainEvent::RESUME_STATUS_CHANGED,
                id.into_uuid(),
                status.as_str(),
            ));
        }
        Ok(updated)
    }

    /// Delete-then-insert, deliberately not wrapped in one transaction: a
    /// reader racing between the two statements may observe an empty set,
    /// which is safe because completion also flips `status` to `ready`
    /// after this call returns (§4.2, §9).
    pub async fn replace_candidate_skills(
        pool: &PgPool,
        resume_id: ResumeId,
        skills: &[NlpSkill],
    ) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM candidate_skills WHERE resume_id = $1")
            .bind(resume_id)
            .execute(pool)
            .await?;

        for skill in skills {
            sqlx::query(
                "INSERT INTO candidate_skills (resume_id, skill, experience_years, proficiency) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(resume_id)
            .bind(&skill.skill)
            .bind(skill.experience_years)
            .bind(&skill.proficiency)
            .execute(pool)
            .await?;
        }
        Ok(())
    }
}

pub fn not_ready_error(status: ParseStatus) -> OrchestratorError {
    let _ = status;
    OrchestratorError::PreconditionFailed { code: "resume_not_ready" }
}
