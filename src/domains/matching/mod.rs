//! Match entity repositories, the quota gate, and the match-summary builder
//! (§3, §4.4, §4.7).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::common::entity_ids::{JobDescriptionId, MatchJobId, MatchResultId, ResumeId, UserId};
use crate::common::error::{OrchestratorError, OrchestratorResult};
use crate::domains::identity::{window_expired, User};
use crate::domains::resume::CandidateSkill;
use crate::domains::status::MatchJobStatus;
use crate::kernel::event_bus::{DomainEvent, EventBus};
use crate::kernel::nlp_client::MatchResponse;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchJob {
    pub id: MatchJobId,
    pub user_id: UserId,
    pub resume_id: ResumeId,
    pub job_id: JobDescriptionId,
    pub status: MatchJobStatus,
    pub error_message: Option<String>,
    pub result_id: Option<MatchResultId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct MatchResultRow {
    id: MatchResultId,
    user_id: UserId,
    resume_id: ResumeId,
    job_id: JobDescriptionId,
    score: f64,
    summary: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub id: MatchResultId,
    pub user_id: UserId,
    pub resume_id: ResumeId,
    pub job_id: JobDescriptionId,
    pub score: f64,
    pub summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<MatchResultRow> for MatchResult {
    fn from(row: MatchResultRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            resume_id: row.resume_id,
            job_id: row.job_id,
            score: row.score,
            summary: serde_json::from_str(&row.summary).unwrap_or(serde_json::Value::Null),
            created_at: row.created_at,
        }
    }
}

const MATCH_JOB_COLUMNS: &str = "id, user_id, resume_id, job_id, status, error_message, \
     result_id, created_at, updated_at";

impl MatchJob {
    pub async fn create(
        pool: &PgPool,
        id: MatchJobId,
        user_id: UserId,
        resume_id: ResumeId,
        job_id: JobDescriptionId,
    ) -> OrchestratorResult<Self> {
        let inserted = sqlx::query_as::<_, Self>(&format!(
            "INSERT INTO match_jobs (id, user_id, resume_id, job_id, status) \
             VALUES ($1, $2, $3, $4, 'queued') \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {MATCH_JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(resume_id)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

        match inserted {
            Some(row) => Ok(row),
            None => Ok(sqlx::query_as::<_, Self>(&format!(
                "SELECT {MATCH_JOB_COLUMNS} FROM match_jobs WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(pool)
            .await?),
        }
    }

    pub async fn get_for_user(
        pool: &PgPool,
        id: MatchJobId,
        user_id: UserId,
    ) -> OrchestratorResult<Option<Self>> {
        Ok(sqlx::query_as::<_, Self>(&format!(
            "SELECT {MATCH_JOB_COLUMNS} FROM match_jobs WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
    }

    pub async fn list_for_user(pool: &PgPool, user_id: UserId) -> OrchestratorResult<Vec<Self>> {
        Ok(sqlx::query_as::<_, Self>(&format!(
            "SELECT {MATCH_JOB_COLUMNS} FROM match_jobs WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?)
    }

    pub async fn mark_running(
        pool: &PgPool,
        event_bus: &EventBus,
        id: MatchJobId,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE match_jobs SET status = 'running', updated_at = NOW() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        let updated = result.rows_affected() > 0;
        if updated {
            event_bus.publish(DomainEvent::new(
                DomainEvent::MATCH_STATUS_CHANGED,
                id.into_uuid(),
                MatchJobStatus::Running.as_str(),
            ));
        }
        Ok(updated)
    }

    /// `resultId` is non-null iff `status = completed` (§3 invariant 4):
    /// both columns are written in the same statement.
    pub async fn mark_completed(
        pool: &PgPool,
        event_bus: &EventBus,
        id: MatchJobId,
        result_id: MatchResultId,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE match_jobs SET status = 'completed', result_id = $1, updated_at = NOW() \
             WHERE id = $2 AND status = 'running'",
        )
        .bind(result_id)
        .bind(id)
        .execute(pool)
        .await?;
        let updated = result.rows_affected() > 0;
        if updated {
            event_bus.publish(DomainEvent::new(
                DomainEvent::MATCH_STATUS_CHANGED,
                id.into_uuid(),
                MatchJobStatus::Completed.as_str(),
            ));
        }
        Ok(updated)
    }

    pub async fn mark_failed(
        pool: &PgPool,
        event_bus: &EventBus,
        id: MatchJobId,
        error_message: &str,
    ) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE match_jobs SET status = 'failed', error_message = $1, updated_at = NOW() \
             WHERE id = $2 AND status = 'running'",
        )
        .bind(error_message)
        .bind(id)
        .execute(pool)
        .await?;
        let updated = result.rows_affected() > 0;
        if updated {
            event_bus.publish(DomainEvent::new(
                DomainEvent::MATCH_STATUS_CHANGED,
                id.into_uuid(),
                MatchJobStatus::Failed.as_str(),
            ));
        }
        Ok(updated)
    }
}

impl MatchResult {
    pub async fn get_by_id(pool: &PgPool, id: MatchResultId) -> OrchestratorResult<Option<Self>> {
        let row = sqlx::query_as::<_, MatchResultRow>(
            "SELECT id, user_id, resume_id, job_id, score, summary, created_at \
             FROM matches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn create(
        pool: &PgPool,
        user_id: UserId,
        resume_id: ResumeId,
        job_id: JobDescriptionId,
        score: f64,
        summary: &serde_json::Value,
    ) -> OrchestratorResult<Self> {
        let row = sqlx::query_as::<_, MatchResultRow>(
            "INSERT INTO matches (user_id, resume_id, job_id, score, summary) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, resume_id, job_id, score, summary, created_at",
        )
        .bind(user_id)
        .bind(resume_id)
        .bind(job_id)
        .bind(score.clamp(0.0, 1.0))
        .bind(summary.to_string())
        .fetch_one(pool)
        .await?;
        Ok(row.into())
    }
}

/// Quota Enforcer (§4.7): the only gate in front of match creation.
pub struct QuotaEnforcer;

impl QuotaEnforcer {
    /// Non-privileged callers are refused with `QuotaExceeded` once
    /// `annual_usage_count >= annual_limit` inside a still-open window;
    /// otherwise the usage counter is incremented (§3 invariant 6).
    pub async fn enforce(
        pool: &PgPool,
        user: &User,
        is_privileged: bool,
    ) -> OrchestratorResult<()> {
        if is_privileged {
            return Ok(());
        }

        if !window_expired(user.annual_period_start) && user.annual_usage_count >= user.annual_limit
        {
            return Err(OrchestratorError::QuotaExceeded);
        }

        crate::domains::identity::User::increment_annual_usage(pool, user.id).await?;
        Ok(())
    }
}

/// Pure builder for the §4.4 "Match summary contract" (§8 P7). Kept free of
/// I/O so it is unit-testable without a database.
pub fn build_match_summary(
    nlp: &MatchResponse,
    candidate_skills: &[CandidateSkill],
    requirements: &[crate::domains::job::Requirement],
    resume_profile: &serde_json::Value,
) -> serde_json::Value {
    let mut skills: Vec<String> = candidate_skills.iter().map(|s| s.skill.clone()).collect();
    skills.sort();
    skills.dedup();

    let experience_years = resume_profile
        .get("experience_years")
        .cloned()
        .unwrap_or_else(|| {
            candidate_skills
                .iter()
                .filter_map(|s| s.experience_years)
                .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))))
                .map(|v| serde_json::json!(v))
                .unwrap_or(serde_json::Value::Null)
        });

    let candidate = serde_json::json!({
        "name": resume_profile.get("name").cloned().unwrap_or(serde_json::Value::Null),
        "skills": skills,
        "experience_years": experience_years,
        "degrees": resume_profile.get("degrees").cloned().unwrap_or(serde_json::Value::Array(vec![])),
        "certifications": resume_profile.get("certifications").cloned().unwrap_or(serde_json::Value::Array(vec![])),
        "summary": resume_profile.get("summary").cloned().unwrap_or(serde_json::Value::Null),
    });

    let details: Vec<serde_json::Value> = nlp
        .summary
        .details
        .iter()
        .map(|d| {
            let matched = d.similarity >= 0.5;
            let comment = match (matched, &d.matched_skill) {
                (true, Some(skill)) => {
                    format!("Matched via {skill} (similarity {:.2})", d.similarity)
                }
                (true, None) => format!("Matched with similarity {:.2}", d.similarity),
                (false, _) => "No close match found".to_string(),
            };
            serde_json::json!({
                "requirement": d.requirement,
                "similarity": d.similarity,
                "matched": matched,
                "matched_skill": d.matched_skill,
                "comment": comment,
            })
        })
        .collect();

    let strengths: Vec<String> = nlp
        .summary
        .details
        .iter()
        .filter(|d| d.similarity >= 0.5)
        .map(|d| format!("{} (similarity {:.2})", d.requirement, d.similarity))
        .collect();

    let weaknesses: Vec<String> = nlp
        .summary
        .details
        .iter()
        .filter(|d| d.similarity < 0.5)
        .filter_map(|d| {
            requirements
                .iter()
                .find(|r| r.skill == d.requirement)
                .map(|r| format!("{} (importance {:.2})", r.skill, r.importance))
        })
        .collect();

    let overall_match_score = nlp.score.or(nlp.summary.overall_match_score).unwrap_or(0.0);

    serde_json::json!({
        "overall_match_score": overall_match_score,
        "candidate": candidate,
        "details": details,
        "strengths": strengths,
        "weaknesses": weaknesses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::nlp_client::{MatchDetail, MatchSummaryResponse};

    fn candidate_skill(skill: &str) -> CandidateSkill {
        CandidateSkill {
            id: uuid::Uuid::new_v4(),
            resume_id: ResumeId::new(),
            skill: skill.to_string(),
            experience_years: Some(3.0),
            proficiency: None,
        }
    }

    fn requirement(skill: &str, importance: f64) -> crate::domains::job::Requirement {
        crate::domains::job::Requirement {
            id: uuid::Uuid::new_v4(),
            job_id: JobDescriptionId::new(),
            skill: skill.to_string(),
            importance,
            inferred: false,
        }
    }

    #[test]
    fn comment_uses_three_case_template() {
        let nlp = MatchResponse {
            score: Some(0.8),
            summary: MatchSummaryResponse {
                details: vec![
                    MatchDetail { requirement: "python".into(), similarity: 0.9, matched_skill: Some("Python".into()) },
                    MatchDetail { requirement: "sql".into(), similarity: 0.6, matched_skill: None },
                    MatchDetail { requirement: "rust".into(), similarity: 0.1, matched_skill: None },
                ],
                strengths: vec![],
                gaps: vec![],
                overall_match_score: None,
            },
        };
        let skills = vec![candidate_skill("python")];
        let requirements = vec![requirement("python", 0.9), requirement("sql", 0.5), requirement("rust", 0.8)];
        let summary = build_match_summary(&nlp, &skills, &requirements, &serde_json::json!({}));

        let details = summary["details"].as_array().unwrap();
        assert_eq!(details[0]["comment"], "Matched via Python (similarity 0.90)");
        assert_eq!(details[1]["comment"], "Matched with similarity 0.60");
        assert_eq!(details[2]["comment"], "No close match found");
        assert_eq!(summary["overall_match_score"], 0.8);
    }

    #[test]
    fn strengths_and_weaknesses_partition_by_similarity_threshold() {
        let nlp = MatchResponse {
            score: None,
            summary: MatchSummaryResponse {
                details: vec![
                    MatchDetail { requirement: "python".into(), similarity: 0.7, matched_skill: None },
                    MatchDetail { requirement: "rust".into(), similarity: 0.2, matched_skill: None },
                ],
                strengths: vec![],
                gaps: vec![],
                overall_match_score: Some(0.5),
            },
        };
        let requirements = vec![requirement("python", 0.9), requirement("rust", 0.4)];
        let summary = build_match_summary(&nlp, &[], &requirements, &serde_json::json!({}));

        assert_eq!(summary["strengths"], serde_json::json!(["python (similarity 0.70)"]));
        assert_eq!(summary["weaknesses"], serde_json::json!(["rust (importance 0.40)"]));
    }

    #[test]
    fn candidate_skills_are_deduped_and_sorted() {
        let nlp = MatchResponse {
            score: Some(0.1),
            summary: MatchSummaryResponse { details: vec![], strengths: vec![], gaps: vec![], overall_match_score: None },
        };
        let skills = vec![candidate_skill("zebra"), candidate_skill("apple"), candidate_skill("apple")];
        let summary = build_match_summary(&nlp, &skills, &[], &serde_json::json!({}));
        assert_eq!(summary["candidate"]["skills"], serde_json::json!(["apple", "zebra"]));
    }
}
