//! The three worker algorithms of §4.4: `parseResume`, `parseJob`, and
//! `computeMatch`. Each handler owns one job's full lifecycle — claim is the
//! queue's job, everything from here down is domain logic.

use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::entity_ids::{JobDescriptionId, MatchJobId, ResumeId};
use crate::domains::job::JobDescription;
use crate::domains::matching::{build_match_summary, MatchJob, MatchResult};
use crate::domains::resume::Resume;
use crate::domains::status::ParseStatus;
use crate::kernel::deps::AppDeps;
use crate::kernel::jobs::CommandMeta;
use crate::kernel::nlp_client::{
    MatchCandidateSkill, MatchRequest, MatchRequirement, ParseJobRequest, ParseResumeRequest,
};

pub const PARSE_RESUME: &str = "parse_resume";
pub const PARSE_JOB: &str = "parse_job";
pub const COMPUTE_MATCH: &str = "compute_match";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResumeCommand {
    pub resume_id: ResumeId,
}

impl CommandMeta for ParseResumeCommand {
    fn command_type(&self) -> &'static str {
        PARSE_RESUME
    }

    fn reference_id(&self) -> Option<Uuid> {
        Some(self.resume_id.into_uuid())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseJobCommand {
    pub job_id: JobDescriptionId,
}

impl CommandMeta for ParseJobCommand {
    fn command_type(&self) -> &'static str {
        PARSE_JOB
    }

    fn reference_id(&self) -> Option<Uuid> {
        Some(self.job_id.into_uuid())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeMatchCommand {
    pub match_job_id: MatchJobId,
}

impl CommandMeta for ComputeMatchCommand {
    fn command_type(&self) -> &'static str {
        COMPUTE_MATCH
    }

    fn reference_id(&self) -> Option<Uuid> {
        Some(self.match_job_id.into_uuid())
    }

    fn max_retries(&self) -> i32 {
        5
    }
}

/// §4.4 worker 1: fetch the stored résumé bytes, call the NLP collaborator,
/// replace the candidate's skills, and flip status to `ready`. Any failure
/// after `processing` is entered writes `error` before the error is
/// rethrown, so the row never stalls mid-flight.
pub async fn parse_resume(cmd: ParseResumeCommand, deps: Arc<AppDeps>) -> anyhow::Result<()> {
    let (resume, _) = Resume::get_for_user_unchecked(&deps.db_pool, cmd.resume_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("resume not found: {}", cmd.resume_id))?;

    Resume::update_status(
        &deps.db_pool,
        &deps.event_bus,
        cmd.resume_id,
        ParseStatus::Queued,
        ParseStatus::Processing,
        None,
    )
    .await?;

    let outcome: anyhow::Result<_> = async {
        let bytes = deps.object_storage.get_object_bytes(&resume.storage_key).await?;
        let request = ParseResumeRequest::new(&resume.filename, &resume.mime_type, &bytes);
        deps.nlp_client.parse_resume(request).await
    }
    .await;

    match outcome {
        Ok(parsed) => {
            Resume::replace_candidate_skills(&deps.db_pool, cmd.resume_id, &parsed.skills).await?;
            let summary = serde_json::json!({
                "sections": parsed.sections,
                "profile": parsed.profile,
                "statistics": parsed.statistics,
            });
            Resume::update_status(
                &deps.db_pool,
                &deps.event_bus,
                cmd.resume_id,
                ParseStatus::Processing,
                ParseStatus::Ready,
                Some(&summary),
            )
            .await?;
            Ok(())
        }
        Err(e) => {
            Resume::update_status(
                &deps.db_pool,
                &deps.event_bus,
                cmd.resume_id,
                ParseStatus::Processing,
                ParseStatus::Error,
                None,
            )
            .await?;
            Err(e)
        }
    }
}

/// §4.4 worker 2: mirrors `parse_resume` but branches on `source` (file vs
/// inline text) when building the NLP request.
pub async fn parse_job(cmd: ParseJobCommand, deps: Arc<AppDeps>) -> anyhow::Result<()> {
    let (job, _, _) = JobDescription::get_for_user_unchecked(&deps.db_pool, cmd.job_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("job description not found: {}", cmd.job_id))?;

    JobDescription::update_status(
        &deps.db_pool,
        &deps.event_bus,
        cmd.job_id,
        ParseStatus::Queued,
        ParseStatus::Processing,
        None,
    )
    .await?;

    let outcome: anyhow::Result<_> = async {
        let request = match job.source {
            crate::domains::job::JobSource::File => {
                let storage_key = job
                    .storage_key
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("file-sourced job missing storage_key"))?;
                let bytes = deps.object_storage.get_object_bytes(storage_key).await?;
                ParseJobRequest::File {
                    filename: job.filename.clone().unwrap_or_default(),
                    mime_type: job.mime_type.clone(),
                    content_b64: base64::engine::general_purpose::STANDARD.encode(&bytes),
                }
            }
            crate::domains::job::JobSource::Text => {
                let raw_text = job
                    .raw_text
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("text-sourced job missing raw_text"))?;
                ParseJobRequest::Text { text: raw_text }
            }
        };
        deps.nlp_client.parse_job(request).await
    }
    .await;

    match outcome {
        Ok(parsed) => {
            JobDescription::replace_requirements(&deps.db_pool, cmd.job_id, &parsed.requirements)
                .await?;
            if let Some(soft_skills) = &parsed.soft_skills {
                JobDescription::replace_soft_skills(&deps.db_pool, cmd.job_id, soft_skills).await?;
            }
            let summary = serde_json::json!({
                "highlights": parsed.highlights,
                "summary": parsed.summary,
                "onet": parsed.onet,
            });
            JobDescription::update_status(
                &deps.db_pool,
                &deps.event_bus,
                cmd.job_id,
                ParseStatus::Processing,
                ParseStatus::Ready,
                Some(&summary),
            )
            .await?;
            Ok(())
        }
        Err(e) => {
            JobDescription::update_status(
                &deps.db_pool,
                &deps.event_bus,
                cmd.job_id,
                ParseStatus::Processing,
                ParseStatus::Error,
                None,
            )
            .await?;
            Err(e)
        }
    }
}

/// §4.4 worker 3: both parents must already be `ready` (enforced by the
/// controller before enqueue — a worker-side re-check would race against a
/// soft delete, so it isn't attempted here). On success, writes `matches`
/// then flips `match_jobs` to `completed` with the resulting `result_id`
/// (§3 invariant 4); on failure, `failed` with `error_message`.
pub async fn compute_match(cmd: ComputeMatchCommand, deps: Arc<AppDeps>) -> anyhow::Result<()> {
    let match_job = sqlx::query_as::<_, MatchJob>(
        "SELECT id, user_id, resume_id, job_id, status, error_message, result_id, \
         created_at, updated_at FROM match_jobs WHERE id = $1",
    )
    .bind(cmd.match_job_id)
    .fetch_optional(&deps.db_pool)
    .await?
    .ok_or_else(|| anyhow::anyhow!("match job not found: {}", cmd.match_job_id))?;

    MatchJob::mark_running(&deps.db_pool, &deps.event_bus, cmd.match_job_id).await?;

    let outcome: anyhow::Result<MatchResult> = async {
        let (resume, candidate_skills) =
            Resume::get_for_user_unchecked(&deps.db_pool, match_job.resume_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("resume not found: {}", match_job.resume_id))?;
        let (_job, requirements, _soft_skills) =
            JobDescription::get_for_user_unchecked(&deps.db_pool, match_job.job_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("job description not found: {}", match_job.job_id))?;

        let request = MatchRequest {
            candidate_skills: candidate_skills
                .iter()
                .map(|s| MatchCandidateSkill {
                    skill: s.skill.clone(),
                    experience_years: s.experience_years,
                    proficiency: s.proficiency.clone(),
                })
                .collect(),
            requirements: requirements
                .iter()
                .map(|r| MatchRequirement {
                    skill: r.skill.clone(),
                    importance: r.importance,
                    inferred: r.inferred,
                })
                .collect(),
        };

        let nlp_response = deps.nlp_client.compute_match(request).await?;
        let score = nlp_response.score.unwrap_or(0.0);
        let profile = resume.parsed_summary.as_ref().and_then(|s| s.get("profile")).cloned().unwrap_or(serde_json::json!({}));
        let summary = build_match_summary(&nlp_response, &candidate_skills, &requirements, &profile);

        MatchResult::create(
            &deps.db_pool,
            match_job.user_id,
            match_job.resume_id,
            match_job.job_id,
            score,
            &summary,
        )
        .await
    }
    .await;

    match outcome {
        Ok(result) => {
            MatchJob::mark_completed(&deps.db_pool, &deps.event_bus, cmd.match_job_id, result.id)
                .await?;
            Ok(())
        }
        Err(e) => {
            MatchJob::mark_failed(
                &deps.db_pool,
                &deps.event_bus,
                cmd.match_job_id,
                &e.to_string(),
            )
            .await?;
            Err(e)
        }
    }
}
