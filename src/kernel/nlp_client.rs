//! A pure REST client to the NLP collaborator (§6.3) — no domain logic, just
//! typed request/response structs and HTTP plumbing, in the shape of the
//! teacher's `openai-client` crate.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::kernel::traits::BaseNlpClient;

pub type Result<T> = std::result::Result<T, NlpError>;

#[derive(Debug, Error)]
pub enum NlpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseResumeRequest {
    pub filename: String,
    pub mime_type: String,
    pub content_b64: String,
}

impl ParseResumeRequest {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content_b64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpSkill {
    pub skill: String,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseResumeResponse {
    #[serde(default)]
    pub skills: Vec<NlpSkill>,
    #[serde(default)]
    pub sections: serde_json::Value,
    #[serde(default)]
    pub profile: serde_json::Value,
    #[serde(default)]
    pub statistics: serde_json::Value,
}

/// `source: text` requests carry `text`; `source: file` requests carry the
/// file fields — the two branches of the worker algorithm in §4.4.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ParseJobRequest {
    File { filename: String, mime_type: String, content_b64: String },
    Text { text: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpRequirement {
    pub skill: String,
    pub importance: f64,
    #[serde(default)]
    pub inferred: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NlpSoftSkill {
    pub skill: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseJobResponse {
    #[serde(default)]
    pub requirements: Vec<NlpRequirement>,
    #[serde(default)]
    pub highlights: serde_json::Value,
    #[serde(default)]
    pub summary: serde_json::Value,
    #[serde(default)]
    pub onet: Option<serde_json::Value>,
    #[serde(default)]
    pub soft_skills: Option<Vec<NlpSoftSkill>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidateSkill {
    pub skill: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRequirement {
    pub skill: String,
    pub importance: f64,
    pub inferred: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRequest {
    pub candidate_skills: Vec<MatchCandidateSkill>,
    pub requirements: Vec<MatchRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchDetail {
    pub requirement: String,
    pub similarity: f64,
    #[serde(default)]
    pub matched_skill: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchSummaryResponse {
    #[serde(default)]
    pub details: Vec<MatchDetail>,
    #[serde(default)]
    pub strengths: Vec<serde_json::Value>,
    #[serde(default)]
    pub gaps: Vec<serde_json::Value>,
    #[serde(default)]
    pub overall_match_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchResponse {
    pub score: Option<f64>,
    pub summary: MatchSummaryResponse,
}

/// `reqwest`-based implementation. Connect/request timeouts come from
/// `Config` (§6.6).
#[derive(Clone)]
pub struct HttpNlpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpNlpClient {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| NlpError::Config(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| NlpError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NlpError::Api(format!("{status}: {text}")));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| NlpError::Parse(e.to_string()))
    }
}

#[async_trait]
impl BaseNlpClient for HttpNlpClient {
    async fn parse_resume(&self, req: ParseResumeRequest) -> anyhow::Result<ParseResumeResponse> {
        Ok(self.post_json("/parse/resume", &req).await?)
    }

    async fn parse_job(&self, req: ParseJobRequest) -> anyhow::Result<ParseJobResponse> {
        Ok(self.post_json("/parse/job", &req).await?)
    }

    async fn compute_match(&self, req: MatchRequest) -> anyhow::Result<MatchResponse> {
        Ok(self.post_json("/match", &req).await?)
    }
}

/// In-memory double for tests and local development without the Python NLP
/// collaborator running, mirroring `storage::InMemoryObjectStorage`. Applies
/// a deliberately simple keyword heuristic so integration tests can assert
/// on deterministic output without a real model in the loop.
#[derive(Clone, Default)]
pub struct FakeNlpClient;

impl FakeNlpClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BaseNlpClient for FakeNlpClient {
    async fn parse_resume(&self, req: ParseResumeRequest) -> anyhow::Result<ParseResumeResponse> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&req.content_b64)
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes).to_lowercase();
        let known_skills = ["python", "rust", "sql", "javascript", "java"];
        let skills = known_skills
            .iter()
            .filter(|s| text.contains(*s))
            .map(|s| NlpSkill { skill: s.to_string(), experience_years: None, proficiency: None })
            .collect();

        Ok(ParseResumeResponse {
            skills,
            sections: serde_json::json!({}),
            profile: serde_json::json!({}),
            statistics: serde_json::json!({ "word_count": text.split_whitespace().count() }),
        })
    }

    async fn parse_job(&self, req: ParseJobRequest) -> anyhow::Result<ParseJobResponse> {
        let text = match &req {
            ParseJobRequest::Text { text } => text.to_lowercase(),
            ParseJobRequest::File { content_b64, .. } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content_b64)
                    .unwrap_or_default();
                String::from_utf8_lossy(&bytes).to_lowercase()
            }
        };
        let known_skills = ["python", "rust", "sql", "javascript", "java"];
        let requirements = known_skills
            .iter()
            .filter(|s| text.contains(*s))
            .map(|s| NlpRequirement { skill: s.to_string(), importance: 0.8, inferred: false })
            .collect();

        Ok(ParseJobResponse {
            requirements,
            highlights: serde_json::json!([]),
            summary: serde_json::json!({}),
            onet: None,
            soft_skills: None,
        })
    }

    async fn compute_match(&self, req: MatchRequest) -> anyhow::Result<MatchResponse> {
        let candidate_skills: std::collections::HashSet<String> =
            req.candidate_skills.iter().map(|s| s.skill.to_lowercase()).collect();

        let details: Vec<MatchDetail> = req
            .requirements
            .iter()
            .map(|r| {
                if candidate_skills.contains(&r.skill.to_lowercase()) {
                    MatchDetail {
                        requirement: r.skill.clone(),
                        similarity: 0.9,
                        matched_skill: Some(r.skill.clone()),
                    }
                } else {
                    MatchDetail { requirement: r.skill.clone(), similarity: 0.1, matched_skill: None }
                }
            })
            .collect();

        let score = if details.is_empty() {
            0.0
        } else {
            details.iter().map(|d| d.similarity).sum::<f64>() / details.len() as f64
        };

        Ok(MatchResponse {
            score: Some(score),
            summary: MatchSummaryResponse {
                details,
                strengths: vec![],
                gaps: vec![],
                overall_match_score: Some(score),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resume_request_encodes_content() {
        let req = ParseResumeRequest::new("resume.txt", "text/plain", b"hello");
        assert_eq!(req.content_b64, base64::engine::general_purpose::STANDARD.encode(b"hello"));
    }

    #[tokio::test]
    async fn fake_client_parses_known_skills_from_resume_bytes() {
        let client = FakeNlpClient::new();
        let req = ParseResumeRequest::new("r.txt", "text/plain", b"I know Python and SQL");
        let resp = client.parse_resume(req).await.unwrap();
        let skills: Vec<_> = resp.skills.iter().map(|s| s.skill.as_str()).collect();
        assert!(skills.contains(&"python"));
        assert!(skills.contains(&"sql"));
    }

    #[tokio::test]
    async fn fake_client_matches_overlapping_skills_above_threshold() {
        let client = FakeNlpClient::new();
        let req = MatchRequest {
            candidate_skills: vec![MatchCandidateSkill {
                skill: "python".into(),
                experience_years: None,
                proficiency: None,
            }],
            requirements: vec![
                MatchRequirement { skill: "python".into(), importance: 0.9, inferred: false },
                MatchRequirement { skill: "rust".into(), importance: 0.5, inferred: false },
            ],
        };
        let resp = client.compute_match(req).await.unwrap();
        assert_eq!(resp.summary.details[0].similarity, 0.9);
        assert_eq!(resp.summary.details[1].similarity, 0.1);
    }
}
