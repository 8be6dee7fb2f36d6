//! Shared lifecycle state machines (§3, §4.4).
//!
//! Résumé and job-description rows share one state set
//! (`queued → processing → ready`, with a terminal `error` branch); match
//! jobs have their own (`queued → running → completed`, with a terminal
//! `failed` branch). Both are monotone: §8 P2 forbids backward transitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Queued,
    Processing,
    Ready,
    Error,
}

impl ParseStatus {
    /// Whether `self → next` is a legal forward transition per §4.4's
    /// `queued → processing → ready` chain with an `error` escape hatch.
    pub fn can_transition_to(&self, next: ParseStatus) -> bool {
        use ParseStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Error)
                | (Processing, Ready)
                | (Processing, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Queued => "queued",
            ParseStatus::Processing => "processing",
            ParseStatus::Ready => "ready",
            ParseStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl MatchJobStatus {
    pub fn can_transition_to(&self, next: MatchJobStatus) -> bool {
        use MatchJobStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Queued, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchJobStatus::Queued => "queued",
            MatchJobStatus::Running => "running",
            MatchJobStatus::Completed => "completed",
            MatchJobStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_forward_transitions_only() {
        assert!(ParseStatus::Queued.can_transition_to(ParseStatus::Processing));
        assert!(ParseStatus::Processing.can_transition_to(ParseStatus::Ready));
        assert!(ParseStatus::Processing.can_transition_to(ParseStatus::Error));
        assert!(!ParseStatus::Ready.can_transition_to(ParseStatus::Processing));
        assert!(!ParseStatus::Error.can_transition_to(ParseStatus::Ready));
        assert!(!ParseStatus::Queued.can_transition_to(ParseStatus::Ready));
    }

    #[test]
    fn match_job_status_forward_transitions_only() {
        assert!(MatchJobStatus::Queued.can_transition_to(MatchJobStatus::Running));
        assert!(MatchJobStatus::Running.can_transition_to(MatchJobStatus::Completed));
        assert!(!MatchJobStatus::Completed.can_transition_to(MatchJobStatus::Running));
        assert!(!MatchJobStatus::Queued.can_transition_to(MatchJobStatus::Completed));
    }
}
