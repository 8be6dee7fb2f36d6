//! Typed ID definitions for every domain entity in the orchestration engine.

pub use super::id::{Id, V4, V7};

/// Marker type for User entities.
pub struct User;

/// Marker type for Resume entities.
pub struct Resume;

/// Marker type for JobDescription entities (the "Job" entity of the data model).
pub struct JobDescription;

/// Marker type for MatchJob entities.
pub struct MatchJob;

/// Marker type for MatchResult entities.
pub struct MatchResult;

pub type UserId = Id<User>;
pub type ResumeId = Id<Resume>;
pub type JobDescriptionId = Id<JobDescription>;
pub type MatchJobId = Id<MatchJob>;
pub type MatchResultId = Id<MatchResult>;
