//! Route handlers for the §6.1 HTTP surface.

pub mod health;
pub mod jobs;
pub mod matches;
pub mod resumes;
pub mod usage;
pub mod ws;
