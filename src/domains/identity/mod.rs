//! Identity Store (§4.1): resolves an external subject to an internal user
//! row and owns the per-user annual-usage counters the quota gate reads.
//! Grounded on the teacher's `Website::create`/`find_by_id` static-method
//! repository convention (hand-written SQL via `query_as::<_, Self>`, no
//! `query!` macro).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::common::entity_ids::UserId;
use crate::common::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub external_subject: String,
    pub email: Option<String>,
    pub annual_limit: i32,
    pub annual_usage_count: i32,
    pub annual_period_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DEFAULT_ANNUAL_LIMIT: i32 = 100;

/// `now - annual_period_start > 365 days`, or no period has started yet
/// (§3 invariant 6).
pub fn window_expired(period_start: Option<DateTime<Utc>>) -> bool {
    match period_start {
        None => true,
        Some(start) => Utc::now() - start > chrono::Duration::days(365),
    }
}

impl User {
    /// Find-or-create by `external_subject`, idempotent under concurrent
    /// callers: a unique-key collision on insert resolves by re-reading
    /// (§4.1 `ensureUser`).
    pub async fn ensure(
        pool: &PgPool,
        external_subject: &str,
        email: Option<&str>,
    ) -> OrchestratorResult<Self> {
        if external_subject.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput { field: "externalSubject" });
        }

        let inserted = sqlx::query_as::<_, Self>(
            "INSERT INTO users (external_subject, email, annual_limit, annual_usage_count) \
             VALUES ($1, $2, $3, 0) \
             ON CONFLICT (external_subject) DO NOTHING \
             RETURNING *",
        )
        .bind(external_subject)
        .bind(email)
        .bind(DEFAULT_ANNUAL_LIMIT)
        .fetch_optional(pool)
        .await?;

        if let Some(user) = inserted {
            return Ok(user);
        }

        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE external_subject = $1")
            .bind(external_subject)
            .fetch_one(pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => OrchestratorError::NotFound,
                other => OrchestratorError::Storage(other),
            })
    }

    pub async fn get_by_id(pool: &PgPool, id: UserId) -> OrchestratorResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(OrchestratorError::NotFound)
    }

    /// Read-only lookup that never creates a row (§4.1 `getUserId`).
    pub async fn find_id_by_subject(
        pool: &PgPool,
        external_subject: &str,
    ) -> OrchestratorResult<Option<UserId>> {
        let row = sqlx::query_as::<_, (UserId,)>(
            "SELECT id FROM users WHERE external_subject = $1",
        )
        .bind(external_subject)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Best-effort read-modify-write: resets the rolling window when
    /// expired, then increments. Not a single round trip, so concurrent
    /// callers can over-increment by at most one (§4.1, §9 "quota race").
    pub async fn increment_annual_usage(
        pool: &PgPool,
        user_id: UserId,
    ) -> OrchestratorResult<(i32, i32)> {
        let user = Self::get_by_id(pool, user_id).await?;

        let (new_count, period_start) = if window_expired(user.annual_period_start) {
            (1, Utc::now())
        } else {
            (user.annual_usage_count + 1, user.annual_period_start.unwrap())
        };

        sqlx::query(
            "UPDATE users SET annual_usage_count = $1, annual_period_start = $2, \
             updated_at = NOW() WHERE id = $3",
        )
        .bind(new_count)
        .bind(period_start)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok((new_count, user.annual_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_expired_true_when_never_started() {
        assert!(window_expired(None));
    }

    #[test]
    fn window_expired_false_within_365_days() {
        let start = Utc::now() - chrono::Duration::days(100);
        assert!(!window_expired(Some(start)));
    }

    #[test]
    fn window_expired_true_past_365_days() {
        let start = Utc::now() - chrono::Duration::days(400);
        assert!(window_expired(Some(start)));
    }
}
