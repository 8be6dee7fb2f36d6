//! Process configuration, loaded from environment variables (§6.6).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub auth_disabled: bool,

    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    pub auth0_issuer_base_url: Option<String>,

    pub database_url: String,
    pub sql_connect_timeout: Duration,
    pub sql_request_timeout: Duration,
    pub sql_pool_max: u32,
    pub sql_retry_attempts: u32,
    pub sql_retry_backoff: Duration,

    pub nlp_service_url: String,

    pub r2_account_id: Option<String>,
    pub r2_access_key_id: Option<String>,
    pub r2_secret_access_key: Option<String>,
    pub r2_bucket: Option<String>,
    pub r2_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            port: env_or("PORT", "4000").parse().context("PORT must be a valid number")?,
            auth_disabled: env_or("AUTH_DISABLED", "false")
                .parse()
                .context("AUTH_DISABLED must be true/false")?,

            auth0_domain: env::var("AUTH0_DOMAIN").ok(),
            auth0_audience: env::var("AUTH0_AUDIENCE").ok(),
            auth0_issuer_base_url: env::var("AUTH0_ISSUER_BASE_URL").ok(),

            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            sql_connect_timeout: Duration::from_millis(parse_u64(
                "SQL_CONNECT_TIMEOUT_MS",
                30_000,
            )?),
            sql_request_timeout: Duration::from_millis(parse_u64(
                "SQL_REQUEST_TIMEOUT_MS",
                60_000,
            )?),
            sql_pool_max: parse_u64("SQL_POOL_MAX", 10)? as u32,
            sql_retry_attempts: parse_u64("SQL_RETRY_ATTEMPTS", 5)? as u32,
            sql_retry_backoff: Duration::from_millis(parse_u64("SQL_RETRY_BACKOFF_MS", 3_000)?),

            nlp_service_url: env::var("PYTHON_SERVICE_URL")
                .context("PYTHON_SERVICE_URL must be set")?,

            r2_account_id: env::var("R2_ACCOUNT_ID").ok(),
            r2_access_key_id: env::var("R2_ACCESS_KEY_ID").ok(),
            r2_secret_access_key: env::var("R2_SECRET_ACCESS_KEY").ok(),
            r2_bucket: env::var("R2_BUCKET").ok(),
            r2_endpoint: env::var("R2_ENDPOINT").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_u64_falls_back_to_default_when_unset() {
        env::remove_var("SOME_TEST_ONLY_KEY");
        assert_eq!(parse_u64("SOME_TEST_ONLY_KEY", 42).unwrap(), 42);
    }
}
