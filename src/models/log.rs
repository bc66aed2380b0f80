//! Log model - security events and audit records

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use super::{push_condition, DEFAULT_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Log {
    pub id: Uuid,
    pub source: String,
    pub log_type: String,
    pub severity: String,
    pub message: String,
    pub action: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLog {
    #[validate(length(min = 1, max = 100))]
    pub source: String,
    #[validate(length(min = 1, max = 100))]
    pub log_type: String,
    pub severity: LogSeverity,
    #[validate(length(min = 1))]
    pub message: String,
    #[validate(length(max = 100))]
    pub action: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub target_id: Option<Uuid>,
    #[validate(length(max = 45))]
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CreateLog {
    /// Log record produced by the server itself
    pub fn system(source: &str, log_type: &str, severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            log_type: log_type.to_string(),
            severity,
            message: message.into(),
            action: None,
            metadata: None,
            timestamp: None,
            target_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_target(mut self, target_id: Uuid) -> Self {
        self.target_id = Some(target_id);
        self
    }
}

#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct LogFilter {
    pub source: Option<String>,
    pub severity: Option<String>,
    pub log_type: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub skip: Option<i64>,
}

impl LogFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let mut has_where = false;
        if let Some(source) = &self.source {
            push_condition(qb, &mut has_where).push("source = ").push_bind(source.clone());
        }
        if let Some(severity) = &self.severity {
            push_condition(qb, &mut has_where).push("severity = ").push_bind(severity.clone());
        }
        if let Some(log_type) = &self.log_type {
            push_condition(qb, &mut has_where).push("log_type = ").push_bind(log_type.clone());
        }
    }
}

impl Log {
    pub async fn create(pool: &PgPool, data: CreateLog, user_id: Option<Uuid>) -> Result<Self, sqlx::Error> {
        let metadata = data.metadata.unwrap_or_else(|| serde_json::json!({}));
        let timestamp = data.timestamp.unwrap_or_else(Utc::now);

        sqlx::query_as::<_, Log>(
            r#"
            INSERT INTO logs (source, log_type, severity, message, action, metadata, timestamp, user_id, target_id, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#
        )
        .bind(&data.source)
        .bind(&data.log_type)
        .bind(data.severity.as_str())
        .bind(&data.message)
        .bind(&data.action)
        .bind(&metadata)
        .bind(timestamp)
        .bind(user_id)
        .bind(data.target_id)
        .bind(&data.ip_address)
        .bind(&data.user_agent)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Log>("SELECT * FROM logs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first
    pub async fn list(pool: &PgPool, filter: &LogFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM logs");
        filter.push_where(&mut qb);
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
            .push(" OFFSET ")
            .push_bind(filter.skip.unwrap_or(0));

        qb.build_query_as::<Log>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &LogFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        filter.push_where(&mut qb);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_sql() {
        let filter = LogFilter {
            source: Some("suricata".into()),
            log_type: Some("alert".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM logs");
        filter.push_where(&mut qb);

        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM logs WHERE source = $1 AND log_type = $2");
    }

    #[test]
    fn test_filter_limits() {
        let ok = LogFilter { limit: Some(1000), ..Default::default() };
        let too_big = LogFilter { limit: Some(1001), ..Default::default() };
        let negative_skip = LogFilter { skip: Some(-1), ..Default::default() };

        assert!(ok.validate().is_ok());
        assert!(too_big.validate().is_err());
        assert!(negative_skip.validate().is_err());
    }

    #[test]
    fn test_severity_parses_lowercase_only() {
        let parsed: LogSeverity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, LogSeverity::Warning);
        assert!(serde_json::from_str::<LogSeverity>("\"fatal\"").is_err());
    }

    #[test]
    fn test_system_log_builder() {
        let log = CreateLog::system("auth", "audit", LogSeverity::Info, "User logged in")
            .with_action("USER_LOGIN");
        assert_eq!(log.action.as_deref(), Some("USER_LOGIN"));
        assert!(log.validate().is_ok());
    }
}
