//! Alert model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use super::{push_condition, DEFAULT_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: String,
    pub alert_type: String,
    pub source: Option<String>,
    pub metadata: serde_json::Value,
    pub related_log_ids: Vec<String>,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::FalsePositive => "false_positive",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAlert {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub severity: AlertSeverity,
    #[validate(length(min = 1, max = 100))]
    pub alert_type: String,
    #[validate(length(max = 100))]
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub related_log_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAlert {
    pub status: Option<AlertStatus>,
    pub notes: Option<String>,
    #[validate(length(max = 255))]
    pub assigned_to: Option<String>,
}

impl UpdateAlert {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.notes.is_none() && self.assigned_to.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct AlertFilter {
    pub status: Option<String>,
    pub severity: Option<String>,
    pub alert_type: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub skip: Option<i64>,
}

impl AlertFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let mut has_where = false;
        if let Some(status) = &self.status {
            push_condition(qb, &mut has_where).push("status = ").push_bind(status.clone());
        }
        if let Some(severity) = &self.severity {
            push_condition(qb, &mut has_where).push("severity = ").push_bind(severity.clone());
        }
        if let Some(alert_type) = &self.alert_type {
            push_condition(qb, &mut has_where).push("alert_type = ").push_bind(alert_type.clone());
        }
    }
}

impl Alert {
    pub async fn create(pool: &PgPool, data: CreateAlert, created_by: Option<Uuid>) -> Result<Self, sqlx::Error> {
        let metadata = data.metadata.unwrap_or_else(|| serde_json::json!({}));
        let related_log_ids = data.related_log_ids.unwrap_or_default();

        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (title, description, severity, alert_type, source, metadata, related_log_ids, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.severity.as_str())
        .bind(&data.alert_type)
        .bind(&data.source)
        .bind(&metadata)
        .bind(&related_log_ids)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first
    pub async fn list(pool: &PgPool, filter: &AlertFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM alerts");
        filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
            .push(" OFFSET ")
            .push_bind(filter.skip.unwrap_or(0));

        qb.build_query_as::<Alert>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &AlertFilter) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM alerts");
        filter.push_where(&mut qb);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Apply the provided fields; `None` when the alert does not exist
    pub async fn update(pool: &PgPool, id: Uuid, data: &UpdateAlert) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts SET
                status = COALESCE($2, status),
                notes = COALESCE($3, notes),
                assigned_to = COALESCE($4, assigned_to),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(data.status.map(|s| s.as_str()))
        .bind(&data.notes)
        .bind(&data.assigned_to)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        let status: AlertStatus = serde_json::from_value(json!("false_positive")).unwrap();
        assert_eq!(status, AlertStatus::FalsePositive);
        assert_eq!(status.as_str(), "false_positive");
        assert!(serde_json::from_value::<AlertStatus>(json!("closed")).is_err());
    }

    #[test]
    fn test_create_alert_title_bounds() {
        let mut alert: CreateAlert = serde_json::from_value(json!({
            "title": "Port scan",
            "description": "Sequential SYNs from one host",
            "severity": "high",
            "alert_type": "intrusion"
        }))
        .unwrap();
        assert!(alert.validate().is_ok());
        assert!(alert.related_log_ids.is_none());

        alert.title = "x".repeat(201);
        assert!(alert.validate().is_err());

        alert.title = String::new();
        assert!(alert.validate().is_err());
    }

    #[test]
    fn test_create_alert_accepts_null_related_logs() {
        let alert: CreateAlert = serde_json::from_value(json!({
            "title": "Brute force",
            "description": "Repeated failed logins",
            "severity": "medium",
            "alert_type": "intrusion",
            "related_log_ids": null
        }))
        .unwrap();
        assert!(alert.related_log_ids.is_none());

        let alert: CreateAlert = serde_json::from_value(json!({
            "title": "Brute force",
            "description": "Repeated failed logins",
            "severity": "medium",
            "alert_type": "intrusion",
            "related_log_ids": ["a1", "b2"]
        }))
        .unwrap();
        assert_eq!(alert.related_log_ids.unwrap_or_default(), vec!["a1", "b2"]);
    }

    #[test]
    fn test_update_alert_partial() {
        let update: UpdateAlert = serde_json::from_value(json!({"notes": "checked"})).unwrap();
        assert!(!update.is_empty());
        assert!(update.status.is_none());
        assert!(UpdateAlert::default().is_empty());
    }

    #[test]
    fn test_filter_sql() {
        let filter = AlertFilter {
            status: Some("open".into()),
            severity: Some("high".into()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM alerts");
        filter.push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT * FROM alerts WHERE status = $1 AND severity = $2");
    }
}
