//! Suricata models - EVE events, rules and configuration files

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use super::{push_condition, LogSeverity, DEFAULT_LIMIT};
use crate::ml::features::parse_timestamp;

/// Map Suricata's numeric alert severity onto log severities
pub fn suricata_log_severity(level: i64) -> LogSeverity {
    match level {
        l if l >= 4 => LogSeverity::Critical,
        3 => LogSeverity::Error,
        2 => LogSeverity::Warning,
        _ => LogSeverity::Info,
    }
}

pub fn map_suricata_severity(level: i64) -> &'static str {
    suricata_log_severity(level).as_str()
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuricataEvent {
    pub id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub raw_event: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields pulled out of a raw EVE record before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEve {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl ParsedEve {
    pub fn from_raw(raw: &Value) -> Self {
        let event_type = raw
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Self { event_type, timestamp }
    }
}

/// Alert section of an EVE `alert` record
#[derive(Debug, Clone, PartialEq)]
pub struct EveAlert {
    pub signature: String,
    pub category: Option<String>,
    pub severity: i64,
    pub raw: Value,
}

impl EveAlert {
    pub fn from_raw(raw: &Value) -> Option<Self> {
        let alert = raw.get("alert")?;
        Some(Self {
            signature: alert
                .get("signature")
                .and_then(Value::as_str)
                .unwrap_or("Unknown signature")
                .to_string(),
            category: alert.get("category").and_then(Value::as_str).map(str::to_string),
            severity: alert.get("severity").and_then(Value::as_i64).unwrap_or(1),
            raw: alert.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct SuricataEventFilter {
    pub event_type: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub skip: Option<i64>,
}

impl SuricataEvent {
    pub async fn create(pool: &PgPool, raw: Value) -> Result<Self, sqlx::Error> {
        let parsed = ParsedEve::from_raw(&raw);

        sqlx::query_as::<_, SuricataEvent>(
            r#"
            INSERT INTO suricata_events (event_type, timestamp, raw_event)
            VALUES ($1, $2, $3)
            RETURNING *
            "#
        )
        .bind(&parsed.event_type)
        .bind(parsed.timestamp)
        .bind(&raw)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SuricataEvent>("SELECT * FROM suricata_events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, filter: &SuricataEventFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM suricata_events");
        let mut has_where = false;
        if let Some(event_type) = &filter.event_type {
            push_condition(&mut qb, &mut has_where).push("event_type = ").push_bind(event_type.clone());
        }
        qb.push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
            .push(" OFFSET ")
            .push_bind(filter.skip.unwrap_or(0));

        qb.build_query_as::<SuricataEvent>().fetch_all(pool).await
    }
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuricataRule {
    pub id: Uuid,
    pub name: String,
    pub rule_content: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSuricataRule {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub rule_content: String,
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSuricataRule {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub rule_content: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

impl SuricataRule {
    pub async fn create(pool: &PgPool, data: &CreateSuricataRule) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SuricataRule>(
            r#"
            INSERT INTO suricata_rules (name, rule_content, description, enabled)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(&data.name)
        .bind(&data.rule_content)
        .bind(&data.description)
        .bind(data.enabled)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool, enabled_only: bool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = if enabled_only {
            "SELECT * FROM suricata_rules WHERE enabled = true ORDER BY created_at DESC"
        } else {
            "SELECT * FROM suricata_rules ORDER BY created_at DESC"
        };
        sqlx::query_as::<_, SuricataRule>(sql).fetch_all(pool).await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: &UpdateSuricataRule) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, SuricataRule>(
            r#"
            UPDATE suricata_rules SET
                name = COALESCE($2, name),
                rule_content = COALESCE($3, rule_content),
                description = COALESCE($4, description),
                enabled = COALESCE($5, enabled),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.rule_content)
        .bind(&data.description)
        .bind(data.enabled)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM suricata_rules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// CONFIGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuricataConfig {
    pub id: Uuid,
    pub config_name: String,
    pub config_content: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSuricataConfig {
    #[validate(length(min = 1, max = 200))]
    pub config_name: String,
    #[validate(length(min = 1))]
    pub config_content: String,
    pub description: Option<String>,
}

impl SuricataConfig {
    pub async fn create(pool: &PgPool, data: &CreateSuricataConfig) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SuricataConfig>(
            r#"
            INSERT INTO suricata_configs (config_name, config_content, description)
            VALUES ($1, $2, $3)
            RETURNING *
            "#
        )
        .bind(&data.config_name)
        .bind(&data.config_content)
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SuricataConfig>("SELECT * FROM suricata_configs ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(map_suricata_severity(1), "info");
        assert_eq!(map_suricata_severity(2), "warning");
        assert_eq!(map_suricata_severity(3), "error");
        assert_eq!(map_suricata_severity(4), "critical");
        assert_eq!(map_suricata_severity(7), "critical");
        assert_eq!(map_suricata_severity(0), "info");
    }

    #[test]
    fn test_parse_eve_alert() {
        let raw = json!({
            "timestamp": "2024-01-15T08:30:12.123456+0000",
            "event_type": "alert",
            "src_ip": "10.0.0.9",
            "alert": {
                "signature": "ET SCAN Nmap Scripting Engine",
                "category": "Attempted Information Leak",
                "severity": 2
            }
        });

        let parsed = ParsedEve::from_raw(&raw);
        assert_eq!(parsed.event_type, "alert");
        assert_eq!((parsed.timestamp.day(), parsed.timestamp.hour()), (15, 8));

        let alert = EveAlert::from_raw(&raw).unwrap();
        assert_eq!(alert.signature, "ET SCAN Nmap Scripting Engine");
        assert_eq!(alert.category.as_deref(), Some("Attempted Information Leak"));
        assert_eq!(alert.severity, 2);
    }

    #[test]
    fn test_parse_eve_defaults() {
        let before = Utc::now();
        let parsed = ParsedEve::from_raw(&json!({"timestamp": "garbage"}));
        assert_eq!(parsed.event_type, "unknown");
        assert!(parsed.timestamp >= before);
        assert!(EveAlert::from_raw(&json!({"event_type": "flow"})).is_none());
    }

    #[test]
    fn test_rule_enabled_by_default() {
        let rule: CreateSuricataRule = serde_json::from_value(json!({
            "name": "local-ssh",
            "rule_content": "alert tcp any any -> any 22 (msg:\"SSH\"; sid:1000001;)"
        }))
        .unwrap();
        assert!(rule.enabled);
        assert!(rule.validate().is_ok());
    }
}
