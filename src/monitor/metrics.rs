//! Live metrics snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub timestamp: DateTime<Utc>,
    pub logs: LogMetrics,
    pub alerts: AlertMetrics,
    pub ml_detections: TotalCount,
    pub suricata_events: TotalCount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogMetrics {
    pub counts: LogCounts,
    pub recent_hour: i64,
    pub by_source: Vec<SourceCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct LogCounts {
    pub total: i64,
    pub info: i64,
    pub warning: i64,
    pub error: i64,
    pub critical: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertMetrics {
    pub counts: AlertCounts,
    pub recent_hour: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: i64,
    pub open: i64,
    pub investigating: i64,
    pub resolved: i64,
    pub by_severity: AlertSeverityCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSeverityCounts {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalCount {
    pub total: i64,
}

#[derive(FromRow)]
struct AlertRow {
    total: i64,
    open: i64,
    investigating: i64,
    resolved: i64,
    low: i64,
    medium: i64,
    high: i64,
    critical: i64,
    recent_hour: i64,
}

impl LiveMetrics {
    /// Gather current counts from the database
    pub async fn collect(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let counts = sqlx::query_as::<_, LogCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE severity = 'info') AS info,
                COUNT(*) FILTER (WHERE severity = 'warning') AS warning,
                COUNT(*) FILTER (WHERE severity = 'error') AS error,
                COUNT(*) FILTER (WHERE severity = 'critical') AS critical
            FROM logs
            "#
        )
        .fetch_one(pool)
        .await?;

        let logs_recent_hour: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM logs WHERE timestamp >= NOW() - INTERVAL '1 hour'"
        )
        .fetch_one(pool)
        .await?;

        let by_source = sqlx::query_as::<_, SourceCount>(
            r#"
            SELECT source, COUNT(*) AS count
            FROM logs
            WHERE timestamp >= NOW() - INTERVAL '1 day'
            GROUP BY source
            ORDER BY count DESC
            LIMIT 10
            "#
        )
        .fetch_all(pool)
        .await?;

        let alerts = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'open') AS open,
                COUNT(*) FILTER (WHERE status = 'investigating') AS investigating,
                COUNT(*) FILTER (WHERE status = 'resolved') AS resolved,
                COUNT(*) FILTER (WHERE severity = 'low') AS low,
                COUNT(*) FILTER (WHERE severity = 'medium') AS medium,
                COUNT(*) FILTER (WHERE severity = 'high') AS high,
                COUNT(*) FILTER (WHERE severity = 'critical') AS critical,
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '1 hour') AS recent_hour
            FROM alerts
            "#
        )
        .fetch_one(pool)
        .await?;

        let detections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ml_detections")
            .fetch_one(pool)
            .await?;

        let suricata_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM suricata_events")
            .fetch_one(pool)
            .await?;

        Ok(Self {
            timestamp: Utc::now(),
            logs: LogMetrics {
                counts,
                recent_hour: logs_recent_hour,
                by_source,
            },
            alerts: alerts.into(),
            ml_detections: TotalCount { total: detections },
            suricata_events: TotalCount { total: suricata_events },
        })
    }
}

impl From<AlertRow> for AlertMetrics {
    fn from(row: AlertRow) -> Self {
        Self {
            counts: AlertCounts {
                total: row.total,
                open: row.open,
                investigating: row.investigating,
                resolved: row.resolved,
                by_severity: AlertSeverityCounts {
                    low: row.low,
                    medium: row.medium,
                    high: row.high,
                    critical: row.critical,
                },
            },
            recent_hour: row.recent_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_row_nesting() {
        let row = AlertRow {
            total: 9,
            open: 4,
            investigating: 2,
            resolved: 3,
            low: 1,
            medium: 2,
            high: 5,
            critical: 1,
            recent_hour: 6,
        };
        let metrics = AlertMetrics::from(row);
        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json["counts"]["open"], 4);
        assert_eq!(json["counts"]["by_severity"]["high"], 5);
        assert_eq!(json["recent_hour"], 6);
    }
}
