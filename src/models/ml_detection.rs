//! ML detection model - stored inference results

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use validator::Validate;

use super::{push_condition, DEFAULT_LIMIT};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MlDetection {
    pub id: Uuid,
    pub detection_type: String,
    pub confidence: f64,
    pub prediction: String,
    pub features: serde_json::Value,
    pub model_name: String,
    pub metadata: serde_json::Value,
    pub related_log_id: Option<Uuid>,
    pub related_alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDetection {
    pub detection_type: String,
    pub confidence: f64,
    pub prediction: String,
    pub features: serde_json::Value,
    pub model_name: String,
    pub metadata: serde_json::Value,
    pub related_log_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct DetectionFilter {
    pub detection_type: Option<String>,
    pub model_name: Option<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: Option<f64>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub skip: Option<i64>,
}

impl DetectionFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        let mut has_where = false;
        if let Some(detection_type) = &self.detection_type {
            push_condition(qb, &mut has_where).push("detection_type = ").push_bind(detection_type.clone());
        }
        if let Some(model_name) = &self.model_name {
            push_condition(qb, &mut has_where).push("model_name = ").push_bind(model_name.clone());
        }
        if let Some(min_confidence) = self.min_confidence {
            push_condition(qb, &mut has_where).push("confidence >= ").push_bind(min_confidence);
        }
    }
}

impl MlDetection {
    pub async fn create(pool: &PgPool, data: NewDetection) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, MlDetection>(
            r#"
            INSERT INTO ml_detections (detection_type, confidence, prediction, features, model_name, metadata, related_log_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#
        )
        .bind(&data.detection_type)
        .bind(data.confidence)
        .bind(&data.prediction)
        .bind(&data.features)
        .bind(&data.model_name)
        .bind(&data.metadata)
        .bind(data.related_log_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MlDetection>("SELECT * FROM ml_detections WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first
    pub async fn list(pool: &PgPool, filter: &DetectionFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM ml_detections");
        filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIMIT))
            .push(" OFFSET ")
            .push_bind(filter.skip.unwrap_or(0));

        qb.build_query_as::<MlDetection>().fetch_all(pool).await
    }

    pub async fn set_related_alert(pool: &PgPool, id: Uuid, alert_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE ml_detections SET related_alert_id = $2 WHERE id = $1")
            .bind(id)
            .bind(alert_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_confidence_bounds() {
        let ok = DetectionFilter { min_confidence: Some(0.75), ..Default::default() };
        let bad = DetectionFilter { min_confidence: Some(1.5), ..Default::default() };
        assert!(ok.validate().is_ok());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_filter_sql() {
        let filter = DetectionFilter {
            model_name: Some("threat_detection".into()),
            min_confidence: Some(0.5),
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM ml_detections");
        filter.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM ml_detections WHERE model_name = $1 AND confidence >= $2"
        );
    }
}
