//! Live monitoring - metrics snapshots and WebSocket fan-out

pub mod metrics;
pub mod registry;

pub use metrics::LiveMetrics;
pub use registry::ConnectionRegistry;

use serde::Serialize;

use crate::models::{Alert, Log};

/// Message pushed to monitoring clients as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MonitorMessage {
    Metrics(LiveMetrics),
    RecentActivity { logs: Vec<Log>, alerts: Vec<Alert> },
    NewLog(Log),
    NewAlert(Alert),
    AlertUpdated(Alert),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(MonitorMessage::RecentActivity {
            logs: vec![],
            alerts: vec![],
        })
        .unwrap();
        assert_eq!(json["type"], "recent_activity");
        assert!(json["data"]["logs"].as_array().unwrap().is_empty());

        let json = serde_json::to_value(MonitorMessage::Metrics(LiveMetrics::default())).unwrap();
        assert_eq!(json["type"], "metrics");
        assert_eq!(json["data"]["logs"]["counts"]["total"], 0);
    }
}
