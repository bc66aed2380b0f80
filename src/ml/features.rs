//! Feature extraction - fixed schema for classifier input
//!
//! The layout below is the single source of truth for the order of values
//! fed to every model. Changing it invalidates trained models, so bump
//! `FEATURE_VERSION` with any change.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{Log, SuricataEvent};
use crate::models::suricata::map_suricata_severity;

/// Current feature layout version
pub const FEATURE_VERSION: u8 = 1;

/// Feature names in exact vector order
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Log (0-8) ===
    "severity_encoded",
    "source_hash",
    "message_length",
    "message_word_count",
    "has_special_chars",
    "has_metadata",
    "metadata_key_count",
    "hour_of_day",
    "day_of_week",

    // === Network (9-20) ===
    "protocol_encoded",
    "src_port",
    "dst_port",
    "is_privileged_port",
    "packet_size",
    "bytes_sent",
    "bytes_received",
    "connection_duration",
    "packet_count",
    "has_syn",
    "has_fin",
    "has_rst",
];

/// Total number of features
pub const FEATURE_COUNT: usize = 21;

const SPECIAL_CHARS: [char; 5] = ['@', '#', '$', '%', '&'];

// ============================================================================
// INPUT
// ============================================================================

/// TCP flags of a network record
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TcpFlags {
    #[serde(default)]
    pub syn: bool,
    #[serde(default)]
    pub fin: bool,
    #[serde(default)]
    pub rst: bool,
}

/// Raw data a feature vector is extracted from.
///
/// Log-like fields and network-like fields may both be present; unknown
/// fields in the request body are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InferenceInput {
    pub severity: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: Option<String>,

    pub protocol: Option<String>,
    pub port: Option<f64>,
    pub src_port: Option<f64>,
    pub dst_port: Option<f64>,
    pub packet_size: Option<f64>,
    pub bytes_sent: Option<f64>,
    pub bytes_received: Option<f64>,
    pub duration: Option<f64>,
    pub packet_count: Option<f64>,
    pub flags: Option<TcpFlags>,
}

impl InferenceInput {
    /// Parse request data; the body must be a JSON object
    pub fn from_json(data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(data)
    }

    fn has_log_fields(&self) -> bool {
        self.severity.is_some() || self.message.is_some()
    }

    fn has_network_fields(&self) -> bool {
        self.protocol.is_some() || self.port.is_some()
    }
}

impl From<&Log> for InferenceInput {
    fn from(log: &Log) -> Self {
        Self {
            severity: Some(log.severity.clone()),
            source: Some(log.source.clone()),
            message: Some(log.message.clone()),
            metadata: Some(log.metadata.clone()),
            timestamp: Some(log.timestamp.to_rfc3339()),
            ..Default::default()
        }
    }
}

impl From<&SuricataEvent> for InferenceInput {
    fn from(event: &SuricataEvent) -> Self {
        let raw = &event.raw_event;
        let number = |v: Option<&Value>| v.and_then(Value::as_f64);

        let flow = raw.get("flow");
        let flow_value = |key: &str| number(flow.and_then(|f| f.get(key)));
        let packet_count = match (flow_value("pkts_toserver"), flow_value("pkts_toclient")) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };

        let tcp = raw.get("tcp");
        let tcp_flag = |key: &str| {
            tcp.and_then(|t| t.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        let flags = tcp.map(|_| TcpFlags {
            syn: tcp_flag("syn"),
            fin: tcp_flag("fin"),
            rst: tcp_flag("rst"),
        });

        let alert = raw.get("alert");
        let (severity, message) = match alert {
            Some(alert) => {
                let level = alert.get("severity").and_then(Value::as_i64).unwrap_or(1);
                let signature = alert
                    .get("signature")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown signature");
                (
                    Some(map_suricata_severity(level).to_string()),
                    Some(format!("Suricata Alert: {}", signature)),
                )
            }
            None => (None, None),
        };

        Self {
            severity,
            source: Some("suricata".to_string()),
            message,
            metadata: alert.cloned(),
            timestamp: Some(event.timestamp.to_rfc3339()),
            protocol: raw.get("proto").and_then(Value::as_str).map(str::to_string),
            port: number(raw.get("dest_port")),
            src_port: number(raw.get("src_port")),
            dst_port: number(raw.get("dest_port")),
            packet_size: None,
            bytes_sent: flow_value("bytes_toserver"),
            bytes_received: flow_value("bytes_toclient"),
            duration: flow_value("age"),
            packet_count,
            flags,
        }
    }
}

// ============================================================================
// FEATURE VECTOR
// ============================================================================

/// Fixed-schema feature vector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // Log
    pub severity_encoded: f32,
    pub source_hash: f32,
    pub message_length: f32,
    pub message_word_count: f32,
    pub has_special_chars: f32,
    pub has_metadata: f32,
    pub metadata_key_count: f32,
    pub hour_of_day: f32,
    pub day_of_week: f32,

    // Network
    pub protocol_encoded: f32,
    pub src_port: f32,
    pub dst_port: f32,
    pub is_privileged_port: f32,
    pub packet_size: f32,
    pub bytes_sent: f32,
    pub bytes_received: f32,
    pub connection_duration: f32,
    pub packet_count: f32,
    pub has_syn: f32,
    pub has_fin: f32,
    pub has_rst: f32,
}

impl FeatureVector {
    /// Extract every feature group the input carries data for
    pub fn extract(input: &InferenceInput) -> Self {
        let mut vector = Self::default();
        if input.has_log_fields() {
            vector.fill_log(input);
        }
        if input.has_network_fields() {
            vector.fill_network(input);
        }
        vector
    }

    fn fill_log(&mut self, input: &InferenceInput) {
        let severity = input.severity.as_deref().unwrap_or("info");
        self.severity_encoded = encode_severity(severity);
        self.source_hash = stable_hash(input.source.as_deref().unwrap_or("unknown")) as f32;

        let message = input.message.as_deref().unwrap_or("");
        self.message_length = message.chars().count() as f32;
        self.message_word_count = message.split_whitespace().count() as f32;
        self.has_special_chars = flag(message.contains(SPECIAL_CHARS.as_slice()));

        let key_count = input
            .metadata
            .as_ref()
            .and_then(Value::as_object)
            .map(Map::len)
            .unwrap_or(0);
        self.has_metadata = flag(key_count > 0);
        self.metadata_key_count = key_count as f32;

        match input.timestamp.as_deref().and_then(parse_timestamp) {
            Some(ts) => {
                self.hour_of_day = ts.hour() as f32;
                self.day_of_week = ts.weekday().num_days_from_monday() as f32;
            }
            None => {
                self.hour_of_day = 12.0;
                self.day_of_week = 0.0;
            }
        }
    }

    fn fill_network(&mut self, input: &InferenceInput) {
        let protocol = input.protocol.as_deref().unwrap_or("unknown");
        self.protocol_encoded = encode_protocol(protocol);

        self.src_port = numeric(input.src_port);
        self.dst_port = numeric(input.dst_port);
        self.is_privileged_port = flag(self.dst_port < 1024.0);

        self.packet_size = numeric(input.packet_size);
        self.bytes_sent = numeric(input.bytes_sent);
        self.bytes_received = numeric(input.bytes_received);
        self.connection_duration = numeric(input.duration);
        self.packet_count = numeric(input.packet_count);

        let flags = input.flags.clone().unwrap_or_default();
        self.has_syn = flag(flags.syn);
        self.has_fin = flag(flags.fin);
        self.has_rst = flag(flags.rst);
    }

    /// Values in `FEATURE_LAYOUT` order
    pub fn to_vector(&self) -> [f32; FEATURE_COUNT] {
        [
            self.severity_encoded,
            self.source_hash,
            self.message_length,
            self.message_word_count,
            self.has_special_chars,
            self.has_metadata,
            self.metadata_key_count,
            self.hour_of_day,
            self.day_of_week,
            self.protocol_encoded,
            self.src_port,
            self.dst_port,
            self.is_privileged_port,
            self.packet_size,
            self.bytes_sent,
            self.bytes_received,
            self.connection_duration,
            self.packet_count,
            self.has_syn,
            self.has_fin,
            self.has_rst,
        ]
    }

    /// Name -> value map, as stored with detections
    pub fn to_named(&self) -> Value {
        let map: Map<String, Value> = FEATURE_LAYOUT
            .iter()
            .zip(self.to_vector())
            .map(|(name, value)| (name.to_string(), Value::from(value as f64)))
            .collect();
        Value::Object(map)
    }
}

/// Layout description exposed to clients
#[derive(Debug, Clone, Serialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub feature_count: usize,
    pub feature_names: Vec<&'static str>,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.to_vec(),
        }
    }
}

// ============================================================================
// ENCODINGS
// ============================================================================

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

/// Narrow an optional input number to f32, saturating at the f32 range.
/// Missing and NaN values become 0.
fn numeric(value: Option<f64>) -> f32 {
    match value {
        Some(v) if !v.is_nan() => v.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32,
        _ => 0.0,
    }
}

pub fn encode_severity(severity: &str) -> f32 {
    match severity.to_lowercase().as_str() {
        "warning" => 1.0,
        "error" => 2.0,
        "critical" => 3.0,
        _ => 0.0,
    }
}

pub fn encode_protocol(protocol: &str) -> f32 {
    match protocol.to_lowercase().as_str() {
        "tcp" => 0.0,
        "udp" => 1.0,
        "icmp" => 2.0,
        "http" => 3.0,
        "https" => 4.0,
        _ => 5.0,
    }
}

/// Process-independent hash of a string into 0..1000
pub fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 1000
}

/// Parse RFC 3339 or Suricata-style (`+0000` offset) timestamps
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
