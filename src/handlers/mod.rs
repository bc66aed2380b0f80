//! HTTP handlers

pub mod health;
pub mod auth;
pub mod logs;
pub mod alerts;
pub mod monitoring;
pub mod suricata;
pub mod ml;
