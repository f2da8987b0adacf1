//! Survey Sherpa - chat-driven survey runner.
//!
//! A bot process guides participants through a YAML-defined, multi-section
//! questionnaire, keeps drafts and completed records in memory, and forwards
//! aggregated answers to a configured reviewer.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;
