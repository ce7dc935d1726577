//! Core library for the EcoPorts environmental monitoring service.
//!
//! Tracks pollution metrics for maritime ports, derives a green score from
//! them, and exposes the directory plus citizen reporting over a JSON API.

pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod ports;
pub mod telemetry;
