//! HTTP API: order intake, order and balance lookups, service wiring.

pub mod app;
pub mod config;
