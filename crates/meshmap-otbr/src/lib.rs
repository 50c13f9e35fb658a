//! Meshmap OTBR - diagnostics client for the OpenThread Border Router REST API
//!
//! This crate fetches `/node` and `/diagnostics` from a border router and
//! hands the raw JSON to the meshmap engine.

pub mod client;

pub use client::{DiagnosticSource, FetchError, OtbrClient, DEFAULT_TIMEOUT};
