//! ext-pulse - VS Code Marketplace extension metrics tracker
//!
//! This service ingests marketplace usage metrics (installs, ratings,
//! downloads) for a set of tracked extensions on a once-daily cadence,
//! stores them as an append-only time series, and monitors the health
//! of the ingestion pipeline itself.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;
