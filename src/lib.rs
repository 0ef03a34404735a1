//! Sheet Migrator Library
//!
//! Staged migration of a legacy questionnaire platform into a normalized
//! SQLite schema, plus duplicate sheet reconciliation. This module exports
//! the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod transform;
pub mod types;
