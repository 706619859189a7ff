//! services/api/src/lib.rs
//!
//! The HTTP service around the engagement engine: storage and notification
//! adapters, configuration, error mapping and the axum router.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
