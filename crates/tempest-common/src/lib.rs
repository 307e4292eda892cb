//! Shared types and utilities for the Tempest weather trading engine.
//!
//! This crate contains:
//! - Core domain types (outcomes, order states, snapshots, persisted rows)
//! - The ten-city registry with forecast grids and settlement stations
//! - The closed error-kind set and exit-code mapping
//! - The ClickHouse repository layer and schema
//! - Token-bucket rate limiting for outbound HTTP clients

pub mod cities;
pub mod clickhouse;
pub mod error;
pub mod limiter;
pub mod types;

pub use crate::clickhouse::{RepoConfig, RepoError, Repository};
pub use crate::error::{CoreError, Result};
pub use crate::limiter::TokenBucket;
pub use crate::types::*;
