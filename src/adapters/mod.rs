//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, WebSockets, child processes).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: range and verify REST services
//! - `oracle`: freshness proof service
//! - `executor`: transaction executor subprocess and dry run
//! - `feeds`: WebSocket price feed listener
//! - `metrics`: Prometheus metrics export and health checks

pub mod api;
pub mod executor;
pub mod feeds;
pub mod metrics;
pub mod oracle;
