//! REST Service Adapters
//!
//! HTTP access to the range and verify services, sharing one
//! rate-limited client.
//!
//! Sub-modules:
//! - `client`: HTTP client with a concurrency cap and request-rate limiter
//! - `range`: `RangeSource` over `GET /bucket/range`
//! - `verify`: `VerifyService` over `GET /verify/<ids>`
//! - `types`: wire request/response types

pub mod client;
pub mod range;
pub mod types;
pub mod verify;

pub use client::{RestClient, RestClientConfig};
pub use range::HttpRangeSource;
pub use verify::HttpVerifyService;
