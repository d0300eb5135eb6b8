//! # API Shared
//!
//! Shared utilities and definitions for the EHR APIs.
//!
//! Contains:
//! - JSON wire types with OpenAPI schemas (`wire` module)
//! - Shared services like `HealthService`
//! - Credential extraction for the gated external endpoints
//!
//! Used by `api-rest`.

pub mod auth;
pub mod health;
pub mod wire;

pub use health::HealthService;
pub use wire::*;
