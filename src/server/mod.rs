//! HTTP transport for the formulation pipeline.
//!
//! # Endpoints
//!
//! - `GET  /health`                  : Liveness probe
//! - `POST /api/formulation/generate`: Generate a validated formula
//! - `POST /api/formulation/validate`: Validate a draft formula

pub mod routes;

pub use routes::{app_router, AppState, GenerateRequest, GenerateResponse, ValidateResponse};
