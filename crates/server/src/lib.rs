//! HTTP module registry server for depot.
//!
//! This crate provides:
//! - The Terraform module registry protocol (version listing, download)
//! - Service discovery at `/.well-known/terraform.json`
//! - Bearer token access control with pluggable providers
//! - Graceful shutdown

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod service;
pub mod state;

pub use auth::{AccessGate, AuthError, AuthProvider, StaticTokenProvider};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{serve, shutdown_on_signal};
pub use service::RegistryService;
pub use state::AppState;
