//! Access control for the module endpoints.
//!
//! The gate holds an ordered list of providers. With no providers configured
//! every request is let through; otherwise a bearer token is required and the
//! first provider that accepts it admits the request.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use depot_core::config::AuthConfig;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};

/// Failure inside a provider. Logged and treated as "no decision".
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AuthError(pub String);

/// A source of truth for bearer tokens.
pub trait AuthProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decide whether `token` grants access to `request`.
    fn verify(&self, request: &Request, token: &str) -> Result<bool, AuthError>;
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Accepts a fixed set of tokens. Only their SHA-256 digests are kept.
pub struct StaticTokenProvider {
    digests: Vec<[u8; 32]>,
}

impl StaticTokenProvider {
    /// Each entry may hold several comma separated tokens; empty pieces are
    /// dropped. Tokens are taken verbatim, whitespace included.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = tokens
            .into_iter()
            .flat_map(|entry| {
                entry
                    .as_ref()
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(digest)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { digests }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl AuthProvider for StaticTokenProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn verify(&self, _request: &Request, token: &str) -> Result<bool, AuthError> {
        let presented = digest(token);
        // Every digest is compared so timing does not depend on which one matched.
        let matched = self
            .digests
            .iter()
            .fold(Choice::from(0), |acc, known| acc | known[..].ct_eq(&presented[..]));
        Ok(bool::from(matched))
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Ordered chain of auth providers.
#[derive(Clone, Default)]
pub struct AccessGate {
    providers: Vec<Arc<dyn AuthProvider>>,
}

impl AccessGate {
    pub fn new(providers: Vec<Arc<dyn AuthProvider>>) -> Self {
        Self { providers }
    }

    /// Build the gate from configuration. The static provider is only added
    /// when at least one token is configured.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut providers: Vec<Arc<dyn AuthProvider>> = Vec::new();
        let static_tokens = StaticTokenProvider::new(&config.static_tokens);
        if !static_tokens.is_empty() {
            tracing::info!(tokens = static_tokens.len(), "Static token provider enabled");
            providers.push(Arc::new(static_tokens));
        }
        Self::new(providers)
    }

    /// Whether every request is admitted without a token.
    pub fn is_open(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn authorize(&self, req: &Request) -> Result<(), ApiError> {
        if self.is_open() {
            return Ok(());
        }

        let token = extract_bearer_token(req).ok_or_else(ApiError::unauthorized)?;

        for provider in &self.providers {
            match provider.verify(req, token) {
                Ok(true) => {
                    tracing::debug!(provider = provider.name(), "Request authorized");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "Auth provider failed, trying next"
                    );
                }
            }
        }

        Err(ApiError::unauthorized())
    }
}

/// Authentication middleware for the module endpoints.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.gate.authorize(&req)?;
    Ok(next.run(req).await)
}
