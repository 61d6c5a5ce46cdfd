//! Service discovery document.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::response::IntoResponse;
use depot_core::config::LoginConfig;
use serde::Serialize;

/// Path prefix advertised for the module registry protocol.
pub const MODULES_V1_PATH: &str = "/v1/modules/";

#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    #[serde(rename = "modules.v1")]
    pub modules_v1: &'static str,
    #[serde(rename = "login.v1", skip_serializing_if = "Option::is_none")]
    pub login_v1: Option<LoginConfig>,
}

/// GET|HEAD /.well-known/terraform.json
pub async fn terraform_json(State(state): State<AppState>) -> impl IntoResponse {
    let document = DiscoveryDocument {
        modules_v1: MODULES_V1_PATH,
        login_v1: state.config.login.clone(),
    };
    (
        [(CACHE_CONTROL, "public, no-cache, must-revalidate")],
        Json(document),
    )
}
