//! Module registry protocol endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Header carrying the archive location on a download response.
pub const TERRAFORM_GET: HeaderName = HeaderName::from_static("x-terraform-get");

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleVersions {
    pub versions: Vec<VersionEntry>,
}

/// Response body for the version listing.
#[derive(Debug, Serialize)]
pub struct ModuleVersionsResponse {
    pub modules: Vec<ModuleVersions>,
}

/// GET /v1/modules/{namespace}/{name}/{provider}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path((namespace, name, provider)): Path<(String, String, String)>,
) -> ApiResult<Json<ModuleVersionsResponse>> {
    let versions = state
        .service
        .list_versions(&namespace, &name, &provider)
        .await?;
    if versions.is_empty() {
        return Err(ApiError::not_found());
    }

    Ok(Json(ModuleVersionsResponse {
        modules: vec![ModuleVersions {
            versions: versions
                .into_iter()
                .map(|version| VersionEntry { version })
                .collect(),
        }],
    }))
}

/// GET /v1/modules/{namespace}/{name}/{provider}/{version}/download
pub async fn download(
    State(state): State<AppState>,
    Path((namespace, name, provider, version)): Path<(String, String, String, String)>,
) -> ApiResult<Response> {
    let record = state
        .service
        .get_module(&namespace, &name, &provider, &version)
        .await?;
    let url = record.download_url.ok_or_else(|| {
        ApiError::Internal(format!("no download url for module {}", record.identity))
    })?;

    tracing::debug!(module = %record.identity, "Serving module download");
    Ok((StatusCode::NO_CONTENT, [(TERRAFORM_GET, url)]).into_response())
}
