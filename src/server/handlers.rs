//! HTTP handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::AppState;
use crate::pipeline::{ObfuscationOptions, PassSpec, PASS_REGISTRY};

/// Wire shape of a compile request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequestBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub llvm_version: Option<String>,
    #[serde(default)]
    pub obfuscation_options: Option<ObfuscationOptions>,
}

/// Wire shape of the pass listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassListing {
    pub passes: &'static [PassSpec],
    pub llvm_versions: Vec<String>,
    pub default_llvm_version: String,
}

/// An error produced before the pipeline runs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn bad_request_json(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.message
        }));
        (self.status, body).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<JsonValue> {
    Json(serde_json::json!({
        "status": "ok",
        "stats": state.orchestrator.stats(),
    }))
}

pub async fn list_passes(State(state): State<AppState>) -> Json<PassListing> {
    let config = state.orchestrator.config();
    Json(PassListing {
        passes: PASS_REGISTRY,
        llvm_versions: config.allowed_llvm_versions.clone(),
        default_llvm_version: config.default_llvm_version.clone(),
    })
}

/// Runs one compilation request.
///
/// Validation failures are 400, pipeline failures 500 with the partial
/// results, success 200.
pub async fn compile(
    State(state): State<AppState>,
    body: Result<Json<CompileRequestBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(ApiError::bad_request_json)?;
    debug!(
        llvm_version = ?body.llvm_version,
        has_options = body.obfuscation_options.is_some(),
        "Compile request"
    );

    let response = state
        .orchestrator
        .compile(
            body.code,
            body.llvm_version,
            body.obfuscation_options.unwrap_or_default(),
        )
        .await;

    let status =
        StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(response.into_body())).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_body_defaults() {
        let body: CompileRequestBody = serde_json::from_str("{}").unwrap();
        assert!(body.code.is_none());
        assert!(body.llvm_version.is_none());
        assert!(body.obfuscation_options.is_none());
    }

    #[test]
    fn test_compile_body_wire_names() {
        let body: CompileRequestBody = serde_json::from_str(
            r#"{
                "code": "int main(){}",
                "llvmVersion": "17",
                "obfuscationOptions": {"enabled": true, "pluto_flattening": true}
            }"#,
        )
        .unwrap();

        assert_eq!(body.code.as_deref(), Some("int main(){}"));
        assert_eq!(body.llvm_version.as_deref(), Some("17"));
        let options = body.obfuscation_options.unwrap();
        assert!(options.enabled);
        assert!(options.is_set("pluto_flattening"));
    }

    #[test]
    fn test_api_error_status() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
