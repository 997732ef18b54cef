// Branch Registry - REST API with Axum
//
// Thin HTTP surface over BranchRegistry. Every response uses the
// { success, data, error } envelope.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::entities::{BranchPatch, NewBranch};
use crate::error::RegistryError;
use crate::registry::BranchRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BranchRegistry>,
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    id: String,
}

fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::Conflict(_) => StatusCode::CONFLICT,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Persistence(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/branches[?active=true] - Loaded branches, ordered by name
async fn list_branches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let branches = match query.active {
        Some(true) => state.registry.active_branches(),
        _ => state.registry.branches(),
    };
    Json(ApiResponse::ok(branches))
}

/// POST /api/branches/reload - Re-fetch from the store
async fn reload_branches(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.registry.load().await))
}

/// POST /api/branches - Create a branch
async fn create_branch(
    State(state): State<AppState>,
    Json(fields): Json<NewBranch>,
) -> Result<impl IntoResponse, RegistryError> {
    let branch = state.registry.create(fields).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(branch))))
}

/// PATCH /api/branches/:id - Partial update
async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<BranchPatch>,
) -> Result<impl IntoResponse, RegistryError> {
    let branch = state.registry.update(&id, patch).await?;
    Ok(Json(ApiResponse::ok(branch)))
}

/// DELETE /api/branches/:id
async fn delete_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RegistryError> {
    state.registry.delete(&id).await?;
    Ok(Json(ApiResponse::ok(id)))
}

/// GET /api/branches/current - Active branch (null when none)
async fn current_branch(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.registry.current_branch()))
}

/// PUT /api/branches/current - Switch the active branch
async fn switch_branch(
    State(state): State<AppState>,
    Json(request): Json<SwitchRequest>,
) -> Result<impl IntoResponse, RegistryError> {
    let branch = state.registry.switch_branch(&request.id)?;
    Ok(Json(ApiResponse::ok(branch)))
}

// ============================================================================
// Router
// ============================================================================

/// Routes mounted under `/api`, with permissive CORS
pub fn router(registry: Arc<BranchRegistry>) -> Router {
    let state = AppState { registry };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/branches", get(list_branches).post(create_branch))
        .route("/branches/reload", post(reload_branches))
        .route("/branches/current", get(current_branch).put(switch_branch))
        .route("/branches/:id", patch(update_branch).delete(delete_branch))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::test_support::harness;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(&[], None).await;
        let app = router(h.registry.clone());

        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "data": "OK"}));
    }

    #[tokio::test]
    async fn test_list_and_current_after_reload() {
        let h = harness(&[("1", "Alpha"), ("2", "Beta")], None).await;
        let app = router(h.registry.clone());

        let (_, body) = call(&app, "GET", "/api/branches", None).await;
        assert_eq!(body["data"], json!([]));

        let (status, body) = call(&app, "POST", "/api/branches/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = call(&app, "GET", "/api/branches/current", None).await;
        assert_eq!(body["data"]["id"], "1");
    }

    #[tokio::test]
    async fn test_create_maps_errors_to_status_codes() {
        let h = harness(&[("1", "Alpha")], None).await;
        h.registry.load().await;
        let app = router(h.registry.clone());

        let (status, body) = call(
            &app,
            "POST",
            "/api/branches",
            Some(json!({"name": "Beta", "address": "2 Elm", "city": "Springfield"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["name"], "Beta");
        assert_eq!(body["data"]["country"], "USA");

        let (status, body) = call(
            &app,
            "POST",
            "/api/branches",
            Some(json!({"name": "Alpha", "address": "elsewhere"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, body) = call(
            &app,
            "POST",
            "/api/branches",
            Some(json!({"name": "  ", "address": "X"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "name is required");

        h.gateway.fail_with(GatewayError::Failure("backend down".into()));
        let (status, _) = call(
            &app,
            "POST",
            "/api/branches",
            Some(json!({"name": "Gamma", "address": "3 Oak"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_switch_update_and_delete() {
        let h = harness(&[("1", "Alpha"), ("2", "Beta")], None).await;
        h.registry.load().await;
        let app = router(h.registry.clone());

        let (status, body) =
            call(&app, "PUT", "/api/branches/current", Some(json!({"id": "2"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "2");
        assert_eq!(h.stored().as_deref(), Some("2"));

        let (status, _) =
            call(&app, "PUT", "/api/branches/current", Some(json!({"id": "missing"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            "PATCH",
            "/api/branches/2",
            Some(json!({"phone": "555-0100", "city": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phone"], "555-0100");

        let (status, _) = call(&app, "PATCH", "/api/branches/nope", Some(json!({"name": "X"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "DELETE", "/api/branches/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.registry.current_branch_id().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let h = harness(&[("1", "Alpha"), ("2", "Beta")], None).await;
        h.registry.load().await;
        let app = router(h.registry.clone());

        call(&app, "PATCH", "/api/branches/1", Some(json!({"is_active": false}))).await;

        let (_, body) = call(&app, "GET", "/api/branches?active=true", None).await;
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["2"]);
    }
}
