//! REST control surface for a running simulation.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ecosim_core::{GridSnapshot, IterationSummary};
use tracing::{debug, error, info, warn};

use crate::control::{ControlError, ControlHandle, HistoryQuery};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Configuration for starting the control server.
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub rest_address: SocketAddr,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            rest_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Clone)]
struct AppState {
    handle: ControlHandle,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        if self.is_client_error() {
            warn!(error = %message, "rejected control request");
            (StatusCode::BAD_REQUEST, message).into_response()
        } else {
            error!(error = %message, "control request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

/// Build the router serving the front-end page and the control endpoints.
pub fn router(handle: ControlHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/start-simulation", post(start_simulation))
        .route("/next-iteration", get(next_iteration))
        .route("/summary", get(summary))
        .route("/history", get(history))
        .with_state(AppState { handle })
}

/// Bind `config.rest_address` and serve until `shutdown` resolves.
pub async fn serve(
    handle: ControlHandle,
    config: ControlServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.rest_address)
        .await
        .with_context(|| format!("failed to bind {}", config.rest_address))?;
    let addr = listener.local_addr().context("listener has no address")?;
    info!("ecosim control surface listening on http://{addr}");
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(shutdown)
        .await
        .context("control server exited unexpectedly")
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn start_simulation(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<GridSnapshot>, ControlError> {
    debug!(bytes = body.len(), "start-simulation requested");
    run_blocking(move || state.handle.start_from_json(&body))
        .await
        .map(Json)
}

async fn next_iteration(
    State(state): State<AppState>,
) -> Result<Json<GridSnapshot>, ControlError> {
    debug!("next-iteration requested");
    run_blocking(move || state.handle.next_iteration())
        .await
        .map(Json)
}

async fn summary(State(state): State<AppState>) -> Result<Json<IterationSummary>, ControlError> {
    run_blocking(move || state.handle.latest_summary())
        .await
        .map(Json)
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<IterationSummary>>, ControlError> {
    let limit = query.limit.unwrap_or(HistoryQuery::DEFAULT_LIMIT);
    run_blocking(move || state.handle.history(limit))
        .await
        .map(Json)
}

/// Iterations park on condition variables; keep them off the async workers.
async fn run_blocking<T, F>(task: F) -> Result<T, ControlError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ControlError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ControlError::Join(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosim_core::SimulationError;
    use std::time::Duration;

    #[test]
    fn iteration_timeout_is_a_server_error() {
        let err = ControlError::from(SimulationError::IterationTimeout {
            completed: 0,
            expected: 1,
            waited: Duration::from_millis(20),
        });
        assert!(!err.is_client_error());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn over_capacity_is_a_bad_request() {
        let err = ControlError::from(SimulationError::TooManyEntities {
            requested: 10,
            capacity: 9,
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
