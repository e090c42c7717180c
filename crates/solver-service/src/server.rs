//! Read-only HTTP status surface for the solver (SPEC_FULL.md §10).
//!
//! Exposes `/health` and `/orders/:id`; no quote or order-submission endpoints —
//! those stand outside this specification's scope.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::get,
	Router,
};
use solver_config::ApiConfig;
use solver_core::SolverEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
	engine: Arc<SolverEngine>,
}

pub async fn start_server(api_config: ApiConfig, engine: Arc<SolverEngine>) -> anyhow::Result<()> {
	let app_state = AppState { engine };

	let app = Router::new()
		.route("/health", get(handle_health))
		.route("/orders/{id}", get(handle_get_order_by_id))
		.layer(CorsLayer::permissive())
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!(%bind_address, "status server starting");

	axum::serve(listener, app).await?;
	Ok(())
}

async fn handle_health() -> impl IntoResponse {
	StatusCode::OK
}

async fn handle_get_order_by_id(Path(id): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
	match crate::apis::order::get_order_by_id(&id, &state.engine).await {
		Ok(response) => Json(response).into_response(),
		Err(e) => e.into_response(),
	}
}
