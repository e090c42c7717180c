//! `/orders/:id` handler: read-only order status lookup (SPEC_FULL.md §10).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use solver_core::SolverEngine;
use solver_types::order::OrderRecord;

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
	error: String,
}

pub enum OrderError {
	InvalidId(String),
	NotFound(String),
}

impl IntoResponse for OrderError {
	fn into_response(self) -> axum::response::Response {
		let (status, message) = match self {
			OrderError::InvalidId(id) => (StatusCode::BAD_REQUEST, format!("invalid order id: {id}")),
			OrderError::NotFound(id) => (StatusCode::NOT_FOUND, format!("order not found: {id}")),
		};
		(status, Json(ErrorBody { error: message })).into_response()
	}
}

/// Looks up one order by its 32-byte id, hex-encoded with or without a `0x` prefix.
pub async fn get_order_by_id(id: &str, engine: &SolverEngine) -> Result<OrderRecord, OrderError> {
	let order_id = parse_order_id(id).ok_or_else(|| OrderError::InvalidId(id.to_string()))?;
	engine
		.order_store()
		.get(order_id)
		.await
		.ok_or_else(|| OrderError::NotFound(id.to_string()))
}

fn parse_order_id(id: &str) -> Option<[u8; 32]> {
	let bytes = hex::decode(id.trim_start_matches("0x")).ok()?;
	bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_hex_ids_with_and_without_prefix() {
		let id = [7u8; 32];
		let hex_id = hex::encode(id);
		assert_eq!(parse_order_id(&hex_id), Some(id));
		assert_eq!(parse_order_id(&format!("0x{hex_id}")), Some(id));
	}

	#[test]
	fn rejects_malformed_ids() {
		assert_eq!(parse_order_id("not-hex"), None);
		assert_eq!(parse_order_id("aabb"), None);
	}
}
