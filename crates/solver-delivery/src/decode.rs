//! Shared decode-time validation (SPEC_FULL.md §4.C): rejects events whose `user`/
//! `orderId` deserialize to zero, whose `fillInstructions` is empty, or whose
//! `fillDeadline <= now`. Runtime-specific wire decoding lives in
//! `implementations::{evm,hc}`.

use crate::DeliveryError;
use solver_types::ResolvedOrder;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn validate_resolved_order(order: &ResolvedOrder) -> Result<(), DeliveryError> {
	if order.user.is_zero() {
		return Err(DeliveryError::Decode("order user is zero address".into()));
	}
	if order.order_id == [0u8; 32] {
		return Err(DeliveryError::Decode("order id is zero".into()));
	}
	if order.fill_instructions.is_empty() {
		return Err(DeliveryError::Decode(
			"order has no fill instructions".into(),
		));
	}
	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);
	if order.fill_deadline <= now {
		return Err(DeliveryError::Decode(format!(
			"fill deadline {} has already passed (now {})",
			order.fill_deadline, now
		)));
	}
	Ok(())
}
