//! Order record and status state machine.
//!
//! An `OrderRecord` is the durable, canonical view of one cross-chain order as it
//! moves through discovery, admission, fill, and settlement. Status transitions are
//! validated against a fixed table: every edge the solver is allowed to take is listed
//! explicitly, everything else is rejected before it reaches storage.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::{ChainId, ResolvedOrder};

/// Current position of an order in its lifecycle (SPEC_FULL.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Decoded from an origin `Open` event, not yet evaluated by admission.
	Seen,
	/// Passed admission, eligible for filling.
	Accepted,
	/// Rejected by admission; the reason is kept for observability.
	Rejected(String),
	/// A fill transaction has been submitted and is awaiting confirmation.
	Filling,
	/// The fill transaction confirmed on the destination chain.
	Filled { fill_tx_ref: String },
	/// Queued for inclusion in the next settlement batch.
	SettleQueued,
	/// The settlement/claim transaction confirmed on the origin chain.
	Settled,
	/// Terminal failure outside the fill/settle happy path (expired, reorged away, etc).
	Failed(String),
}

impl OrderStatus {
	fn kind(&self) -> OrderStatusKind {
		match self {
			OrderStatus::Seen => OrderStatusKind::Seen,
			OrderStatus::Accepted => OrderStatusKind::Accepted,
			OrderStatus::Rejected(_) => OrderStatusKind::Rejected,
			OrderStatus::Filling => OrderStatusKind::Filling,
			OrderStatus::Filled { .. } => OrderStatusKind::Filled,
			OrderStatus::SettleQueued => OrderStatusKind::SettleQueued,
			OrderStatus::Settled => OrderStatusKind::Settled,
			OrderStatus::Failed(_) => OrderStatusKind::Failed,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self.kind(),
			OrderStatusKind::Rejected | OrderStatusKind::Settled | OrderStatusKind::Failed
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OrderStatusKind {
	Seen,
	Accepted,
	Rejected,
	Filling,
	Filled,
	SettleQueued,
	Settled,
	Failed,
}

static TRANSITIONS: Lazy<HashMap<OrderStatusKind, HashSet<OrderStatusKind>>> = Lazy::new(|| {
	use OrderStatusKind::*;
	let mut m = HashMap::new();
	m.insert(Seen, HashSet::from([Accepted, Rejected, Failed]));
	m.insert(Accepted, HashSet::from([Filling, Failed]));
	m.insert(Rejected, HashSet::new());
	m.insert(Filling, HashSet::from([Filled, Failed]));
	m.insert(Filled, HashSet::from([SettleQueued, Failed]));
	m.insert(SettleQueued, HashSet::from([Settled, Failed]));
	m.insert(Settled, HashSet::new());
	m.insert(Failed, HashSet::new());
	m
});

/// Checks whether `from -> to` is a transition the state machine permits
/// (SPEC_FULL.md §8 invariant 1: status only ever advances along these edges).
pub fn is_valid_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
	TRANSITIONS
		.get(&from.kind())
		.is_some_and(|set| set.contains(&to.kind()))
}

#[derive(Debug, thiserror::Error)]
pub enum OrderTransitionError {
	#[error("invalid order status transition from {from:?} to {to:?}")]
	Invalid { from: OrderStatus, to: OrderStatus },
}

/// Durable record of one order, keyed by `order_id` in the checkpoint/order store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
	pub order_id: [u8; 32],
	pub origin_chain_id: ChainId,
	pub status: OrderStatus,
	pub resolved: ResolvedOrder,
	pub first_seen_at: u64,
	pub updated_at: u64,
	/// Number of fill submission attempts, used for retry/backoff decisions.
	pub fill_attempts: u32,
}

impl OrderRecord {
	pub fn new(resolved: ResolvedOrder, now: u64) -> Self {
		let origin_chain_id = resolved.origin_chain_id;
		let order_id = resolved.order_id;
		OrderRecord {
			order_id,
			origin_chain_id,
			status: OrderStatus::Seen,
			resolved,
			first_seen_at: now,
			updated_at: now,
			fill_attempts: 0,
		}
	}

	/// Applies a validated transition, updating `updated_at`. Rejects edges the state
	/// machine does not list, leaving `self` untouched.
	pub fn transition(&mut self, to: OrderStatus, now: u64) -> Result<(), OrderTransitionError> {
		if !is_valid_transition(&self.status, &to) {
			return Err(OrderTransitionError::Invalid {
				from: self.status.clone(),
				to,
			});
		}
		self.status = to;
		self.updated_at = now;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Address;

	fn sample_resolved() -> ResolvedOrder {
		ResolvedOrder {
			user: Address::ZERO,
			origin_chain_id: ChainId(1),
			open_deadline: 100,
			fill_deadline: 200,
			order_id: [7u8; 32],
			max_spent: vec![],
			min_received: vec![],
			fill_instructions: vec![],
		}
	}

	#[test]
	fn happy_path_sequence_is_valid() {
		let mut rec = OrderRecord::new(sample_resolved(), 0);
		rec.transition(OrderStatus::Accepted, 1).unwrap();
		rec.transition(OrderStatus::Filling, 2).unwrap();
		rec.transition(
			OrderStatus::Filled {
				fill_tx_ref: "0xabc".into(),
			},
			3,
		)
		.unwrap();
		rec.transition(OrderStatus::SettleQueued, 4).unwrap();
		rec.transition(OrderStatus::Settled, 5).unwrap();
		assert!(rec.status.is_terminal());
	}

	#[test]
	fn cannot_skip_accepted() {
		let mut rec = OrderRecord::new(sample_resolved(), 0);
		let err = rec.transition(OrderStatus::Filling, 1);
		assert!(err.is_err());
		assert_eq!(rec.status, OrderStatus::Seen);
	}

	#[test]
	fn cannot_leave_terminal_state() {
		let mut rec = OrderRecord::new(sample_resolved(), 0);
		rec.transition(OrderStatus::Rejected("blocked".into()), 1)
			.unwrap();
		assert!(rec
			.transition(OrderStatus::Accepted, 2)
			.is_err());
	}

	#[test]
	fn failed_reachable_from_every_nonterminal_state() {
		use OrderStatus::*;
		let nonterminal = [
			Seen,
			Accepted,
			Filling,
			Filled {
				fill_tx_ref: "x".into(),
			},
			SettleQueued,
		];
		for s in nonterminal {
			assert!(is_valid_transition(&s, &Failed("boom".into())), "{:?}", s);
		}
	}
}
