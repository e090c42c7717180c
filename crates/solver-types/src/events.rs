//! Event types for inter-component communication.
//!
//! Components talk to each other only through an internal event bus: the Listener
//! announces discovered orders, Admission announces verdicts, the Filler announces
//! fill progress, the Settler announces batch progress. Nothing here crosses a process
//! boundary; it is purely in-process decoupling (see SPEC_FULL.md §5).

use serde::{Deserialize, Serialize};

use crate::{ChainId, OrderStatus, ResolvedOrder};

/// Top-level event envelope, categorized by the component that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SolverEvent {
	Listener(ListenerEvent),
	Admission(AdmissionEvent),
	Filler(FillerEvent),
	Settler(SettlerEvent),
}

/// Events from the Listener (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListenerEvent {
	/// A new order was decoded from an origin `Open` event.
	OrderDiscovered { order: ResolvedOrder },
	/// The listener's checkpoint advanced for a chain.
	CheckpointAdvanced { chain_id: ChainId, block_number: u64 },
	/// The listener's provider connection for a chain degraded or recovered.
	ChainHealthChanged { chain_id: ChainId, healthy: bool },
}

/// Events from Admission (§4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdmissionEvent {
	Accepted { order_id: [u8; 32] },
	Rejected { order_id: [u8; 32], reason: String },
}

/// Events from the Filler (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FillerEvent {
	FillSubmitted {
		order_id: [u8; 32],
		destination_chain_id: ChainId,
		tx_ref: String,
	},
	FillConfirmed {
		order_id: [u8; 32],
		tx_ref: String,
	},
	FillFailed {
		order_id: [u8; 32],
		reason: String,
	},
}

/// Events from the Settler/Batcher (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlerEvent {
	QueuedForSettlement { order_id: [u8; 32] },
	BatchSubmitted { order_ids: Vec<[u8; 32]>, tx_ref: String },
	BatchConfirmed { order_ids: Vec<[u8; 32]> },
	SettlementFailed { order_id: [u8; 32], reason: String },
}

/// Status-change notification broadcast whenever an `OrderRecord` transitions, for
/// consumers (the HTTP read surface, logging) that only care about the net effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChanged {
	pub order_id: [u8; 32],
	pub from: OrderStatus,
	pub to: OrderStatus,
}
