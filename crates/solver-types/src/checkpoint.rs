//! Durable per-chain scan-progress marker, owned by the Checkpoint Store (§4.B).

use serde::{Deserialize, Serialize};

use crate::ChainId;

/// The listener's last durably-committed position on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
	pub chain_id: ChainId,
	/// Last block whose events were fully processed and acknowledged by every
	/// downstream handler. The next scan resumes at `last_indexed_block + 1`.
	pub last_indexed_block: u64,
	pub last_updated: u64,
}

impl ChainCheckpoint {
	pub fn genesis(chain_id: ChainId, start_block: u64, now: u64) -> Self {
		ChainCheckpoint {
			chain_id,
			last_indexed_block: start_block.saturating_sub(1),
			last_updated: now,
		}
	}

	pub fn advance(&mut self, block_number: u64, now: u64) {
		self.last_indexed_block = self.last_indexed_block.max(block_number);
		self.last_updated = now;
	}
}

/// Whole-file persisted shape: one checkpoint per chain, written atomically together
/// so a crash never leaves one chain's checkpoint ahead of another's on-disk image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
	pub chains: Vec<ChainCheckpoint>,
}

impl Checkpoint {
	pub fn get(&self, chain_id: ChainId) -> Option<&ChainCheckpoint> {
		self.chains.iter().find(|c| c.chain_id == chain_id)
	}

	pub fn upsert(&mut self, cp: ChainCheckpoint) {
		match self.chains.iter_mut().find(|c| c.chain_id == cp.chain_id) {
			Some(existing) => *existing = cp,
			None => self.chains.push(cp),
		}
	}
}
