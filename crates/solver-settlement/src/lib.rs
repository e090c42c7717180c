//! Settler (Batcher) — SPEC_FULL.md §4.G.
//!
//! Maintains a queue of `Filled` order ids per destination chain (that is the
//! chain a batch's `submitSettle` call actually lands on — see DESIGN.md's Open
//! Question decision on "per origin chain" vs. "per destination chain"
//! grouping). At a configurable cadence, or once a queue reaches `batch_max`,
//! flushes the queue in a single `submit_settle` call. The batcher's job ends at
//! submission: origin-side `SETTLED` transition is observed by that chain's own
//! Listener watching the settler's event, same mechanism as `Open`.

use solver_delivery::{ChainAdapter, DeliveryError};
use solver_types::{Address, ChainId, SettlerEvent, SolverEvent, TokenAmount};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SettlerError {
	#[error("no adapter configured for destination chain {0}")]
	UnknownDestination(ChainId),
	#[error("no settler address configured for destination chain {0}")]
	UnknownSettler(ChainId),
	#[error("delivery error: {0}")]
	Delivery(#[from] DeliveryError),
}

#[derive(Debug, Default)]
struct ChainQueue {
	order_ids: Vec<[u8; 32]>,
}

/// Per-destination-chain settlement queue and flush cadence.
pub struct Batcher {
	adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
	settlers: HashMap<ChainId, Address>,
	fee_values: HashMap<ChainId, TokenAmount>,
	queues: Mutex<HashMap<ChainId, ChainQueue>>,
	batch_max: usize,
	cadence: Duration,
}

impl Batcher {
	pub fn new(
		adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
		settlers: HashMap<ChainId, Address>,
		fee_values: HashMap<ChainId, TokenAmount>,
		batch_max: usize,
		cadence: Duration,
	) -> Self {
		Batcher {
			adapters,
			settlers,
			fee_values,
			queues: Mutex::new(HashMap::new()),
			batch_max,
			cadence,
		}
	}

	/// Queues a `Filled` order id for settlement on `destination_chain_id`. Returns
	/// `true` if the queue crossed `batch_max` and should be flushed immediately
	/// rather than waiting for the next cadence tick.
	pub async fn enqueue(&self, destination_chain_id: ChainId, order_id: [u8; 32]) -> bool {
		let mut queues = self.queues.lock().await;
		let queue = queues.entry(destination_chain_id).or_default();
		queue.order_ids.push(order_id);
		queue.order_ids.len() >= self.batch_max
	}

	/// Flushes every non-empty queue, one `submit_settle` call per destination
	/// chain. A chain whose submission fails keeps its order ids queued (along
	/// with anything enqueued concurrently) for the next attempt; other chains'
	/// flushes are unaffected.
	pub async fn flush_all(&self) -> Vec<SolverEvent> {
		let chain_ids: Vec<ChainId> = {
			let queues = self.queues.lock().await;
			queues
				.iter()
				.filter(|(_, q)| !q.order_ids.is_empty())
				.map(|(c, _)| *c)
				.collect()
		};

		let mut events = Vec::new();
		for chain_id in chain_ids {
			events.extend(self.flush_chain(chain_id).await);
		}
		events
	}

	async fn flush_chain(&self, destination_chain_id: ChainId) -> Vec<SolverEvent> {
		let batch = {
			let mut queues = self.queues.lock().await;
			match queues.get_mut(&destination_chain_id) {
				Some(q) if !q.order_ids.is_empty() => std::mem::take(&mut q.order_ids),
				_ => return Vec::new(),
			}
		};

		match self.submit_settle(destination_chain_id, &batch).await {
			Ok(tx_ref) => vec![SolverEvent::Settler(SettlerEvent::BatchSubmitted {
				order_ids: batch,
				tx_ref,
			})],
			Err(e) => {
				tracing::warn!(chain_id = %destination_chain_id, error = %e, "settlement batch submission failed, re-queuing");
				let mut queues = self.queues.lock().await;
				queues
					.entry(destination_chain_id)
					.or_default()
					.order_ids
					.extend(batch.iter().copied());
				batch
					.into_iter()
					.map(|order_id| {
						SolverEvent::Settler(SettlerEvent::SettlementFailed {
							order_id,
							reason: e.to_string(),
						})
					})
					.collect()
			}
		}
	}

	async fn submit_settle(
		&self,
		destination_chain_id: ChainId,
		order_ids: &[[u8; 32]],
	) -> Result<String, SettlerError> {
		let adapter = self
			.adapters
			.get(&destination_chain_id)
			.ok_or(SettlerError::UnknownDestination(destination_chain_id))?;
		let settler = self
			.settlers
			.get(&destination_chain_id)
			.copied()
			.ok_or(SettlerError::UnknownSettler(destination_chain_id))?;
		let fee_value = self
			.fee_values
			.get(&destination_chain_id)
			.copied()
			.unwrap_or(TokenAmount::ZERO);

		Ok(adapter.submit_settle(settler, order_ids, fee_value).await?)
	}

	/// Runs the cadence loop until `cancel` fires: sleeps `cadence`, then flushes
	/// every non-empty queue. `enqueue`'s `batch_max` early-flush is the caller's
	/// responsibility to act on (typically by calling `flush_all` right away); this
	/// loop only guarantees a queue is never stuck waiting longer than `cadence`.
	pub async fn run(&self, cancel: CancellationToken) {
		loop {
			tokio::select! {
				_ = tokio::time::sleep(self.cadence) => {}
				_ = cancel.cancelled() => return,
			}
			let events = self.flush_all().await;
			for event in events {
				tracing::debug!(?event, "settlement batch event");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use solver_types::{OrderStatusCode, RawEvent};
	use std::sync::atomic::{AtomicU32, Ordering};

	struct MockAdapter {
		chain_id: ChainId,
		calls: AtomicU32,
		fail_next: std::sync::atomic::AtomicBool,
	}

	#[async_trait]
	impl ChainAdapter for MockAdapter {
		fn chain_id(&self) -> ChainId {
			self.chain_id
		}

		async fn tip(&self) -> Result<u64, DeliveryError> {
			Ok(0)
		}

		async fn scan_events(
			&self,
			_contract: Address,
			_topics: Vec<[u8; 32]>,
			_from_block: u64,
			_to_block: u64,
		) -> Result<Vec<RawEvent>, DeliveryError> {
			Ok(vec![])
		}

		async fn submit_fill(
			&self,
			_settler: Address,
			_order_id: [u8; 32],
			_origin_data: &[u8],
			_filler_data: &[u8],
		) -> Result<String, DeliveryError> {
			unimplemented!()
		}

		async fn submit_settle(
			&self,
			_settler: Address,
			order_ids: &[[u8; 32]],
			_fee_value: TokenAmount,
		) -> Result<String, DeliveryError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if self.fail_next.swap(false, Ordering::SeqCst) {
				return Err(DeliveryError::Rpc("simulated outage".into()));
			}
			Ok(format!("settle-tx-{}", order_ids.len()))
		}

		async fn erc20_balance(&self, _token: Address, _holder: Address) -> Result<TokenAmount, DeliveryError> {
			unimplemented!()
		}

		async fn erc20_allowance(
			&self,
			_token: Address,
			_holder: Address,
			_spender: Address,
		) -> Result<TokenAmount, DeliveryError> {
			unimplemented!()
		}

		async fn erc20_approve(
			&self,
			_token: Address,
			_spender: Address,
			_amount: TokenAmount,
		) -> Result<String, DeliveryError> {
			unimplemented!()
		}

		async fn query_order_status(
			&self,
			_settler: Address,
			_order_id: [u8; 32],
		) -> Result<OrderStatusCode, DeliveryError> {
			unimplemented!()
		}
	}

	fn order_id(tag: u8) -> [u8; 32] {
		let mut id = [0u8; 32];
		id[31] = tag;
		id
	}

	fn batcher(adapter: Arc<MockAdapter>, batch_max: usize) -> Batcher {
		let mut adapters: HashMap<ChainId, Arc<dyn ChainAdapter>> = HashMap::new();
		adapters.insert(ChainId(10), adapter);
		let mut settlers = HashMap::new();
		settlers.insert(ChainId(10), Address::ZERO);
		Batcher::new(adapters, settlers, HashMap::new(), batch_max, Duration::from_secs(60))
	}

	#[tokio::test]
	async fn enqueue_signals_flush_once_batch_max_reached() {
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(10),
			calls: AtomicU32::new(0),
			fail_next: std::sync::atomic::AtomicBool::new(false),
		});
		let b = batcher(adapter, 2);

		assert!(!b.enqueue(ChainId(10), order_id(1)).await);
		assert!(b.enqueue(ChainId(10), order_id(2)).await);
	}

	#[tokio::test]
	async fn flush_all_submits_one_batch_per_chain() {
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(10),
			calls: AtomicU32::new(0),
			fail_next: std::sync::atomic::AtomicBool::new(false),
		});
		let b = batcher(adapter.clone(), 10);
		b.enqueue(ChainId(10), order_id(1)).await;
		b.enqueue(ChainId(10), order_id(2)).await;
		b.enqueue(ChainId(10), order_id(3)).await;

		let events = b.flush_all().await;
		assert_eq!(events.len(), 1);
		assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
		assert!(matches!(
			&events[0],
			SolverEvent::Settler(SettlerEvent::BatchSubmitted { order_ids, .. }) if order_ids.len() == 3
		));

		// queue is empty now; a second flush is a no-op
		let events = b.flush_all().await;
		assert!(events.is_empty());
	}

	#[tokio::test]
	async fn failed_submission_requeues_the_batch() {
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(10),
			calls: AtomicU32::new(0),
			fail_next: std::sync::atomic::AtomicBool::new(true),
		});
		let b = batcher(adapter.clone(), 10);
		b.enqueue(ChainId(10), order_id(1)).await;

		let events = b.flush_all().await;
		assert!(matches!(&events[0], SolverEvent::Settler(SettlerEvent::SettlementFailed { .. })));

		// requeued: a subsequent flush (now succeeding) picks it back up
		let events = b.flush_all().await;
		assert!(matches!(&events[0], SolverEvent::Settler(SettlerEvent::BatchSubmitted { .. })));
		assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn unknown_destination_is_reported_as_a_failure_per_order() {
		let b = Batcher::new(HashMap::new(), HashMap::new(), HashMap::new(), 10, Duration::from_secs(60));
		b.enqueue(ChainId(99), order_id(1)).await;
		b.enqueue(ChainId(99), order_id(2)).await;

		let events = b.flush_all().await;
		assert_eq!(events.len(), 2);
		assert!(events
			.iter()
			.all(|e| matches!(e, SolverEvent::Settler(SettlerEvent::SettlementFailed { .. }))));
	}
}
