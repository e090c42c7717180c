//! Listener (SPEC_FULL.md §4.D): one cooperative polling loop per chain.
//!
//! A `Listener` owns a chain's adapter and decoder, its checkpoint, and a handler
//! that absorbs discovered events. It never interprets events itself beyond
//! decoding — acceptance, filling, and settlement all live downstream, reached
//! only through `EventHandler`.

use std::sync::Arc;
use std::time::Duration;

use solver_delivery::{ChainAdapter, DeliveryError, EventDecoder};
use solver_storage::{now_unix, CheckpointError, CheckpointStore};
use solver_types::{Address, ChainId, FillEvent, RawEvent, ResolvedOrder};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("checkpoint error: {0}")]
	Checkpoint(#[from] CheckpointError),
}

/// An event kind a `Listener` can be configured to watch. Only `Open` is named in
/// the origin-discovery algorithm, but destination-side fill confirmation and
/// origin-side settlement observation reuse the identical polling/checkpoint
/// mechanism against a different topic (SPEC_FULL.md §4.G), so the loop itself is
/// generic over which one a given instance watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedEvent {
	Open,
	Filled,
}

/// A decoded event handed to the consumer handler, tagged by which kind it is.
#[derive(Debug, Clone)]
pub enum DecodedEvent {
	Open(ResolvedOrder),
	Filled(FillEvent),
}

/// Consumes events discovered by a `Listener`. Must be idempotent: a window can be
/// re-delivered in full if a prior attempt only partially succeeded, since the
/// checkpoint only advances once every event in the window has been acknowledged.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
	async fn handle(&self, event: DecodedEvent, chain_id: ChainId, block_number: u64) -> bool;
}

/// One chain's polling loop (SPEC_FULL.md §4.D).
pub struct Listener {
	chain_id: ChainId,
	adapter: Arc<dyn ChainAdapter>,
	decoder: Arc<dyn EventDecoder>,
	checkpoints: Arc<CheckpointStore>,
	handler: Arc<dyn EventHandler>,
	settler: Address,
	watched: WatchedEvent,
	start_block: u64,
	poll_interval: Duration,
	max_block_range: u64,
	confirmation_blocks: u64,
}

impl Listener {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		chain_id: ChainId,
		adapter: Arc<dyn ChainAdapter>,
		decoder: Arc<dyn EventDecoder>,
		checkpoints: Arc<CheckpointStore>,
		handler: Arc<dyn EventHandler>,
		settler: Address,
		watched: WatchedEvent,
		start_block: u64,
		poll_interval: Duration,
		max_block_range: u64,
		confirmation_blocks: u64,
	) -> Self {
		Listener {
			chain_id,
			adapter,
			decoder,
			checkpoints,
			handler,
			settler,
			watched,
			start_block,
			poll_interval,
			max_block_range,
			confirmation_blocks,
		}
	}

	/// Runs until `cancel` fires. Back-fills unthrottled on startup (a window is
	/// immediately followed by another if the chain is still behind tip); once
	/// caught up, sleeps `pollInterval` between empty polls. Adapter errors are
	/// logged and retried after a sleep — this loop never panics and never exits
	/// on its own short of cancellation.
	pub async fn run(&self, cancel: CancellationToken) {
		loop {
			if cancel.is_cancelled() {
				return;
			}

			let advanced = match self.poll_once().await {
				Ok(advanced) => advanced,
				Err(e) => {
					tracing::warn!(chain_id = %self.chain_id, error = %e, "listener poll failed, retrying after backoff");
					false
				}
			};

			if advanced {
				// Unthrottled backfill: immediately check whether another window
				// is ready rather than waiting out the full poll interval.
				continue;
			}

			tokio::select! {
				_ = tokio::time::sleep(self.poll_interval) => {}
				_ = cancel.cancelled() => return,
			}
		}
	}

	/// Runs a single poll: computes the window, scans, decodes, delivers in
	/// order, and advances the checkpoint iff every event in the window was
	/// acknowledged. Returns whether the window had a non-empty range to scan
	/// (used by `run` to decide whether to skip the sleep).
	async fn poll_once(&self) -> Result<bool, DiscoveryError> {
		let last_indexed = self
			.checkpoints
			.get_chain(self.chain_id)
			.await?
			.map(|cp| cp.last_indexed_block)
			.unwrap_or(self.start_block.saturating_sub(1));

		let from = last_indexed + 1;
		let tip = self.adapter.tip().await?;
		let safe_tip = tip.saturating_sub(self.confirmation_blocks);
		if safe_tip < from {
			return Ok(false);
		}
		let to = safe_tip.min(from + self.max_block_range - 1);
		if to < from {
			return Ok(false);
		}

		let topic = match self.watched {
			WatchedEvent::Open => self.decoder.open_topic(),
			WatchedEvent::Filled => self.decoder.filled_topic(),
		};

		let mut raw = self
			.adapter
			.scan_events(self.settler, vec![topic], from, to)
			.await?;
		raw.sort_by_key(|e| (e.block_number, e.log_index));

		for event in &raw {
			let decoded = self.decode(event)?;
			let ok = self
				.handler
				.handle(decoded, self.chain_id, event.block_number)
				.await;
			if !ok {
				// Leave the checkpoint where it is; the whole window is retried
				// on the next poll and the handler's own idempotency absorbs the
				// events it already processed successfully.
				return Ok(false);
			}
		}

		self.checkpoints
			.update(solver_types::ChainCheckpoint {
				chain_id: self.chain_id,
				last_indexed_block: to,
				last_updated: now_unix(),
			})
			.await?;

		Ok(true)
	}

	fn decode(&self, raw: &RawEvent) -> Result<DecodedEvent, DiscoveryError> {
		match self.watched {
			WatchedEvent::Open => Ok(DecodedEvent::Open(self.decoder.decode_open(raw)?)),
			WatchedEvent::Filled => Ok(DecodedEvent::Filled(self.decoder.decode_filled(raw)?)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use solver_types::{OrderStatusCode, TokenAmount};
	use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
	use std::sync::Mutex;

	struct MockAdapter {
		chain_id: ChainId,
		tip: AtomicU64,
		events: Mutex<Vec<RawEvent>>,
	}

	#[async_trait]
	impl ChainAdapter for MockAdapter {
		fn chain_id(&self) -> ChainId {
			self.chain_id
		}

		async fn tip(&self) -> Result<u64, DeliveryError> {
			Ok(self.tip.load(Ordering::SeqCst))
		}

		async fn scan_events(
			&self,
			_contract: Address,
			_topics: Vec<[u8; 32]>,
			from_block: u64,
			to_block: u64,
		) -> Result<Vec<RawEvent>, DeliveryError> {
			Ok(self
				.events
				.lock()
				.unwrap()
				.iter()
				.filter(|e| e.block_number >= from_block && e.block_number <= to_block)
				.cloned()
				.collect())
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
			_order_ids: &[[u8; 32]],
			_fee_value: TokenAmount,
		) -> Result<String, DeliveryError> {
			unimplemented!()
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

	struct MockDecoder;

	impl EventDecoder for MockDecoder {
		fn decode_open(&self, raw: &RawEvent) -> Result<ResolvedOrder, DeliveryError> {
			Ok(ResolvedOrder {
				user: Address::ZERO,
				origin_chain_id: raw.chain_id,
				open_deadline: 0,
				fill_deadline: 0,
				order_id: {
					let mut id = [0u8; 32];
					id[31] = raw.log_index as u8;
					id
				},
				max_spent: vec![],
				min_received: vec![],
				fill_instructions: vec![],
			})
		}

		fn decode_filled(&self, _raw: &RawEvent) -> Result<FillEvent, DeliveryError> {
			unimplemented!()
		}

		fn open_topic(&self) -> [u8; 32] {
			[0xAA; 32]
		}

		fn filled_topic(&self) -> [u8; 32] {
			[0xBB; 32]
		}
	}

	fn raw_event(chain_id: ChainId, block_number: u64, log_index: u64) -> RawEvent {
		RawEvent {
			chain_id,
			block_number,
			log_index,
			tx_hash: vec![0; 32],
			topics: vec![vec![0xAA; 32]],
			data: vec![],
		}
	}

	struct CountingHandler {
		seen: Mutex<Vec<(u64, u64)>>,
		accept: AtomicBool,
	}

	impl CountingHandler {
		fn new(accept: bool) -> Self {
			CountingHandler {
				seen: Mutex::new(Vec::new()),
				accept: AtomicBool::new(accept),
			}
		}
	}

	#[async_trait]
	impl EventHandler for CountingHandler {
		async fn handle(&self, event: DecodedEvent, _chain_id: ChainId, block_number: u64) -> bool {
			if let DecodedEvent::Open(order) = event {
				self.seen
					.lock()
					.unwrap()
					.push((block_number, order.order_id[31] as u64));
			}
			self.accept.load(Ordering::SeqCst)
		}
	}

	fn listener(
		adapter: Arc<MockAdapter>,
		handler: Arc<CountingHandler>,
		checkpoints: Arc<CheckpointStore>,
		max_block_range: u64,
		confirmation_blocks: u64,
	) -> Listener {
		Listener::new(
			ChainId(1),
			adapter,
			Arc::new(MockDecoder),
			checkpoints,
			handler,
			Address::ZERO,
			WatchedEvent::Open,
			1,
			Duration::from_millis(10),
			max_block_range,
			confirmation_blocks,
		)
	}

	#[tokio::test]
	async fn advances_checkpoint_when_all_events_acknowledged() {
		let dir = tempfile::TempDir::new().unwrap();
		let checkpoints = Arc::new(CheckpointStore::new(dir.path().join("checkpoint.json")));
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(1),
			tip: AtomicU64::new(10),
			events: Mutex::new(vec![raw_event(ChainId(1), 5, 0), raw_event(ChainId(1), 5, 1)]),
		});
		let handler = Arc::new(CountingHandler::new(true));
		let l = listener(adapter, handler.clone(), checkpoints.clone(), 500, 2);

		let advanced = l.poll_once().await.unwrap();
		assert!(advanced);
		assert_eq!(handler.seen.lock().unwrap().len(), 2);

		let cp = checkpoints.get_chain(ChainId(1)).await.unwrap().unwrap();
		assert_eq!(cp.last_indexed_block, 8); // safe_tip = 10 - 2
	}

	#[tokio::test]
	async fn checkpoint_does_not_advance_when_handler_rejects() {
		let dir = tempfile::TempDir::new().unwrap();
		let checkpoints = Arc::new(CheckpointStore::new(dir.path().join("checkpoint.json")));
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(1),
			tip: AtomicU64::new(10),
			events: Mutex::new(vec![raw_event(ChainId(1), 5, 0)]),
		});
		let handler = Arc::new(CountingHandler::new(false));
		let l = listener(adapter, handler, checkpoints.clone(), 500, 2);

		let advanced = l.poll_once().await.unwrap();
		assert!(!advanced);
		assert!(checkpoints.get_chain(ChainId(1)).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn window_respects_confirmation_blocks_and_max_range() {
		let dir = tempfile::TempDir::new().unwrap();
		let checkpoints = Arc::new(CheckpointStore::new(dir.path().join("checkpoint.json")));
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(1),
			tip: AtomicU64::new(1000),
			events: Mutex::new(vec![]),
		});
		let handler = Arc::new(CountingHandler::new(true));
		let l = listener(adapter, handler, checkpoints.clone(), 100, 2);

		l.poll_once().await.unwrap();
		let cp = checkpoints.get_chain(ChainId(1)).await.unwrap().unwrap();
		// from = 1, safe_tip = 998, to = min(998, 1 + 100 - 1) = 100
		assert_eq!(cp.last_indexed_block, 100);
	}

	#[tokio::test]
	async fn no_poll_when_tip_not_past_confirmation_depth() {
		let dir = tempfile::TempDir::new().unwrap();
		let checkpoints = Arc::new(CheckpointStore::new(dir.path().join("checkpoint.json")));
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(1),
			tip: AtomicU64::new(1),
			events: Mutex::new(vec![]),
		});
		let handler = Arc::new(CountingHandler::new(true));
		let l = listener(adapter, handler, checkpoints.clone(), 500, 2);

		let advanced = l.poll_once().await.unwrap();
		assert!(!advanced);
		assert!(checkpoints.get_chain(ChainId(1)).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn backfill_continues_across_consecutive_windows() {
		let dir = tempfile::TempDir::new().unwrap();
		let checkpoints = Arc::new(CheckpointStore::new(dir.path().join("checkpoint.json")));
		let adapter = Arc::new(MockAdapter {
			chain_id: ChainId(1),
			tip: AtomicU64::new(500),
			events: Mutex::new(vec![]),
		});
		let handler = Arc::new(CountingHandler::new(true));
		let l = listener(adapter, handler, checkpoints.clone(), 100, 0);

		assert!(l.poll_once().await.unwrap());
		let cp = checkpoints.get_chain(ChainId(1)).await.unwrap().unwrap();
		assert_eq!(cp.last_indexed_block, 100);

		assert!(l.poll_once().await.unwrap());
		let cp = checkpoints.get_chain(ChainId(1)).await.unwrap().unwrap();
		assert_eq!(cp.last_indexed_block, 200);
	}
}
