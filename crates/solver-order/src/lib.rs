//! Filler (SPEC_FULL.md §4.F).
//!
//! Drives an accepted order's destination legs to completion: idempotency probe,
//! approval, fill submission, and outcome classification. Per-order serialization
//! (the keyed mutex map) is the Manager's concern (§4.H); this crate processes one
//! order at a time and is safe to call concurrently for distinct orders.

use backoff::{backoff::Backoff, ExponentialBackoff};
use solver_delivery::{ChainAdapter, DeliveryError};
use solver_types::{
	Address, ChainId, FillInstruction, FillerEvent, Output, ResolvedOrder, SolverEvent, TokenAmount,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillerError {
	#[error("no adapter configured for destination chain {0}")]
	UnknownDestination(ChainId),
	#[error("delivery error: {0}")]
	Delivery(#[from] DeliveryError),
}

/// Terminal-vs-retryable classification of a submission failure (SPEC_FULL.md §4.F
/// step 4 and §7 error kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
	Terminal,
	Transient,
}

fn classify(err: &DeliveryError) -> FailureClass {
	match err {
		DeliveryError::Rpc(_) | DeliveryError::Timeout(_) => FailureClass::Transient,
		DeliveryError::TransactionFailed(_) | DeliveryError::Decode(_) | DeliveryError::Configuration(_) => {
			FailureClass::Terminal
		}
	}
}

/// Outcome of driving one order through the filler.
#[derive(Debug, Clone)]
pub enum FillOutcome {
	/// Already filled (or later) on the destination chain; no transaction was sent.
	AlreadyFilled,
	/// A fill transaction was submitted and confirmed.
	Filled { tx_ref: String },
	/// Submission failed in a way that will never succeed on retry.
	Failed { reason: String },
}

/// Encodes the solver's origin-chain address as the 32-byte `solverFillerData`
/// payload a destination settler records against the fill (SPEC_FULL.md §4.F step 3).
fn solver_filler_data(solver_origin_address: Address) -> Vec<u8> {
	solver_origin_address.0.to_vec()
}

/// Drives fills for accepted orders across whichever destination chains are configured.
pub struct Filler {
	adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
	solver_origin_address: Address,
	max_attempts: u32,
}

impl Filler {
	pub fn new(
		adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
		solver_origin_address: Address,
		max_attempts: u32,
	) -> Self {
		Self {
			adapters,
			solver_origin_address,
			max_attempts,
		}
	}

	/// The solver's origin-chain address this filler fills under.
	pub fn solver_origin_address(&self) -> Address {
		self.solver_origin_address
	}

	fn adapter(&self, chain_id: ChainId) -> Result<&Arc<dyn ChainAdapter>, FillerError> {
		self.adapters
			.get(&chain_id)
			.ok_or(FillerError::UnknownDestination(chain_id))
	}

	/// Runs the full §4.F sequence for one order's first (and, for now, only actively
	/// driven) destination leg, returning the outcome plus the events to publish.
	///
	/// Multi-leg orders are processed by calling this once per leg from the Manager;
	/// each leg's settler/orderId pair is independently idempotent, so repeating the
	/// call for a leg that already succeeded is always safe (step 1 short-circuits it).
	pub async fn fill_leg(
		&self,
		order: &ResolvedOrder,
		leg_index: usize,
	) -> Result<(FillOutcome, Vec<SolverEvent>), FillerError> {
		let leg = order
			.fill_instructions
			.get(leg_index)
			.expect("leg_index must index an existing fill instruction");
		let adapter = self.adapter(leg.destination_chain_id)?;
		let mut events = Vec::new();

		// Step 1: idempotency gate.
		let status = adapter
			.query_order_status(leg.destination_settler, order.order_id)
			.await?;
		if status.is_filled_or_later() {
			tracing::info!(order_id = %order.order_id_hex(), "already filled on destination, skipping resubmission");
			return Ok((FillOutcome::AlreadyFilled, events));
		}

		// Step 2: approvals, one per output destined for this leg's chain.
		for output in order
			.max_spent
			.iter()
			.filter(|o| o.chain_id == leg.destination_chain_id)
		{
			if let Err(e) = self.ensure_allowance(adapter, output, leg.destination_settler).await {
				let reason = e.to_string();
				events.push(SolverEvent::Filler(FillerEvent::FillFailed {
					order_id: order.order_id,
					reason: reason.clone(),
				}));
				return Ok((FillOutcome::Failed { reason }, events));
			}
		}

		// Step 3 + 4: submit the fill, retrying transient failures with backoff.
		let filler_data = solver_filler_data(self.solver_origin_address);
		match self.submit_with_retry(adapter, leg, order, &filler_data).await {
			Ok(tx_ref) => {
				events.push(SolverEvent::Filler(FillerEvent::FillSubmitted {
					order_id: order.order_id,
					destination_chain_id: leg.destination_chain_id,
					tx_ref: tx_ref.clone(),
				}));
				events.push(SolverEvent::Filler(FillerEvent::FillConfirmed {
					order_id: order.order_id,
					tx_ref: tx_ref.clone(),
				}));
				Ok((FillOutcome::Filled { tx_ref }, events))
			}
			Err(reason) => {
				events.push(SolverEvent::Filler(FillerEvent::FillFailed {
					order_id: order.order_id,
					reason: reason.clone(),
				}));
				Ok((FillOutcome::Failed { reason }, events))
			}
		}
	}

	async fn ensure_allowance(
		&self,
		adapter: &Arc<dyn ChainAdapter>,
		output: &Output,
		spender: Address,
	) -> Result<(), DeliveryError> {
		let allowance = adapter
			.erc20_allowance(output.token, self.solver_address(adapter).await?, spender)
			.await?;
		if allowance < output.amount {
			adapter
				.erc20_approve(output.token, spender, output.amount)
				.await?;
		}
		Ok(())
	}

	/// The destination-chain address the solver holds the output tokens under. For
	/// every adapter today this is the same signer as on origin; kept as a hook so a
	/// future per-chain signer key doesn't require reworking the allowance check.
	async fn solver_address(&self, _adapter: &Arc<dyn ChainAdapter>) -> Result<Address, DeliveryError> {
		Ok(self.solver_origin_address)
	}

	async fn submit_with_retry(
		&self,
		adapter: &Arc<dyn ChainAdapter>,
		leg: &FillInstruction,
		order: &ResolvedOrder,
		filler_data: &[u8],
	) -> Result<String, String> {
		let mut backoff = ExponentialBackoff {
			initial_interval: Duration::from_millis(250),
			max_interval: Duration::from_secs(10),
			max_elapsed_time: Some(Duration::from_secs(60)),
			..Default::default()
		};
		let mut attempts = 0u32;
		loop {
			match adapter
				.submit_fill(leg.destination_settler, order.order_id, &leg.origin_data, filler_data)
				.await
			{
				Ok(tx_ref) => return Ok(tx_ref),
				Err(e) => {
					attempts += 1;
					match classify(&e) {
						FailureClass::Terminal => return Err(e.to_string()),
						FailureClass::Transient => {
							if attempts >= self.max_attempts {
								return Err(format!("giving up after {attempts} attempts: {e}"));
							}
							match backoff.next_backoff() {
								Some(delay) => tokio::time::sleep(delay).await,
								None => return Err(format!("backoff exhausted: {e}")),
							}
						}
					}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use solver_types::{FillInstruction, OrderStatusCode, Output, RawEvent};
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Mutex;

	struct MockAdapter {
		chain_id: ChainId,
		status: OrderStatusCode,
		allowance: TokenAmount,
		fill_calls: AtomicU32,
		fill_result: Mutex<Vec<Result<String, DeliveryError>>>,
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
			self.fill_calls.fetch_add(1, Ordering::SeqCst);
			let mut results = self.fill_result.lock().unwrap();
			if results.is_empty() {
				Ok("0xdeadbeef".to_string())
			} else {
				results.remove(0)
			}
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
			Ok(TokenAmount::ZERO)
		}
		async fn erc20_allowance(
			&self,
			_token: Address,
			_holder: Address,
			_spender: Address,
		) -> Result<TokenAmount, DeliveryError> {
			Ok(self.allowance)
		}
		async fn erc20_approve(
			&self,
			_token: Address,
			_spender: Address,
			_amount: TokenAmount,
		) -> Result<String, DeliveryError> {
			Ok("0xapprove".to_string())
		}
		async fn query_order_status(
			&self,
			_settler: Address,
			_order_id: [u8; 32],
		) -> Result<OrderStatusCode, DeliveryError> {
			Ok(self.status)
		}
	}

	fn sample_order() -> ResolvedOrder {
		ResolvedOrder {
			user: Address::from_evm([1u8; 20]),
			origin_chain_id: ChainId(1),
			open_deadline: 0,
			fill_deadline: 10_000,
			order_id: [7u8; 32],
			max_spent: vec![Output {
				token: Address::from_evm([2u8; 20]),
				amount: TokenAmount::from_u128(100),
				recipient: Address::from_evm([3u8; 20]),
				chain_id: ChainId(2),
			}],
			min_received: vec![],
			fill_instructions: vec![FillInstruction {
				destination_chain_id: ChainId(2),
				destination_settler: Address::from_evm([4u8; 20]),
				origin_data: vec![0xBE, 0xEF],
			}],
		}
	}

	#[tokio::test]
	async fn idempotency_gate_skips_already_filled() {
		let adapter: Arc<dyn ChainAdapter> = Arc::new(MockAdapter {
			chain_id: ChainId(2),
			status: OrderStatusCode::Filled,
			allowance: TokenAmount::ZERO,
			fill_calls: AtomicU32::new(0),
			fill_result: Mutex::new(vec![]),
		});
		let mut adapters = HashMap::new();
		adapters.insert(ChainId(2), adapter.clone());
		let filler = Filler::new(adapters, Address::from_evm([9u8; 20]), 3);

		let (outcome, _events) = filler.fill_leg(&sample_order(), 0).await.unwrap();
		assert!(matches!(outcome, FillOutcome::AlreadyFilled));
	}

	#[tokio::test]
	async fn insufficient_allowance_triggers_approve_then_fill() {
		let adapter: Arc<dyn ChainAdapter> = Arc::new(MockAdapter {
			chain_id: ChainId(2),
			status: OrderStatusCode::Opened,
			allowance: TokenAmount::ZERO,
			fill_calls: AtomicU32::new(0),
			fill_result: Mutex::new(vec![]),
		});
		let mut adapters = HashMap::new();
		adapters.insert(ChainId(2), adapter.clone());
		let filler = Filler::new(adapters, Address::from_evm([9u8; 20]), 3);

		let (outcome, events) = filler.fill_leg(&sample_order(), 0).await.unwrap();
		match outcome {
			FillOutcome::Filled { tx_ref } => assert_eq!(tx_ref, "0xdeadbeef"),
			other => panic!("expected Filled, got {other:?}"),
		}
		assert_eq!(events.len(), 2);
	}

	#[tokio::test]
	async fn terminal_revert_does_not_retry() {
		let concrete = Arc::new(MockAdapter {
			chain_id: ChainId(2),
			status: OrderStatusCode::Opened,
			allowance: TokenAmount::from_u128(1_000),
			fill_calls: AtomicU32::new(0),
			fill_result: Mutex::new(vec![Err(DeliveryError::TransactionFailed(
				"deadline expired".to_string(),
			))]),
		});
		let mut adapters: HashMap<ChainId, Arc<dyn ChainAdapter>> = HashMap::new();
		adapters.insert(ChainId(2), concrete.clone());
		let filler = Filler::new(adapters, Address::from_evm([9u8; 20]), 3);

		let (outcome, _events) = filler.fill_leg(&sample_order(), 0).await.unwrap();
		assert!(matches!(outcome, FillOutcome::Failed { .. }));
		assert_eq!(concrete.fill_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unknown_destination_is_rejected() {
		let filler = Filler::new(HashMap::new(), Address::from_evm([9u8; 20]), 3);
		let err = filler.fill_leg(&sample_order(), 0).await.unwrap_err();
		assert!(matches!(err, FillerError::UnknownDestination(_)));
	}
}
