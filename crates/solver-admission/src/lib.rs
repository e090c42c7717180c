//! Admission / Rules pipeline (SPEC_FULL.md §4.E).
//!
//! Evaluates an accepted `ResolvedOrder` against an ordered list of rule
//! predicates. Rules are pure over the order plus an injected `Environment`
//! (balances, allowances, configured chains) — no rule performs I/O itself; the
//! caller (the Manager) gathers the environment beforehand.

use solver_types::{
	Address, AdmissionEvent, AdmissionVerdict, AllowBlockList, ChainId, MessagingDomain,
	ResolvedOrder, SolverEvent, TokenAmount,
};
use std::collections::HashMap;

/// Per-chain facts the rules need that aren't in the order itself.
#[derive(Debug, Clone)]
pub struct ChainEnvironment {
	pub messaging_domain: MessagingDomain,
	pub filler_enabled: bool,
}

/// Everything the rule pipeline needs besides the order: current time, configured
/// chains, and the solver's on-chain balances/allowances for every destination.
#[derive(Debug, Clone, Default)]
pub struct Environment {
	pub now: u64,
	pub min_fill_deadline_headroom_seconds: u64,
	pub chains: HashMap<ChainId, ChainEnvironment>,
	/// Keyed by (chain, token) -> solver's balance of that token on that chain.
	pub balances: HashMap<(ChainId, Address), TokenAmount>,
	/// Keyed by (chain, token, spender) -> solver's allowance to that spender.
	pub allowances: HashMap<(ChainId, Address, Address), TokenAmount>,
}

/// One admission rule. `evaluate` returns `None` to pass, or `Some(reason)` to
/// reject — letting `AdmissionService` short-circuit on the first rejection while
/// keeping each rule a plain, independently testable predicate.
pub trait AdmissionRule: Send + Sync {
	fn name(&self) -> &'static str;
	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String>;
}

/// Block list wins over allow list; if the allow list is non-empty and no entry
/// matches, reject. Applied independently to every output in the order.
pub struct AllowBlockListRule(pub AllowBlockList);

impl AdmissionRule for AllowBlockListRule {
	fn name(&self) -> &'static str {
		"allow_block_list"
	}

	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String> {
		for output in &order.max_spent {
			// Matched against the destination's configured MessagingDomain, not its
			// ChainId — the two are independent identifiers (SPEC_FULL.md §3) and an
			// unconfigured destination has no domain to check against here; that case
			// is KnownDestinationRule's concern.
			let Some(domain) = env.chains.get(&output.chain_id).map(|c| c.messaging_domain) else {
				continue;
			};
			if !self.0.is_admissible(&order.user, domain, &output.recipient) {
				return Some(format!(
					"sender/destination/recipient not admissible for destination chain {}",
					output.chain_id
				));
			}
		}
		None
	}
}

/// `fillDeadline > now + minHeadroom`.
pub struct DeadlineRule;

impl AdmissionRule for DeadlineRule {
	fn name(&self) -> &'static str {
		"deadline"
	}

	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String> {
		let min_deadline = env.now + env.min_fill_deadline_headroom_seconds;
		if order.fill_deadline <= min_deadline {
			return Some(format!(
				"fill deadline {} does not clear minimum headroom (now {}, headroom {}s)",
				order.fill_deadline, env.now, env.min_fill_deadline_headroom_seconds
			));
		}
		None
	}
}

/// Every `fillInstruction.destinationChainId` must correspond to a configured
/// chain whose filler is enabled.
pub struct KnownDestinationRule;

impl AdmissionRule for KnownDestinationRule {
	fn name(&self) -> &'static str {
		"known_destination"
	}

	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String> {
		for leg in &order.fill_instructions {
			match env.chains.get(&leg.destination_chain_id) {
				Some(chain) if chain.filler_enabled => {}
				Some(_) => {
					return Some(format!(
						"filler disabled for destination chain {}",
						leg.destination_chain_id
					))
				}
				None => {
					return Some(format!(
						"destination chain {} is not configured",
						leg.destination_chain_id
					))
				}
			}
		}
		None
	}
}

/// `destinationChainId` must resolve to the configured `MessagingDomain` that the
/// order expects; checked continuously at admission time, not just once at
/// startup (SPEC_FULL.md §9 open question 1).
pub struct DomainConsistencyRule {
	/// Maps a chain id to the messaging domain the order is expected to assert for it.
	pub expected_domains: HashMap<ChainId, MessagingDomain>,
}

impl AdmissionRule for DomainConsistencyRule {
	fn name(&self) -> &'static str {
		"domain_consistency"
	}

	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String> {
		for leg in &order.fill_instructions {
			// An unconfigured chain is KnownDestinationRule's concern, not ours —
			// assumes it runs earlier in the pipeline.
			let configured = env.chains.get(&leg.destination_chain_id)?;
			match self.expected_domains.get(&leg.destination_chain_id) {
				Some(expected) if *expected == configured.messaging_domain => {}
				Some(expected) => {
					return Some(format!(
						"chain {} messaging domain mismatch: configured {:?}, order expects {:?}",
						leg.destination_chain_id, configured.messaging_domain, expected
					))
				}
				None => {
					return Some(format!(
						"no expected messaging domain recorded for chain {}",
						leg.destination_chain_id
					))
				}
			}
		}
		None
	}
}

/// Solver's balance of each output token on each destination chain must be
/// sufficient, and its allowance to the destination settler must be sufficient
/// (an insufficient allowance alone does not reject — the filler raises an
/// Approve first; see §4.F — but an insufficient *balance* does).
pub struct SolvencyRule;

impl AdmissionRule for SolvencyRule {
	fn name(&self) -> &'static str {
		"solvency"
	}

	fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> Option<String> {
		for output in &order.max_spent {
			let balance = env
				.balances
				.get(&(output.chain_id, output.token))
				.copied()
				.unwrap_or(TokenAmount::ZERO);
			if balance < output.amount {
				return Some(format!(
					"insufficient balance on chain {} for token {}: have {}, need {}",
					output.chain_id, output.token, balance, output.amount
				));
			}
		}
		None
	}
}

/// Runs an order through an ordered rule pipeline, short-circuiting on the first
/// rejection.
pub struct AdmissionService {
	rules: Vec<Box<dyn AdmissionRule>>,
}

impl AdmissionService {
	pub fn new(rules: Vec<Box<dyn AdmissionRule>>) -> Self {
		Self { rules }
	}

	pub fn evaluate(&self, order: &ResolvedOrder, env: &Environment) -> (AdmissionVerdict, SolverEvent) {
		for rule in &self.rules {
			if let Some(reason) = rule.evaluate(order, env) {
				let detail = format!("{}: {}", rule.name(), reason);
				tracing::info!(order_id = %order.order_id_hex(), rule = rule.name(), %detail, "order rejected");
				return (
					AdmissionVerdict::Reject(detail.clone()),
					SolverEvent::Admission(AdmissionEvent::Rejected {
						order_id: order.order_id,
						reason: detail,
					}),
				);
			}
		}
		tracing::info!(order_id = %order.order_id_hex(), "order accepted");
		(
			AdmissionVerdict::Accept,
			SolverEvent::Admission(AdmissionEvent::Accepted {
				order_id: order.order_id,
			}),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use solver_types::{FillInstruction, Output};

	fn sample_order() -> ResolvedOrder {
		ResolvedOrder {
			user: Address::from_evm([1u8; 20]),
			origin_chain_id: ChainId(1),
			open_deadline: 0,
			fill_deadline: 10_000,
			order_id: [9u8; 32],
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
				origin_data: vec![],
			}],
		}
	}

	fn sample_env() -> Environment {
		let mut chains = HashMap::new();
		chains.insert(
			ChainId(2),
			ChainEnvironment {
				// Deliberately distinct from the chain id so any code that confuses
				// the two (matching against ChainId where it should match
				// MessagingDomain) fails these tests instead of passing by accident.
				messaging_domain: MessagingDomain(20),
				filler_enabled: true,
			},
		);
		let mut balances = HashMap::new();
		balances.insert(
			(ChainId(2), Address::from_evm([2u8; 20])),
			TokenAmount::from_u128(1_000),
		);
		Environment {
			now: 100,
			min_fill_deadline_headroom_seconds: 60,
			chains,
			balances,
			allowances: HashMap::new(),
		}
	}

	#[test]
	fn accepts_well_formed_order() {
		let service = AdmissionService::new(vec![
			Box::new(AllowBlockListRule(AllowBlockList::default())),
			Box::new(DeadlineRule),
			Box::new(KnownDestinationRule),
			Box::new(SolvencyRule),
		]);
		let (verdict, _) = service.evaluate(&sample_order(), &sample_env());
		assert_eq!(verdict, AdmissionVerdict::Accept);
	}

	#[test]
	fn rejects_insufficient_balance() {
		let mut env = sample_env();
		env.balances
			.insert((ChainId(2), Address::from_evm([2u8; 20])), TokenAmount::from_u128(1));
		let service = AdmissionService::new(vec![Box::new(SolvencyRule)]);
		let (verdict, _) = service.evaluate(&sample_order(), &env);
		assert!(matches!(verdict, AdmissionVerdict::Reject(_)));
	}

	#[test]
	fn rejects_unconfigured_destination() {
		let env = Environment {
			chains: HashMap::new(),
			..sample_env()
		};
		let service = AdmissionService::new(vec![Box::new(KnownDestinationRule)]);
		let (verdict, _) = service.evaluate(&sample_order(), &env);
		assert!(matches!(verdict, AdmissionVerdict::Reject(_)));
	}

	#[test]
	fn rejects_tight_deadline() {
		let mut order = sample_order();
		order.fill_deadline = 110;
		let service = AdmissionService::new(vec![Box::new(DeadlineRule)]);
		let (verdict, _) = service.evaluate(&order, &sample_env());
		assert!(matches!(verdict, AdmissionVerdict::Reject(_)));
	}

	#[test]
	fn block_list_rejects_matching_sender() {
		let mut blocklist = AllowBlockList::default();
		blocklist.block.push(solver_types::ListEntry {
			sender_address: Some(Address::from_evm([1u8; 20])),
			..Default::default()
		});
		let service = AdmissionService::new(vec![Box::new(AllowBlockListRule(blocklist))]);
		let (verdict, _) = service.evaluate(&sample_order(), &sample_env());
		assert!(matches!(verdict, AdmissionVerdict::Reject(_)));
	}

	#[test]
	fn block_list_matches_messaging_domain_not_chain_id() {
		// sample_env() gives ChainId(2) a distinct MessagingDomain(20). A block list
		// entry naming the chain id as a domain must NOT match; one naming the real
		// domain must.
		let mut by_chain_id = AllowBlockList::default();
		by_chain_id.block.push(solver_types::ListEntry {
			destination_domain: Some(MessagingDomain(2)),
			..Default::default()
		});
		let service = AdmissionService::new(vec![Box::new(AllowBlockListRule(by_chain_id))]);
		let (verdict, _) = service.evaluate(&sample_order(), &sample_env());
		assert_eq!(verdict, AdmissionVerdict::Accept);

		let mut by_domain = AllowBlockList::default();
		by_domain.block.push(solver_types::ListEntry {
			destination_domain: Some(MessagingDomain(20)),
			..Default::default()
		});
		let service = AdmissionService::new(vec![Box::new(AllowBlockListRule(by_domain))]);
		let (verdict, _) = service.evaluate(&sample_order(), &sample_env());
		assert!(matches!(verdict, AdmissionVerdict::Reject(_)));
	}

	#[test]
	fn rule_pipeline_stops_at_first_rejection() {
		let env = Environment {
			chains: HashMap::new(),
			..sample_env()
		};
		// SolvencyRule would also pass/fail independently; KnownDestinationRule must
		// short-circuit first since it's ordered first here.
		let service = AdmissionService::new(vec![Box::new(KnownDestinationRule), Box::new(SolvencyRule)]);
		let (verdict, _) = service.evaluate(&sample_order(), &env);
		match verdict {
			AdmissionVerdict::Reject(reason) => assert!(reason.contains("known_destination")),
			_ => panic!("expected rejection"),
		}
	}
}
