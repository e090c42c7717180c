//! Allow/block list types shared between config and the Admission component (§4.E).

use serde::{Deserialize, Serialize};

use crate::{Address, MessagingDomain};

/// One entry in an allow or block list. Any field left `None` matches everything for
/// that dimension ("*" in config). `destination_domain` matches the destination's
/// `MessagingDomain`, not its `ChainId` — the two are configured independently and
/// are not interchangeable (SPEC_FULL.md §3, §9 open question 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListEntry {
	pub sender_address: Option<Address>,
	pub destination_domain: Option<MessagingDomain>,
	pub recipient_address: Option<Address>,
}

impl ListEntry {
	pub fn matches(&self, sender: &Address, destination: MessagingDomain, recipient: &Address) -> bool {
		self.sender_address.as_ref().is_none_or(|a| a == sender)
			&& self.destination_domain.is_none_or(|d| d == destination)
			&& self.recipient_address.as_ref().is_none_or(|a| a == recipient)
	}
}

/// Allow/block list pair. An order is admissible only if it matches the allow list
/// (or the allow list is empty, meaning "allow all") and matches no block list entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowBlockList {
	pub allow: Vec<ListEntry>,
	pub block: Vec<ListEntry>,
}

impl AllowBlockList {
	pub fn is_admissible(
		&self,
		sender: &Address,
		destination: MessagingDomain,
		recipient: &Address,
	) -> bool {
		let blocked = self
			.block
			.iter()
			.any(|e| e.matches(sender, destination, recipient));
		if blocked {
			return false;
		}
		self.allow.is_empty()
			|| self
				.allow
				.iter()
				.any(|e| e.matches(sender, destination, recipient))
	}
}

/// Outcome of running an order through the Admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionVerdict {
	Accept,
	Reject(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_allow_list_allows_all_when_not_blocked() {
		let list = AllowBlockList::default();
		assert!(list.is_admissible(&Address::ZERO, MessagingDomain(1), &Address::ZERO));
	}

	#[test]
	fn block_list_wins_over_allow_list() {
		let addr = Address::from_evm([1u8; 20]);
		let list = AllowBlockList {
			allow: vec![ListEntry {
				sender_address: Some(addr),
				..Default::default()
			}],
			block: vec![ListEntry {
				sender_address: Some(addr),
				..Default::default()
			}],
		};
		assert!(!list.is_admissible(&addr, MessagingDomain(1), &Address::ZERO));
	}

	#[test]
	fn non_matching_allow_list_rejects() {
		let addr = Address::from_evm([2u8; 20]);
		let other = Address::from_evm([3u8; 20]);
		let list = AllowBlockList {
			allow: vec![ListEntry {
				sender_address: Some(addr),
				..Default::default()
			}],
			block: vec![],
		};
		assert!(!list.is_admissible(&other, MessagingDomain(1), &Address::ZERO));
	}
}
