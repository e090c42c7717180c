//! Common types shared across every solver component.
//!
//! This crate defines the canonical, runtime-independent data model the rest of the
//! workspace builds on: chain-agnostic addresses and amounts, order records and their
//! status state machine, checkpoints, allow/block lists, and the event envelopes
//! components use to talk to each other.

/// Allow/block list types used by admission and config.
pub mod admission;
/// Durable per-chain scan-progress markers.
pub mod checkpoint;
/// Event types for inter-component communication.
pub mod events;
/// Order records and the order status state machine.
pub mod order;
/// Canonical chain-agnostic primitives: addresses, amounts, orders.
pub mod primitives;
/// Factory/registry trait for pluggable implementations.
pub mod registry;
/// Zeroizing wrapper for secret material such as private keys.
pub mod secret_string;
/// Configuration schema validation types.
pub mod validation;

pub use admission::*;
pub use checkpoint::*;
pub use events::*;
pub use order::*;
pub use primitives::*;
pub use registry::*;
pub use secret_string::*;
pub use validation::*;
