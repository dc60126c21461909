//! Crate root: public surface and protocol-wide invariants
//!
//! This module is the single canonical entry point for downstream users. It
//! centralizes the module list and re-exports the small set of types a
//! caller needs to build a ring and perform lookups.
//!
//! ## Invariants
//!
//! - **Key space.** Identifiers and keys are both 256-bit values on a
//!   circular namespace of size `2^256`. All arithmetic is wrap-around;
//!   there is no "invalid identifier".
//! - **Read-only lookups.** A lookup only ever reads routing state
//!   (`succ[*]`, `fingers[*]`, `id`) through shared [`std::sync::Arc`]
//!   handles. Nothing is mutated once [`routing::Node::set_routing`] has
//!   wired a node; concurrent lookups against the same ring therefore
//!   require no synchronization.
//! - **No unsafe.** `#![forbid(unsafe_code)]` throughout the crate.
//! - **Precise failure.** The only failure mode at lookup time is
//!   [`lookup::LookupError::Unreachable`], carrying the full diagnostic
//!   tuple `(key, origin, virtual_node, key_shift, hops)` for post-mortem
//!   analysis. A well-formed ring (§3.3's invariants, checked by
//!   [`routing::verify_invariants`]) never produces one.
//!
//! These invariants are enforced by design across the submodules. If any
//! is violated at runtime, the failure mode is a precise error, never UB.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// 256-bit ring identifiers and the wrap-aware interval predicates.
pub mod identifier;
/// Immutable per-node configuration (degree, degree_shift, backup_successors).
pub mod config;
/// Routing table: successor list, de Bruijn fingers, invariant checks.
pub mod routing;
/// The lookup engine: `best_start` and the iterative `step` loop.
pub mod lookup;
/// Static ring construction, for tests and as a membership-subsystem stand-in.
pub mod ring;

// ============================================================================
// Root-level re-exports (centralization)
// ============================================================================

/// 256-bit ring identifier. Re-exported from `identifier` so downstream
/// code can `use koorde::Identifier;` without reaching into the submodule.
pub use identifier::Identifier;

/// Per-node configuration and its validation error.
pub use config::{Config, ConfigError};

/// A ring participant, and the errors that can arise wiring its routing
/// table or checking its invariants.
pub use routing::{verify_invariants, InvariantViolation, Node, RoutingError};

/// The lookup entry point lives as [`lookup::lookup`]; its error
/// type is re-exported here.
pub use lookup::LookupError;

/// Static ring construction helper and its error type.
pub use ring::{build_static_ring, RingBuildError};
