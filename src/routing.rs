//! Routing table: successor list and de Bruijn fingers
//!
//! A [`Node`] is a read-only, shared handle (`Arc<Node>`) into a ring. Its
//! routing arrays — the successor list and the de Bruijn finger array — are
//! wired by the surrounding membership subsystem (here, [`crate::ring`] for
//! tests) once, at construction time, and never touched again: the lookup
//! engine only ever reads `succ(j)`/`finger(j)` through shared references,
//! matching the single-threaded, read-only-snapshot contract of spec §5.
//!
//! The two arrays are populated via [`Node::set_routing`], a one-shot
//! `OnceLock`-backed setter. This gives the construction phase (which is
//! necessarily cyclic — `succ[0]` of the last node points back to the
//! first) a place to finish wiring the ring without requiring `unsafe` or
//! interior-mutable state that could be touched again during a lookup.

#![forbid(unsafe_code)]

use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::identifier::Identifier;

/// Index into a node's successor list, `j ∈ [0, backup_successors)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SuccIdx(pub usize);
impl SuccIdx {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Index into a node's de Bruijn finger array, `j ∈ [0, degree)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FingerIdx(pub usize);
impl FingerIdx {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Errors raised while wiring or inspecting a routing table.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// [`Node::set_routing`] was called more than once on the same node.
    #[error("routing table already wired for node {id}")]
    AlreadyWired {
        /// The node that was already wired.
        id: Identifier,
    },
    /// The successor list did not have exactly `backup_successors` entries.
    #[error("successor list length {got} does not match configured backup_successors {want}")]
    SuccLenMismatch {
        /// Observed length.
        got: usize,
        /// Configured length.
        want: usize,
    },
    /// The finger array did not have exactly `degree` entries.
    #[error("finger array length {got} does not match configured degree {want}")]
    FingerLenMismatch {
        /// Observed length.
        got: usize,
        /// Configured length.
        want: usize,
    },
}

/// A participant in the ring.
///
/// `id` and `cfg` are fixed at construction. `succ`/`fingers` start empty
/// and are wired exactly once via [`Node::set_routing`] before any lookup
/// may be performed against the ring; [`Node::succ`]/[`Node::finger`] panic
/// if called before wiring, since that would indicate a malformed setup
/// rather than a recoverable runtime condition.
#[derive(Debug)]
pub struct Node {
    id: Identifier,
    cfg: Config,
    succ: OnceLock<Vec<Arc<Node>>>,
    fingers: OnceLock<Vec<Arc<Node>>>,
}

impl Node {
    /// Construct a node with an as-yet-unwired routing table.
    pub fn new(id: Identifier, cfg: Config) -> Arc<Node> {
        Arc::new(Node {
            id,
            cfg,
            succ: OnceLock::new(),
            fingers: OnceLock::new(),
        })
    }

    /// This node's identifier.
    #[inline]
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// This node's configuration.
    #[inline]
    pub fn cfg(&self) -> Config {
        self.cfg
    }

    /// Wire the successor list and de Bruijn finger array. Called once by
    /// the membership/ring-construction subsystem; idempotent calls with
    /// identical contents are rejected just as loudly as conflicting ones,
    /// since a second call always indicates a bug in the caller.
    pub fn set_routing(
        &self,
        succ: Vec<Arc<Node>>,
        fingers: Vec<Arc<Node>>,
    ) -> Result<(), RoutingError> {
        if succ.len() != self.cfg.backup_successors() as usize {
            return Err(RoutingError::SuccLenMismatch {
                got: succ.len(),
                want: self.cfg.backup_successors() as usize,
            });
        }
        if fingers.len() != self.cfg.degree() as usize {
            return Err(RoutingError::FingerLenMismatch {
                got: fingers.len(),
                want: self.cfg.degree() as usize,
            });
        }
        self.succ
            .set(succ)
            .map_err(|_| RoutingError::AlreadyWired { id: self.id })?;
        self.fingers
            .set(fingers)
            .map_err(|_| RoutingError::AlreadyWired { id: self.id })?;
        Ok(())
    }

    /// The `j`-th successor (`j`-th closest clockwise neighbour).
    ///
    /// # Panics
    /// Panics if `j` is out of range or the routing table has not been
    /// wired yet — both indicate a malformed ring, not a runtime error a
    /// lookup caller could meaningfully recover from.
    #[inline]
    pub fn succ(&self, j: SuccIdx) -> &Arc<Node> {
        &self.wired_succ()[j.as_usize()]
    }

    /// The `j`-th de Bruijn finger.
    ///
    /// # Panics
    /// See [`Node::succ`].
    #[inline]
    pub fn finger(&self, j: FingerIdx) -> &Arc<Node> {
        &self.wired_fingers()[j.as_usize()]
    }

    #[inline]
    fn wired_succ(&self) -> &Vec<Arc<Node>> {
        self.succ
            .get()
            .expect("routing table not wired before use")
    }

    #[inline]
    fn wired_fingers(&self) -> &Vec<Arc<Node>> {
        self.fingers
            .get()
            .expect("routing table not wired before use")
    }
}

/// Errors surfaced by [`verify_invariants`].
#[derive(Debug, thiserror::Error)]
pub enum InvariantViolation {
    /// Two nodes in the ring share an identifier.
    #[error("duplicate identifier {id} in ring")]
    DuplicateId {
        /// The offending shared identifier.
        id: Identifier,
    },
    /// `succ(0)` is not the closest clockwise node (some other node lies
    /// strictly inside `[self.id, succ(0).id)`).
    #[error("node {id}: succ(0) = {succ0} is not the closest clockwise neighbour")]
    SuccZeroNotClosest {
        /// The node under inspection.
        id: Identifier,
        /// Its claimed nearest successor.
        succ0: Identifier,
    },
    /// `succ[j+1]` is not `succ[j]`'s immediate clockwise successor.
    #[error("node {id}: succ({j}) = {succ_j} is not the predecessor of succ({j1}) = {succ_j1}")]
    SuccChainBroken {
        /// The node under inspection.
        id: Identifier,
        /// Index `j`.
        j: usize,
        /// `succ(j)`'s identifier.
        succ_j: Identifier,
        /// Index `j+1`.
        j1: usize,
        /// `succ(j+1)`'s identifier.
        succ_j1: Identifier,
    },
    /// `d[0]` does not satisfy `(self.id << degree_shift) mod 2^256 ∈
    /// (d[0].id, d[0].succ(0).id]`.
    #[error("node {id}: finger(0) = {finger0} does not bracket 2*id on the de Bruijn path")]
    FingerZeroMisplaced {
        /// The node under inspection.
        id: Identifier,
        /// Its claimed `d[0]`.
        finger0: Identifier,
    },
    /// `d[j]` does not equal `d[j-1].succ(0)` for `j > 0`.
    #[error("node {id}: finger({j}) = {finger_j} != finger({j_minus_1}).succ(0) = {expected}")]
    FingerChainBroken {
        /// The node under inspection.
        id: Identifier,
        /// Index `j`.
        j: usize,
        /// `finger(j)`'s identifier.
        finger_j: Identifier,
        /// Index `j-1`.
        j_minus_1: usize,
        /// Expected identifier, `finger(j-1).succ(0).id`.
        expected: Identifier,
    },
}

/// Check every invariant of spec §3.3 on a fully-wired ring.
///
/// Intended for use by tests and by a membership subsystem's own
/// self-checks before handing routing state to the lookup engine; the
/// lookup engine itself assumes these invariants hold and does not
/// re-verify them on the hot path (Design Note 9.6).
pub fn verify_invariants(nodes: &[Arc<Node>]) -> Result<(), InvariantViolation> {
    use crate::identifier::in_excl_incl;

    let mut seen = std::collections::HashSet::new();
    for n in nodes {
        if !seen.insert(n.id()) {
            return Err(InvariantViolation::DuplicateId { id: n.id() });
        }
    }

    for n in nodes {
        let succ0 = n.succ(SuccIdx(0));
        for other in nodes {
            if std::ptr::eq(other.as_ref(), n.as_ref()) || std::ptr::eq(other.as_ref(), succ0.as_ref()) {
                continue;
            }
            // Ids are unique (checked above), so `other.id() != succ0.id()` here
            // always holds; `in_excl_incl` including the right bound therefore
            // only fires when `other` lies strictly inside (n.id, succ0.id).
            if in_excl_incl(other.id(), n.id(), succ0.id()) {
                return Err(InvariantViolation::SuccZeroNotClosest {
                    id: n.id(),
                    succ0: succ0.id(),
                });
            }
        }

        let s = n.cfg().backup_successors() as usize;
        for j in 0..s.saturating_sub(1) {
            let succ_j = n.succ(SuccIdx(j));
            let succ_j1 = n.succ(SuccIdx(j + 1));
            if succ_j.succ(SuccIdx(0)).id() != succ_j1.id() {
                return Err(InvariantViolation::SuccChainBroken {
                    id: n.id(),
                    j,
                    succ_j: succ_j.id(),
                    j1: j + 1,
                    succ_j1: succ_j1.id(),
                });
            }
        }

        let finger0 = n.finger(FingerIdx(0));
        let doubled = n.id().shl(n.cfg().degree_shift());
        if !in_excl_incl(doubled, finger0.id(), finger0.succ(SuccIdx(0)).id()) {
            return Err(InvariantViolation::FingerZeroMisplaced {
                id: n.id(),
                finger0: finger0.id(),
            });
        }

        let d = n.cfg().degree() as usize;
        for j in 1..d {
            let finger_j = n.finger(FingerIdx(j));
            let expected = n.finger(FingerIdx(j - 1)).succ(SuccIdx(0));
            if finger_j.id() != expected.id() {
                return Err(InvariantViolation::FingerChainBroken {
                    id: n.id(),
                    j,
                    finger_j: finger_j.id(),
                    j_minus_1: j - 1,
                    expected: expected.id(),
                });
            }
        }
    }

    Ok(())
}
