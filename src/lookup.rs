//! The lookup engine
//!
//! This module is the whole reason the crate exists: `best_start` and the
//! iterative `step` loop that together implement Koorde lookup.
//!
//! ## Shape of a lookup
//!
//! 1. [`lookup`] clones the key into a scratch `k_shift` register and
//!    calls [`best_start`] to pick an initial virtual de Bruijn node `i`
//!    that lies on the one path segment `self` controls —
//!    `(self.id, self.succ(0).id]` — while pre-consuming as large a prefix
//!    of the key as possible.
//! 2. [`step`] then iterates, each hop evaluating three cases in order:
//!    **owned** (the current node or one of its successors is responsible
//!    — terminate), **forward** (the virtual pointer is still on this
//!    node's controlled arc — advance it one de Bruijn hop and recurse into
//!    the matching finger), **correct** (the virtual pointer has drifted
//!    off this node's arc — hand off along the successor list towards a
//!    closer predecessor of `i`).
//!
//! Per Design Note 9.2, `step` is an explicit loop rebinding
//! `(self, k_shift, i)` each hop rather than a recursive call, so a lookup's
//! stack depth never grows with hop count.

#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::{debug, trace, trace_span};

use crate::identifier::{in_excl_incl, Identifier};
use crate::routing::{FingerIdx, Node, SuccIdx};

/// `KEY_SPACE`, the width of the identifier ring in bits.
const KEY_SPACE: u32 = Identifier::BITS;

/// Extra hops of slack above the theoretical `⌈256 / degree_shift⌉ + s`
/// bound before a lookup gives up and reports [`LookupError::Unreachable`].
const HOP_SLACK: u32 = 4;

/// Errors raised by [`lookup`].
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// No case (owned / forward / correct) applied at some hop. Indicates a
    /// malformed ring or a bug; there is no partial result to fall back to.
    #[error(
        "lookup unreachable: key={key}, origin={origin}, virtual_node={virtual_node}, \
         key_shift={key_shift}, hops={hops}"
    )]
    Unreachable {
        /// The key being looked up.
        key: Identifier,
        /// The node that started the lookup.
        origin: Identifier,
        /// The virtual de Bruijn node `i` at the point of failure.
        virtual_node: Identifier,
        /// The remaining `k_shift` register at the point of failure.
        key_shift: Identifier,
        /// Number of hops taken before failure.
        hops: u32,
    },
    /// The hop ceiling (`⌈256 / degree_shift⌉ + backup_successors + 4`) was
    /// exceeded without reaching case A. Distinguished from [`Self::Unreachable`]
    /// so diagnosis can tell "no case matched" apart from "termination never
    /// arrived"; both indicate the same underlying malformed-ring condition.
    #[error(
        "lookup did not terminate within the hop ceiling: key={key}, origin={origin}, \
         virtual_node={virtual_node}, key_shift={key_shift}, hops={hops}"
    )]
    HopCeilingExceeded {
        /// The key being looked up.
        key: Identifier,
        /// The node that started the lookup.
        origin: Identifier,
        /// The virtual de Bruijn node `i` at the point of failure.
        virtual_node: Identifier,
        /// The remaining `k_shift` register at the point of failure.
        key_shift: Identifier,
        /// Number of hops taken before failure.
        hops: u32,
    },
}

/// Return the node responsible for key `k`: the unique node `n` such that
/// `k ∈ (pred(n).id, n.id]` on the ring.
///
/// `start` may be any node in the ring; Property P2 guarantees every choice
/// of `start` yields the same answer on a well-formed ring.
pub fn lookup(start: &Arc<Node>, k: Identifier) -> Result<Arc<Node>, LookupError> {
    let span = trace_span!("lookup", origin = %start.id(), key = %k);
    let _enter = span.enter();

    let (k_shift, i) = best_start(start, k);
    step(start, k, k_shift, i)
}

/// Choose the initial virtual de Bruijn node `i` on the path
/// `(self.id, self.succ(0).id]`, placing as many high-order bits of `k` as
/// possible into the low bits of `i`.
///
/// Returns `(k_shift, i)` where `k_shift` is `k` with the consumed prefix
/// shifted out.
pub(crate) fn best_start(node: &Arc<Node>, k: Identifier) -> (Identifier, Identifier) {
    let shift = node.cfg().degree_shift();
    debug_assert!(shift >= 1 && shift < KEY_SPACE, "degree_shift out of range");

    let succ0 = node.succ(SuccIdx(0));

    // Signed loop counter (Design Note 9.4): j ranges over
    // KEY_SPACE - shift, KEY_SPACE - 2*shift, ..., down to (and including) 0.
    let mut j = KEY_SPACE as i64 - shift as i64;
    while j >= 0 {
        let ju = j as u32;

        // Smallest identifier > self.id sharing the high (256 - ju) bits
        // with self.id: clear the low ju bits, then add the unit at bit ju.
        let mut i = node.id().clear_low_bits(ju).wrapping_add(Identifier::ONE.shl(ju));
        // Overlay the top ju bits of k into the low ju bits of i.
        i = i.bitor(k.shr(KEY_SPACE - ju));

        if in_excl_incl(i, node.id(), succ0.id()) {
            debug!(bits_consumed = ju, "best_start match");
            return (k.shl(ju), i);
        }

        j -= shift as i64;
    }

    debug!("best_start: no match, starting immediately above self");
    (k, node.id().wrapping_add(Identifier::ONE))
}

/// Iterative lookup step. Evaluates the owned / forward / correct cases in
/// order at each hop, rebinding `(node, k_shift, i)` in place rather than
/// recursing (Design Note 9.2).
pub(crate) fn step(
    start: &Arc<Node>,
    k: Identifier,
    mut k_shift: Identifier,
    mut i: Identifier,
) -> Result<Arc<Node>, LookupError> {
    let hop_ceiling = KEY_SPACE.div_ceil(start.cfg().degree_shift()) + start.cfg().backup_successors() + HOP_SLACK;

    let mut node = Arc::clone(start);
    let mut hops: u32 = 0;

    loop {
        if hops > hop_ceiling {
            return Err(LookupError::HopCeilingExceeded {
                key: k,
                origin: start.id(),
                virtual_node: i,
                key_shift: k_shift,
                hops,
            });
        }

        // Case A: owned.
        let succ0 = node.succ(SuccIdx(0));
        if in_excl_incl(k, node.id(), succ0.id()) {
            trace!(node = %node.id(), case = "owned", hop = hops, "terminating at succ(0)");
            return Ok(Arc::clone(succ0));
        }
        let s = node.cfg().backup_successors() as usize;
        let mut owned_via_succ_list = None;
        for j in 0..s.saturating_sub(1) {
            let succ_j = node.succ(SuccIdx(j));
            let succ_j1 = node.succ(SuccIdx(j + 1));
            if in_excl_incl(k, succ_j.id(), succ_j1.id()) {
                owned_via_succ_list = Some(Arc::clone(succ_j1));
                break;
            }
        }
        if let Some(owner) = owned_via_succ_list {
            trace!(node = %node.id(), case = "owned", hop = hops, "terminating via successor list");
            return Ok(owner);
        }

        // Case B: forward.
        if in_excl_incl(i, node.id(), succ0.id()) {
            let shift = node.cfg().degree_shift();
            let top_bits = k_shift.shr(KEY_SPACE - shift);
            i = i.shl(shift).bitor(top_bits);
            k_shift = k_shift.shl(shift);

            let degree = node.cfg().degree() as usize;
            let mut next = None;
            for j in 0..degree {
                let finger_j = node.finger(FingerIdx(j));
                if in_excl_incl(i, finger_j.id(), finger_j.succ(SuccIdx(0)).id()) {
                    next = Some(Arc::clone(finger_j));
                    break;
                }
            }
            let next = next.unwrap_or_else(|| Arc::clone(node.finger(FingerIdx(degree - 1))));
            trace!(node = %node.id(), case = "forward", hop = hops, next = %next.id(), "advancing de Bruijn pointer");
            node = next;
            hops += 1;
            continue;
        }

        // Case C: correct.
        let mut corrected = None;
        for j in (0..s).rev() {
            let succ_j = node.succ(SuccIdx(j));
            if in_excl_incl(i, succ_j.id(), node.id()) {
                corrected = Some(Arc::clone(succ_j));
                break;
            }
        }
        match corrected {
            Some(next) => {
                trace!(node = %node.id(), case = "correct", hop = hops, next = %next.id(), "handing off along successor list");
                node = next;
                hops += 1;
                continue;
            }
            None => {
                return Err(LookupError::Unreachable {
                    key: k,
                    origin: start.id(),
                    virtual_node: i,
                    key_shift: k_shift,
                    hops,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ring;
    use alloy_primitives::U256;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn rand_id(rng: &mut StdRng) -> Identifier {
        Identifier::from_u256(rng.gen::<U256>())
    }

    fn unique_random_ring(
        rng: &mut StdRng,
        n: usize,
        cfg: Config,
    ) -> Vec<Arc<Node>> {
        let mut ids = std::collections::HashSet::new();
        while ids.len() < n {
            ids.insert(rand_id(rng));
        }
        let ids: Vec<Identifier> = ids.into_iter().collect();
        ring::build_static_ring(ids, cfg).expect("well-formed ring")
    }

    #[test]
    fn property_p2_and_p3_small_ring() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = Config::new(16, 16).unwrap();
        let nodes = unique_random_ring(&mut rng, 256, cfg);
        crate::routing::verify_invariants(&nodes).expect("ring invariants hold");

        for _ in 0..32 {
            let key = rand_id(&mut rng);

            let mut results = Vec::new();
            for n in &nodes {
                results.push(lookup(n, key).expect("lookup succeeds").id());
            }
            // P2: every starting node agrees on the same responsible node.
            assert!(results.windows(2).all(|w| w[0] == w[1]));

            // P3: the returned node's predecessor interval brackets the key.
            let responsible_id = results[0];
            let responsible = nodes.iter().find(|n| n.id() == responsible_id).unwrap();
            let idx = nodes.iter().position(|n| n.id() == responsible_id).unwrap();
            let pred = &nodes[(idx + nodes.len() - 1) % nodes.len()];
            assert!(in_excl_incl(key, pred.id(), responsible.id()));
        }
    }

    #[test]
    fn property_p4_bounded_hops_large_ring() {
        let mut rng = StdRng::seed_from_u64(2);
        let cfg = Config::new(2, 8).unwrap();
        let nodes = unique_random_ring(&mut rng, 1024, cfg);
        crate::routing::verify_invariants(&nodes).expect("ring invariants hold");

        for _ in 0..10_000 {
            let key = rand_id(&mut rng);
            let n = &nodes[rng.gen_range(0..nodes.len())];
            lookup(n, key).expect("lookup always succeeds on a well-formed ring");
        }
    }
}
