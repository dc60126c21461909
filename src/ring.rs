//! Static ring construction (test/membership-subsystem harness)
//!
//! Production deployments wire a node's successor list and de Bruijn
//! fingers from a live membership/stabilization subsystem — out of scope
//! here (spec §1). This module implements the construction recipe spec §6
//! prescribes for tests: given a set of identifiers and a [`Config`], build
//! a fully-wired, static ring in memory.
//!
//! Recipe:
//! 1. Sort the identifiers ascending.
//! 2. For each node `i`, `succ[j] = nodes[(i + j + 1) mod N]` for
//!    `j ∈ [0, s)`.
//! 3. For each node `i`, compute `did = (id_i << degree_shift) mod 2^256`;
//!    walk successors from `nodes[i]` until a node `c` satisfies
//!    `did ∈ (c.id, c.succ(0).id]`; set `d[0]` to the predecessor of `c`
//!    on that walk, then `d[j] = d[j-1].succ(0)` for `j >= 1`.

#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::config::Config;
use crate::identifier::{in_excl_incl, Identifier};
use crate::routing::{Node, RoutingError, SuccIdx};

/// Errors raised while constructing a static ring.
#[derive(Debug, thiserror::Error)]
pub enum RingBuildError {
    /// Fewer than two distinct identifiers were supplied; a ring needs at
    /// least `degree + 1` nodes to wire a non-degenerate de Bruijn walk,
    /// and strictly needs at least 2 to have a meaningful successor.
    #[error("ring needs at least 2 distinct identifiers (got {0})")]
    TooFewNodes(usize),
    /// A node's routing table could not be wired.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// The de Bruijn walk for some node never found a bracketing successor
    /// (can only happen if the ring itself is malformed, e.g. duplicate
    /// ids slipped past the caller).
    #[error("de Bruijn walk for node {0} did not terminate within the ring")]
    DeBruijnWalkDidNotTerminate(Identifier),
}

/// Build a fully-wired, static ring from a set of distinct identifiers.
///
/// `ids` need not be pre-sorted; this function sorts a copy. Returns
/// `Arc<Node>` handles ready for [`crate::routing::verify_invariants`] and
/// [`crate::lookup::lookup`].
pub fn build_static_ring(
    mut ids: Vec<Identifier>,
    cfg: Config,
) -> Result<Vec<Arc<Node>>, RingBuildError> {
    if ids.len() < 2 {
        return Err(RingBuildError::TooFewNodes(ids.len()));
    }
    ids.sort();
    ids.dedup();
    if ids.len() < 2 {
        return Err(RingBuildError::TooFewNodes(ids.len()));
    }

    let n = ids.len();
    let nodes: Vec<Arc<Node>> = ids.into_iter().map(|id| Node::new(id, cfg)).collect();

    let s = cfg.backup_successors() as usize;
    let degree_shift = cfg.degree_shift();

    for i in 0..n {
        let succ: Vec<Arc<Node>> = (0..s).map(|j| Arc::clone(&nodes[(i + j + 1) % n])).collect();

        let did = nodes[i].id().shl(degree_shift);
        // Walk the plain ring-order successor chain (index + 1 mod n) looking
        // for the node `c` that brackets `did`; `d[0]` is `c`'s predecessor on
        // that walk, per spec §6.
        let mut prev_idx = i;
        let mut curr_idx = (i + 1) % n;
        let mut found = None;
        for _ in 0..=n {
            let curr_succ0_idx = (curr_idx + 1) % n;
            if in_excl_incl(did, nodes[curr_idx].id(), nodes[curr_succ0_idx].id()) {
                found = Some(prev_idx);
                break;
            }
            prev_idx = curr_idx;
            curr_idx = curr_succ0_idx;
        }
        let d0_idx = found.ok_or_else(|| RingBuildError::DeBruijnWalkDidNotTerminate(nodes[i].id()))?;

        let fingers: Vec<Arc<Node>> = (0..cfg.degree() as usize)
            .map(|j| Arc::clone(&nodes[(d0_idx + j) % n]))
            .collect();

        nodes[i].set_routing(succ, fingers)?;
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn rand_id(rng: &mut StdRng) -> Identifier {
        Identifier::from_u256(rng.gen::<U256>())
    }

    #[test]
    fn builds_and_validates_a_small_ring() {
        let mut rng = StdRng::seed_from_u64(42);
        let cfg = Config::new(4, 4).unwrap();
        let mut ids = std::collections::HashSet::new();
        while ids.len() < 32 {
            ids.insert(rand_id(&mut rng));
        }
        let nodes = build_static_ring(ids.into_iter().collect(), cfg).unwrap();
        assert_eq!(nodes.len(), 32);
        crate::routing::verify_invariants(&nodes).unwrap();
    }

    #[test]
    fn rejects_fewer_than_two_nodes() {
        let cfg = Config::new(2, 1).unwrap();
        let err = build_static_ring(vec![Identifier::from(1u64)], cfg).unwrap_err();
        assert!(matches!(err, RingBuildError::TooFewNodes(1)));
    }

    #[test]
    fn dedups_duplicate_identifiers() {
        let cfg = Config::new(2, 1).unwrap();
        let ids = vec![
            Identifier::from(1u64),
            Identifier::from(1u64),
            Identifier::from(2u64),
            Identifier::from(3u64),
        ];
        let nodes = build_static_ring(ids, cfg).unwrap();
        assert_eq!(nodes.len(), 3);
    }
}
