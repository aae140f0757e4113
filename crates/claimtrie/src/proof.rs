//! Merkle proofs of the controlling claim of a name.

use crate::hash::{node_hash, value_hash};
use crate::trie::ClaimTrie;
use claimtrie_primitives::{ClaimId, OutPoint, Uint256};
use serde::{Deserialize, Serialize};

/// One node on the path from the root to the proven name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    /// Children in label order. The child on the path carries no hash, the
    /// verifier fills it in from the node below.
    pub children: Vec<(u8, Option<Uint256>)>,
    /// Value hash of the node. Left out for the final node of a proof with a
    /// value, which the verifier recomputes from the exported outpoint.
    pub value_hash: Option<Uint256>,
}

/// Proof that a name resolves, or does not resolve, to a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Nodes from the root down to the name.
    pub nodes: Vec<ProofNode>,
    /// Whether the name is controlled by the requested claim.
    pub has_value: bool,
    /// Controlling claim, set when `has_value`.
    pub claim_id: Option<ClaimId>,
    /// Outpoint of the controlling claim, set when `has_value`.
    pub outpoint: Option<OutPoint>,
    /// Takeover height of the controlling claim, zero without a value.
    pub last_takeover_height: u32,
}

impl Proof {
    /// Recomputes the root hash of a proof for `name`, `None` if the proof is
    /// malformed or its path does not spell `name`.
    pub fn compute_root(&self, name: &[u8]) -> Option<Uint256> {
        if self.nodes.len() != name.len() + 1 {
            return None;
        }
        let mut below: Option<Uint256> = None;
        for (index, node) in self.nodes.iter().enumerate().rev() {
            // Inner nodes have exactly one hole, at the next byte of the name.
            let expected_hole = name.get(index).copied();
            let mut holes = Vec::new();
            let children = node
                .children
                .iter()
                .map(|(label, hash)| match hash {
                    Some(hash) => Some((*label, *hash)),
                    None => {
                        holes.push(*label);
                        below.map(|hash| (*label, hash))
                    }
                })
                .collect::<Option<Vec<_>>>()?;
            if holes.as_slice() != expected_hole.as_slice() {
                return None;
            }
            let value = if expected_hole.is_none() && self.has_value {
                Some(value_hash(self.outpoint.as_ref()?, self.last_takeover_height))
            } else {
                node.value_hash
            };
            below = Some(node_hash(children, value.as_ref()));
        }
        below
    }

    /// Checks the proof for `name` against a trusted root hash.
    pub fn verify(&self, name: &[u8], root: &Uint256) -> bool {
        self.compute_root(name).as_ref() == Some(root)
    }
}

/// Builds the proof for `name` against the current state of `trie`.
///
/// With a `target`, the proof has a value only if `target` controls the name,
/// without one it has a value if any claim controls the name.
pub(crate) fn build_proof(trie: &ClaimTrie, name: &[u8], target: Option<&ClaimId>) -> Option<Proof> {
    let path = trie.path(name)?;
    let last = *path.last()?;

    let best = trie.data(last).best_claim();
    let has_value = best.is_some_and(|claim| target.is_none_or(|target| *target == claim.claim_id));

    let nodes = path
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let next = path.get(index + 1).copied();
            let children = trie
                .children(*id)
                .map(|(label, child)| {
                    let hash = (Some(child) != next).then(|| trie.hash_of(child));
                    (label, hash)
                })
                .collect();
            let value_hash = if *id == last && has_value {
                None
            } else {
                trie.value_hash_of(*id)
            };
            ProofNode {
                children,
                value_hash,
            }
        })
        .collect();

    let data = trie.data(last);
    Some(Proof {
        nodes,
        has_value,
        claim_id: has_value.then(|| best.map(|claim| claim.claim_id)).flatten(),
        outpoint: has_value.then(|| best.map(|claim| claim.outpoint)).flatten(),
        last_takeover_height: if has_value { data.takeover.height } else { 0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::{NodeData, TakeoverState};
    use claimtrie_primitives::{Claim, Txid};

    fn node(seed: u8, takeover_height: u32) -> NodeData {
        let claim = Claim::new(
            OutPoint::new(Txid::from_bytes([seed; 32]), seed as u32),
            ClaimId::from_bytes([seed; 20]),
            10,
            1,
            1,
        );
        NodeData {
            takeover: TakeoverState {
                height: takeover_height,
                claim_id: Some(claim.claim_id),
            },
            claims: vec![claim],
        }
    }

    fn sample_trie() -> ClaimTrie {
        let mut trie = ClaimTrie::empty();
        trie.set(b"a", node(1, 3));
        trie.set(b"abc", node(2, 5));
        trie.set(b"abd", node(3, 7));
        trie.set(b"b", node(4, 9));
        trie
    }

    #[test]
    fn test_proof_verifies_against_root() {
        let trie = sample_trie();
        let root = trie.root_hash();

        for name in [b"a".as_slice(), b"abc", b"abd", b"b"] {
            let proof = build_proof(&trie, name, None).unwrap();
            assert!(proof.has_value);
            assert_eq!(proof.nodes.len(), name.len() + 1);
            assert!(proof.verify(name, &root), "proof of {name:?} must verify");
        }

        // A path without a value still proves the state.
        let proof = build_proof(&trie, b"ab", None).unwrap();
        assert!(!proof.has_value);
        assert!(proof.outpoint.is_none());
        assert!(proof.verify(b"ab", &root));

        assert!(build_proof(&trie, b"abe", None).is_none());
    }

    #[test]
    fn test_proof_for_other_claim_has_no_value() {
        let trie = sample_trie();
        let root = trie.root_hash();
        let controlling = ClaimId::from_bytes([2u8; 20]);

        let proof = build_proof(&trie, b"abc", Some(&controlling)).unwrap();
        assert!(proof.has_value);
        assert_eq!(proof.claim_id, Some(controlling));
        assert_eq!(proof.last_takeover_height, 5);

        let proof = build_proof(&trie, b"abc", Some(&ClaimId::from_bytes([9u8; 20]))).unwrap();
        assert!(!proof.has_value);
        assert!(proof.nodes.last().unwrap().value_hash.is_some());
        assert!(proof.verify(b"abc", &root));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let trie = sample_trie();
        let root = trie.root_hash();
        let proof = build_proof(&trie, b"abd", None).unwrap();

        let mut forged = proof.clone();
        forged.last_takeover_height += 1;
        assert!(!forged.verify(b"abd", &root));

        let mut forged = proof.clone();
        forged.outpoint = Some(OutPoint::new(Txid::from_bytes([9u8; 32]), 0));
        assert!(!forged.verify(b"abd", &root));

        // Every inner node needs exactly one hole for the path.
        let mut forged = proof;
        forged.nodes[0].children.iter_mut().for_each(|(_, hash)| *hash = Some(root));
        assert!(forged.compute_root(b"abd").is_none());
    }

    #[test]
    fn test_proof_is_bound_to_its_name() {
        let trie = sample_trie();
        let root = trie.root_hash();
        let proof = build_proof(&trie, b"abd", None).unwrap();
        assert!(proof.verify(b"abd", &root));

        // Same depth, the last hole sits at a different label.
        assert!(!proof.verify(b"abc", &root));
        assert!(proof.compute_root(b"abc").is_none());
        // Shorter and longer names do not match the path length.
        assert!(!proof.verify(b"ab", &root));
        assert!(!proof.verify(b"abdd", &root));
        assert!(!proof.verify(b"b", &root));
    }
}
