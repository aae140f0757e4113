//! Arena backed prefix tree of names.
//!
//! Every byte of a name is one edge, the node reached by the last byte holds the
//! active claims of that exact name. Nodes carry a memoized hash which is cleared
//! on the whole path to the root whenever a node below changes, so a dirty node
//! always has dirty ancestors.

use crate::hash::{node_hash, value_hash};
use claimtrie_primitives::{Claim, ClaimId, Support, Uint256};
use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Index of a node in the arena.
pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

/// Last takeover of a name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize,
)]
pub struct TakeoverState {
    /// Height at which the controlling claim took control.
    pub height: u32,
    /// Controlling claim as of the last takeover check.
    pub claim_id: Option<ClaimId>,
}

/// Content of a node, persisted per name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct NodeData {
    /// Active claims in rank order, the first one controls the name.
    pub claims: Vec<Claim>,
    pub takeover: TakeoverState,
}

impl NodeData {
    pub fn best_claim(&self) -> Option<&Claim> {
        self.claims.first()
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    parent: Option<NodeId>,
    children: BTreeMap<u8, NodeId>,
    data: NodeData,
    hash: Option<Uint256>,
}

/// Returns the stake of `claim` plus the active supports for it.
pub fn effective_amount(claim: &Claim, supports: &[Support]) -> i64 {
    supports
        .iter()
        .filter(|support| support.supported_claim_id == claim.claim_id)
        .fold(claim.amount, |acc, support| acc.saturating_add(support.amount))
}

/// Sorts claims best first: greater effective amount, then lower height, then
/// lower outpoint.
pub fn rank_claims(claims: &mut [Claim], supports: &[Support]) {
    claims.sort_by_cached_key(|claim| {
        (
            Reverse(effective_amount(claim, supports)),
            claim.height,
            claim.outpoint,
        )
    });
}

#[derive(Debug, Clone)]
pub struct ClaimTrie {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Default for ClaimTrie {
    fn default() -> Self {
        Self::empty()
    }
}

impl ClaimTrie {
    pub fn empty() -> Self {
        Self {
            nodes: vec![Some(Node::default())],
            free: Vec::new(),
        }
    }

    /// Whether no name holds a claim.
    pub fn is_empty(&self) -> bool {
        let root = self.node(ROOT);
        root.children.is_empty() && root.data.claims.is_empty()
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id]
            .as_ref()
            .expect("Node ids handed out by the trie always point to live nodes; qed")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id]
            .as_mut()
            .expect("Node ids handed out by the trie always point to live nodes; qed")
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Returns the node of `name`, if the path exists.
    pub(crate) fn find(&self, name: &[u8]) -> Option<NodeId> {
        name.iter().try_fold(ROOT, |id, label| {
            self.node(id).children.get(label).copied()
        })
    }

    /// Returns the node ids from the root down to `name`, if the path exists.
    pub(crate) fn path(&self, name: &[u8]) -> Option<Vec<NodeId>> {
        let mut path = Vec::with_capacity(name.len() + 1);
        path.push(ROOT);
        let mut id = ROOT;
        for label in name {
            id = *self.node(id).children.get(label)?;
            path.push(id);
        }
        Some(path)
    }

    /// Returns the content of the node of `name`.
    pub fn get(&self, name: &[u8]) -> Option<&NodeData> {
        self.find(name).map(|id| &self.node(id).data)
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    /// Children of a node in label order.
    pub(crate) fn children(&self, id: NodeId) -> impl Iterator<Item = (u8, NodeId)> + '_ {
        self.node(id)
            .children
            .iter()
            .map(|(label, child)| (*label, *child))
    }

    /// Replaces the content of the node of `name`, creating the path as needed.
    ///
    /// A node left without claims and children is pruned together with its empty
    /// ancestors.
    pub fn set(&mut self, name: &[u8], data: NodeData) {
        if data.claims.is_empty() {
            if let Some(id) = self.find(name) {
                let node = self.node_mut(id);
                node.data = data;
                self.invalidate(id);
                self.prune(id);
            }
            return;
        }
        let id = self.insert_path(name);
        self.node_mut(id).data = data;
        self.invalidate(id);
    }

    /// Removes the claims of `name` and returns the previous content.
    pub fn remove(&mut self, name: &[u8]) -> Option<NodeData> {
        let id = self.find(name)?;
        let data = std::mem::take(&mut self.node_mut(id).data);
        self.invalidate(id);
        self.prune(id);
        Some(data)
    }

    fn insert_path(&mut self, name: &[u8]) -> NodeId {
        let mut id = ROOT;
        for label in name {
            let existing = self.node(id).children.get(label).copied();
            id = match existing {
                Some(child) => child,
                None => {
                    let child = self.alloc(Node {
                        parent: Some(id),
                        ..Default::default()
                    });
                    self.node_mut(id).children.insert(*label, child);
                    self.invalidate(id);
                    child
                }
            };
        }
        id
    }

    fn invalidate(&mut self, mut id: NodeId) {
        loop {
            let parent = {
                let node = self.node_mut(id);
                node.hash = None;
                node.parent
            };
            match parent {
                Some(parent) if self.node(parent).hash.is_some() => id = parent,
                _ => break,
            }
        }
    }

    fn prune(&mut self, mut id: NodeId) {
        while id != ROOT {
            let node = self.node(id);
            if !node.children.is_empty() || !node.data.claims.is_empty() {
                break;
            }
            let Some(parent) = node.parent else { break };
            self.nodes[id] = None;
            self.free.push(id);
            self.node_mut(parent).children.retain(|_, child| *child != id);
            self.invalidate(parent);
            id = parent;
        }
    }

    /// Hash of a node, using memoized hashes where available.
    pub(crate) fn hash_of(&self, id: NodeId) -> Uint256 {
        let node = self.node(id);
        if let Some(hash) = node.hash {
            return hash;
        }
        let children = node
            .children
            .iter()
            .map(|(label, child)| (*label, self.hash_of(*child)))
            .collect::<Vec<_>>();
        node_hash(children, self.value_hash_of(id).as_ref())
    }

    /// Value hash of the controlling claim of a node.
    pub(crate) fn value_hash_of(&self, id: NodeId) -> Option<Uint256> {
        let data = &self.node(id).data;
        data.best_claim()
            .map(|claim| value_hash(&claim.outpoint, data.takeover.height))
    }

    /// Root hash computed without touching the memoized hashes.
    pub fn root_hash(&self) -> Uint256 {
        self.hash_of(ROOT)
    }

    /// Recomputes and memoizes the hashes of all dirty nodes, returning the root
    /// hash.
    pub fn update_hashes(&mut self) -> Uint256 {
        self.memoize(ROOT)
    }

    fn memoize(&mut self, id: NodeId) -> Uint256 {
        if let Some(hash) = self.node(id).hash {
            return hash;
        }
        let children = self.children(id).collect::<Vec<_>>();
        let children = children
            .into_iter()
            .map(|(label, child)| (label, self.memoize(child)))
            .collect::<Vec<_>>();
        let hash = node_hash(children, self.value_hash_of(id).as_ref());
        self.node_mut(id).hash = Some(hash);
        hash
    }

    /// Visits every name holding claims in byte order.
    pub fn for_each(&self, mut f: impl FnMut(&[u8], &NodeData)) {
        let mut name = Vec::new();
        self.visit(ROOT, &mut name, &mut f);
    }

    fn visit(&self, id: NodeId, name: &mut Vec<u8>, f: &mut impl FnMut(&[u8], &NodeData)) {
        let node = self.node(id);
        if !node.data.claims.is_empty() {
            f(name, &node.data);
        }
        for (label, child) in &node.children {
            name.push(*label);
            self.visit(*child, name, f);
            name.pop();
        }
    }

    /// Number of names holding at least one claim.
    pub fn name_count(&self) -> usize {
        let mut count = 0;
        self.for_each(|_, _| count += 1);
        count
    }

    /// Number of claims over all names.
    pub fn claim_count(&self) -> usize {
        let mut count = 0;
        self.for_each(|_, data| count += data.claims.len());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::EMPTY_TRIE_HASH;
    use claimtrie_primitives::OutPoint;

    fn claim(seed: u8, amount: i64, height: u32) -> Claim {
        Claim::new(
            OutPoint::new(Uint256::from_bytes([seed; 32]), 0),
            ClaimId::from_bytes([seed; 20]),
            amount,
            height,
            height,
        )
    }

    fn data(claims: Vec<Claim>, takeover_height: u32) -> NodeData {
        let takeover = TakeoverState {
            height: takeover_height,
            claim_id: claims.first().map(|c| c.claim_id),
        };
        NodeData { claims, takeover }
    }

    #[test]
    fn test_insert_creates_intermediate_nodes() {
        let mut trie = ClaimTrie::empty();
        assert!(trie.is_empty());
        assert_eq!(trie.root_hash(), EMPTY_TRIE_HASH);

        trie.set(b"test", data(vec![claim(1, 10, 1)], 1));
        assert!(!trie.is_empty());
        assert!(trie.find(b"tes").is_some());
        assert!(trie.get(b"tes").unwrap().claims.is_empty());
        assert_eq!(trie.get(b"test").unwrap().claims.len(), 1);
        assert_eq!(trie.path(b"test").unwrap().len(), 5);
        assert!(trie.path(b"tests").is_none());
        assert_eq!(trie.name_count(), 1);
    }

    #[test]
    fn test_prune_empty_branches() {
        let mut trie = ClaimTrie::empty();
        trie.set(b"test", data(vec![claim(1, 10, 1)], 1));
        trie.set(b"tester", data(vec![claim(2, 10, 1)], 1));
        let before = trie.root_hash();

        trie.set(b"tester", NodeData::default());
        assert!(trie.find(b"teste").is_none());
        assert!(trie.find(b"test").is_some());

        trie.set(b"tester", data(vec![claim(2, 10, 1)], 1));
        assert_eq!(trie.root_hash(), before);

        trie.remove(b"tester");
        trie.remove(b"test");
        assert!(trie.is_empty());
        assert!(trie.find(b"t").is_none());
        assert_eq!(trie.root_hash(), EMPTY_TRIE_HASH);
    }

    #[test]
    fn test_memoized_hash_matches_fresh_computation() {
        let mut trie = ClaimTrie::empty();
        trie.set(b"a", data(vec![claim(1, 10, 1)], 1));
        trie.set(b"ab", data(vec![claim(2, 10, 1)], 1));
        trie.set(b"b", data(vec![claim(3, 10, 1)], 1));
        let root = trie.update_hashes();
        assert_eq!(root, trie.root_hash());

        // Changing the takeover height changes the value hash.
        trie.set(b"ab", data(vec![claim(2, 10, 1)], 2));
        assert_ne!(trie.root_hash(), root);
        let updated = trie.update_hashes();
        assert_eq!(updated, trie.root_hash());

        // Insertion order does not matter.
        let mut other = ClaimTrie::empty();
        other.set(b"b", data(vec![claim(3, 10, 1)], 1));
        other.set(b"ab", data(vec![claim(2, 10, 1)], 2));
        other.set(b"a", data(vec![claim(1, 10, 1)], 1));
        assert_eq!(other.update_hashes(), updated);
    }

    #[test]
    fn test_rank_claims() {
        let big = claim(1, 5, 10);
        let early = claim(2, 3, 1);
        let late = claim(3, 3, 2);
        let mut claims = vec![late.clone(), early.clone(), big.clone()];
        rank_claims(&mut claims, &[]);
        assert_eq!(claims, vec![big.clone(), early.clone(), late.clone()]);

        let support = Support::new(late.outpoint, late.claim_id, 10, 3, 3);
        assert_eq!(effective_amount(&late, std::slice::from_ref(&support)), 13);
        rank_claims(&mut claims, &[support]);
        assert_eq!(claims[0], late);
    }

    #[test]
    fn test_for_each_visits_names_in_byte_order() {
        let mut trie = ClaimTrie::empty();
        for name in [b"b".as_slice(), b"a", b"ab", b"abc"] {
            trie.set(name, data(vec![claim(name.len() as u8, 1, 1)], 1));
        }
        let mut names = Vec::new();
        trie.for_each(|name, _| names.push(name.to_vec()));
        assert_eq!(names, vec![b"a".to_vec(), b"ab".to_vec(), b"abc".to_vec(), b"b".to_vec()]);
        assert_eq!(trie.claim_count(), 4);
    }
}
