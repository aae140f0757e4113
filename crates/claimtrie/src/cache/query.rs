use super::ClaimTrieCache;
use crate::proof::{Proof, build_proof};
use crate::queue::{Record, RecordKind};
use crate::trie::{TakeoverState, effective_amount};
use claimtrie_primitives::{Claim, ClaimId, OutPoint, Support, Uint256};
use serde::{Deserialize, Serialize};

/// An active claim together with its derived stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub claim: Claim,
    /// Own amount plus the amounts of the active supports.
    pub effective_amount: i64,
    /// Active supports of the claim.
    pub supports: Vec<Support>,
}

/// Active claims and supports of a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsForName {
    pub name: Vec<u8>,
    /// Takeover height of the controlling claim.
    pub last_takeover_height: Option<u32>,
    /// Claims in rank order.
    pub claims: Vec<ClaimEntry>,
    /// Every active support of the name, including supports of claims that are
    /// not active.
    pub supports: Vec<Support>,
}

/// Snapshot of a name holding claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub name: Vec<u8>,
    pub claims: Vec<Claim>,
    pub takeover: TakeoverState,
    pub hash: Uint256,
}

impl ClaimTrieCache {
    fn claim_entry(&self, name: &[u8], claim: &Claim) -> ClaimEntry {
        let supports = self.supports_of(name);
        ClaimEntry {
            claim: claim.clone(),
            effective_amount: effective_amount(claim, supports),
            supports: supports
                .iter()
                .filter(|support| support.supported_claim_id == claim.claim_id)
                .cloned()
                .collect(),
        }
    }

    /// Whether an active claim of `name` was created by `outpoint`.
    pub fn have_claim(&self, name: &[u8], outpoint: &OutPoint) -> bool {
        self.trie
            .get(name)
            .is_some_and(|data| data.claims.iter().any(|claim| claim.outpoint == *outpoint))
    }

    /// Valid heights of the pending claims of `name` created by `outpoint`,
    /// empty if there are none.
    pub fn have_claim_in_queue(&self, name: &[u8], outpoint: &OutPoint) -> Vec<u32> {
        self.pending
            .valid_heights(name, RecordKind::Claim, outpoint)
    }

    pub fn have_support(&self, name: &[u8], outpoint: &OutPoint) -> bool {
        self.supports_of(name)
            .iter()
            .any(|support| support.outpoint == *outpoint)
    }

    pub fn have_support_in_queue(&self, name: &[u8], outpoint: &OutPoint) -> Vec<u32> {
        self.pending
            .valid_heights(name, RecordKind::Support, outpoint)
    }

    /// Returns the claim leading `name`.
    pub fn get_info_for_name(&self, name: &[u8]) -> Option<ClaimEntry> {
        let claim = self.trie.get(name)?.best_claim()?;
        Some(self.claim_entry(name, claim))
    }

    /// Returns the active claims of `name` in rank order and its active supports.
    pub fn get_claims_for_name(&self, name: &[u8]) -> ClaimsForName {
        let data = self.trie.get(name).filter(|data| !data.claims.is_empty());
        ClaimsForName {
            name: name.to_vec(),
            last_takeover_height: data.map(|data| data.takeover.height),
            claims: data
                .map(|data| {
                    data.claims
                        .iter()
                        .map(|claim| self.claim_entry(name, claim))
                        .collect()
                })
                .unwrap_or_default(),
            supports: self.supports_of(name).to_vec(),
        }
    }

    /// Builds a proof for `name`, `None` if no node exists on its path.
    ///
    /// The proof has a value if `target` controls the name, or if any claim does
    /// when no target is given.
    pub fn get_proof_for_name(&self, name: &[u8], target: Option<&ClaimId>) -> Option<Proof> {
        build_proof(&self.trie, name, target)
    }

    /// Controlling claim of `name` and the height at which it took control.
    pub fn get_last_takeover_for_name(&self, name: &[u8]) -> Option<(ClaimId, u32)> {
        let data = self.trie.get(name)?;
        let claim_id = data.takeover.claim_id?;
        Some((claim_id, data.takeover.height))
    }

    /// Finds an active or pending claim by identifier.
    pub fn get_claim_by_id(&self, claim_id: &ClaimId) -> Option<(Vec<u8>, Claim)> {
        let name = self.claim_index.get(claim_id)?;
        let active = self
            .trie
            .get(name)
            .and_then(|data| data.claims.iter().find(|claim| claim.claim_id == *claim_id));
        let claim = match active {
            Some(claim) => claim.clone(),
            None => self.pending.entries_for(name).find_map(|record| match record {
                Record::Claim(claim) if claim.claim_id == *claim_id => Some(claim.clone()),
                _ => None,
            })?,
        };
        Some((name.clone(), claim))
    }

    /// Number of names holding at least one active claim.
    pub fn get_total_names_in_trie(&self) -> usize {
        self.trie.name_count()
    }

    /// Number of active claims.
    pub fn get_total_claims_in_trie(&self) -> usize {
        self.trie.claim_count()
    }

    /// Sum of the own amounts of all active claims, or of the controlling
    /// claims only. Supports are not counted.
    pub fn get_total_value_of_claims_in_trie(&self, controlling_only: bool) -> i64 {
        let mut total = 0i64;
        self.trie.for_each(|_, data| {
            let claims = if controlling_only {
                &data.claims[..1]
            } else {
                &data.claims[..]
            };
            for claim in claims {
                total = total.saturating_add(claim.amount);
            }
        });
        total
    }

    /// Names holding active claims, in byte order.
    pub fn get_names_in_trie(&self) -> Vec<Vec<u8>> {
        let mut names = Vec::new();
        self.trie.for_each(|name, _| names.push(name.to_vec()));
        names
    }

    /// Root hash of the trie.
    pub fn get_merkle_hash(&self) -> Uint256 {
        self.trie.root_hash()
    }

    /// Root hash, memoizing the hashes of changed nodes.
    pub fn update_merkle_hash(&mut self) -> Uint256 {
        self.trie.update_hashes()
    }

    /// Snapshot of every name holding claims, in byte order.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let mut nodes = Vec::new();
        self.trie.for_each(|name, data| {
            let hash = self
                .trie
                .find(name)
                .map(|id| self.trie.hash_of(id))
                .unwrap_or_default();
            nodes.push(FlatNode {
                name: name.to_vec(),
                claims: data.claims.clone(),
                takeover: data.takeover,
                hash,
            });
        });
        nodes
    }

    /// Number of records waiting for activation.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
