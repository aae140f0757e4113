use crate::{ClaimId, OutPoint};
use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A staked record asserting ownership of a name.
///
/// Records are immutable once constructed, a spend removes the record instead of
/// modifying it.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct Claim {
    /// Output that created the claim.
    pub outpoint: OutPoint,
    /// Identifier shared by all updates of this claim.
    pub claim_id: ClaimId,
    /// Staked amount.
    pub amount: i64,
    /// Height of the block that included the claim.
    pub height: u32,
    /// Height at which the stake starts counting.
    pub valid_height: u32,
}

impl Claim {
    pub fn new(
        outpoint: OutPoint,
        claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height: u32,
    ) -> Self {
        Self {
            outpoint,
            claim_id,
            amount,
            height,
            valid_height,
        }
    }

    /// Returns a copy of this record that becomes valid at `valid_height`.
    pub fn with_valid_height(&self, valid_height: u32) -> Self {
        Self {
            valid_height,
            ..self.clone()
        }
    }

    pub fn is_active_at(&self, height: u32) -> bool {
        self.valid_height <= height
    }
}

/// A staked record adding weight to an existing claim.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct Support {
    /// Output that created the support.
    pub outpoint: OutPoint,
    /// Claim receiving the stake.
    pub supported_claim_id: ClaimId,
    pub amount: i64,
    pub height: u32,
    pub valid_height: u32,
}

impl Support {
    pub fn new(
        outpoint: OutPoint,
        supported_claim_id: ClaimId,
        amount: i64,
        height: u32,
        valid_height: u32,
    ) -> Self {
        Self {
            outpoint,
            supported_claim_id,
            amount,
            height,
            valid_height,
        }
    }

    pub fn with_valid_height(&self, valid_height: u32) -> Self {
        Self {
            valid_height,
            ..self.clone()
        }
    }

    pub fn is_active_at(&self, height: u32) -> bool {
        self.valid_height <= height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Txid;

    #[test]
    fn test_records_are_structural() {
        let outpoint = OutPoint::new(Txid::from_bytes([7u8; 32]), 0);
        let claim = Claim::new(outpoint, ClaimId::from_bytes([1u8; 20]), 20, 5, 5);
        assert_eq!(claim, claim.clone());
        assert!(claim.is_active_at(5));
        assert!(!claim.is_active_at(4));

        let moved = claim.with_valid_height(9);
        assert_ne!(moved, claim);
        assert_eq!(moved.valid_height, 9);
        assert_eq!(moved.height, claim.height);

        let support = Support::new(outpoint, claim.claim_id, 10, 5, 6);
        assert!(!support.is_active_at(5));
        assert_eq!(support.with_valid_height(5).valid_height, 5);
    }
}
