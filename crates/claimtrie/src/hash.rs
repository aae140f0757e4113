//! Hash functions of the trie commitment.

use claimtrie_primitives::{OutPoint, Uint256};
use sha2::{Digest, Sha256};

/// Root hash of a trie without any claim.
pub const EMPTY_TRIE_HASH: Uint256 = {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    Uint256::from_bytes(bytes)
};

/// Double SHA-256.
pub fn hash256(data: &[u8]) -> Uint256 {
    let first = Sha256::digest(data);
    Uint256::from_bytes(Sha256::digest(first).into())
}

/// Encodes a takeover height as 8 bytes, four zero bytes followed by the
/// big-endian height.
fn height_to_bytes(height: u32) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[4..].copy_from_slice(&height.to_be_bytes());
    bytes
}

/// Commitment to the controlling claim of a node.
pub fn value_hash(outpoint: &OutPoint, last_takeover_height: u32) -> Uint256 {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(hash256(outpoint.txid.as_bytes()).as_bytes());
    data.extend_from_slice(hash256(outpoint.vout.to_string().as_bytes()).as_bytes());
    data.extend_from_slice(hash256(&height_to_bytes(last_takeover_height)).as_bytes());
    hash256(&data)
}

/// Hash of a node given its children in label order and its optional value hash.
pub fn node_hash(
    children: impl IntoIterator<Item = (u8, Uint256)>,
    value: Option<&Uint256>,
) -> Uint256 {
    let mut data = Vec::new();
    for (label, hash) in children {
        data.push(label);
        data.extend_from_slice(hash.as_bytes());
    }
    if let Some(value) = value {
        data.extend_from_slice(value.as_bytes());
    }
    if data.is_empty() {
        return EMPTY_TRIE_HASH;
    }
    hash256(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_hash256() {
        // Double SHA-256 of the empty string.
        assert_eq!(
            hash256(b"").to_bytes(),
            hex!("5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456")
        );
    }

    #[test]
    fn test_height_encoding() {
        assert_eq!(height_to_bytes(0x01020304), [0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_value_hash_commits_to_all_inputs() {
        let outpoint = OutPoint::new(Uint256::from_bytes([3u8; 32]), 1);
        let base = value_hash(&outpoint, 10);
        assert_eq!(base, value_hash(&outpoint, 10));
        assert_ne!(base, value_hash(&outpoint, 11));
        assert_ne!(base, value_hash(&OutPoint::new(outpoint.txid, 2), 10));
    }

    #[test]
    fn test_empty_node_hash() {
        assert_eq!(node_hash(std::iter::empty(), None), EMPTY_TRIE_HASH);
        assert_eq!(EMPTY_TRIE_HASH.to_hex().trim_start_matches('0'), "1");
    }
}
