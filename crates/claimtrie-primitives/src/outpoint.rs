use crate::{Error, Result, Txid};
use codec::{Decode, Encode, MaxEncodedLen};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reference to a transaction output.
///
/// Ordering compares the txid bytes first, then the output index.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    MaxEncodedLen,
    Serialize,
    Deserialize,
)]
pub struct OutPoint {
    /// The transaction ID of the referenced output.
    pub txid: Txid,
    /// The index of the output within the referenced transaction.
    pub vout: u32,
}

impl OutPoint {
    /// Index used by the null outpoint.
    pub const NULL_INDEX: u32 = u32::MAX;

    pub const fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Returns the null outpoint, a zero txid with [`Self::NULL_INDEX`].
    pub const fn null() -> Self {
        Self {
            txid: Txid::zero(),
            vout: Self::NULL_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_null() && self.vout == Self::NULL_INDEX
    }

    pub fn set_null(&mut self) {
        *self = Self::null();
    }
}

impl Default for OutPoint {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({self})")
    }
}

impl FromStr for OutPoint {
    type Err = Error;

    /// Parses `<txid hex>:<vout>`.
    fn from_str(s: &str) -> Result<Self> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or_else(|| Error::MalformedInput(format!("missing output index in {s}")))?;
        let vout = vout
            .parse::<u32>()
            .map_err(|err| Error::MalformedInput(format!("{vout}: {err}")))?;
        Ok(Self::new(txid.parse()?, vout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_null_outpoint() {
        let null = OutPoint::default();
        assert!(null.is_null());
        assert_eq!(null, OutPoint::new(Txid::zero(), OutPoint::NULL_INDEX));

        let txid = Txid::from_bytes(hex!(
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        ));
        let mut outpoint = OutPoint::new(txid, OutPoint::NULL_INDEX);
        assert!(!outpoint.is_null());
        assert_ne!(outpoint, null);

        // A zero txid with a real output index is not null either.
        assert!(!OutPoint::new(Txid::zero(), 0).is_null());

        outpoint.set_null();
        assert!(outpoint.is_null());
    }

    #[test]
    fn test_parse_display_form() {
        let txid = Txid::from_bytes(hex!(
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        ));
        let outpoint = OutPoint::new(txid, 3);
        let parsed: OutPoint = outpoint.to_string().parse().unwrap();
        assert_eq!(parsed, outpoint);

        assert!("deadbeef".parse::<OutPoint>().is_err());
        assert!(format!("{txid}:x").parse::<OutPoint>().is_err());
    }

    #[test]
    fn test_ordering() {
        let a = Txid::from_bytes([1u8; 32]);
        let b = Txid::from_bytes([2u8; 32]);
        assert!(OutPoint::new(a, 9) < OutPoint::new(b, 0));
        assert!(OutPoint::new(a, 0) < OutPoint::new(a, 1));
    }
}
