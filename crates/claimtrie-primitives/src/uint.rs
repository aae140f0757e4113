use crate::{Error, Result};
use codec::{Decode, Encode, MaxEncodedLen};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! construct_uint {
    ($(#[$attr:meta])* $name:ident, $width:expr) => {
        $(#[$attr])*
        #[derive(
            Clone,
            Copy,
            Default,
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
        pub struct $name([u8; $width]);

        impl $name {
            /// Width in bytes.
            pub const SIZE: usize = $width;

            /// Returns the null (all-zero) value.
            pub const fn zero() -> Self {
                Self([0u8; $width])
            }

            /// Constructs from raw bytes in storage order.
            pub const fn from_bytes(bytes: [u8; $width]) -> Self {
                Self(bytes)
            }

            /// Constructs from a byte slice, which must be exactly [`Self::SIZE`] long.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let bytes: [u8; $width] = bytes.try_into().map_err(|_| {
                    Error::MalformedInput(format!(
                        "expected {} bytes, got {}",
                        $width,
                        bytes.len()
                    ))
                })?;
                Ok(Self(bytes))
            }

            /// Parses the display form, i.e. the bytes in reversed order as hex.
            ///
            /// The string must be exactly `2 * SIZE` hex characters.
            pub fn from_hex(s: &str) -> Result<Self> {
                if s.len() != $width * 2 {
                    return Err(Error::MalformedInput(format!(
                        "expected {} hex characters, got {}",
                        $width * 2,
                        s.len()
                    )));
                }
                let mut bytes = [0u8; $width];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|err| Error::MalformedInput(format!("{s}: {err}")))?;
                bytes.reverse();
                Ok(Self(bytes))
            }

            /// Returns the display form, bytes in reversed order.
            pub fn to_hex(&self) -> String {
                let mut bytes = self.0;
                bytes.reverse();
                hex::encode(bytes)
            }

            pub fn is_null(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn set_null(&mut self) {
                self.0 = [0u8; $width];
            }

            pub const fn size(&self) -> usize {
                $width
            }

            pub fn as_bytes(&self) -> &[u8; $width] {
                &self.0
            }

            pub fn to_bytes(self) -> [u8; $width] {
                self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $width]> for $name {
            fn from(bytes: [u8; $width]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hex(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }
    };
}

construct_uint!(
    /// 160-bit identifier, used for claim and support identifiers.
    Uint160,
    20
);

construct_uint!(
    /// 256-bit identifier, used for transaction and node hashes.
    Uint256,
    32
);

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_hex_is_byte_reversed() {
        let mut raw = [0u8; 32];
        raw[0] = 1;
        let one = Uint256::from_bytes(raw);
        assert_eq!(
            one.to_hex(),
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
        assert_eq!(Uint256::from_hex(&one.to_hex()).unwrap(), one);

        let id = Uint160::from_bytes(hex!("0102030405060708090a0b0c0d0e0f1011121314"));
        assert_eq!(id.to_string(), "14131211100f0e0d0c0b0a090807060504030201");
    }

    #[test]
    fn test_random_hex_roundtrip() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..64 {
            let mut bytes = [0u8; 20];
            rng.fill(&mut bytes);
            let id = Uint160::from_bytes(bytes);
            assert_eq!(id.to_hex().parse::<Uint160>().unwrap(), id);

            let mut bytes = [0u8; 32];
            rng.fill(&mut bytes);
            let hash = Uint256::from_bytes(bytes);
            assert_eq!(Uint256::from_hex(&hash.to_hex()).unwrap(), hash);
        }
    }

    #[test]
    fn test_malformed_hex_is_rejected() {
        assert!(matches!(
            Uint160::from_hex("abcd"),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            Uint160::from_hex("zz02030405060708090a0b0c0d0e0f1011121314"),
            Err(Error::MalformedInput(_))
        ));
        assert!(Uint256::from_hex("").is_err());
        assert!(Uint256::from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_null_state() {
        let mut id = Uint160::zero();
        assert!(id.is_null());
        assert_eq!(id, Uint160::default());
        assert_eq!(id.size(), 20);

        let source = Uint160::from_hex("1234567890abcdef1234567890abcdef12345678").unwrap();
        id = source;
        assert!(!id.is_null());
        assert_eq!(id, source);

        id.set_null();
        assert!(id.is_null());
        assert_ne!(id, source);
    }

    #[test]
    fn test_ordering_follows_storage_bytes() {
        let mut low = [0u8; 32];
        low[31] = 1;
        let mut high = [0u8; 32];
        high[0] = 2;
        let (low, high) = (Uint256::from_bytes(low), Uint256::from_bytes(high));
        // Display order is reversed, storage order decides comparison.
        assert!(low < high);
        assert!(low.to_hex() > high.to_hex());
    }
}
