//! Primitive types shared by the claim trie.
//!
//! - [`Uint160`] and [`Uint256`]: fixed-size opaque identifiers. Claim and support
//!   identifiers are 160-bit, transaction hashes are 256-bit.
//! - [`OutPoint`]: the ledger output that created a claim or a support.
//! - [`Claim`] and [`Support`]: immutable value records. Derived data such as the
//!   effective amount of a claim is computed by the trie overlay and never stored
//!   on the record itself.

mod error;
mod outpoint;
mod record;
mod uint;

pub use self::error::{Error, Result};
pub use self::outpoint::OutPoint;
pub use self::record::{Claim, Support};
pub use self::uint::{Uint160, Uint256};

/// Identifier of a claim, shared by all updates of the same claim.
pub type ClaimId = Uint160;

/// Transaction hash.
pub type Txid = Uint256;
