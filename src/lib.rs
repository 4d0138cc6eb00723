#![cfg_attr(not(feature = "std"), no_std)]

//! A transcript-based cryptographic protocol framework built on
//! Keccak-p\[1600,12\]: a permutation layer, TurboSHAKE128, the KT128
//! (KangarooTwelve) tree XOF, TreeWrap (a tree-parallel AEAD), and a
//! [`Protocol`] transcript engine composing all of the above into hashes,
//! MACs, AEAD, and key derivation under a single ordered API.
//!
//! ```
//! use thyrse::Protocol;
//!
//! let mut alice = Protocol::new(b"example.com/v1");
//! alice.mix(b"key", b"shared secret");
//! let sealed = alice.seal(b"message", b"hello, world!");
//!
//! let mut bob = Protocol::new(b"example.com/v1");
//! bob.mix(b"key", b"shared secret");
//! let opened = bob.open(b"message", &sealed).unwrap();
//! assert_eq!(opened, b"hello, world!");
//! ```

pub mod encoding;
pub mod error;
pub mod keccak_p;
pub mod kt128;
pub mod protocol;
pub mod treewrap;
pub mod turboshake;
pub mod xor;

pub use error::{ProtocolError, Result};
pub use kt128::Kt128;
pub use protocol::{Direction, MixWriter, Protocol};
pub use turboshake::TurboShake128;
