//! Authenticated Received Chain (RFC 8617) message processing engine.
//!
//! This crate implements the ARC chain engine as a library: a caller
//! streams a message's headers and body in through [`chain::ArcMessage`],
//! which assembles and (in verify mode) validates the existing ARC sets,
//! or (in sign mode) prepares the state a new set is sealed from via
//! [`seal::SealParams`]. DNS key lookups and signing/verification
//! primitives are both injected through the [`resolver::Resolver`] and
//! [`crypto::Signer`] traits so the engine carries no global mutable
//! state and no opinion about where keys or records come from.

pub mod canon;
pub mod chain;
pub mod config;
pub mod crypto;
mod error;
pub mod hash;
pub mod header;
pub mod resolver;
pub mod seal;
pub mod tables;
pub mod tagvalue;

#[cfg(test)]
mod roundtrip_test;

pub use chain::{ArcMessage, ArcSet, Mode};
pub use config::{ArcLib, ArcLibBuilder, HeaderNameSet, LibFlags};
pub use error::{ArcError, ArcStat};
pub use resolver::Resolver;
pub use seal::{GeneratedSet, SealParams};
pub use tables::ChainStatus;
