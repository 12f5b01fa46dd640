//! Hash-chain codec for the tamperlog event log.
//!
//! Everything in this crate is pure: no I/O, no shared state. It defines
//!
//! - the **canonical encoding** of a structured payload ([`canonical_encode`]),
//!   the only byte form of a payload that is ever hashed;
//! - the **link digest** ([`compute_hash`]) that commits an entry to its
//!   fields and to the digest of its predecessor;
//! - **chain verification** ([`verify`], [`ChainVerifier`]),
//!   which walks entries in ascending order and reports the first sequence
//!   number at which the chain stops being trustworthy.
//!
//! # Canonical form
//!
//! Compact JSON, object keys sorted by UTF-8 byte order at every depth, array
//! order preserved, numbers rendered exactly as `serde_json` parsed them
//! (`1` and `1.0` are different values), strings escaped with the minimal
//! JSON escape set.
//!
//! # Link digest
//!
//! ```text
//! SHA-256( "tamperlog-entry-v1"
//!        || len(event_type)    || event_type
//!        || len(source_app_id) || source_app_id
//!        || len(payload)       || canonical(payload)
//!        || 0x00                                   -- genesis
//!         | 0x01 || len(prev_hash) || prev_hash )  -- otherwise
//! ```
//!
//! Lengths are 8-byte big-endian. The digest is rendered as lowercase hex.

mod canonical;
mod hash;
mod verify;

pub use canonical::canonical_encode;
pub use hash::{compute_hash, entry_hash};
pub use verify::{verify, ChainVerdict, ChainVerifier, Tamper, TamperReason};
