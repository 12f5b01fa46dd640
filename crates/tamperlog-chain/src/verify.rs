//! Chain verification.
//!
//! Verification walks entries in ascending sequence order and stops at the
//! first entry it cannot trust. Everything after that point hangs off a
//! broken link, so scanning further would not say anything new.

use serde::Serialize;
use tamperlog_types::EventLogEntry;
use thiserror::Error;

use crate::hash::entry_hash;

/// Why an entry failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TamperReason {
    /// The entry's sequence number is not the one that should come next.
    OutOfSequence {
        /// The sequence number actually found.
        found: u64,
    },
    /// The stored `hash` does not match the digest of the stored fields.
    HashMismatch,
    /// `prev_hash` does not equal the previous entry's `hash` (or the genesis
    /// sentinel for sequence 1).
    BrokenLink,
    /// The stored row could not be decoded into an entry, so its hash cannot
    /// be recomputed.
    Undecodable,
}

impl std::fmt::Display for TamperReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfSequence { found } => write!(f, "out of sequence (found {found})"),
            Self::HashMismatch => f.write_str("stored hash does not match entry contents"),
            Self::BrokenLink => f.write_str("prev_hash does not match previous entry"),
            Self::Undecodable => f.write_str("stored entry cannot be decoded"),
        }
    }
}

/// The first point at which a chain fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tamper detected at sequence {at}: {reason}")]
pub struct Tamper {
    /// The sequence number at which trust is lost.
    pub at: u64,
    /// What was wrong with it.
    pub reason: TamperReason,
}

/// Outcome of verifying a whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum ChainVerdict {
    /// Every entry checked out.
    #[serde(rename = "ok")]
    Intact {
        /// Number of entries verified.
        length: u64,
    },
    /// Verification stopped at the first untrustworthy entry.
    #[serde(rename = "tampered")]
    TamperDetected {
        /// The offending sequence number.
        at: u64,
        /// What was wrong with it.
        reason: TamperReason,
    },
}

impl ChainVerdict {
    /// Returns `true` if the chain verified cleanly.
    pub fn is_intact(&self) -> bool {
        matches!(self, Self::Intact { .. })
    }
}

impl From<Tamper> for ChainVerdict {
    fn from(t: Tamper) -> Self {
        Self::TamperDetected {
            at: t.at,
            reason: t.reason,
        }
    }
}

/// Incremental verifier: feed it entries in ascending order.
///
/// Useful when the chain is streamed from storage and should not be held in
/// memory all at once.
#[derive(Debug, Default)]
pub struct ChainVerifier {
    tail: Option<(u64, String)>,
    checked: u64,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the next entry against the chain verified so far.
    ///
    /// # Errors
    ///
    /// Returns [`Tamper`] describing the first failed check. The verifier
    /// should not be fed further entries after an error.
    pub fn check(&mut self, entry: &EventLogEntry) -> Result<(), Tamper> {
        self.check_sequence(entry.sequence)?;

        if entry_hash(entry) != entry.hash {
            return Err(Tamper {
                at: entry.sequence,
                reason: TamperReason::HashMismatch,
            });
        }

        let expected_prev = self.tail.as_ref().map(|(_, hash)| hash.as_str());
        if entry.prev_hash.as_deref() != expected_prev {
            return Err(Tamper {
                at: entry.sequence,
                reason: TamperReason::BrokenLink,
            });
        }

        self.tail = Some((entry.sequence, entry.hash.clone()));
        self.checked += 1;
        Ok(())
    }

    /// Reports a stored row at `sequence` that could not be decoded.
    ///
    /// A row that is also out of place is reported as a sequence gap, the
    /// same as a decodable one would be.
    pub fn undecodable(&self, sequence: u64) -> Tamper {
        match self.check_sequence(sequence) {
            Err(gap) => gap,
            Ok(()) => Tamper {
                at: sequence,
                reason: TamperReason::Undecodable,
            },
        }
    }

    fn check_sequence(&self, sequence: u64) -> Result<(), Tamper> {
        let expected = self.tail.as_ref().map_or(1, |(seq, _)| seq + 1);
        if sequence != expected {
            return Err(Tamper {
                at: expected,
                reason: TamperReason::OutOfSequence { found: sequence },
            });
        }
        Ok(())
    }

    /// Number of entries verified so far.
    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Consumes the verifier, reporting the chain as intact.
    pub fn finish(self) -> ChainVerdict {
        ChainVerdict::Intact {
            length: self.checked,
        }
    }
}

/// Verifies an in-memory chain given in ascending sequence order.
pub fn verify<'a, I>(entries: I) -> ChainVerdict
where
    I: IntoIterator<Item = &'a EventLogEntry>,
{
    let mut verifier = ChainVerifier::new();
    for entry in entries {
        if let Err(tamper) = verifier.check(entry) {
            return tamper.into();
        }
    }
    verifier.finish()
}
