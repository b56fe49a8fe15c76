//! Transaction identifiers for transfer legs
//!
//! Identifiers are derived from the wall clock in nanoseconds. Two calls in
//! the same process never return the same sequence number, even when the
//! clock does not advance between them or steps backwards.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Prefix of the debit leg identifier
pub const OUTGOING_PREFIX: &str = "TXN-OUT";

/// Prefix of the credit leg identifier
pub const INCOMING_PREFIX: &str = "TXN-IN";

#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last: AtomicI64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number: the current clock reading, or one past the
    /// previous number if the clock has not moved past it.
    pub fn next_sequence(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }

    /// Identifiers for the outgoing and incoming legs of one transfer
    pub fn leg_ids(&self) -> (String, String) {
        let outgoing = format!("{}-{}", OUTGOING_PREFIX, self.next_sequence());
        let incoming = format!("{}-{}", INCOMING_PREFIX, self.next_sequence());
        (outgoing, incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let ids = TransactionIdGenerator::new();
        let mut previous = ids.next_sequence();
        for _ in 0..10_000 {
            let next = ids.next_sequence();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_leg_ids_have_prefixes() {
        let (out, inc) = TransactionIdGenerator::new().leg_ids();
        assert!(out.starts_with("TXN-OUT-"));
        assert!(inc.starts_with("TXN-IN-"));
        assert_ne!(out.trim_start_matches("TXN-OUT-"), inc.trim_start_matches("TXN-IN-"));
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(TransactionIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| ids.next_sequence())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.join().unwrap() {
                assert!(seen.insert(n), "duplicate sequence {n}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
