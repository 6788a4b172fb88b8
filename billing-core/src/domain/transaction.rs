use std::collections::VecDeque;

use serde::Serialize;
use time::OffsetDateTime;

/// History keeps only the most recent completed operations.
pub const HISTORY_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    EnergySubmission,
    BillPayment,
}

/// A completed on-chain operation as the session remembers it.
///
/// `amount` is kept as decimal text: kWh for submissions, the smallest ledger
/// unit for payments. `reference` is the transaction hash reported by the
/// ledger and is treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub amount: String,
    pub reference: String,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl TransactionRecord {
    pub fn new(kind: TransactionKind, amount: String, reference: String) -> Self {
        Self {
            kind,
            amount,
            reference,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Newest-first log of completed operations, bounded at [`HISTORY_CAPACITY`].
///
/// Order reflects local insertion time, not any ledger-confirmed ordering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionHistory {
    entries: VecDeque<TransactionRecord>,
}

impl TransactionHistory {
    pub fn record(&mut self, entry: TransactionRecord) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&TransactionRecord> {
        self.entries.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> TransactionRecord {
        TransactionRecord::new(
            TransactionKind::EnergySubmission,
            n.to_string(),
            format!("0x{n:064x}"),
        )
    }

    #[test]
    fn records_are_newest_first() {
        let mut history = TransactionHistory::default();
        history.record(entry(1));
        history.record(entry(2));
        history.record(entry(3));

        let amounts: Vec<&str> = history.iter().map(|r| r.amount.as_str()).collect();
        assert_eq!(amounts, vec!["3", "2", "1"]);
    }

    #[test]
    fn capacity_is_bounded_by_evicting_the_oldest() {
        let mut history = TransactionHistory::default();
        for n in 1..=7 {
            history.record(entry(n));
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        let amounts: Vec<&str> = history.iter().map(|r| r.amount.as_str()).collect();
        assert_eq!(amounts, vec!["7", "6", "5", "4", "3"]);
    }

    #[test]
    fn latest_tracks_the_front() {
        let mut history = TransactionHistory::default();
        assert!(history.latest().is_none());
        history.record(entry(9));
        assert_eq!(history.latest().unwrap().amount, "9");
    }
}
