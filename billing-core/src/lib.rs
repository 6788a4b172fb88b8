pub mod domain;

pub use domain::{
    MeterReading, ReadingError, TransactionHistory, TransactionKind, TransactionRecord,
    HISTORY_CAPACITY,
};
