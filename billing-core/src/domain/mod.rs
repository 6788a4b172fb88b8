mod reading;
mod transaction;

pub use reading::{MeterReading, ReadingError};
pub use transaction::{TransactionHistory, TransactionKind, TransactionRecord, HISTORY_CAPACITY};
