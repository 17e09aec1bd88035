pub mod award;
pub mod change;
pub mod error;
pub mod money;
pub mod period;
pub mod reference;
pub mod transaction;

pub use award::AwardPair;
pub use change::{ChangeLogEntry, ChangeReason, ChangedField};
pub use error::RecordError;
pub use money::Money;
pub use period::{BrokerDate, DateRange, TaxYear};
pub use reference::{PriceRecord, SpinOffRecord};
pub use transaction::{Action, Column, TransactionKey, TransactionRecord};
