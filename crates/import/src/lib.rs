pub mod config;
pub mod csv;
pub mod merge;
pub mod postprocess;
pub mod rounding;
pub mod symbols;
pub mod tools;
pub mod transfers;
pub(crate) mod util;

pub use config::{Config, ConfigError};
pub use crate::csv::{CsvError, TransactionFile, TransactionLayout};
pub use merge::{merge, MergeOutcome, MergeReport, Mergeable, TieBreak};
pub use postprocess::{PostprocessError, PostprocessOptions, PostprocessPipeline, Postprocessed};
pub use rounding::{RoundingBand, RoundingCorrector};
pub use symbols::{synthetic_symbol, SymbolMapping, SymbolResolver};
pub use tools::{
    merge_award_files, merge_price_files, merge_spin_off_files, merge_transaction_files,
    postprocess_file, prepare_directory, MergeError, MergeSummary, PostprocessSummary,
    PrepareError, PrepareSummary, TransactionMergeOptions,
};
pub use transfers::{filter_transfers, TransferError, TransferOptions, TransferSummary};
