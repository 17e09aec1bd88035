//! File-level entry points: read inputs, run one algorithm, write output.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use sieve_core::{AwardPair, DateRange, PriceRecord, SpinOffRecord, TransactionRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::csv::{
    check_same_headers, read_awards, read_path, read_prices, read_spin_offs, read_symbol_mapping,
    read_transactions, write_awards, write_file_atomic, write_prices, write_spin_offs,
    write_transactions, CsvError, TransactionLayout,
};
use crate::merge::{dedup, merge, sort_records, MergeReport, Replacement};
use crate::postprocess::{
    write_change_log, PostprocessError, PostprocessOptions, PostprocessPipeline, PostprocessStats,
};
use crate::symbols::SymbolCollision;
use crate::transfers::{filter_transfers, TransferError, TransferOptions, TransferSummary};
use crate::util::accounts_from_paths;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No input files given")]
    NoInputs,
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Postprocess(#[from] PostprocessError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCount {
    pub file: String,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub output: String,
    pub files: Vec<FileCount>,
    pub total_input: usize,
    pub duplicates: usize,
    /// Last-wins overwrites, described as `key: old -> new`.
    pub replacements: Vec<String>,
    pub written: usize,
    pub date_range: Option<DateRange>,
    pub transfers: Option<TransferSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostprocessSummary {
    pub input: String,
    pub output: String,
    pub log: Option<String>,
    pub stats: PostprocessStats,
    pub changes: usize,
    pub collisions: Vec<SymbolCollision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrepareSummary {
    pub transactions: MergeSummary,
    pub awards: Option<MergeSummary>,
    pub postprocess: PostprocessSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMergeOptions {
    pub filter_transfers: bool,
    pub keep_unmatched: bool,
}

impl Default for TransactionMergeOptions {
    fn default() -> Self {
        Self {
            filter_transfers: true,
            keep_unmatched: false,
        }
    }
}

fn label(path: &Path) -> String {
    path.display().to_string()
}

fn summarize<T>(
    output: &Path,
    files: Vec<FileCount>,
    report: &MergeReport<T>,
    written: usize,
    date_range: Option<DateRange>,
    describe: impl Fn(&Replacement<T>) -> String,
) -> MergeSummary {
    MergeSummary {
        output: label(output),
        files,
        total_input: report.total_input(),
        duplicates: report.duplicates.len(),
        replacements: report.replacements.iter().map(describe).collect(),
        written,
        date_range,
        transfers: None,
    }
}

fn read_all<T, F>(inputs: &[PathBuf], read: F) -> Result<Vec<(String, T)>, MergeError>
where
    F: Fn(std::fs::File, &str) -> Result<T, CsvError>,
{
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }
    inputs
        .iter()
        .map(|path| {
            debug!(file = %path.display(), "reading");
            Ok((label(path), read_path(path, &read)?))
        })
        .collect()
}

fn file_counts<T>(files: &[(String, Vec<T>)]) -> Vec<FileCount> {
    files
        .iter()
        .map(|(file, records)| FileCount { file: file.clone(), records: records.len() })
        .collect()
}

// ── Merge tools ──────────────────────────────────────────────────────────────

/// A merged set held in memory until every later stage has succeeded.
struct Merged<T> {
    records: Vec<T>,
    summary: MergeSummary,
}

/// Reads, dedups and transfer-filters transaction exports. `output` only
/// labels the summary; nothing is written.
fn merge_transactions(
    inputs: &[PathBuf],
    output: &Path,
    options: &TransactionMergeOptions,
) -> Result<(TransactionLayout, Merged<TransactionRecord>), MergeError> {
    let files = read_all(inputs, read_transactions)?;
    let (reference, first) = &files[0];
    let layout = first.layout.clone();
    for (file, other) in &files[1..] {
        check_same_headers(reference, layout.headers(), file, other.layout.headers())?;
        if other.layout != layout {
            debug!(file, "remapping columns to reference order");
        }
    }

    let per_file: Vec<(String, Vec<TransactionRecord>)> = files
        .into_iter()
        .map(|(file, tx)| (file, tx.into_records()))
        .collect();
    let counts = file_counts(&per_file);
    for count in &counts {
        info!(file = %count.file, transactions = count.records, "read");
    }
    let (records, report) = dedup(per_file.into_iter().map(|(_, r)| r).collect());

    let (mut records, transfers) = if options.filter_transfers {
        let accounts = accounts_from_paths(inputs);
        if accounts.is_none() && inputs.len() > 1 {
            warn!("not every filename carries an account number, skipping account verification");
        }
        let transfer_options = TransferOptions {
            keep_unmatched: options.keep_unmatched,
            accounts,
        };
        let (kept, summary) = filter_transfers(records, &transfer_options)?;
        (kept, Some(summary))
    } else {
        (records, None)
    };
    sort_records(&mut records);

    let range = DateRange::spanning(records.iter().map(TransactionRecord::posted));
    let mut summary = summarize(output, counts, &report, records.len(), range, |_| String::new());
    summary.transfers = transfers;
    Ok((layout, Merged { records, summary }))
}

/// Merges transaction exports into one file in the first file's column
/// order: dedup, drop internal transfer pairs, sort by posting date.
pub fn merge_transaction_files(
    inputs: &[PathBuf],
    output: &Path,
    options: &TransactionMergeOptions,
) -> Result<MergeSummary, MergeError> {
    let (layout, merged) = merge_transactions(inputs, output, options)?;
    write_file_atomic(output, |w| write_transactions(w, &layout, &merged.records))?;
    info!(output = %output.display(), written = merged.records.len(), "merged transactions");
    Ok(merged.summary)
}

fn merge_awards(
    inputs: &[PathBuf],
    output: &Path,
) -> Result<(Vec<String>, Merged<AwardPair>), MergeError> {
    let files = read_all(inputs, read_awards)?;
    let reference_file = files[0].0.clone();
    let headers = files[0].1.headers.clone();

    let mut per_file: Vec<(String, Vec<AwardPair>)> = Vec::with_capacity(files.len());
    for (file, awards) in files {
        check_same_headers(&reference_file, &headers, &file, &awards.headers)?;
        let pairs = awards.into_order(&headers, &file)?;
        info!(file = %file, awards = pairs.len(), "read");
        per_file.push((file, pairs));
    }
    let counts = file_counts(&per_file);
    let outcome = merge(per_file.into_iter().map(|(_, p)| p).collect());

    let range = DateRange::spanning(outcome.records.iter().map(AwardPair::date));
    let summary =
        summarize(output, counts, &outcome.report, outcome.records.len(), range, |_| String::new());
    Ok((headers, Merged { records: outcome.records, summary }))
}

/// Merges equity award exports, keeping each two-row award intact.
pub fn merge_award_files(inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, MergeError> {
    let (headers, merged) = merge_awards(inputs, output)?;
    write_file_atomic(output, |w| write_awards(w, &headers, &merged.records))?;
    info!(output = %output.display(), written = merged.records.len(), "merged awards");
    Ok(merged.summary)
}

/// Merges `date,symbol,price` files; a later file overrides an earlier one.
pub fn merge_price_files(inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, MergeError> {
    let files = read_all(inputs, read_prices)?;
    let counts = file_counts(&files);
    let outcome = merge(files.into_iter().map(|(_, p)| p).collect());

    write_file_atomic(output, |w| write_prices(w, &outcome.records))?;
    let range = DateRange::spanning(outcome.records.iter().map(|p: &PriceRecord| p.date));
    Ok(summarize(output, counts, &outcome.report, outcome.records.len(), range, |r| {
        format!("{} {}: {} -> {}", r.new.date_text, r.new.symbol, r.old.price, r.new.price)
    }))
}

/// Merges `dst,src` spin-off files; a later file overrides an earlier one.
pub fn merge_spin_off_files(inputs: &[PathBuf], output: &Path) -> Result<MergeSummary, MergeError> {
    let files = read_all(inputs, read_spin_offs)?;
    let counts = file_counts(&files);
    let outcome = merge(files.into_iter().map(|(_, s)| s).collect());

    write_file_atomic(output, |w| write_spin_offs(w, &outcome.records))?;
    Ok(summarize(output, counts, &outcome.report, outcome.records.len(), None, |r: &Replacement<SpinOffRecord>| {
        format!("{}: {} -> {}", r.new.dst, r.old.src, r.new.src)
    }))
}

// ── Postprocess ──────────────────────────────────────────────────────────────

/// `<stem>_processed.csv` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transactions".to_string());
    input.with_file_name(format!("{stem}_processed.csv"))
}

pub fn postprocess_file(
    input: &Path,
    output: &Path,
    mapping: Option<&Path>,
    options: PostprocessOptions,
    log: Option<&Path>,
) -> Result<PostprocessSummary, PostprocessError> {
    let mapping = mapping
        .map(|path| read_path(path, read_symbol_mapping))
        .transpose()?;
    let file = read_path(input, read_transactions)?;
    let layout = file.layout.clone();

    let out = PostprocessPipeline::new(mapping.as_ref(), options).run_numbered(file.rows)?;
    write_file_atomic(output, |w| write_transactions(w, &layout, &out.records))?;
    if let Some(log) = log {
        write_file_atomic(log, |w| write_change_log(w, &out.changes).map_err(CsvError::from))?;
    }
    info!(
        input = %input.display(),
        output = %output.display(),
        changes = out.changes.len(),
        "postprocessed"
    );

    Ok(PostprocessSummary {
        input: label(input),
        output: label(output),
        log: log.map(label),
        stats: out.stats,
        changes: out.changes.len(),
        collisions: out.collisions,
    })
}

// ── Prepare ──────────────────────────────────────────────────────────────────

pub const PREPARED_TRANSACTIONS: &str = "transactions.csv";
pub const PREPARED_AWARDS: &str = "awards.csv";

/// Merges and cleans a set of exports into `out_dir`, ready for a tax
/// calculator: `transactions.csv` and, when award files are given,
/// `awards.csv`. Every stage runs in memory; files are only written once
/// all of them have succeeded.
pub fn prepare_directory(
    transactions: &[PathBuf],
    awards: &[PathBuf],
    out_dir: &Path,
    mapping: Option<&Path>,
    merge_options: &TransactionMergeOptions,
    options: PostprocessOptions,
) -> Result<PrepareSummary, PrepareError> {
    let tx_path = out_dir.join(PREPARED_TRANSACTIONS);
    let awards_path = out_dir.join(PREPARED_AWARDS);

    let (layout, merged) = merge_transactions(transactions, &tx_path, merge_options)?;
    let awards = if awards.is_empty() {
        None
    } else {
        Some(merge_awards(awards, &awards_path)?)
    };
    let mapping = mapping
        .map(|path| read_path(path, read_symbol_mapping))
        .transpose()?;
    // Line numbers in errors and the change log refer to the written file.
    let out = PostprocessPipeline::new(mapping.as_ref(), options).run(merged.records)?;

    std::fs::create_dir_all(out_dir)?;
    write_file_atomic(&tx_path, |w| write_transactions(w, &layout, &out.records))?;
    if let Some((headers, awards)) = &awards {
        if let Err(e) = write_file_atomic(&awards_path, |w| write_awards(w, headers, &awards.records)) {
            let _ = std::fs::remove_file(&tx_path);
            return Err(e.into());
        }
    }
    info!(dir = %out_dir.display(), transactions = out.records.len(), "prepared");

    Ok(PrepareSummary {
        transactions: merged.summary,
        awards: awards.map(|(_, merged)| merged.summary),
        postprocess: PostprocessSummary {
            input: label(&tx_path),
            output: label(&tx_path),
            log: None,
            stats: out.stats,
            changes: out.changes.len(),
            collisions: out.collisions,
        },
    })
}

/// Last day of a UK tax year, for `--tax-year`.
pub fn tax_year_cutoff(year: i32) -> Option<NaiveDate> {
    sieve_core::TaxYear::new(year).end_date()
}
