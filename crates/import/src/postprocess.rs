use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;
use sieve_core::{ChangeLogEntry, ChangeReason, ChangedField, TransactionRecord};
use thiserror::Error;
use tracing::{debug, info};

use crate::csv::CsvError;
use crate::rounding::{RoundingBand, RoundingCorrector};
use crate::symbols::{
    ResolveError, SymbolCollision, SymbolMapping, SymbolResolver, SymbolSource,
    DEFAULT_MAX_SYMBOL_LEN,
};

#[derive(Error, Debug)]
pub enum PostprocessError {
    #[error("line {line}: {source}")]
    Symbol {
        line: usize,
        #[source]
        source: ResolveError,
    },
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessOptions {
    pub fix_symbols: bool,
    pub fix_rounding: bool,
    /// Only fill symbols on rows whose action moves a security.
    pub securities_only: bool,
    pub max_symbol_len: usize,
    pub rounding_band: RoundingBand,
    pub include_trades: bool,
    /// Rows posted after this date are dropped before any fixing.
    pub cutoff: Option<NaiveDate>,
}

impl Default for PostprocessOptions {
    fn default() -> Self {
        Self {
            fix_symbols: true,
            fix_rounding: false,
            securities_only: false,
            max_symbol_len: DEFAULT_MAX_SYMBOL_LEN,
            rounding_band: RoundingBand::default(),
            include_trades: false,
            cutoff: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostprocessStats {
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub missing_symbols: usize,
    pub mapped: usize,
    pub generated: usize,
    pub rounding_fixed: usize,
}

impl PostprocessStats {
    pub fn rows_written(&self) -> usize {
        self.total_rows - self.filtered_rows
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Postprocessed {
    pub records: Vec<TransactionRecord>,
    /// In row order.
    pub changes: Vec<ChangeLogEntry>,
    pub stats: PostprocessStats,
    pub collisions: Vec<SymbolCollision>,
}

pub struct PostprocessPipeline<'m> {
    mapping: Option<&'m SymbolMapping>,
    options: PostprocessOptions,
}

impl<'m> PostprocessPipeline<'m> {
    pub fn new(mapping: Option<&'m SymbolMapping>, options: PostprocessOptions) -> Self {
        Self { mapping, options }
    }

    pub fn options(&self) -> &PostprocessOptions {
        &self.options
    }

    /// Runs over records read from a file with one physical line per row,
    /// so the record at index `i` sits on line `i + 2`.
    pub fn run(&self, records: Vec<TransactionRecord>) -> Result<Postprocessed, PostprocessError> {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| (i + 2, r))
            .collect();
        self.run_numbered(rows)
    }

    /// Runs over records paired with their input line numbers.
    pub fn run_numbered(
        &self,
        rows: Vec<(usize, TransactionRecord)>,
    ) -> Result<Postprocessed, PostprocessError> {
        let opts = &self.options;
        let mut stats = PostprocessStats { total_rows: rows.len(), ..Default::default() };

        let rows: Vec<(usize, TransactionRecord)> = match opts.cutoff {
            Some(cutoff) => rows
                .into_iter()
                .filter(|(line, r)| {
                    let keep = r.posted() <= cutoff;
                    if !keep {
                        debug!(line, date = %r.date, "dropping row after cut-off");
                    }
                    keep
                })
                .collect(),
            None => rows,
        };
        stats.filtered_rows = stats.total_rows - rows.len();
        if stats.filtered_rows > 0 {
            info!(filtered = stats.filtered_rows, cutoff = ?opts.cutoff, "filtered rows after cut-off");
        }

        let mut resolver = SymbolResolver::new(self.mapping, opts.max_symbol_len);
        let corrector = RoundingCorrector::new(opts.rounding_band, opts.include_trades);
        let mut records = Vec::with_capacity(rows.len());
        let mut changes = Vec::new();

        for (line, mut record) in rows {
            if record.has_missing_symbol() {
                stats.missing_symbols += 1;
                let in_scope = !opts.securities_only || record.action.is_security_action();
                if opts.fix_symbols && in_scope {
                    let resolution = resolver
                        .resolve(&record.description)
                        .map_err(|source| PostprocessError::Symbol { line, source })?;
                    let reason = match resolution.source {
                        SymbolSource::Mapped => {
                            stats.mapped += 1;
                            ChangeReason::MappedSymbol
                        }
                        SymbolSource::Synthetic => {
                            stats.generated += 1;
                            ChangeReason::SyntheticSymbol
                        }
                    };
                    changes.push(ChangeLogEntry {
                        line,
                        field: ChangedField::Symbol,
                        old_value: record.symbol.take().unwrap_or_default(),
                        new_value: resolution.symbol.clone(),
                        reason,
                    });
                    record.symbol = Some(resolution.symbol);
                }
            }

            if opts.fix_rounding {
                if let Some(fix) = corrector.apply(&mut record) {
                    stats.rounding_fixed += 1;
                    changes.push(ChangeLogEntry {
                        line,
                        field: ChangedField::Amount,
                        old_value: fix.old.to_string(),
                        new_value: fix.new.to_string(),
                        reason: ChangeReason::RoundingFix,
                    });
                }
            }
            records.push(record);
        }

        Ok(Postprocessed {
            records,
            changes,
            stats,
            collisions: resolver.into_collisions(),
        })
    }
}

/// Writes one change per line, e.g. `line 12: Symbol "" -> "VWRL" (mapped symbol)`.
pub fn write_change_log<W: Write>(mut writer: W, changes: &[ChangeLogEntry]) -> std::io::Result<()> {
    for change in changes {
        writeln!(writer, "{change}")?;
    }
    writer.flush()
}
