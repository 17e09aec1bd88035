use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use sieve_core::award::{
    AWARD_COLUMN_COUNT, AWARD_DATE_HEADER, AWARD_DETAIL_DATE_HEADER, AWARD_REQUIRED_HEADERS,
};
use sieve_core::{AwardPair, Column, PriceRecord, RecordError, SpinOffRecord, TransactionRecord};
use thiserror::Error;
use tracing::{debug, warn};

use crate::symbols::SymbolMapping;

pub const MIN_TRANSACTION_COLUMNS: usize = 8;
pub const MAX_TRANSACTION_COLUMNS: usize = 9;
pub const PRICE_HEADERS: [&str; 3] = ["date", "symbol", "price"];
pub const SPIN_OFF_HEADERS: [&str; 2] = ["dst", "src"];
pub const MAPPING_HEADERS: [&str; 2] = ["Description", "Symbol"];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Empty file: {file}")]
    EmptyFile { file: String },
    #[error("Invalid column count in {file}: expected {expected}, got {found}")]
    ColumnCount {
        file: String,
        expected: String,
        found: usize,
    },
    #[error("Missing required columns in {file}: {}", .missing.join(", "))]
    MissingColumns { file: String, missing: Vec<String> },
    #[error(
        "{file} has different columns than {reference} (missing: [{}], extra: [{}])",
        .missing.join(", "),
        .extra.join(", ")
    )]
    HeaderMismatch {
        reference: String,
        file: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error("{file}, line {line}: {error}")]
    Record {
        file: String,
        line: usize,
        #[source]
        error: RecordError,
    },
    #[error("{file}, line {line}: expected {expected} fields, got {found}")]
    RowLength {
        file: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{file}, line {line}: unexpected value '{value}' in an unnamed column")]
    TrailingValue {
        file: String,
        line: usize,
        value: String,
    },
    #[error("Odd number of data rows ({rows}) in {file}: awards span two rows each")]
    OddAwardRows { file: String, rows: usize },
}

// ── Raw table reading ────────────────────────────────────────────────────────

struct RawTable {
    headers: Vec<String>,
    /// Non-blank data rows with their 1-based line number.
    rows: Vec<(usize, StringRecord)>,
}

fn read_table<R: Read>(reader: R, file: &str) -> Result<RawTable, CsvError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records();

    let header = match records.next() {
        Some(result) => result?,
        None => return Err(CsvError::EmptyFile { file: file.to_string() }),
    };
    let headers = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in records.enumerate() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map_or(idx + 2, |p| p.line() as usize);
        rows.push((line, record));
    }
    Ok(RawTable { headers, rows })
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn require_columns<const N: usize>(
    headers: &[String],
    names: [&str; N],
    file: &str,
) -> Result<[usize; N], CsvError> {
    let found = names.map(|name| header_index(headers, name));
    let missing: Vec<String> = names
        .iter()
        .zip(&found)
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CsvError::MissingColumns { file: file.to_string(), missing });
    }
    Ok(found.map(Option::unwrap_or_default))
}

/// Rows of the fixed-width tables must have exactly one cell per header.
fn check_row_width(
    file: &str,
    line: usize,
    row: &StringRecord,
    expected: usize,
) -> Result<(), CsvError> {
    if row.len() == expected {
        return Ok(());
    }
    Err(CsvError::RowLength {
        file: file.to_string(),
        line,
        expected,
        found: row.len(),
    })
}

fn record_error(file: &str, line: usize) -> impl FnOnce(RecordError) -> CsvError + '_ {
    move |error| CsvError::Record { file: file.to_string(), line, error }
}

fn named_headers(headers: &[String]) -> BTreeSet<&str> {
    headers.iter().map(|h| h.trim()).filter(|h| !h.is_empty()).collect()
}

/// Fails unless both files carry the same set of named headers, in any
/// order. Blank header cells (the unnamed trailing column) are ignored.
pub fn check_same_headers(
    reference: &str,
    reference_headers: &[String],
    file: &str,
    headers: &[String],
) -> Result<(), CsvError> {
    let expected = named_headers(reference_headers);
    let actual = named_headers(headers);
    if expected == actual {
        return Ok(());
    }
    Err(CsvError::HeaderMismatch {
        reference: reference.to_string(),
        file: file.to_string(),
        missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
        extra: actual.difference(&expected).map(|s| s.to_string()).collect(),
    })
}

// ── Transactions ─────────────────────────────────────────────────────────────

/// Where each canonical column lives in a particular file's header row.
/// Exports come with 8 columns or with a 9th, unnamed, always-empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLayout {
    headers: Vec<String>,
    positions: [usize; 8],
}

impl Default for TransactionLayout {
    fn default() -> Self {
        Self {
            headers: Column::ALL.iter().map(|c| c.header().to_string()).collect(),
            positions: std::array::from_fn(|i| i),
        }
    }
}

impl TransactionLayout {
    pub fn from_headers(headers: Vec<String>, file: &str) -> Result<Self, CsvError> {
        if !(MIN_TRANSACTION_COLUMNS..=MAX_TRANSACTION_COLUMNS).contains(&headers.len()) {
            return Err(CsvError::ColumnCount {
                file: file.to_string(),
                expected: format!("{MIN_TRANSACTION_COLUMNS}-{MAX_TRANSACTION_COLUMNS}"),
                found: headers.len(),
            });
        }
        let positions = require_columns(&headers, Column::ALL.map(Column::header), file)?;
        Ok(Self { headers, positions })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Extracts the canonical cells from a raw row. The row may omit a
    /// trailing unnamed column or carry one extra empty cell; any value in a
    /// column that no canonical header claims is rejected.
    fn cells<'r>(
        &self,
        row: &'r StringRecord,
        file: &str,
        line: usize,
    ) -> Result<[&'r str; 8], CsvError> {
        let width = self.headers.len();
        if self.positions.iter().any(|&p| p >= row.len()) || row.len() > width + 1 {
            return Err(CsvError::RowLength {
                file: file.to_string(),
                line,
                expected: width,
                found: row.len(),
            });
        }
        if let Some(value) = row
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.positions.contains(i))
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
        {
            return Err(CsvError::TrailingValue {
                file: file.to_string(),
                line,
                value: value.to_string(),
            });
        }
        Ok(self.positions.map(|p| row.get(p).unwrap_or_default()))
    }

    /// Lays a record out in this file's column order.
    pub fn to_row(&self, record: &TransactionRecord) -> Vec<String> {
        let mut row = vec![String::new(); self.headers.len()];
        for (cell, &pos) in record.to_cells().into_iter().zip(&self.positions) {
            row[pos] = cell;
        }
        row
    }
}

#[derive(Debug, Clone)]
pub struct TransactionFile {
    pub layout: TransactionLayout,
    /// Records paired with the line they were read from.
    pub rows: Vec<(usize, TransactionRecord)>,
}

impl TransactionFile {
    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.rows.iter().map(|(_, r)| r)
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.rows.into_iter().map(|(_, r)| r).collect()
    }
}

pub fn read_transactions<R: Read>(reader: R, file: &str) -> Result<TransactionFile, CsvError> {
    let table = read_table(reader, file)?;
    let layout = TransactionLayout::from_headers(table.headers, file)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for (line, raw) in &table.rows {
        let cells = layout.cells(raw, file, *line)?;
        let record = TransactionRecord::from_cells(cells).map_err(record_error(file, *line))?;
        rows.push((*line, record));
    }
    debug!(file, rows = rows.len(), "read transactions");
    Ok(TransactionFile { layout, rows })
}

pub fn write_transactions<W: Write>(
    writer: W,
    layout: &TransactionLayout,
    records: &[TransactionRecord],
) -> Result<(), CsvError> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(layout.headers())?;
    for record in records {
        wtr.write_record(layout.to_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Equity awards ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AwardFile {
    pub headers: Vec<String>,
    /// Pairs with the line of their lead row.
    pub pairs: Vec<(usize, AwardPair)>,
}

impl AwardFile {
    pub fn awards(&self) -> impl Iterator<Item = &AwardPair> {
        self.pairs.iter().map(|(_, pair)| pair)
    }

    /// Re-expresses every pair in `reference` column order. The caller checks
    /// beforehand that both header sets match.
    pub fn into_order(self, reference: &[String], file: &str) -> Result<Vec<AwardPair>, CsvError> {
        if self.headers == reference {
            return Ok(self.pairs.into_iter().map(|(_, pair)| pair).collect());
        }
        let mapping: Vec<usize> = reference
            .iter()
            .filter_map(|name| self.headers.iter().position(|h| h == name))
            .collect();
        if mapping.len() != reference.len() {
            return Err(CsvError::ColumnCount {
                file: file.to_string(),
                expected: reference.len().to_string(),
                found: mapping.len(),
            });
        }
        let [date_idx, _, _] = require_columns(reference, AWARD_REQUIRED_HEADERS, file)?;
        let detail_idx = header_index(reference, AWARD_DETAIL_DATE_HEADER);
        let remap = |row: &[String]| mapping.iter().map(|&i| row[i].clone()).collect::<Vec<_>>();

        self.pairs
            .into_iter()
            .map(|(line, pair)| {
                AwardPair::new(remap(pair.lead()), remap(pair.detail()), date_idx, detail_idx)
                    .map_err(record_error(file, line))
            })
            .collect()
    }
}

pub fn read_awards<R: Read>(reader: R, file: &str) -> Result<AwardFile, CsvError> {
    let table = read_table(reader, file)?;
    if table.headers.len() != AWARD_COLUMN_COUNT {
        return Err(CsvError::ColumnCount {
            file: file.to_string(),
            expected: AWARD_COLUMN_COUNT.to_string(),
            found: table.headers.len(),
        });
    }
    let [date_idx, _, _] = require_columns(&table.headers, AWARD_REQUIRED_HEADERS, file)?;
    let detail_idx = header_index(&table.headers, AWARD_DETAIL_DATE_HEADER);
    if table.rows.len() % 2 != 0 {
        return Err(CsvError::OddAwardRows { file: file.to_string(), rows: table.rows.len() });
    }

    let to_cells = |(line, row): &(usize, StringRecord)| -> Result<Vec<String>, CsvError> {
        check_row_width(file, *line, row, AWARD_COLUMN_COUNT)?;
        Ok(row.iter().map(str::to_string).collect())
    };

    let mut pairs = Vec::with_capacity(table.rows.len() / 2);
    for chunk in table.rows.chunks_exact(2) {
        let lead_line = chunk[0].0;
        let pair = AwardPair::new(to_cells(&chunk[0])?, to_cells(&chunk[1])?, date_idx, detail_idx)
            .map_err(record_error(file, lead_line))?;
        pairs.push((lead_line, pair));
    }
    debug!(file, pairs = pairs.len(), date_column = AWARD_DATE_HEADER, "read awards");
    Ok(AwardFile { headers: table.headers, pairs })
}

pub fn write_awards<W: Write>(
    writer: W,
    headers: &[String],
    pairs: &[AwardPair],
) -> Result<(), CsvError> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(headers)?;
    for pair in pairs {
        for row in pair.rows() {
            wtr.write_record(row)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

// ── Prices and spin-offs ─────────────────────────────────────────────────────

pub fn read_prices<R: Read>(reader: R, file: &str) -> Result<Vec<PriceRecord>, CsvError> {
    let table = read_table(reader, file)?;
    let [date, symbol, price] = require_columns(&table.headers, PRICE_HEADERS, file)?;
    let width = table.headers.len();
    table
        .rows
        .iter()
        .map(|(line, row)| {
            check_row_width(file, *line, row, width)?;
            let cell = |i: usize| row.get(i).unwrap_or_default();
            PriceRecord::parse(cell(date), cell(symbol), cell(price))
                .map_err(record_error(file, *line))
        })
        .collect()
}

pub fn write_prices<W: Write>(writer: W, records: &[PriceRecord]) -> Result<(), CsvError> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(PRICE_HEADERS)?;
    for p in records {
        let price = p.price.to_string();
        wtr.write_record([p.date_text.as_str(), p.symbol.as_str(), price.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_spin_offs<R: Read>(reader: R, file: &str) -> Result<Vec<SpinOffRecord>, CsvError> {
    let table = read_table(reader, file)?;
    let [dst, src] = require_columns(&table.headers, SPIN_OFF_HEADERS, file)?;
    let width = table.headers.len();
    table
        .rows
        .iter()
        .map(|(line, row)| {
            check_row_width(file, *line, row, width)?;
            let cell = |i: usize| row.get(i).unwrap_or_default();
            SpinOffRecord::parse(cell(dst), cell(src)).map_err(record_error(file, *line))
        })
        .collect()
}

pub fn write_spin_offs<W: Write>(writer: W, records: &[SpinOffRecord]) -> Result<(), CsvError> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(SPIN_OFF_HEADERS)?;
    for s in records {
        wtr.write_record([&s.dst, &s.src])?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Symbol mapping ───────────────────────────────────────────────────────────

/// Reads a `Description,Symbol` table. Blank descriptions are skipped; a
/// repeated description keeps its first symbol.
pub fn read_symbol_mapping<R: Read>(reader: R, file: &str) -> Result<SymbolMapping, CsvError> {
    let table = read_table(reader, file)?;
    let [desc_idx, symbol_idx] = require_columns(&table.headers, MAPPING_HEADERS, file)?;

    let mut mapping = SymbolMapping::default();
    for (line, row) in &table.rows {
        check_row_width(file, *line, row, table.headers.len())?;
        let description = row.get(desc_idx).unwrap_or_default().trim();
        let symbol = row.get(symbol_idx).unwrap_or_default().trim();
        if description.is_empty() {
            debug!(file, line, "skipping mapping row without description");
            continue;
        }
        if symbol.is_empty() {
            return Err(record_error(file, *line)(RecordError::MissingValue { column: "Symbol" }));
        }
        if !mapping.insert(description, symbol) {
            warn!(file, line, description, "duplicate mapping ignored, keeping first symbol");
        }
    }
    debug!(file, entries = mapping.len(), "read symbol mapping");
    Ok(mapping)
}

// ── Files ────────────────────────────────────────────────────────────────────

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer)
}

/// Opens `path` and hands it to one of the `read_*` functions, labelling
/// errors with the path.
pub fn read_path<T, F>(path: &Path, read: F) -> Result<T, CsvError>
where
    F: FnOnce(File, &str) -> Result<T, CsvError>,
{
    let file = File::open(path)?;
    read(file, &path.display().to_string())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes through a temporary sibling and renames it over `path` only once
/// `write` succeeded, so a failed run never leaves a partial file behind.
pub fn write_file_atomic<F>(path: &Path, write: F) -> Result<(), CsvError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), CsvError>,
{
    let tmp = temp_sibling(path);
    let result = (|| -> Result<(), CsvError> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write(&mut out)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
