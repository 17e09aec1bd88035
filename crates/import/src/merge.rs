use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::NaiveDate;
use serde::Serialize;
use sieve_core::{AwardPair, PriceRecord, SpinOffRecord, TransactionKey, TransactionRecord};
use tracing::{debug, warn};

/// Which record survives when several inputs share an identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TieBreak {
    FirstWins,
    LastWins,
}

/// A record kind the merge engine can deduplicate and order.
pub trait Mergeable: Clone + PartialEq + Debug {
    type Key: Eq + Hash + Clone;
    type SortKey: Ord;

    const TIE_BREAK: TieBreak;

    fn identity_key(&self) -> Self::Key;
    fn sort_key(&self) -> Self::SortKey;
}

/// A record dropped because an equal-keyed one was already kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Duplicate<T> {
    /// Index of the input the dropped record came from.
    pub source: usize,
    pub record: T,
}

/// A last-wins overwrite with a different value.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement<T> {
    pub source: usize,
    pub old: T,
    pub new: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport<T> {
    pub input_counts: Vec<usize>,
    pub duplicates: Vec<Duplicate<T>>,
    pub replacements: Vec<Replacement<T>>,
}

impl<T> MergeReport<T> {
    pub fn total_input(&self) -> usize {
        self.input_counts.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T> {
    pub records: Vec<T>,
    pub report: MergeReport<T>,
}

/// Collapses records sharing an identity key, keeping input order.
///
/// First-wins kinds keep the earliest record. Last-wins kinds keep the slot
/// of the earliest record but take the value of the latest one; an overwrite
/// with an identical value counts as a plain duplicate.
pub fn dedup<T: Mergeable>(inputs: Vec<Vec<T>>) -> (Vec<T>, MergeReport<T>) {
    let input_counts: Vec<usize> = inputs.iter().map(Vec::len).collect();
    let mut kept: Vec<T> = Vec::with_capacity(input_counts.iter().sum());
    let mut index: HashMap<T::Key, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    let mut replacements = Vec::new();

    for (source, records) in inputs.into_iter().enumerate() {
        for record in records {
            let key = record.identity_key();
            let Some(&slot) = index.get(&key) else {
                index.insert(key, kept.len());
                kept.push(record);
                continue;
            };
            if T::TIE_BREAK == TieBreak::LastWins && kept[slot] != record {
                warn!(source, old = ?kept[slot], new = ?record, "replacing earlier record");
                let old = std::mem::replace(&mut kept[slot], record.clone());
                replacements.push(Replacement { source, old, new: record });
            } else {
                debug!(source, ?record, "dropping duplicate");
                duplicates.push(Duplicate { source, record });
            }
        }
    }

    let report = MergeReport { input_counts, duplicates, replacements };
    (kept, report)
}

/// Stable sort: records with equal sort keys keep their relative order.
pub fn sort_records<T: Mergeable>(records: &mut [T]) {
    records.sort_by_cached_key(T::sort_key);
}

pub fn merge<T: Mergeable>(inputs: Vec<Vec<T>>) -> MergeOutcome<T> {
    let (mut records, report) = dedup(inputs);
    sort_records(&mut records);
    MergeOutcome { records, report }
}

// ── Record kinds ─────────────────────────────────────────────────────────────

impl Mergeable for TransactionRecord {
    type Key = TransactionKey;
    type SortKey = NaiveDate;
    const TIE_BREAK: TieBreak = TieBreak::FirstWins;

    fn identity_key(&self) -> TransactionKey {
        TransactionRecord::identity_key(self)
    }

    fn sort_key(&self) -> NaiveDate {
        self.posted()
    }
}

impl Mergeable for AwardPair {
    /// Both rows, lead first.
    type Key = Vec<String>;
    type SortKey = NaiveDate;
    const TIE_BREAK: TieBreak = TieBreak::FirstWins;

    fn identity_key(&self) -> Vec<String> {
        self.lead().iter().chain(self.detail()).cloned().collect()
    }

    fn sort_key(&self) -> NaiveDate {
        self.date()
    }
}

impl Mergeable for PriceRecord {
    type Key = (NaiveDate, String);
    type SortKey = (NaiveDate, String);
    const TIE_BREAK: TieBreak = TieBreak::LastWins;

    fn identity_key(&self) -> Self::Key {
        (self.date, self.symbol.clone())
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.date, self.symbol.clone())
    }
}

impl Mergeable for SpinOffRecord {
    type Key = String;
    type SortKey = String;
    const TIE_BREAK: TieBreak = TieBreak::LastWins;

    fn identity_key(&self) -> String {
        self.dst.clone()
    }

    fn sort_key(&self) -> String {
        self.dst.clone()
    }
}
