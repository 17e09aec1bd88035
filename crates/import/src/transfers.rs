use std::collections::BTreeSet;

use serde::Serialize;
use sieve_core::{Action, Money, TransactionRecord};
use thiserror::Error;
use tracing::{debug, info};

use crate::util::{extract_journal_account, truncate_text};

const JOURNAL_TO: &str = "JOURNAL TO";
const JOURNAL_FRM: &str = "JOURNAL FRM";

#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Keep transfers without a counterpart instead of failing.
    pub keep_unmatched: bool,
    /// Accounts being merged, taken from the input filenames. When set,
    /// journal pairs are only matched if both legs name one of these
    /// accounts, and only unmatched journals naming one of them are errors.
    pub accounts: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub journaled_found: usize,
    pub journaled_pairs: usize,
    pub journal_found: usize,
    pub journal_pairs: usize,
    pub unmatched_kept: usize,
}

impl TransferSummary {
    pub fn removed(&self) -> usize {
        2 * (self.journaled_pairs + self.journal_pairs)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error(
        "{count} unmatched transfer(s) found (use --keep-unmatched-transfers to keep them):\n{}",
        .details.join("\n")
    )]
    Unmatched { count: usize, details: Vec<String> },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum JournalLeg {
    To,
    From,
}

fn journal_leg(record: &TransactionRecord) -> Option<JournalLeg> {
    let desc = record.description.to_uppercase();
    if desc.contains(JOURNAL_TO) {
        Some(JournalLeg::To)
    } else if desc.contains(JOURNAL_FRM) {
        Some(JournalLeg::From)
    } else {
        None
    }
}

/// An overflowing sum cannot be zero.
fn sums_to_zero(a: Money, b: Money) -> bool {
    a.checked_add(b).is_some_and(Money::is_zero)
}

/// Removes both legs of internal transfers from a merged transaction set.
///
/// `Journaled Shares` rows pair up when symbol, date and price agree and the
/// quantities cancel out. `Journal` rows pair a `JOURNAL TO` leg with a
/// `JOURNAL FRM` leg on the same date with cancelling amounts. Pairing is
/// greedy in input order; the relative order of surviving rows is kept.
pub fn filter_transfers(
    records: Vec<TransactionRecord>,
    options: &TransferOptions,
) -> Result<(Vec<TransactionRecord>, TransferSummary), TransferError> {
    let journaled: Vec<usize> = indices_of(&records, &Action::JournaledShares);
    let journal: Vec<usize> = indices_of(&records, &Action::Journal);
    let mut summary = TransferSummary {
        journaled_found: journaled.len(),
        journal_found: journal.len(),
        ..TransferSummary::default()
    };
    if journaled.is_empty() && journal.is_empty() {
        return Ok((records, summary));
    }

    let mut matched = vec![false; records.len()];
    summary.journaled_pairs = pair_up(&journaled, &mut matched, |a, b| {
        let (a, b) = (&records[a], &records[b]);
        match (a.quantity, b.quantity) {
            (Some(qa), Some(qb)) => {
                a.symbol == b.symbol
                    && a.date == b.date
                    && a.price == b.price
                    && qa.checked_add(qb).is_some_and(|q| q.is_zero())
            }
            _ => false,
        }
    });
    summary.journal_pairs = pair_up(&journal, &mut matched, |a, b| {
        journals_match(&records[a], &records[b], options.accounts.as_ref())
    });

    let problems: Vec<String> = journaled
        .iter()
        .chain(&journal)
        .filter(|&&i| !matched[i])
        .map(|&i| &records[i])
        .filter(|r| is_problem(r, options.accounts.as_ref()))
        .map(describe)
        .collect();
    if !options.keep_unmatched && !problems.is_empty() {
        return Err(TransferError::Unmatched { count: problems.len(), details: problems });
    }

    let unmatched = journaled.iter().chain(&journal).filter(|&&i| !matched[i]).count();
    summary.unmatched_kept = unmatched;
    if unmatched > 0 {
        info!(unmatched, "keeping unmatched transfers");
    }

    let kept = records
        .into_iter()
        .zip(matched)
        .filter_map(|(record, m)| (!m).then_some(record))
        .collect();
    debug!(?summary, "transfer filter done");
    Ok((kept, summary))
}

fn indices_of(records: &[TransactionRecord], action: &Action) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| &r.action == action)
        .map(|(i, _)| i)
        .collect()
}

/// Greedily pairs each candidate with the first later unmatched candidate
/// accepted by `is_pair`. Returns the number of pairs.
fn pair_up<F>(candidates: &[usize], matched: &mut [bool], is_pair: F) -> usize
where
    F: Fn(usize, usize) -> bool,
{
    let mut pairs = 0;
    for (pos, &a) in candidates.iter().enumerate() {
        if matched[a] {
            continue;
        }
        let partner = candidates[pos + 1..]
            .iter()
            .copied()
            .find(|&b| !matched[b] && is_pair(a, b));
        if let Some(b) = partner {
            matched[a] = true;
            matched[b] = true;
            pairs += 1;
        }
    }
    pairs
}

fn journals_match(
    a: &TransactionRecord,
    b: &TransactionRecord,
    accounts: Option<&BTreeSet<String>>,
) -> bool {
    let (Some(amount_a), Some(amount_b)) = (a.amount, b.amount) else {
        return false;
    };
    let opposite = matches!(
        (journal_leg(a), journal_leg(b)),
        (Some(JournalLeg::To), Some(JournalLeg::From)) | (Some(JournalLeg::From), Some(JournalLeg::To))
    );
    if a.date != b.date || !opposite || !sums_to_zero(amount_a, amount_b) {
        return false;
    }
    if let Some(accounts) = accounts {
        let legs = (
            extract_journal_account(&a.description),
            extract_journal_account(&b.description),
        );
        if let (Some(acct_a), Some(acct_b)) = legs {
            if !accounts.contains(&acct_a) || !accounts.contains(&acct_b) {
                debug!(date = %a.date, acct_a, acct_b, "journal pair names an account outside the merge");
                return false;
            }
        }
    }
    true
}

fn is_problem(record: &TransactionRecord, accounts: Option<&BTreeSet<String>>) -> bool {
    match (&record.action, accounts) {
        (Action::Journal, Some(accounts)) => extract_journal_account(&record.description)
            .is_some_and(|acct| accounts.contains(&acct)),
        _ => true,
    }
}

fn describe(record: &TransactionRecord) -> String {
    let show = |m: Option<Money>| m.map(|m| m.to_string()).unwrap_or_default();
    match record.action {
        Action::JournaledShares => format!(
            "  {}, {}, qty {}",
            record.date,
            record.symbol.as_deref().unwrap_or_default(),
            record.quantity.map(|q| q.to_string()).unwrap_or_default()
        ),
        _ => format!(
            "  {}, {}, amt {}",
            record.date,
            truncate_text(&record.description, 50),
            show(record.amount)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shares(date: &str, symbol: &str, qty: &str) -> TransactionRecord {
        TransactionRecord::from_cells([
            date,
            "Journaled Shares",
            symbol,
            "JOURNALED SHARES",
            qty,
            "",
            "",
            "",
        ])
        .unwrap()
    }

    fn journal(date: &str, desc: &str, amount: &str) -> TransactionRecord {
        TransactionRecord::from_cells([date, "Journal", "", desc, "", "", "", amount]).unwrap()
    }

    fn buy(date: &str) -> TransactionRecord {
        TransactionRecord::from_cells([date, "Buy", "AAPL", "APPLE INC", "1", "$1.00", "", "-$1.00"])
            .unwrap()
    }

    fn accounts(list: &[&str]) -> Option<BTreeSet<String>> {
        Some(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn no_transfers_is_a_no_op() {
        let records = vec![buy("01/02/2024"), buy("01/01/2024")];
        let (kept, summary) = filter_transfers(records.clone(), &TransferOptions::default()).unwrap();
        assert_eq!(kept, records);
        assert_eq!(summary, TransferSummary::default());
    }

    #[test]
    fn overflowing_amounts_never_pair() {
        let huge = "79228162514264337593543950335";
        let records = vec![
            journal("02/20/2025", "JOURNAL TO ...964", huge),
            journal("02/20/2025", "JOURNAL FRM ...157", huge),
            shares("02/20/2025", "VWRL", huge),
            shares("02/20/2025", "VWRL", huge),
        ];
        let options = TransferOptions { keep_unmatched: true, ..Default::default() };
        let (kept, summary) = filter_transfers(records, &options).unwrap();
        assert_eq!(kept.len(), 4);
        assert_eq!(summary.removed(), 0);
    }

    #[test]
    fn journaled_share_pair_removed() {
        let records = vec![
            buy("01/01/2024"),
            shares("02/01/2024", "VWRL", "161"),
            shares("02/01/2024", "VWRL", "-161"),
        ];
        let (kept, summary) = filter_transfers(records, &TransferOptions::default()).unwrap();
        assert_eq!(kept, vec![buy("01/01/2024")]);
        assert_eq!(summary.journaled_pairs, 1);
        assert_eq!(summary.removed(), 2);
    }

    #[test]
    fn journal_pair_removed() {
        let records = vec![
            journal("02/20/2025", "JOURNAL TO ...964", "-$100,000.00"),
            buy("02/21/2025"),
            journal("02/20/2025", "JOURNAL FRM ...157", "$100,000.00"),
        ];
        let (kept, summary) = filter_transfers(records, &TransferOptions::default()).unwrap();
        assert_eq!(kept, vec![buy("02/21/2025")]);
        assert_eq!(summary.journal_pairs, 1);
    }

    #[test]
    fn unmatched_transfer_is_an_error() {
        let records = vec![shares("02/01/2024", "VWRL", "161"), shares("02/01/2024", "VWRL", "-160")];
        let err = filter_transfers(records, &TransferOptions::default()).unwrap_err();
        match err {
            TransferError::Unmatched { count, details } => {
                assert_eq!(count, 2);
                assert_eq!(details[0], "  02/01/2024, VWRL, qty 161");
            }
        }
    }

    #[test]
    fn unmatched_kept_when_asked() {
        let records = vec![buy("01/01/2024"), shares("02/01/2024", "VWRL", "161")];
        let options = TransferOptions { keep_unmatched: true, accounts: None };
        let (kept, summary) = filter_transfers(records.clone(), &options).unwrap();
        assert_eq!(kept, records);
        assert_eq!(summary.unmatched_kept, 1);
    }

    #[test]
    fn pairs_are_greedy_and_one_to_one() {
        let records = vec![
            shares("02/01/2024", "VWRL", "10"),
            shares("02/01/2024", "VWRL", "-10"),
            shares("02/01/2024", "VWRL", "-10"),
        ];
        let options = TransferOptions { keep_unmatched: true, accounts: None };
        let (kept, summary) = filter_transfers(records, &options).unwrap();
        assert_eq!(summary.journaled_pairs, 1);
        assert_eq!(kept, vec![shares("02/01/2024", "VWRL", "-10")]);
    }

    #[test]
    fn account_verification_skips_foreign_pairs() {
        let records = vec![
            journal("02/20/2025", "JOURNAL TO ...964", "-$500.00"),
            journal("02/20/2025", "JOURNAL FRM ...777", "$500.00"),
        ];
        let options = TransferOptions { keep_unmatched: false, accounts: accounts(&["157", "964"]) };
        let err = filter_transfers(records, &options).unwrap_err();
        // Only the leg naming a merged account is a problem.
        assert!(matches!(err, TransferError::Unmatched { count: 1, .. }));
    }

    #[test]
    fn account_verification_keeps_external_journals() {
        let records = vec![journal("02/20/2025", "JOURNAL TO ...555", "-$500.00")];
        let options = TransferOptions { keep_unmatched: false, accounts: accounts(&["157", "964"]) };
        let (kept, summary) = filter_transfers(records.clone(), &options).unwrap();
        assert_eq!(kept, records);
        assert_eq!(summary.unmatched_kept, 1);
    }

    #[test]
    fn account_verification_matches_merged_accounts() {
        let records = vec![
            journal("02/20/2025", "JOURNAL TO ...964", "-$500.00"),
            journal("02/20/2025", "JOURNAL FRM ...157", "$500.00"),
        ];
        let options = TransferOptions { keep_unmatched: false, accounts: accounts(&["157", "964"]) };
        let (kept, _) = filter_transfers(records, &options).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn same_direction_journals_do_not_pair() {
        let records = vec![
            journal("02/20/2025", "JOURNAL TO ...964", "-$500.00"),
            journal("02/20/2025", "JOURNAL TO ...157", "$500.00"),
        ];
        assert!(filter_transfers(records, &TransferOptions::default()).is_err());
    }
}
