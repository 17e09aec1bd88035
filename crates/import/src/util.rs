use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_file_account, r"XXX(\d{3,4})");
re!(re_journal_account, r"\.{3}(\d{3,4})");

/// Account suffix embedded in an export filename,
/// e.g. `Individual_XXX157_Transactions_20251114.csv` → `157`.
pub fn extract_account_number(filename: &str) -> Option<String> {
    re_file_account()
        .captures(filename)
        .map(|c| c[1].to_string())
}

/// Counterparty account in a journal description, e.g. `JOURNAL TO ...964`.
pub fn extract_journal_account(description: &str) -> Option<String> {
    re_journal_account()
        .captures(description)
        .map(|c| c[1].to_string())
}

/// Accounts named by every input filename, or `None` if any file lacks one.
pub fn accounts_from_paths<P: AsRef<Path>>(paths: &[P]) -> Option<BTreeSet<String>> {
    paths
        .iter()
        .map(|p| {
            p.as_ref()
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(extract_account_number)
        })
        .collect()
}

/// Shortens `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_from_filename() {
        assert_eq!(
            extract_account_number("Individual_XXX157_Transactions_20251114.csv").as_deref(),
            Some("157")
        );
        assert_eq!(extract_account_number("SCHWAB1_XXX9640_Tx.csv").as_deref(), Some("9640"));
        assert_eq!(extract_account_number("transactions.csv"), None);
    }

    #[test]
    fn account_from_journal_description() {
        assert_eq!(extract_journal_account("JOURNAL TO ...964").as_deref(), Some("964"));
        assert_eq!(extract_journal_account("JOURNAL FRM ...157").as_deref(), Some("157"));
        assert_eq!(extract_journal_account("Regular transaction"), None);
    }

    #[test]
    fn accounts_require_every_file() {
        let all = accounts_from_paths(&["dir/A_XXX157_T.csv", "B_XXX964_T.csv"]).unwrap();
        assert_eq!(all.into_iter().collect::<Vec<_>>(), vec!["157", "964"]);
        assert!(accounts_from_paths(&["A_XXX157_T.csv", "plain.csv"]).is_none());
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_text("Short text", 50), "Short text");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ééé", 2), "éé...");
    }
}
