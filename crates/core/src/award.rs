use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::RecordError;
use super::period::parse_award_date;

pub const AWARD_COLUMN_COUNT: usize = 15;
pub const AWARD_REQUIRED_HEADERS: [&str; 3] = ["Date", "Symbol", "FairMarketValuePrice"];
pub const AWARD_DATE_HEADER: &str = "Date";
pub const AWARD_DETAIL_DATE_HEADER: &str = "AwardDate";

/// One equity award event. Exports spread it over two physical rows: the lead
/// row (date, action, symbol, quantity) and a detail row (award date, fair
/// market value, ...). The pair is only ever compared and moved as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwardPair {
    lead: Vec<String>,
    detail: Vec<String>,
    date: NaiveDate,
}

impl AwardPair {
    /// Validates that both rows have the full column count and complement
    /// each other, then parses the sort date from `date_idx` in the lead row,
    /// or `detail_date_idx` in the detail row when the lead cell is blank.
    pub fn new(
        lead: Vec<String>,
        detail: Vec<String>,
        date_idx: usize,
        detail_date_idx: Option<usize>,
    ) -> Result<Self, RecordError> {
        for row in [&lead, &detail] {
            if row.len() != AWARD_COLUMN_COUNT {
                return Err(RecordError::ColumnCount {
                    expected: AWARD_COLUMN_COUNT,
                    found: row.len(),
                });
            }
        }
        if let Some((index, (l, d))) = lead
            .iter()
            .zip(&detail)
            .enumerate()
            .find(|(_, (l, d))| !l.is_empty() && !d.is_empty())
        {
            return Err(RecordError::AwardConflict {
                index,
                lead: l.clone(),
                detail: d.clone(),
            });
        }

        let lead_date = lead[date_idx].trim();
        let raw_date = if lead_date.is_empty() {
            detail_date_idx
                .map(|i| detail[i].trim())
                .filter(|s| !s.is_empty())
                .ok_or(RecordError::MissingValue { column: AWARD_DATE_HEADER })?
        } else {
            lead_date
        };
        let date = parse_award_date(raw_date).map_err(|_| RecordError::InvalidDate {
            column: AWARD_DATE_HEADER,
            value: raw_date.to_string(),
        })?;

        Ok(AwardPair { lead, detail, date })
    }

    pub fn lead(&self) -> &[String] {
        &self.lead
    }

    pub fn detail(&self) -> &[String] {
        &self.detail
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Both rows, in file order.
    pub fn rows(&self) -> [&[String]; 2] {
        [&self.lead, &self.detail]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(usize, &str)]) -> Vec<String> {
        let mut out = vec![String::new(); AWARD_COLUMN_COUNT];
        for (i, v) in cells {
            out[*i] = v.to_string();
        }
        out
    }

    #[test]
    fn pair_parses_lead_date() {
        let pair = AwardPair::new(
            row(&[(0, "03/15/2024"), (1, "Lapse"), (2, "GOOG"), (4, "10")]),
            row(&[(8, "03/01/2022"), (9, "$140.50")]),
            0,
            Some(8),
        )
        .unwrap();
        assert_eq!(pair.date(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(pair.lead()[2], "GOOG");
        assert_eq!(pair.detail()[9], "$140.50");
    }

    #[test]
    fn pair_falls_back_to_detail_date() {
        let pair = AwardPair::new(
            row(&[(2, "GOOG")]),
            row(&[(8, "2022/03/01")]),
            0,
            Some(8),
        )
        .unwrap();
        assert_eq!(pair.date(), NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
    }

    #[test]
    fn pair_without_any_date_is_rejected() {
        let err = AwardPair::new(row(&[(2, "GOOG")]), row(&[]), 0, Some(8)).unwrap_err();
        assert_eq!(err, RecordError::MissingValue { column: "Date" });
    }

    #[test]
    fn pair_rejects_overlapping_rows() {
        let err = AwardPair::new(
            row(&[(0, "03/15/2024"), (4, "10")]),
            row(&[(4, "12")]),
            0,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::AwardConflict { index: 4, .. }));
    }

    #[test]
    fn pair_rejects_short_rows() {
        let err = AwardPair::new(vec!["03/15/2024".into()], row(&[]), 0, None).unwrap_err();
        assert_eq!(err, RecordError::ColumnCount { expected: 15, found: 1 });
    }

    #[test]
    fn pairs_compare_as_a_whole() {
        let a = AwardPair::new(row(&[(0, "03/15/2024")]), row(&[(9, "$1.00")]), 0, None).unwrap();
        let b = AwardPair::new(row(&[(0, "03/15/2024")]), row(&[(9, "$2.00")]), 0, None).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
