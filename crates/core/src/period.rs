use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const US_DATE: &str = "%m/%d/%Y";
const AS_OF: &str = " as of ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid date: '{0}'")]
pub struct ParseDateError(pub String);

/// A transaction date as exported by the broker. Late-posted rows carry a
/// second, effective date: `"06/02/2025 as of 05/30/2025"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerDate {
    posted: NaiveDate,
    as_of: Option<NaiveDate>,
}

impl BrokerDate {
    pub fn new(posted: NaiveDate) -> Self {
        BrokerDate { posted, as_of: None }
    }

    pub fn with_as_of(posted: NaiveDate, as_of: NaiveDate) -> Self {
        BrokerDate { posted, as_of: Some(as_of) }
    }

    /// The date the row was booked; used for ordering merged files.
    pub fn posted(self) -> NaiveDate {
        self.posted
    }

    pub fn as_of(self) -> Option<NaiveDate> {
        self.as_of
    }

    /// The date the event economically happened.
    pub fn effective(self) -> NaiveDate {
        self.as_of.unwrap_or(self.posted)
    }
}

impl FromStr for BrokerDate {
    type Err = ParseDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseDateError(s.to_string());

        // ASCII lowercasing keeps byte offsets aligned with the original.
        match trimmed.to_ascii_lowercase().find(AS_OF) {
            Some(idx) => {
                let posted = parse_us_date(&trimmed[..idx]).ok_or_else(err)?;
                let as_of = parse_us_date(&trimmed[idx + AS_OF.len()..]).ok_or_else(err)?;
                Ok(BrokerDate::with_as_of(posted, as_of))
            }
            None => parse_us_date(trimmed).map(BrokerDate::new).ok_or_else(err),
        }
    }
}

impl fmt::Display for BrokerDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.posted.format(US_DATE))?;
        if let Some(as_of) = self.as_of {
            write!(f, "{AS_OF}{}", as_of.format(US_DATE))?;
        }
        Ok(())
    }
}

fn parse_us_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), US_DATE).ok()
}

/// Equity award exports mix `MM/DD/YYYY` and `YYYY/MM/DD`.
pub fn parse_award_date(s: &str) -> Result<NaiveDate, ParseDateError> {
    let s = s.trim();
    for fmt in [US_DATE, "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    Err(ParseDateError(s.to_string()))
}

/// Price files carry free-form dates such as `"May 30, 2025"`.
pub fn parse_price_date(s: &str) -> Result<NaiveDate, ParseDateError> {
    let s = s.trim();
    for fmt in ["%B %d, %Y", "%b %d, %Y", US_DATE, "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    Err(ParseDateError(s.to_string()))
}

/// UK tax year, named after the calendar year it starts in: tax year 2024
/// runs from 6 April 2024 to 5 April 2025.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxYear(pub i32);

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}", self.0, (self.0 + 1).rem_euclid(100))
    }
}

impl TaxYear {
    pub fn new(year: i32) -> Self {
        TaxYear(year)
    }

    pub fn containing(date: NaiveDate) -> Self {
        let starts_this_year = (date.month(), date.day()) >= (4, 6);
        TaxYear(if starts_this_year { date.year() } else { date.year() - 1 })
    }

    pub fn start_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0, 4, 6)
    }

    /// 5 April of the following calendar year, inclusive.
    pub fn end_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.0 + 1, 4, 5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.format(US_DATE), self.end.format(US_DATE))
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Smallest range covering every date, or `None` for an empty input.
    pub fn spanning<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Option<Self> {
        dates.into_iter().fold(None, |range, date| match range {
            None => Some(DateRange::new(date, date)),
            Some(r) => Some(DateRange::new(r.start.min(date), r.end.max(date))),
        })
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn broker_date_plain() {
        let d: BrokerDate = "05/30/2025".parse().unwrap();
        assert_eq!(d.posted(), date(2025, 5, 30));
        assert_eq!(d.as_of(), None);
        assert_eq!(d.to_string(), "05/30/2025");
    }

    #[test]
    fn broker_date_as_of() {
        let d: BrokerDate = "06/02/2025 as of 05/30/2025".parse().unwrap();
        assert_eq!(d.posted(), date(2025, 6, 2));
        assert_eq!(d.effective(), date(2025, 5, 30));
        assert_eq!(d.to_string(), "06/02/2025 as of 05/30/2025");
    }

    #[test]
    fn broker_date_as_of_is_case_insensitive() {
        let d: BrokerDate = "06/02/2025 AS OF 05/30/2025".parse().unwrap();
        assert_eq!(d.as_of(), Some(date(2025, 5, 30)));
    }

    #[test]
    fn broker_date_rejects_garbage() {
        assert!("2025-05-30".parse::<BrokerDate>().is_err());
        assert!("".parse::<BrokerDate>().is_err());
        assert!("06/02/2025 as of later".parse::<BrokerDate>().is_err());
    }

    #[test]
    fn award_dates_in_both_layouts() {
        assert_eq!(parse_award_date("08/15/2023").unwrap(), date(2023, 8, 15));
        assert_eq!(parse_award_date("2023/08/15").unwrap(), date(2023, 8, 15));
        assert!(parse_award_date("15.08.2023").is_err());
    }

    #[test]
    fn price_dates_free_form() {
        assert_eq!(parse_price_date("May 30, 2025").unwrap(), date(2025, 5, 30));
        assert_eq!(parse_price_date("Sep 1, 2024").unwrap(), date(2024, 9, 1));
        assert_eq!(parse_price_date("2024-09-01").unwrap(), date(2024, 9, 1));
        assert!(parse_price_date("soon").is_err());
    }

    #[test]
    fn tax_year_bounds() {
        let ty = TaxYear::new(2024);
        assert_eq!(ty.start_date(), Some(date(2024, 4, 6)));
        assert_eq!(ty.end_date(), Some(date(2025, 4, 5)));
        assert_eq!(ty.to_string(), "2024/25");
    }

    #[test]
    fn tax_year_containing() {
        assert_eq!(TaxYear::containing(date(2025, 4, 5)), TaxYear(2024));
        assert_eq!(TaxYear::containing(date(2025, 4, 6)), TaxYear(2025));
        assert_eq!(TaxYear::containing(date(2025, 1, 1)), TaxYear(2024));
    }

    #[test]
    fn date_range_spanning() {
        let range = DateRange::spanning([date(2024, 3, 1), date(2023, 1, 2), date(2024, 1, 1)]).unwrap();
        assert_eq!(range.start, date(2023, 1, 2));
        assert_eq!(range.end, date(2024, 3, 1));
        assert_eq!(range.to_string(), "01/02/2023 to 03/01/2024");
        assert!(range.contains(date(2023, 6, 1)));
        assert!(DateRange::spanning(Vec::new()).is_none());
    }
}
