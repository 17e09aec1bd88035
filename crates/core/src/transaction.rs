use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::RecordError;
use super::money::{parse_quantity, Money};
use super::period::BrokerDate;

/// Canonical transaction columns, in the order brokerage exports use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Date,
    Action,
    Symbol,
    Description,
    Quantity,
    Price,
    Fees,
    Amount,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Date,
        Column::Action,
        Column::Symbol,
        Column::Description,
        Column::Quantity,
        Column::Price,
        Column::Fees,
        Column::Amount,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Date => "Date",
            Column::Action => "Action",
            Column::Symbol => "Symbol",
            Column::Description => "Description",
            Column::Quantity => "Quantity",
            Column::Price => "Price",
            Column::Fees => "Fees & Comm",
            Column::Amount => "Amount",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    CancelBuy,
    CancelSell,
    ReinvestShares,
    ReinvestDividend,
    QualDivReinvest,
    CashDividend,
    QualifiedDividend,
    NonQualifiedDividend,
    StockPlanActivity,
    Journal,
    JournaledShares,
    CreditInterest,
    BankInterest,
    WireSent,
    WireReceived,
    MoneyLinkTransfer,
    ForeignTaxPaid,
    Other(String),
}

impl Action {
    /// Matches the exported text exactly; unknown actions are kept verbatim.
    pub fn parse(s: &str) -> Action {
        match s.trim() {
            "Buy" => Action::Buy,
            "Sell" => Action::Sell,
            "Cancel Buy" => Action::CancelBuy,
            "Cancel Sell" => Action::CancelSell,
            "Reinvest Shares" => Action::ReinvestShares,
            "Reinvest Dividend" => Action::ReinvestDividend,
            "Qual Div Reinvest" => Action::QualDivReinvest,
            "Cash Dividend" => Action::CashDividend,
            "Qualified Dividend" => Action::QualifiedDividend,
            "Non-Qualified Div" => Action::NonQualifiedDividend,
            "Stock Plan Activity" => Action::StockPlanActivity,
            "Journal" => Action::Journal,
            "Journaled Shares" => Action::JournaledShares,
            "Credit Interest" => Action::CreditInterest,
            "Bank Interest" => Action::BankInterest,
            "Wire Sent" => Action::WireSent,
            "Wire Received" => Action::WireReceived,
            "MoneyLink Transfer" => Action::MoneyLinkTransfer,
            "Foreign Tax Paid" => Action::ForeignTaxPaid,
            other => Action::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::Buy => "Buy",
            Action::Sell => "Sell",
            Action::CancelBuy => "Cancel Buy",
            Action::CancelSell => "Cancel Sell",
            Action::ReinvestShares => "Reinvest Shares",
            Action::ReinvestDividend => "Reinvest Dividend",
            Action::QualDivReinvest => "Qual Div Reinvest",
            Action::CashDividend => "Cash Dividend",
            Action::QualifiedDividend => "Qualified Dividend",
            Action::NonQualifiedDividend => "Non-Qualified Div",
            Action::StockPlanActivity => "Stock Plan Activity",
            Action::Journal => "Journal",
            Action::JournaledShares => "Journaled Shares",
            Action::CreditInterest => "Credit Interest",
            Action::BankInterest => "Bank Interest",
            Action::WireSent => "Wire Sent",
            Action::WireReceived => "Wire Received",
            Action::MoneyLinkTransfer => "MoneyLink Transfer",
            Action::ForeignTaxPaid => "Foreign Tax Paid",
            Action::Other(s) => s,
        }
    }

    /// Actions that move a security and therefore need a symbol.
    pub fn is_security_action(&self) -> bool {
        matches!(
            self,
            Action::Buy
                | Action::Sell
                | Action::StockPlanActivity
                | Action::ReinvestShares
                | Action::QualDivReinvest
                | Action::CancelBuy
                | Action::Journal
        )
    }

    /// Buys paid for with a dividend.
    pub fn is_reinvestment(&self) -> bool {
        matches!(
            self,
            Action::ReinvestShares | Action::ReinvestDividend | Action::QualDivReinvest
        )
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, Action::Buy | Action::Sell)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: BrokerDate,
    pub action: Action,
    pub symbol: Option<String>,
    pub description: String,
    pub quantity: Option<Decimal>,
    pub price: Option<Money>,
    pub fees: Option<Money>,
    /// Absent only on rows that move shares without cash (e.g. journaled shares).
    pub amount: Option<Money>,
}

/// Identity used when deduplicating rows across overlapping exports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    date: BrokerDate,
    symbol: Option<String>,
    action: Action,
    quantity: Option<Decimal>,
    price: Option<Money>,
    /// Cash-only rows (no quantity, no price) also compare description and
    /// amount, so two different cash movements on one day stay distinct.
    cash: Option<(String, Option<Money>)>,
}

impl TransactionRecord {
    /// Builds a record from cells given in [`Column::ALL`] order.
    pub fn from_cells(cells: [&str; 8]) -> Result<Self, RecordError> {
        let cell = |c: Column| cells[c.index()].trim();
        let number = |c: Column| -> Result<Option<Money>, RecordError> {
            Money::parse_optional(cell(c)).map_err(|_| RecordError::invalid_number(c, cell(c)))
        };

        let date = cell(Column::Date)
            .parse::<BrokerDate>()
            .map_err(|_| RecordError::invalid_date(Column::Date, cell(Column::Date)))?;
        let action_text = cell(Column::Action);
        if action_text.is_empty() {
            return Err(RecordError::MissingValue { column: Column::Action.header() });
        }
        let symbol = Some(cell(Column::Symbol))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let quantity = parse_quantity(cell(Column::Quantity))
            .map_err(|_| RecordError::invalid_number(Column::Quantity, cell(Column::Quantity)))?;

        Ok(TransactionRecord {
            date,
            action: Action::parse(action_text),
            symbol,
            description: cell(Column::Description).to_string(),
            quantity,
            price: number(Column::Price)?,
            fees: number(Column::Fees)?,
            amount: number(Column::Amount)?,
        })
    }

    /// Renders the record as cells in [`Column::ALL`] order.
    pub fn to_cells(&self) -> [String; 8] {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        [
            self.date.to_string(),
            self.action.to_string(),
            self.symbol.clone().unwrap_or_default(),
            self.description.clone(),
            opt(&self.quantity),
            opt(&self.price),
            opt(&self.fees),
            opt(&self.amount),
        ]
    }

    pub fn has_missing_symbol(&self) -> bool {
        self.symbol.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    pub fn posted(&self) -> NaiveDate {
        self.date.posted()
    }

    pub fn identity_key(&self) -> TransactionKey {
        let cash_only = self.quantity.is_none() && self.price.is_none();
        TransactionKey {
            date: self.date,
            symbol: self.symbol.clone(),
            action: self.action.clone(),
            quantity: self.quantity,
            price: self.price,
            cash: cash_only.then(|| (self.description.clone(), self.amount)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action: &str, symbol: &str, qty: &str, price: &str, amount: &str) -> TransactionRecord {
        TransactionRecord::from_cells([
            "01/15/2024",
            action,
            symbol,
            "APPLE INC",
            qty,
            price,
            "",
            amount,
        ])
        .unwrap()
    }

    #[test]
    fn action_round_trips_known_and_unknown() {
        assert_eq!(Action::parse("Qual Div Reinvest"), Action::QualDivReinvest);
        assert_eq!(Action::QualDivReinvest.to_string(), "Qual Div Reinvest");
        let other = Action::parse("NRA Tax Adj");
        assert_eq!(other, Action::Other("NRA Tax Adj".to_string()));
        assert_eq!(other.to_string(), "NRA Tax Adj");
    }

    #[test]
    fn action_classification() {
        assert!(Action::Buy.is_security_action());
        assert!(!Action::CreditInterest.is_security_action());
        assert!(Action::ReinvestShares.is_reinvestment());
        assert!(!Action::Buy.is_reinvestment());
        assert!(Action::Sell.is_trade());
    }

    #[test]
    fn from_cells_parses_typed_fields() {
        let tx = TransactionRecord::from_cells([
            "01/15/2024",
            "Buy",
            "AAPL",
            "APPLE INC",
            "10",
            "$150.00",
            "$1.00",
            "-$1,501.00",
        ])
        .unwrap();
        assert_eq!(tx.action, Action::Buy);
        assert_eq!(tx.symbol.as_deref(), Some("AAPL"));
        assert_eq!(tx.quantity, Some(Decimal::from(10)));
        assert_eq!(tx.amount.unwrap().amount(), Decimal::new(-150100, 2));
    }

    #[test]
    fn from_cells_blank_symbol_is_missing() {
        let tx = row("Buy", "  ", "1", "$1.00", "-$1.00");
        assert!(tx.symbol.is_none());
        assert!(tx.has_missing_symbol());
    }

    #[test]
    fn from_cells_reports_bad_fields() {
        let bad_date = TransactionRecord::from_cells(["2024-01-15", "Buy", "", "", "", "", "", ""]);
        assert!(matches!(bad_date, Err(RecordError::InvalidDate { column: "Date", .. })));

        let bad_qty = TransactionRecord::from_cells(["01/15/2024", "Buy", "", "", "ten", "", "", ""]);
        assert!(matches!(bad_qty, Err(RecordError::InvalidNumber { column: "Quantity", .. })));

        let no_action = TransactionRecord::from_cells(["01/15/2024", "", "", "", "", "", "", ""]);
        assert!(matches!(no_action, Err(RecordError::MissingValue { column: "Action" })));
    }

    #[test]
    fn to_cells_round_trips() {
        let cells = [
            "06/02/2025 as of 05/30/2025",
            "Qual Div Reinvest",
            "VWRL",
            "VANGUARD FTSE ALL WORLD",
            "0.571",
            "$54.34",
            "",
            "-$31.04",
        ];
        let tx = TransactionRecord::from_cells(cells).unwrap();
        assert_eq!(tx.to_cells().map(|s| s), cells.map(str::to_string));
    }

    #[test]
    fn identity_ignores_amount_for_security_rows() {
        let a = row("Buy", "AAPL", "10", "$150.00", "-$1,501.00");
        let b = row("Buy", "AAPL", "10", "$150.00", "-$1,500.00");
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn identity_distinguishes_cash_rows() {
        let to = TransactionRecord::from_cells([
            "02/20/2025", "Journal", "", "JOURNAL TO ...964", "", "", "", "-$100,000.00",
        ])
        .unwrap();
        let frm = TransactionRecord::from_cells([
            "02/20/2025", "Journal", "", "JOURNAL FRM ...157", "", "", "", "$100,000.00",
        ])
        .unwrap();
        assert_ne!(to.identity_key(), frm.identity_key());
        assert_eq!(to.identity_key(), to.clone().identity_key());
    }

    #[test]
    fn identity_treats_equal_decimals_alike() {
        let a = row("Buy", "AAPL", "10", "$150.00", "-$1,500.00");
        let b = row("Buy", "AAPL", "10.0", "$150", "-$1,500.00");
        assert_eq!(a.identity_key(), b.identity_key());
    }
}
