use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sieve_core::{Action, Money, TransactionRecord};
use tracing::debug;

/// Discrepancies strictly above `lower` and up to and including `upper` are
/// treated as broker rounding. Anything larger is assumed to be real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingBand {
    pub lower: Decimal,
    pub upper: Decimal,
}

impl Default for RoundingBand {
    fn default() -> Self {
        Self {
            lower: Decimal::new(1, 2),
            upper: Decimal::new(100, 2),
        }
    }
}

impl RoundingBand {
    pub fn new(lower: Decimal, upper: Decimal) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, discrepancy: Decimal) -> bool {
        discrepancy > self.lower && discrepancy <= self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundingFix {
    pub old: Money,
    pub new: Money,
    pub discrepancy: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundingCorrector {
    pub band: RoundingBand,
    /// Also correct plain `Buy` and `Sell` rows.
    pub include_trades: bool,
}

impl RoundingCorrector {
    pub fn new(band: RoundingBand, include_trades: bool) -> Self {
        Self { band, include_trades }
    }

    pub fn is_eligible(&self, action: &Action) -> bool {
        action.is_reinvestment() || (self.include_trades && action.is_trade())
    }

    /// What the amount should be given quantity, price and fees: outflows
    /// are `-(gross + fees)`, inflows `gross - fees`. `None` when any of
    /// quantity, price or amount is missing, or the result overflows.
    pub fn expected_amount(record: &TransactionRecord) -> Option<Decimal> {
        let quantity = record.quantity?;
        let price = record.price?.amount();
        let amount = record.amount?;
        let fees = record.fees.map(Money::amount).unwrap_or_default();
        let gross = quantity.checked_mul(price)?;
        if amount.is_negative() {
            gross.checked_add(fees).map(|total| -total)
        } else {
            gross.checked_sub(fees)
        }
    }

    /// The correction this row would receive, if any.
    pub fn check(&self, record: &TransactionRecord) -> Option<RoundingFix> {
        if !self.is_eligible(&record.action) {
            return None;
        }
        let old = record.amount?;
        let expected = Self::expected_amount(record)?;
        let discrepancy = expected.checked_sub(old.amount())?.abs();
        if !self.band.contains(discrepancy) {
            return None;
        }
        let new = Money::new(expected.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
        Some(RoundingFix { old, new, discrepancy })
    }

    pub fn apply(&self, record: &mut TransactionRecord) -> Option<RoundingFix> {
        let fix = self.check(record)?;
        debug!(
            date = %record.date,
            action = %record.action,
            old = %fix.old,
            new = %fix.new,
            "rounding fix"
        );
        record.amount = Some(fix.new);
        Some(fix)
    }
}
