use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use ulid::Ulid;

use crate::model::{DateSpan, NightlyRate, SeasonRule};

/// Currency precision for every rate the engine hands out.
pub const RATE_DECIMAL_PLACES: u32 = 2;

pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATE_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// The set of season rules in force.
///
/// Rules may overlap. When several cover the same date the highest
/// multiplier is applied; a date no rule covers is priced at 1.0.
#[derive(Debug, Clone, Default)]
pub struct SeasonTable {
    rules: Vec<SeasonRule>,
}

impl SeasonTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[SeasonRule] {
        &self.rules
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.rules.iter().any(|r| r.id == id)
    }

    /// Insert keeping rules ordered by start date.
    pub fn insert(&mut self, rule: SeasonRule) {
        let pos = self.rules.partition_point(|r| r.start <= rule.start);
        self.rules.insert(pos, rule);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<SeasonRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    pub fn multiplier_for(&self, date: NaiveDate) -> Decimal {
        self.rules
            .iter()
            .filter(|r| r.covers(date))
            .map(|r| r.multiplier)
            .max()
            .unwrap_or(Decimal::ONE)
    }

    /// Blended average nightly rate for the stay `[check_in, check_out)`.
    ///
    /// Sums `base_rate * multiplier` over every night, divides by the number
    /// of nights and rounds to cents. An empty or reversed range prices at 0.
    /// A rate too large for `Decimal` saturates at `Decimal::MAX`; use
    /// [`SeasonTable::checked_rate`] to detect it.
    pub fn calculate_rate(
        &self,
        base_rate: Decimal,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Decimal {
        self.checked_rate(base_rate, check_in, check_out)
            .unwrap_or(Decimal::MAX)
    }

    /// [`SeasonTable::calculate_rate`], or `None` if the nightly sum overflows.
    pub fn checked_rate(
        &self,
        base_rate: Decimal,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Option<Decimal> {
        let Some(span) = DateSpan::try_new(check_in, check_out) else {
            return Some(Decimal::ZERO);
        };
        let total = span.nights_iter().try_fold(Decimal::ZERO, |sum, night| {
            sum.checked_add(base_rate.checked_mul(self.multiplier_for(night))?)
        })?;
        Some(round_rate(total / Decimal::from(span.nights())))
    }

    /// Blended nightly rate and stay total, or `None` if either overflows.
    pub fn quote(&self, base_rate: Decimal, span: &DateSpan) -> Option<(Decimal, Decimal)> {
        let rate = self.checked_rate(base_rate, span.start, span.end)?;
        Some((rate, total_for_stay(rate, span)?))
    }

    /// Per-night schedule, each night priced as a one-night stay.
    pub fn nightly_breakdown(
        &self,
        base_rate: Decimal,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Vec<NightlyRate> {
        let Some(span) = DateSpan::try_new(check_in, check_out) else {
            return Vec::new();
        };
        span.nights_iter()
            .filter_map(|night| {
                let next = night.succ_opt()?;
                Some(NightlyRate {
                    date: night,
                    multiplier: self.multiplier_for(night),
                    rate: self.calculate_rate(base_rate, night, next),
                })
            })
            .collect()
    }
}

/// Price of the whole stay given its blended nightly rate. `None` on overflow.
pub fn total_for_stay(rate_per_night: Decimal, span: &DateSpan) -> Option<Decimal> {
    rate_per_night
        .checked_mul(Decimal::from(span.nights()))
        .map(round_rate)
}
