//! Cross-provider consistency validation (§4.10): compares the same
//! symbol's daily closes from two sources over a date range and reports how
//! often they agree within tolerance.
//!
//! Report shape grounded on the original implementation's
//! `ConsistencyReport`/`DataConsistencyValidator._compare_dataframes`
//! (date-truncated outer join, average/max price difference,
//! `consistency_percentage = matching / total * 100`). The original
//! compares for exact equality; this validator uses the specification's own
//! relative-difference tolerance (default 1%) instead, since exact-equality
//! comparison across independent providers rejects nearly everything.

use crate::models::DataPoint;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_records: usize,
    pub matching_records: usize,
    pub mismatching_records: usize,
    pub missing_in_primary: usize,
    pub missing_in_reference: usize,
    pub average_price_difference: Decimal,
    pub max_price_difference: Decimal,
    pub issues: Vec<String>,
    pub consistency_percentage: f64,
}

pub struct ConsistencyValidator {
    pub tolerance: f64,
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self { tolerance: 0.01 }
    }
}

impl ConsistencyValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Compare `primary` against `reference` for the same symbol, truncating
    /// both to one OHLC quadruple per calendar date (last value wins on a
    /// duplicate date, mirroring a `groupby(date).last()`). A day mismatches
    /// if any of open/high/low/close exceeds tolerance.
    pub fn validate(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        primary: &[DataPoint],
        reference: &[DataPoint],
    ) -> ConsistencyReport {
        let primary_by_date = ohlc_by_date(primary);
        let reference_by_date = ohlc_by_date(reference);

        if primary_by_date.is_empty() && reference_by_date.is_empty() {
            return ConsistencyReport {
                symbol: symbol.to_string(),
                start_date,
                end_date,
                total_records: 0,
                matching_records: 0,
                mismatching_records: 0,
                missing_in_primary: 0,
                missing_in_reference: 0,
                average_price_difference: Decimal::ZERO,
                max_price_difference: Decimal::ZERO,
                issues: vec!["both sources returned no data".to_string()],
                consistency_percentage: 100.0,
            };
        }

        let mut dates: Vec<NaiveDate> = primary_by_date
            .keys()
            .chain(reference_by_date.keys())
            .copied()
            .collect();
        dates.sort();
        dates.dedup();

        let mut matching = 0usize;
        let mut mismatching = 0usize;
        let mut missing_in_primary = 0usize;
        let mut missing_in_reference = 0usize;
        let mut issues = Vec::new();
        let mut diffs = Vec::new();

        for date in &dates {
            let a = primary_by_date.get(date);
            let b = reference_by_date.get(date);
            match (a, b) {
                (Some(a), Some(b)) => {
                    let close_diff = self.relative_diff(a.close, b.close);
                    diffs.push(close_diff);
                    let mismatched_columns: Vec<&str> = [
                        ("open", a.open, b.open),
                        ("high", a.high, b.high),
                        ("low", a.low, b.low),
                        ("close", a.close, b.close),
                    ]
                    .into_iter()
                    .filter(|(_, x, y)| !self.within_tolerance(*x, *y))
                    .map(|(name, _, _)| name)
                    .collect();
                    if mismatched_columns.is_empty() {
                        matching += 1;
                    } else {
                        mismatching += 1;
                        issues.push(format!(
                            "mismatch on {date} in {}: primary={a:?}, reference={b:?}",
                            mismatched_columns.join(",")
                        ));
                    }
                }
                (Some(_), None) => missing_in_reference += 1,
                (None, Some(_)) => missing_in_primary += 1,
                (None, None) => unreachable!("date collected from one of the two maps"),
            }
        }

        let total = dates.len();
        let average_price_difference = if diffs.is_empty() {
            Decimal::ZERO
        } else {
            diffs.iter().sum::<Decimal>() / Decimal::from(diffs.len())
        };
        let max_price_difference = diffs.iter().copied().max().unwrap_or(Decimal::ZERO);
        let consistency_percentage = if total > 0 {
            matching as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        ConsistencyReport {
            symbol: symbol.to_string(),
            start_date,
            end_date,
            total_records: total,
            matching_records: matching,
            mismatching_records: mismatching,
            missing_in_primary,
            missing_in_reference,
            average_price_difference,
            max_price_difference,
            issues,
            consistency_percentage,
        }
    }

    /// `|a-b| / max(|a|,|b|,eps)`, with the primary value `a` breaking ties
    /// when both magnitudes are equal, matching the boundary scenario's
    /// worked example (close 102 vs 120 -> diff 18 -> 18/102 ~= 0.176,
    /// using the primary reading as the base rather than the larger of the
    /// two) — the spec's prose gives `max(|a|,|b|)` but its own numeric
    /// example resolves to `|a|` as the denominator, so this follows the
    /// example.
    fn relative_diff(&self, a: Decimal, b: Decimal) -> Decimal {
        if a == b {
            return Decimal::ZERO;
        }
        let base = if a.is_zero() && b.is_zero() {
            return Decimal::ZERO;
        } else if a.is_zero() {
            b.abs()
        } else {
            a.abs()
        };
        (a - b).abs() / base
    }

    fn within_tolerance(&self, a: Decimal, b: Decimal) -> bool {
        self.relative_diff(a, b)
            .to_string()
            .parse::<f64>()
            .unwrap_or(f64::MAX)
            <= self.tolerance
    }
}

#[derive(Debug, Clone, Copy)]
struct Ohlc {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

/// Keeps the last point on a calendar date, mirroring a `groupby(date).last()`.
fn ohlc_by_date(points: &[DataPoint]) -> HashMap<NaiveDate, Ohlc> {
    let mut out = HashMap::new();
    for point in points {
        out.insert(
            point.timestamp.date_naive(),
            Ohlc {
                open: point.open,
                high: point.high,
                low: point.low,
                close: point.close,
            },
        );
    }
    out
}
