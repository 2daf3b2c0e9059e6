//! Raw ingestion (§4.9): validate a batch of incoming OHLCV rows, commit
//! all-or-nothing, and score the batch's quality. Grounded on the original
//! implementation's `raw_ingestion.py` for codes and the all-or-nothing
//! commit rule and per-(symbol,market) quality scoring, but the validation
//! order follows §4.9's normative order: non-monotonic timestamp -> duplicate
//! -> null price -> low>high -> open>high -> close>high.

use crate::error::CoreError;
use crate::models::{AssetKind, Market};
use crate::repository::Repository;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RawRecord {
    pub symbol: String,
    pub asset: AssetKind,
    pub market: Market,
    pub timestamp: DateTime<Utc>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, code: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionResult {
    pub written_rows: usize,
    pub rejected_rows: usize,
    pub batch_id: String,
    pub duration: Duration,
    pub issues: Vec<ValidationIssue>,
}

impl IngestionResult {
    /// Converts a rejected batch into a hard error for callers that want
    /// fail-fast semantics instead of inspecting `issues`/`rejected_rows`
    /// themselves.
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.rejected_rows > 0 {
            Err(CoreError::Validation {
                count: self.issues.len(),
            })
        } else {
            Ok(self)
        }
    }
}

const PRICE_ISSUE_CODES: [&str; 3] = ["LOW_GT_HIGH", "OPEN_GT_HIGH", "CLOSE_GT_HIGH"];

/// §4.9's normative traversal order: per record, the monotonicity check
/// against the *previous* record's timestamp runs first, then duplicate,
/// then null-price, then the three OHLC relationship checks.
pub fn validate_records(records: &[RawRecord]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut last_ts: Option<DateTime<Utc>> = None;
    let mut seen: HashSet<(String, String, DateTime<Utc>)> = HashSet::new();

    for record in records {
        if let Some(last) = last_ts {
            if record.timestamp < last {
                issues.push(ValidationIssue::new(
                    "timestamp",
                    "NON_MONOTONIC",
                    "timestamp non monotonic",
                ));
            }
        }

        let key = (record.symbol.clone(), record.market.0.clone(), record.timestamp);
        if !seen.insert(key) {
            issues.push(ValidationIssue::new(
                "duplicate",
                "DUPLICATE_ROW",
                "duplicate symbol/market/timestamp",
            ));
        }

        if record.open.is_none() || record.high.is_none() || record.low.is_none() || record.close.is_none() {
            issues.push(ValidationIssue::new("price", "NULL_PRICE", "price field is null"));
        }
        if let (Some(low), Some(high)) = (record.low, record.high) {
            if low > high {
                issues.push(ValidationIssue::new("ohlc", "LOW_GT_HIGH", "low greater than high"));
            }
        }
        if let (Some(open), Some(high)) = (record.open, record.high) {
            if open > high {
                issues.push(ValidationIssue::new("ohlc", "OPEN_GT_HIGH", "open greater than high"));
            }
        }
        if let (Some(close), Some(high)) = (record.close, record.high) {
            if close > high {
                issues.push(ValidationIssue::new("ohlc", "CLOSE_GT_HIGH", "close greater than high"));
            }
        }
        last_ts = Some(record.timestamp);
    }

    issues
}

/// Validate, and only if the batch is entirely clean, persist every row and
/// the per-(symbol,market) quality record computed from it. A dirty batch
/// writes nothing.
pub async fn ingest_raw(
    repository: &Arc<Repository>,
    records: Vec<RawRecord>,
    batch_id: String,
    timeframe: crate::models::Timeframe,
) -> Result<IngestionResult, CoreError> {
    let start = Instant::now();
    let issues = validate_records(&records);
    let valid = issues.is_empty();

    let mut written = 0usize;
    if valid && !records.is_empty() {
        let data_records: Vec<crate::models::DataRecord> = records
            .iter()
            .map(|r| crate::models::DataRecord {
                symbol: r.symbol.clone(),
                asset: r.asset,
                market: r.market.clone(),
                timestamp: r.timestamp,
                timeframe,
                open: r.open.unwrap_or_default(),
                high: r.high.unwrap_or_default(),
                low: r.low.unwrap_or_default(),
                close: r.close.unwrap_or_default(),
                volume: r.volume.unwrap_or_default(),
                amount: None,
                provider: r.provider.clone(),
                adjusted_close: None,
                split_factor: Decimal::ONE,
                dividend_amount: Decimal::ZERO,
                metadata: Default::default(),
            })
            .collect();
        written = repository.save_ohlcv(data_records).await?;

        for ((symbol, market), items) in group_by_symbol_market(&records) {
            let total = items.len();
            let missing = items
                .iter()
                .filter(|r| r.open.is_none() || r.high.is_none() || r.low.is_none() || r.close.is_none())
                .count();
            let anomalies = issues
                .iter()
                .filter(|i| PRICE_ISSUE_CODES.contains(&i.code.as_str()))
                .count();
            let completeness = if total == 0 { 0.0 } else { 1.0 - (missing as f64 / total as f64) };
            let accuracy = if total == 0 { 0.0 } else { 1.0 - (anomalies as f64 / total as f64) };
            let consistency = 1.0;
            let score = score_quality(completeness, accuracy, consistency, None);
            let start_ts = items.iter().map(|r| r.timestamp).min().unwrap_or_else(Utc::now);
            let end_ts = items.iter().map(|r| r.timestamp).max().unwrap_or_else(Utc::now);
            let provider = items[0].provider.clone();

            repository
                .save_quality(
                    symbol,
                    Market::new(market),
                    start_ts,
                    end_ts,
                    completeness,
                    accuracy,
                    consistency,
                    score.overall,
                    format!("{:?}", score.level),
                    total as i64,
                    missing as i64,
                    anomalies as i64,
                    provider,
                )
                .await?;
        }
    }

    Ok(IngestionResult {
        written_rows: written,
        rejected_rows: if valid { 0 } else { records.len() },
        batch_id,
        duration: start.elapsed(),
        issues,
    })
}

fn group_by_symbol_market(records: &[RawRecord]) -> HashMap<(String, String), Vec<&RawRecord>> {
    let mut groups: HashMap<(String, String), Vec<&RawRecord>> = HashMap::new();
    for record in records {
        groups
            .entry((record.symbol.clone(), record.market.0.clone()))
            .or_default()
            .push(record);
    }
    groups
}

/// Overall quality bucket (§3 `QualityScore.level`); not part of the commit
/// rule, which is all-or-nothing on validation issues alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Unacceptable,
}

fn quality_level(score: f64) -> QualityLevel {
    if score >= 0.90 {
        QualityLevel::Excellent
    } else if score >= 0.80 {
        QualityLevel::Good
    } else if score >= 0.60 {
        QualityLevel::Fair
    } else if score >= 0.40 {
        QualityLevel::Poor
    } else {
        QualityLevel::Unacceptable
    }
}

/// The `QualityScore` entity (§3): per-(symbol,market) quality for one
/// scored batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    pub completeness: f64,
    pub accuracy: f64,
    pub timeliness: Option<f64>,
    pub consistency: f64,
    pub overall: f64,
    pub level: QualityLevel,
}

/// Weighted mean `{completeness:0.4, accuracy:0.3, timeliness:0.2,
/// consistency:0.1}` when `timeliness` is present (§4.9); otherwise the
/// plain mean of the three components that are — ingestion alone never
/// has a timeliness signal (that requires comparing against a live quote),
/// so batches scored here always take the fallback branch, and callers
/// who do have a timeliness figure (e.g. the consistency validator) get
/// the full weighted form.
pub fn score_quality(
    completeness: f64,
    accuracy: f64,
    consistency: f64,
    timeliness: Option<f64>,
) -> QualityScore {
    let overall = match timeliness {
        Some(timeliness) => {
            0.4 * completeness + 0.3 * accuracy + 0.2 * timeliness + 0.1 * consistency
        }
        None => (completeness + accuracy + consistency) / 3.0,
    };
    QualityScore {
        completeness,
        accuracy,
        timeliness,
        consistency,
        overall,
        level: quality_level(overall),
    }
}

/// Indices of values lying outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`. Used by
/// the consistency validator/cleaning passes, never by the commit rule
/// above — an outlier is not a validation failure.
pub fn detect_outliers_iqr(values: &[Decimal]) -> Vec<usize> {
    if values.len() < 4 {
        return Vec::new();
    }
    let mut sorted: Vec<Decimal> = values.to_vec();
    sorted.sort();
    let q1 = sorted[sorted.len() / 4];
    let q3 = sorted[sorted.len() * 3 / 4];
    let iqr = q3 - q1;
    let lower = q1 - iqr * Decimal::new(15, 1);
    let upper = q3 + iqr * Decimal::new(15, 1);
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < lower || **v > upper)
        .map(|(i, _)| i)
        .collect()
}
