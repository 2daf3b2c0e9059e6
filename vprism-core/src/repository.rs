//! Repository (§4.7): durable storage for asset reference data, OHLCV bars
//! (daily and intraday split into separate tables, matching the original
//! schema's query patterns), real-time quotes and data-quality records.
//!
//! Schema grounded verbatim on the original implementation's
//! `database_schema.py` (`asset_info`, `daily_ohlcv`, `intraday_ohlcv`,
//! `real_time_quotes`, `data_quality`), adapted to DuckDB's SQL dialect and
//! `rust_decimal`-typed columns. Blocking DuckDB calls run inside
//! `spawn_blocking` so they never stall the async executor.

use crate::error::CoreError;
use crate::models::{Asset, AssetKind, DataRecord, Market, Timeframe};
use chrono::{DateTime, TimeZone, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// A `data_quality` row as read back (§3 `QualityScore`, persisted form).
#[derive(Debug, Clone)]
pub struct StoredQualityScore {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub overall: f64,
    pub level: String,
    pub total_records: i64,
    pub missing_records: i64,
    pub anomaly_count: i64,
    pub provider: String,
}

pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: Option<&str>) -> Result<Arc<Self>, CoreError> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| CoreError::Storage {
            message: format!("opening repository database: {e}"),
        })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS asset_info (
                symbol VARCHAR NOT NULL,
                market VARCHAR NOT NULL,
                name VARCHAR,
                asset_type VARCHAR NOT NULL,
                currency VARCHAR,
                exchange VARCHAR,
                sector VARCHAR,
                industry VARCHAR,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                first_traded BIGINT,
                metadata VARCHAR,
                PRIMARY KEY (symbol, market)
            );

            CREATE TABLE IF NOT EXISTS daily_ohlcv (
                symbol VARCHAR NOT NULL,
                market VARCHAR NOT NULL,
                trade_date BIGINT NOT NULL,
                asset_type VARCHAR NOT NULL DEFAULT 'stock',
                open_price DECIMAL(18,6) NOT NULL,
                high_price DECIMAL(18,6) NOT NULL,
                low_price DECIMAL(18,6) NOT NULL,
                close_price DECIMAL(18,6) NOT NULL,
                volume DECIMAL(20,2) NOT NULL,
                amount DECIMAL(20,2),
                adjusted_close DECIMAL(18,6),
                split_factor DECIMAL(10,6) NOT NULL DEFAULT 1.0,
                dividend_amount DECIMAL(18,6) NOT NULL DEFAULT 0.0,
                provider VARCHAR NOT NULL,
                PRIMARY KEY (symbol, market, trade_date)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_symbol_date
                ON daily_ohlcv(symbol, trade_date DESC);

            CREATE TABLE IF NOT EXISTS intraday_ohlcv (
                symbol VARCHAR NOT NULL,
                market VARCHAR NOT NULL,
                timeframe VARCHAR NOT NULL,
                ts BIGINT NOT NULL,
                asset_type VARCHAR NOT NULL DEFAULT 'stock',
                open_price DECIMAL(18,6) NOT NULL,
                high_price DECIMAL(18,6) NOT NULL,
                low_price DECIMAL(18,6) NOT NULL,
                close_price DECIMAL(18,6) NOT NULL,
                volume DECIMAL(20,2) NOT NULL,
                amount DECIMAL(20,2),
                provider VARCHAR NOT NULL,
                PRIMARY KEY (symbol, market, timeframe, ts)
            );
            CREATE INDEX IF NOT EXISTS idx_intraday_symbol_ts
                ON intraday_ohlcv(symbol, timeframe, ts DESC);

            CREATE TABLE IF NOT EXISTS real_time_quotes (
                symbol VARCHAR NOT NULL,
                market VARCHAR NOT NULL,
                price DECIMAL(18,6) NOT NULL,
                volume DECIMAL(20,2),
                ts BIGINT NOT NULL,
                provider VARCHAR NOT NULL,
                PRIMARY KEY (symbol, market)
            );

            CREATE TABLE IF NOT EXISTS data_quality (
                symbol VARCHAR NOT NULL,
                market VARCHAR NOT NULL,
                range_start BIGINT NOT NULL,
                range_end BIGINT NOT NULL,
                completeness_score DECIMAL(5,2) NOT NULL,
                accuracy_score DECIMAL(5,2) NOT NULL,
                consistency_score DECIMAL(5,2) NOT NULL,
                overall_score DECIMAL(5,2) NOT NULL,
                quality_level VARCHAR NOT NULL,
                total_records BIGINT NOT NULL,
                missing_records BIGINT NOT NULL,
                anomaly_count BIGINT NOT NULL,
                provider VARCHAR NOT NULL,
                checked_at BIGINT NOT NULL,
                PRIMARY KEY (symbol, market, range_start, range_end)
            );

            CREATE TABLE IF NOT EXISTS provider_status (
                provider VARCHAR NOT NULL,
                status VARCHAR NOT NULL,
                consecutive_successes INTEGER NOT NULL,
                consecutive_failures INTEGER NOT NULL,
                total_probes BIGINT NOT NULL,
                total_failures BIGINT NOT NULL,
                last_probe BIGINT,
                updated_at BIGINT NOT NULL,
                PRIMARY KEY (provider)
            );",
        )
        .map_err(|e| CoreError::Storage {
            message: format!("creating repository schema: {e}"),
        })?;

        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
        }))
    }

    pub async fn save_asset_info(self: &Arc<Self>, asset: Asset) -> Result<(), CoreError> {
        let this = self.clone();
        run_blocking(move || this.save_asset_info_blocking(&asset)).await
    }

    fn save_asset_info_blocking(&self, asset: &Asset) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO asset_info
                (symbol, market, name, asset_type, currency, exchange, sector, industry,
                 is_active, first_traded, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                asset.symbol,
                asset.market.0,
                asset.name,
                kind_str(asset.kind),
                asset.currency,
                asset.exchange,
                asset.sector,
                asset.industry,
                asset.is_active,
                asset.first_traded.map(|d| d.timestamp()),
                serde_json::to_string(&asset.metadata).unwrap_or_default(),
            ],
        )
        .map_err(|e| CoreError::Storage {
            message: format!("saving asset_info: {e}"),
        })?;
        Ok(())
    }

    pub async fn get_asset_info(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
    ) -> Result<Option<Asset>, CoreError> {
        let this = self.clone();
        run_blocking(move || this.get_asset_info_blocking(&symbol, &market)).await
    }

    fn get_asset_info_blocking(&self, symbol: &str, market: &Market) -> Result<Option<Asset>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn.query_row(
            "SELECT symbol, market, name, asset_type, currency, exchange, sector, industry,
                    is_active, first_traded, metadata
             FROM asset_info WHERE symbol = ? AND market = ?",
            params![symbol, market.0],
            |row| {
                let kind: String = row.get(3)?;
                let first_traded: Option<i64> = row.get(9)?;
                let metadata_json: Option<String> = row.get(10)?;
                Ok(Asset {
                    symbol: row.get(0)?,
                    market: Market::new(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    kind: parse_kind(&kind),
                    currency: row.get(4)?,
                    exchange: row.get(5)?,
                    sector: row.get(6)?,
                    industry: row.get(7)?,
                    is_active: row.get(8)?,
                    first_traded: first_traded.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    metadata: metadata_json
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                })
            },
        );
        match row {
            Ok(asset) => Ok(Some(asset)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CoreError::Storage {
                message: format!("reading asset_info: {e}"),
            }),
        }
    }

    /// Routes to `daily_ohlcv` or `intraday_ohlcv` by the record's declared
    /// timeframe (§9 Open Question (a) resolution).
    pub async fn save_ohlcv(self: &Arc<Self>, records: Vec<DataRecord>) -> Result<usize, CoreError> {
        let this = self.clone();
        run_blocking(move || this.save_ohlcv_blocking(&records)).await
    }

    fn save_ohlcv_blocking(&self, records: &[DataRecord]) -> Result<usize, CoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(|e| CoreError::Storage {
            message: format!("opening repository transaction: {e}"),
        })?;
        let mut written = 0usize;
        for record in records {
            if record.timeframe.is_intraday() {
                tx.execute(
                    "INSERT OR REPLACE INTO intraday_ohlcv
                        (symbol, market, timeframe, ts, asset_type, open_price, high_price, low_price,
                         close_price, volume, amount, provider)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        record.symbol,
                        record.market.0,
                        record.timeframe.code(),
                        record.timestamp.timestamp(),
                        kind_str(record.asset),
                        record.open.to_string(),
                        record.high.to_string(),
                        record.low.to_string(),
                        record.close.to_string(),
                        record.volume.to_string(),
                        record.amount.map(|d| d.to_string()),
                        record.provider,
                    ],
                )
            } else {
                tx.execute(
                    "INSERT OR REPLACE INTO daily_ohlcv
                        (symbol, market, trade_date, asset_type, open_price, high_price, low_price,
                         close_price, volume, amount, adjusted_close, split_factor,
                         dividend_amount, provider)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        record.symbol,
                        record.market.0,
                        record.timestamp.timestamp(),
                        kind_str(record.asset),
                        record.open.to_string(),
                        record.high.to_string(),
                        record.low.to_string(),
                        record.close.to_string(),
                        record.volume.to_string(),
                        record.amount.map(|d| d.to_string()),
                        record.adjusted_close.map(|d| d.to_string()),
                        record.split_factor.to_string(),
                        record.dividend_amount.to_string(),
                        record.provider,
                    ],
                )
            }
            .map_err(|e| CoreError::Storage {
                message: format!("writing ohlcv row: {e}"),
            })?;
            written += 1;
        }
        tx.commit().map_err(|e| CoreError::Storage {
            message: format!("committing ohlcv write: {e}"),
        })?;
        Ok(written)
    }

    pub async fn get_ohlcv(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataRecord>, CoreError> {
        let this = self.clone();
        run_blocking(move || this.get_ohlcv_blocking(&symbol, &market, timeframe, start, end)).await
    }

    fn get_ohlcv_blocking(
        &self,
        symbol: &str,
        market: &Market,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DataRecord>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = if timeframe.is_intraday() {
            "SELECT symbol, market, ts, asset_type, open_price, high_price, low_price, close_price,
                    volume, amount, provider
             FROM intraday_ohlcv
             WHERE symbol = ? AND market = ? AND timeframe = ? AND ts BETWEEN ? AND ?
             ORDER BY ts ASC"
        } else {
            "SELECT symbol, market, trade_date, asset_type, open_price, high_price, low_price, close_price,
                    volume, amount, adjusted_close, split_factor, dividend_amount, provider
             FROM daily_ohlcv
             WHERE symbol = ? AND market = ? AND trade_date BETWEEN ? AND ?
             ORDER BY trade_date ASC"
        };

        let mut stmt = conn.prepare(sql).map_err(|e| CoreError::Storage {
            message: format!("preparing ohlcv query: {e}"),
        })?;

        let rows: Vec<DataRecord> = if timeframe.is_intraday() {
            let mapped = stmt
                .query_map(
                    params![symbol, market.0, timeframe.code(), start.timestamp(), end.timestamp()],
                    |row| {
                        Ok(DataRecord {
                            symbol: row.get(0)?,
                            asset: parse_kind(&row.get::<_, String>(3)?),
                            market: Market::new(row.get::<_, String>(1)?),
                            timestamp: Utc.timestamp_opt(row.get(2)?, 0).single().unwrap_or_else(Utc::now),
                            timeframe,
                            open: decimal_from(row.get(4)?),
                            high: decimal_from(row.get(5)?),
                            low: decimal_from(row.get(6)?),
                            close: decimal_from(row.get(7)?),
                            volume: decimal_from(row.get(8)?),
                            amount: row.get::<_, Option<String>>(9)?.map(decimal_from),
                            provider: row.get(10)?,
                            adjusted_close: None,
                            split_factor: Decimal::ONE,
                            dividend_amount: Decimal::ZERO,
                            metadata: Default::default(),
                        })
                    },
                )
                .map_err(|e| CoreError::Storage {
                    message: format!("reading intraday_ohlcv: {e}"),
                })?;
            mapped.collect::<Result<_, _>>().map_err(|e| CoreError::Storage {
                message: format!("decoding intraday_ohlcv row: {e}"),
            })?
        } else {
            let mapped = stmt
                .query_map(
                    params![symbol, market.0, start.timestamp(), end.timestamp()],
                    |row| {
                        Ok(DataRecord {
                            symbol: row.get(0)?,
                            asset: parse_kind(&row.get::<_, String>(3)?),
                            market: Market::new(row.get::<_, String>(1)?),
                            timestamp: Utc.timestamp_opt(row.get(2)?, 0).single().unwrap_or_else(Utc::now),
                            timeframe,
                            open: decimal_from(row.get(4)?),
                            high: decimal_from(row.get(5)?),
                            low: decimal_from(row.get(6)?),
                            close: decimal_from(row.get(7)?),
                            volume: decimal_from(row.get(8)?),
                            amount: row.get::<_, Option<String>>(9)?.map(decimal_from),
                            provider: row.get(13)?,
                            adjusted_close: row.get::<_, Option<String>>(10)?.map(decimal_from),
                            split_factor: row.get::<_, Option<String>>(11)?.map(decimal_from).unwrap_or(Decimal::ONE),
                            dividend_amount: row.get::<_, Option<String>>(12)?.map(decimal_from).unwrap_or(Decimal::ZERO),
                            metadata: Default::default(),
                        })
                    },
                )
                .map_err(|e| CoreError::Storage {
                    message: format!("reading daily_ohlcv: {e}"),
                })?;
            mapped.collect::<Result<_, _>>().map_err(|e| CoreError::Storage {
                message: format!("decoding daily_ohlcv row: {e}"),
            })?
        };

        Ok(rows)
    }

    pub async fn save_realtime_quote(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
        price: Decimal,
        volume: Option<Decimal>,
        timestamp: DateTime<Utc>,
        provider: String,
    ) -> Result<(), CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO real_time_quotes
                    (symbol, market, price, volume, ts, provider)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    symbol,
                    market.0,
                    price.to_string(),
                    volume.map(|d| d.to_string()),
                    timestamp.timestamp(),
                    provider,
                ],
            )
            .map_err(|e| CoreError::Storage {
                message: format!("saving real_time_quotes: {e}"),
            })?;
            Ok(())
        })
        .await
    }

    pub async fn get_realtime_quote(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
    ) -> Result<Option<(Decimal, DateTime<Utc>, String)>, CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            let row = conn.query_row(
                "SELECT price, ts, provider FROM real_time_quotes WHERE symbol = ? AND market = ?",
                params![symbol, market.0],
                |row| {
                    let price: String = row.get(0)?;
                    let ts: i64 = row.get(1)?;
                    let provider: String = row.get(2)?;
                    Ok((price, ts, provider))
                },
            );
            match row {
                Ok((price, ts, provider)) => Ok(Some((
                    decimal_from(price),
                    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
                    provider,
                ))),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(CoreError::Storage {
                    message: format!("reading real_time_quotes: {e}"),
                }),
            }
        })
        .await
    }

    /// Real-time quote if one exists, otherwise the most recent daily close.
    pub async fn get_latest_price(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
    ) -> Result<Option<Decimal>, CoreError> {
        if let Some((price, _, _)) = self.get_realtime_quote(symbol.clone(), market.clone()).await? {
            return Ok(Some(price));
        }
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            let row = conn.query_row(
                "SELECT close_price FROM daily_ohlcv WHERE symbol = ? AND market = ?
                 ORDER BY trade_date DESC LIMIT 1",
                params![symbol, market.0],
                |row| row.get::<_, String>(0),
            );
            match row {
                Ok(price) => Ok(Some(decimal_from(price))),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(CoreError::Storage {
                    message: format!("reading latest daily close: {e}"),
                }),
            }
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save_quality(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        completeness_score: f64,
        accuracy_score: f64,
        consistency_score: f64,
        overall_score: f64,
        quality_level: String,
        total_records: i64,
        missing_records: i64,
        anomaly_count: i64,
        provider: String,
    ) -> Result<(), CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO data_quality
                    (symbol, market, range_start, range_end, completeness_score, accuracy_score,
                     consistency_score, overall_score, quality_level, total_records,
                     missing_records, anomaly_count, provider, checked_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    symbol,
                    market.0,
                    range_start.timestamp(),
                    range_end.timestamp(),
                    completeness_score,
                    accuracy_score,
                    consistency_score,
                    overall_score,
                    quality_level,
                    total_records,
                    missing_records,
                    anomaly_count,
                    provider,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| CoreError::Storage {
                message: format!("saving data_quality: {e}"),
            })?;
            Ok(())
        })
        .await
    }

    /// Fetch the most recently computed quality row for a (symbol, market,
    /// date-range) key (§4.7 `getQuality`).
    pub async fn get_quality(
        self: &Arc<Self>,
        symbol: String,
        market: Market,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Option<StoredQualityScore>, CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            let row = conn
                .query_row(
                    "SELECT completeness_score, accuracy_score, consistency_score, overall_score,
                            quality_level, total_records, missing_records, anomaly_count, provider
                     FROM data_quality
                     WHERE symbol = ? AND market = ? AND range_start = ? AND range_end = ?",
                    params![symbol, market.0, range_start.timestamp(), range_end.timestamp()],
                    |row| {
                        Ok(StoredQualityScore {
                            completeness: row.get(0)?,
                            accuracy: row.get(1)?,
                            consistency: row.get(2)?,
                            overall: row.get(3)?,
                            level: row.get(4)?,
                            total_records: row.get(5)?,
                            missing_records: row.get(6)?,
                            anomaly_count: row.get(7)?,
                            provider: row.get(8)?,
                        })
                    },
                )
                .ok();
            Ok(row)
        })
        .await
    }

    /// Periodic durability mirror of the registry's in-memory health state
    /// (§4.7: `provider_status` is additive, not a new invariant — the
    /// registry's in-memory map stays authoritative for query serving).
    #[allow(clippy::too_many_arguments)]
    pub async fn save_provider_status(
        self: &Arc<Self>,
        provider: String,
        status: String,
        consecutive_successes: u32,
        consecutive_failures: u32,
        total_probes: u64,
        total_failures: u64,
        last_probe: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO provider_status
                    (provider, status, consecutive_successes, consecutive_failures,
                     total_probes, total_failures, last_probe, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    provider,
                    status,
                    consecutive_successes,
                    consecutive_failures,
                    total_probes as i64,
                    total_failures as i64,
                    last_probe.map(|ts| ts.timestamp()),
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| CoreError::Storage {
                message: format!("saving provider_status: {e}"),
            })?;
            Ok(())
        })
        .await
    }

    /// Reads back the mirrored status column only; the registry remains the
    /// source of truth for query-time routing decisions.
    pub async fn get_provider_status(self: &Arc<Self>, provider: String) -> Result<Option<String>, CoreError> {
        let this = self.clone();
        run_blocking(move || {
            let conn = this.conn.lock().unwrap();
            Ok(conn
                .query_row(
                    "SELECT status FROM provider_status WHERE provider = ?",
                    params![provider],
                    |row| row.get(0),
                )
                .ok())
        })
        .await
    }

    pub async fn get_symbols_by_market(self: &Arc<Self>, market: Market) -> Result<Vec<String>, CoreError> {
        let this = self.clone();
        run_blocking(move || this.get_symbols_by_market_blocking(&market)).await
    }

    fn get_symbols_by_market_blocking(&self, market: &Market) -> Result<Vec<String>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT symbol FROM asset_info WHERE market = ? AND is_active = TRUE ORDER BY symbol")
            .map_err(|e| CoreError::Storage {
                message: format!("preparing symbol listing query: {e}"),
            })?;
        let symbols = stmt
            .query_map(params![market.0], |row| row.get(0))
            .map_err(|e| CoreError::Storage {
                message: format!("listing symbols: {e}"),
            })?
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::Storage {
                message: format!("decoding symbol listing row: {e}"),
            })?;
        Ok(symbols)
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| CoreError::Internal {
        message: format!("repository task panicked: {e}"),
    })?
}

fn decimal_from(text: String) -> Decimal {
    Decimal::from_str(&text).unwrap_or(Decimal::ZERO)
}

fn kind_str(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Stock => "stock",
        AssetKind::Etf => "etf",
        AssetKind::Fund => "fund",
        AssetKind::Bond => "bond",
        AssetKind::Future => "future",
        AssetKind::Option => "option",
        AssetKind::Crypto => "crypto",
        AssetKind::Forex => "forex",
        AssetKind::Index => "index",
    }
}

fn parse_kind(text: &str) -> AssetKind {
    match text {
        "etf" => AssetKind::Etf,
        "fund" => AssetKind::Fund,
        "bond" => AssetKind::Bond,
        "future" => AssetKind::Future,
        "option" => AssetKind::Option,
        "crypto" => AssetKind::Crypto,
        "forex" => AssetKind::Forex,
        "index" => AssetKind::Index,
        _ => AssetKind::Stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn asset() -> Asset {
        Asset {
            symbol: "AAPL".into(),
            name: Some("Apple Inc.".into()),
            kind: AssetKind::Stock,
            market: Market::new("us"),
            currency: Some("USD".into()),
            exchange: Some("NASDAQ".into()),
            sector: None,
            industry: None,
            is_active: true,
            first_traded: None,
            metadata: HashMap::new(),
        }
    }

    fn daily_record() -> DataRecord {
        DataRecord {
            symbol: "AAPL".into(),
            asset: AssetKind::Stock,
            market: Market::new("us"),
            timestamp: Utc::now(),
            timeframe: Timeframe::Day1,
            open: Decimal::new(100, 0),
            high: Decimal::new(110, 0),
            low: Decimal::new(95, 0),
            close: Decimal::new(105, 0),
            volume: Decimal::new(1_000_000, 0),
            amount: None,
            provider: "tushare".into(),
            adjusted_close: Some(Decimal::new(105, 0)),
            split_factor: Decimal::ONE,
            dividend_amount: Decimal::ZERO,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn asset_info_round_trips() {
        let repo = Repository::open(None).unwrap();
        repo.save_asset_info(asset()).await.unwrap();
        let fetched = repo
            .get_asset_info("AAPL".into(), Market::new("us"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.symbol, "AAPL");
        assert_eq!(fetched.exchange.as_deref(), Some("NASDAQ"));
    }

    #[tokio::test]
    async fn daily_ohlcv_round_trips_within_range() {
        let repo = Repository::open(None).unwrap();
        let record = daily_record();
        let ts = record.timestamp;
        repo.save_ohlcv(vec![record]).await.unwrap();

        let rows = repo
            .get_ohlcv(
                "AAPL".into(),
                Market::new("us"),
                Timeframe::Day1,
                ts - chrono::Duration::days(1),
                ts + chrono::Duration::days(1),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, Decimal::new(105, 0));
    }

    #[tokio::test]
    async fn symbols_by_market_lists_only_active() {
        let repo = Repository::open(None).unwrap();
        repo.save_asset_info(asset()).await.unwrap();
        let mut inactive = asset();
        inactive.symbol = "ZZZZ".into();
        inactive.is_active = false;
        repo.save_asset_info(inactive).await.unwrap();

        let symbols = repo.get_symbols_by_market(Market::new("us")).await.unwrap();
        assert_eq!(symbols, vec!["AAPL".to_string()]);
    }

    #[tokio::test]
    async fn latest_price_prefers_realtime_quote_over_daily_close() {
        let repo = Repository::open(None).unwrap();
        let record = daily_record();
        let ts = record.timestamp;
        repo.save_ohlcv(vec![record]).await.unwrap();

        let from_daily = repo
            .get_latest_price("AAPL".into(), Market::new("us"))
            .await
            .unwrap();
        assert_eq!(from_daily, Some(Decimal::new(105, 0)));

        repo.save_realtime_quote(
            "AAPL".into(),
            Market::new("us"),
            Decimal::new(109, 0),
            None,
            ts,
            "tushare".into(),
        )
        .await
        .unwrap();

        let from_realtime = repo
            .get_latest_price("AAPL".into(), Market::new("us"))
            .await
            .unwrap();
        assert_eq!(from_realtime, Some(Decimal::new(109, 0)));
    }

    #[tokio::test]
    async fn quality_round_trips_by_symbol_market_and_range() {
        let repo = Repository::open(None).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();

        repo.save_quality(
            "AAPL".into(),
            Market::new("us"),
            start,
            end,
            0.95,
            0.90,
            1.0,
            0.92,
            "Excellent".into(),
            30,
            1,
            0,
            "tushare".into(),
        )
        .await
        .unwrap();

        let fetched = repo
            .get_quality("AAPL".into(), Market::new("us"), start, end)
            .await
            .unwrap()
            .expect("quality row");
        assert_eq!(fetched.level, "Excellent");
        assert_eq!(fetched.total_records, 30);
        assert_eq!(fetched.provider, "tushare");

        let missing = repo
            .get_quality("MSFT".into(), Market::new("us"), start, end)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn provider_status_round_trips() {
        let repo = Repository::open(None).unwrap();
        repo.save_provider_status("tushare".into(), "Healthy".into(), 2, 0, 10, 1, Some(Utc::now()))
            .await
            .unwrap();

        let status = repo.get_provider_status("tushare".into()).await.unwrap();
        assert_eq!(status.as_deref(), Some("Healthy"));

        let missing = repo.get_provider_status("yahoo".into()).await.unwrap();
        assert!(missing.is_none());
    }
}
