//! Normalization of raw price rows into per-symbol series.
//!
//! The store is the only place that touches the raw input frame. It resolves
//! column names case-insensitively, coerces types, drops rows that cannot be
//! used, applies the status and exclusion filters, and partitions what is
//! left into date-sorted [`SymbolSeries`] keyed by symbol index.

use crate::{
    Result, ScreenerError,
    model::{Identifiers, PricePoint, Status, SymbolSeries},
};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Patterns matching exchange-traded funds and commodity trackers.
pub const DEFAULT_EXCLUSION_PATTERNS: [&str; 7] =
    ["ETF", "BEES", "NIFTY", "GOLD", "GLD", "SILVER", "SILV"];

/// Configuration for row filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Drop rows whose status is not active (default: true)
    pub active_only: bool,
    /// Case-insensitive substrings; matching symbols are dropped (default: none)
    pub exclusion_patterns: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            active_only: true,
            exclusion_patterns: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Default filters plus the fund/commodity exclusion list.
    pub fn with_default_exclusions() -> Self {
        Self {
            exclusion_patterns: DEFAULT_EXCLUSION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ..Self::default()
        }
    }

    /// Whether the symbol matches any exclusion pattern.
    pub fn is_excluded(&self, symbol: &str) -> bool {
        let upper = symbol.to_uppercase();
        self.exclusion_patterns
            .iter()
            .any(|p| !p.is_empty() && upper.contains(&p.to_uppercase()))
    }
}

/// Counters collected while normalizing input rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Rows seen in the input
    pub rows_read: usize,
    /// Rows with an unusable symbol, date or close
    pub rows_invalid: usize,
    /// Rows dropped by the status filter
    pub rows_inactive: usize,
    /// Distinct symbols dropped by exclusion patterns
    pub symbols_excluded: usize,
}

/// Per-symbol, date-sorted price history for a whole universe.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesStore {
    series: Vec<SymbolSeries>,
    index: HashMap<String, usize>,
    summary: IngestSummary,
}

/// Rows collected for one symbol before they are turned into a series.
#[derive(Default)]
struct PendingSymbol {
    rows: Vec<(NaiveDate, f64, Option<u64>)>,
    latest: Option<NaiveDate>,
    identifiers: Identifiers,
}

impl PendingSymbol {
    fn push(&mut self, date: NaiveDate, close: f64, volume: Option<u64>, ids: Identifiers) {
        if self.latest.is_none_or(|latest| date >= latest) {
            self.latest = Some(date);
            self.identifiers = ids;
        }
        self.rows.push((date, close, volume));
    }
}

impl TimeSeriesStore {
    /// Columns that must be present in the input frame.
    pub const REQUIRED_COLUMNS: [&'static str; 3] = ["symbol", "date", "close"];

    /// Builds a store from a raw frame.
    ///
    /// # Required Columns
    ///
    /// - `symbol`: Trading symbol
    /// - `date`: `Date`, `Datetime` or `YYYY-MM-DD` string
    /// - `close`: Closing price
    ///
    /// Optional: `volume`, `status`, `fincode`, `isin`. Column names are
    /// matched case-insensitively.
    pub fn from_frame(df: &DataFrame, config: &StoreConfig) -> Result<Self> {
        let symbol_name = require_column(df, "symbol")?;
        let date_name = require_column(df, "date")?;
        let close_name = require_column(df, "close")?;

        let symbols = df.column(&symbol_name)?.cast(&DataType::String)?;
        let dates = df.column(&date_name)?.cast(&DataType::String)?;
        let closes = df.column(&close_name)?.cast(&DataType::Float64)?;
        let volumes = optional_column(df, "volume", &DataType::Float64)?;
        let statuses = optional_column(df, "status", &DataType::String)?;
        let fincodes = optional_column(df, "fincode", &DataType::String)?;
        let isins = optional_column(df, "isin", &DataType::String)?;

        let symbols = symbols.str()?;
        let dates = dates.str()?;
        let closes = closes.f64()?;
        let volumes = volumes.as_ref().map(|c| c.f64()).transpose()?;
        let statuses = statuses.as_ref().map(|c| c.str()).transpose()?;
        let fincodes = fincodes.as_ref().map(|c| c.str()).transpose()?;
        let isins = isins.as_ref().map(|c| c.str()).transpose()?;

        let mut builder = StoreBuilder::new(config);
        for row in 0..df.height() {
            builder.summary.rows_read += 1;

            let symbol = symbols.get(row).map(str::trim).filter(|s| !s.is_empty());
            let date = dates.get(row).and_then(parse_date);
            let close = closes.get(row).filter(|c| !c.is_nan());
            let (Some(symbol), Some(date), Some(close)) = (symbol, date, close) else {
                builder.summary.rows_invalid += 1;
                continue;
            };

            let status = statuses
                .and_then(|s| s.get(row))
                .map_or(Status::Active, Status::parse);
            let volume = volumes.and_then(|v| v.get(row)).and_then(to_volume);
            let identifiers = Identifiers {
                fincode: non_blank(fincodes.and_then(|f| f.get(row))),
                isin: non_blank(isins.and_then(|i| i.get(row))),
            };

            builder.push(symbol, date, close, volume, status, identifiers);
        }

        Ok(builder.finish())
    }

    /// Builds a store from already-typed observations.
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>, config: &StoreConfig) -> Self {
        let mut builder = StoreBuilder::new(config);
        for point in points {
            builder.summary.rows_read += 1;
            if point.symbol.trim().is_empty() || point.close.is_nan() {
                builder.summary.rows_invalid += 1;
                continue;
            }
            builder.push(
                point.symbol.trim(),
                point.date,
                point.close,
                point.volume,
                point.status,
                point.identifiers,
            );
        }
        builder.finish()
    }

    /// All series, ordered by symbol.
    pub fn series(&self) -> &[SymbolSeries] {
        &self.series
    }

    /// Series for one symbol.
    pub fn get(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.index.get(symbol).map(|&i| &self.series[i])
    }

    /// Symbols in index order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.iter().map(SymbolSeries::symbol)
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the store holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Counters from normalization.
    pub const fn summary(&self) -> &IngestSummary {
        &self.summary
    }

    /// Latest observation date across all symbols.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.series.iter().filter_map(SymbolSeries::latest_date).max()
    }

    /// Sorted distinct observation dates across all symbols.
    pub fn all_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .series
            .iter()
            .flat_map(|s| s.dates().iter().copied())
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Restricts every series to `[start, end]`, dropping symbols left empty.
    pub fn restrict_to(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(ScreenerError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let in_range = |d: NaiveDate| start.is_none_or(|s| d >= s) && end.is_none_or(|e| d <= e);
        let series: Vec<SymbolSeries> = self
            .series
            .iter()
            .filter_map(|s| {
                let rows: Vec<_> = s
                    .dates()
                    .iter()
                    .zip(s.closes())
                    .zip(s.volumes())
                    .filter(|((d, _), _)| in_range(**d))
                    .map(|((d, c), v)| (*d, *c, *v))
                    .collect();
                (!rows.is_empty())
                    .then(|| SymbolSeries::from_rows(s.symbol(), s.identifiers().clone(), rows))
            })
            .collect();

        Ok(Self::from_series(series, self.summary))
    }

    /// Keeps only the listed symbols.
    pub fn retain_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> Self {
        let series = self
            .series
            .iter()
            .filter(|s| symbols.iter().any(|k| k.as_ref() == s.symbol()))
            .cloned()
            .collect();
        Self::from_series(series, self.summary)
    }

    fn from_series(series: Vec<SymbolSeries>, summary: IngestSummary) -> Self {
        let index = series
            .iter()
            .enumerate()
            .map(|(i, s)| (s.symbol().to_string(), i))
            .collect();
        Self {
            series,
            index,
            summary,
        }
    }
}

struct StoreBuilder<'a> {
    config: &'a StoreConfig,
    pending: BTreeMap<String, PendingSymbol>,
    excluded: BTreeSet<String>,
    summary: IngestSummary,
}

impl<'a> StoreBuilder<'a> {
    fn new(config: &'a StoreConfig) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            excluded: BTreeSet::new(),
            summary: IngestSummary::default(),
        }
    }

    fn push(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        close: f64,
        volume: Option<u64>,
        status: Status,
        identifiers: Identifiers,
    ) {
        if self.config.active_only && status != Status::Active {
            self.summary.rows_inactive += 1;
            return;
        }
        if self.config.is_excluded(symbol) {
            self.excluded.insert(symbol.to_string());
            return;
        }
        self.pending
            .entry(symbol.to_string())
            .or_default()
            .push(date, close, volume, identifiers);
    }

    fn finish(mut self) -> TimeSeriesStore {
        self.summary.symbols_excluded = self.excluded.len();
        if self.summary.rows_invalid > 0 {
            warn!(
                rows = self.summary.rows_invalid,
                "Dropped rows with missing symbol, date or close"
            );
        }
        if !self.excluded.is_empty() {
            let sample: Vec<&str> = self.excluded.iter().take(10).map(String::as_str).collect();
            info!(
                symbols = self.excluded.len(),
                sample = ?sample,
                "Excluded symbols matching exclusion patterns"
            );
        }

        let series: Vec<SymbolSeries> = self
            .pending
            .into_iter()
            .map(|(symbol, pending)| {
                SymbolSeries::from_rows(symbol, pending.identifiers, pending.rows)
            })
            .collect();

        debug!(
            rows = self.summary.rows_read,
            inactive = self.summary.rows_inactive,
            "Normalized input rows"
        );
        info!(symbols = series.len(), "Built time series store");
        TimeSeriesStore::from_series(series, self.summary)
    }
}

fn find_column(df: &DataFrame, wanted: &str) -> Option<String> {
    df.get_columns()
        .iter()
        .map(|c| c.name().as_str())
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .map(str::to_string)
}

fn require_column(df: &DataFrame, wanted: &str) -> Result<String> {
    find_column(df, wanted).ok_or_else(|| ScreenerError::MissingColumn(wanted.to_string()))
}

fn optional_column(df: &DataFrame, wanted: &str, dtype: &DataType) -> Result<Option<Column>> {
    find_column(df, wanted)
        .map(|name| -> Result<Column> { Ok(df.column(&name)?.cast(dtype)?) })
        .transpose()
}

/// Parses the leading `YYYY-MM-DD` of a date or datetime rendering.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn to_volume(raw: f64) -> Option<u64> {
    (raw.is_finite() && raw >= 0.0).then(|| raw.round() as u64)
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_frame_normalizes_rows() {
        let df = df![
            "Symbol" => ["AAA", "AAA", "BBB", "AAA", "BBB"],
            "Date" => ["2024-01-03", "2024-01-01", "2024-01-01", "2024-01-03", "2024-01-02"],
            "Close" => [12.0, 10.0, 50.0, 13.0, 51.0],
            "Volume" => [300.0, 100.0, 500.0, 310.0, 510.0],
            "Status" => ["Active", "Active", "Active", "Active", "Active"],
            "Fincode" => ["1", "1", "2", "1", "2"],
            "ISIN" => ["INE001", "INE001", "INE002", "INE001", "INE002"]
        ]
        .unwrap();

        let store = TimeSeriesStore::from_frame(&df, &StoreConfig::default()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.symbols().collect::<Vec<_>>(), vec!["AAA", "BBB"]);

        let aaa = store.get("AAA").unwrap();
        assert_eq!(aaa.dates(), &[date(2024, 1, 1), date(2024, 1, 3)]);
        // Later duplicate wins.
        assert_eq!(aaa.closes(), &[10.0, 13.0]);
        assert_eq!(aaa.volumes(), &[Some(100), Some(310)]);
        assert_eq!(aaa.identifiers().isin.as_deref(), Some("INE001"));
        assert_eq!(aaa.identifiers().fincode.as_deref(), Some("1"));

        assert_eq!(store.latest_date(), Some(date(2024, 1, 3)));
        assert_eq!(
            store.all_dates(),
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]
        );
    }

    #[test]
    fn test_missing_required_column() {
        let df = df![
            "symbol" => ["AAA"],
            "date" => ["2024-01-01"]
        ]
        .unwrap();

        let err = TimeSeriesStore::from_frame(&df, &StoreConfig::default()).unwrap_err();
        assert!(matches!(err, ScreenerError::MissingColumn(ref c) if c == "close"));
    }

    #[test]
    fn test_invalid_rows_are_dropped_not_fatal() {
        let df = df![
            "symbol" => [Some("AAA"), Some(""), Some("AAA"), None],
            "date" => ["2024-01-01", "2024-01-02", "not a date", "2024-01-04"],
            "close" => [Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        ]
        .unwrap();

        let store = TimeSeriesStore::from_frame(&df, &StoreConfig::default()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("AAA").unwrap().len(), 1);
        assert_eq!(store.summary().rows_read, 4);
        assert_eq!(store.summary().rows_invalid, 3);
    }

    #[test]
    fn test_status_and_exclusion_filters() {
        let df = df![
            "symbol" => ["AAA", "AAA", "GOLDBEES", "NIFTYETF"],
            "date" => ["2024-01-01", "2024-01-02", "2024-01-01", "2024-01-01"],
            "close" => [1.0, 2.0, 3.0, 4.0],
            "status" => ["Active", "Inactive", "Active", "Active"]
        ]
        .unwrap();

        let store =
            TimeSeriesStore::from_frame(&df, &StoreConfig::with_default_exclusions()).unwrap();
        assert_eq!(store.symbols().collect::<Vec<_>>(), vec!["AAA"]);
        assert_eq!(store.get("AAA").unwrap().len(), 1);
        assert_eq!(store.summary().rows_inactive, 1);
        assert_eq!(store.summary().symbols_excluded, 2);

        let keep_all = StoreConfig {
            active_only: false,
            ..StoreConfig::default()
        };
        let store = TimeSeriesStore::from_frame(&df, &keep_all).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("AAA").unwrap().len(), 2);
    }

    #[test]
    fn test_from_points_and_restrict() {
        let points = (1..=10).map(|d| PricePoint::new("AAA", date(2024, 1, d), 100.0 + d as f64));
        let store = TimeSeriesStore::from_points(points, &StoreConfig::default());
        assert_eq!(store.get("AAA").unwrap().len(), 10);

        let window = store
            .restrict_to(Some(date(2024, 1, 3)), Some(date(2024, 1, 5)))
            .unwrap();
        assert_eq!(window.get("AAA").unwrap().len(), 3);

        let err = store
            .restrict_to(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, ScreenerError::InvalidDateRange { .. }));

        let empty = store.restrict_to(Some(date(2025, 1, 1)), None).unwrap();
        assert!(empty.is_empty());

        assert_eq!(store.retain_symbols(&["AAA"]).len(), 1);
        assert!(store.retain_symbols(&["ZZZ"]).is_empty());
    }

    #[test]
    fn test_parse_date_accepts_datetime_rendering() {
        assert_eq!(parse_date("2024-03-05 00:00:00"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("05/03/2024"), None);
        assert_eq!(parse_date("2024"), None);
    }
}
