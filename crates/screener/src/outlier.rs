//! Robust outlier and anomaly flags on daily log-returns.
//!
//! Log-returns are scored with the MAD-based robust z-score
//! `0.6745 * (x - median) / MAD` under two baselines:
//!
//! - the symbol's whole history, which drives both the global flag and the
//!   per-entity robust/very-extreme flags with their own thresholds;
//! - a trailing window of rows ending at the current row, which drives the
//!   mild/major regime anomaly flags.
//!
//! A zero MAD or an empty reference set leaves the score undefined, and an
//! undefined score never raises a flag.
//!
//! All scores are polars expressions partitioned by `symbol`, so a whole
//! universe is scored in one lazy query.

use crate::{
    Result, ScreenerError,
    model::{OutlierFlags, SymbolSeries},
    store::TimeSeriesStore,
    traits::{ConfigurableEngine, SeriesEngine},
};
use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::{f64::consts::E, ops::Range};
use tracing::info;

/// Configuration for outlier detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Whole-history |z| above which a row is a global outlier (default: 6)
    pub global_threshold: f64,
    /// Rows in the trailing window, current row included (default: 40)
    pub rolling_window: usize,
    /// Defined observations needed before a rolling score exists (default: 1)
    pub rolling_min_periods: usize,
    /// Rolling |z| for a mild anomaly (default: 3)
    pub mild_threshold: f64,
    /// Rolling |z| for a major anomaly (default: 6)
    pub major_threshold: f64,
    /// Per-entity |z| for a robust outlier (default: 6)
    pub entity_threshold: f64,
    /// Per-entity |z| for a very extreme move (default: 10)
    pub extreme_threshold: f64,
    /// Window sizes reported as ready or not (default: 10, 40, 120)
    pub readiness_windows: Vec<usize>,
    /// Share of defined observations a window needs to be ready (default: 0.8)
    pub readiness_fraction: f64,
    /// Missing weekday share above which a symbol is illiquid (default: 0.3)
    pub illiquid_missing_fraction: f64,
    /// Ignore observations before this date (default: none)
    pub start_date: Option<NaiveDate>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            global_threshold: 6.0,
            rolling_window: 40,
            rolling_min_periods: 1,
            mild_threshold: 3.0,
            major_threshold: 6.0,
            entity_threshold: 6.0,
            extreme_threshold: 10.0,
            readiness_windows: vec![10, 40, 120],
            readiness_fraction: 0.8,
            illiquid_missing_fraction: 0.3,
            start_date: None,
        }
    }
}

impl OutlierConfig {
    /// Rejects empty windows and out-of-range fractions.
    pub fn validate(&self) -> Result<()> {
        if self.rolling_window == 0 || self.readiness_windows.contains(&0) {
            return Err(ScreenerError::InvalidConfig(
                "outlier windows must be positive".into(),
            ));
        }
        if self.rolling_min_periods == 0 || self.rolling_min_periods > self.rolling_window {
            return Err(ScreenerError::InvalidConfig(
                "rolling_min_periods must be within 1..=rolling_window".into(),
            ));
        }
        let fractions = [self.readiness_fraction, self.illiquid_missing_fraction];
        if fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(ScreenerError::InvalidConfig(
                "outlier fractions must be within [0, 1]".into(),
            ));
        }
        let thresholds = [
            self.global_threshold,
            self.mild_threshold,
            self.major_threshold,
            self.entity_threshold,
            self.extreme_threshold,
        ];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ScreenerError::InvalidConfig(
                "outlier thresholds must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Scores and flags for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierRow {
    /// Observation date
    pub date: NaiveDate,
    /// Close on that date
    pub close: f64,
    /// `ln(close / previous close)`
    pub log_return: Option<f64>,
    /// Robust z against the symbol's whole history
    pub robust_z: Option<f64>,
    /// Robust z against the trailing window
    pub rolling_z: Option<f64>,
    /// Anomaly flags and window readiness
    pub flags: OutlierFlags,
}

/// Descriptive statistics of one symbol's log-returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnSnapshot {
    /// Defined log-returns
    pub n_returns: usize,
    /// Percentage of weekday slots without an observation
    pub pct_missing: f64,
    /// First observation date
    pub start_date: Option<NaiveDate>,
    /// Last observation date
    pub end_date: Option<NaiveDate>,
    /// Mean log-return
    pub mean: Option<f64>,
    /// Population standard deviation
    pub std: Option<f64>,
    /// Bias-corrected skewness; undefined for a flat series
    pub skew: Option<f64>,
    /// Bias-corrected excess kurtosis; undefined for a flat series
    pub kurtosis: Option<f64>,
    /// Smallest log-return
    pub min: Option<f64>,
    /// 1st percentile
    pub p1: Option<f64>,
    /// 5th percentile
    pub p5: Option<f64>,
    /// 95th percentile
    pub p95: Option<f64>,
    /// 99th percentile
    pub p99: Option<f64>,
    /// Largest log-return
    pub max: Option<f64>,
    /// Too many missing weekday slots
    pub illiquid: bool,
}

/// Detector output for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolOutliers {
    /// Trading symbol
    pub symbol: String,
    /// One row per observation, date ascending
    pub rows: Vec<OutlierRow>,
    /// Summary statistics
    pub snapshot: ReturnSnapshot,
}

impl SymbolOutliers {
    /// Rows with at least one anomaly flag raised.
    pub fn flagged(&self) -> impl Iterator<Item = &OutlierRow> + '_ {
        self.rows.iter().filter(|r| r.flags.any())
    }
}

/// Detector output for a universe.
#[derive(Debug, Clone, Default)]
pub struct OutlierReport {
    symbols: Vec<SymbolOutliers>,
    readiness_windows: Vec<usize>,
}

impl OutlierReport {
    /// Per-symbol results, ordered by symbol.
    pub fn symbols(&self) -> &[SymbolOutliers] {
        &self.symbols
    }

    /// Result for one symbol.
    pub fn get(&self, symbol: &str) -> Option<&SymbolOutliers> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    /// Total flagged rows across all symbols.
    pub fn flagged_count(&self) -> usize {
        self.symbols.iter().map(|s| s.flagged().count()).sum()
    }

    /// Per-date rows as a frame.
    ///
    /// Columns: `symbol, date, close, log_return, robust_z, robust_z_rolling,
    /// global_outlier, mild_anomaly, major_anomaly, robust_outlier,
    /// very_extreme, window_ready_<n>...`.
    pub fn rows_frame(&self) -> Result<DataFrame> {
        let rows = || self.symbols.iter().flat_map(|s| s.rows.iter().map(move |r| (s, r)));

        let mut columns = vec![
            Column::new(
                "symbol".into(),
                rows().map(|(s, _)| s.symbol.as_str()).collect::<Vec<_>>(),
            ),
            Column::new("date".into(), rows().map(|(_, r)| r.date).collect::<Vec<_>>()),
            Column::new("close".into(), rows().map(|(_, r)| r.close).collect::<Vec<_>>()),
            Column::new(
                "log_return".into(),
                rows().map(|(_, r)| r.log_return).collect::<Vec<_>>(),
            ),
            Column::new(
                "robust_z".into(),
                rows().map(|(_, r)| r.robust_z).collect::<Vec<_>>(),
            ),
            Column::new(
                "robust_z_rolling".into(),
                rows().map(|(_, r)| r.rolling_z).collect::<Vec<_>>(),
            ),
        ];

        let flag_columns: [(&str, fn(&OutlierFlags) -> bool); 5] = [
            ("global_outlier", |f: &OutlierFlags| f.global_outlier),
            ("mild_anomaly", |f: &OutlierFlags| f.mild_anomaly),
            ("major_anomaly", |f: &OutlierFlags| f.major_anomaly),
            ("robust_outlier", |f: &OutlierFlags| f.robust_outlier),
            ("very_extreme", |f: &OutlierFlags| f.very_extreme),
        ];
        for (name, flag) in flag_columns {
            columns.push(Column::new(
                name.into(),
                rows().map(|(_, r)| flag(&r.flags)).collect::<Vec<_>>(),
            ));
        }
        for &window in &self.readiness_windows {
            columns.push(Column::new(
                format!("window_ready_{window}").into(),
                rows()
                    .map(|(_, r)| r.flags.window_ready.get(&window).copied().unwrap_or(false))
                    .collect::<Vec<_>>(),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// One row of descriptive statistics per symbol.
    pub fn snapshot_frame(&self) -> Result<DataFrame> {
        let snaps = || self.symbols.iter().map(|s| &s.snapshot);
        let stat = |name: &str, get: fn(&ReturnSnapshot) -> Option<f64>| {
            Column::new(name.into(), snaps().map(get).collect::<Vec<_>>())
        };

        let df = DataFrame::new(vec![
            Column::new(
                "symbol".into(),
                self.symbols.iter().map(|s| s.symbol.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "n_returns".into(),
                snaps().map(|s| s.n_returns as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "pct_missing".into(),
                snaps().map(|s| s.pct_missing).collect::<Vec<_>>(),
            ),
            Column::new(
                "start_date".into(),
                snaps().map(|s| s.start_date).collect::<Vec<_>>(),
            ),
            Column::new(
                "end_date".into(),
                snaps().map(|s| s.end_date).collect::<Vec<_>>(),
            ),
            stat("mean_return", |s: &ReturnSnapshot| s.mean),
            stat("std_return", |s: &ReturnSnapshot| s.std),
            stat("skew_return", |s: &ReturnSnapshot| s.skew),
            stat("kurtosis_return", |s: &ReturnSnapshot| s.kurtosis),
            stat("min_return", |s: &ReturnSnapshot| s.min),
            stat("p1_return", |s: &ReturnSnapshot| s.p1),
            stat("p5_return", |s: &ReturnSnapshot| s.p5),
            stat("p95_return", |s: &ReturnSnapshot| s.p95),
            stat("p99_return", |s: &ReturnSnapshot| s.p99),
            stat("max_return", |s: &ReturnSnapshot| s.max),
            Column::new(
                "illiquid".into(),
                snaps().map(|s| s.illiquid).collect::<Vec<_>>(),
            ),
        ])?;
        Ok(df)
    }
}

/// Consistency constant relating MAD to the standard deviation of a normal
/// distribution (`Φ⁻¹(0.75)`).
pub const ROBUST_Z_SCALE: f64 = 0.6745;

const LOG_RETURN: &str = "log_return";

/// `ln(close / previous close)` within each symbol.
///
/// Null on a symbol's first row and wherever either close is non-positive.
/// Expects a frame sorted by `symbol`, `date`.
pub fn log_return() -> Expr {
    let close_lag = col("close").shift(lit(1)).over([col("symbol")]);
    when(col("close").gt(lit(0.0)).and(close_lag.clone().gt(lit(0.0))))
        .then((col("close") / close_lag).log(E))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// `0.6745 * (log_return - center) / mad`, null unless `mad > 0`.
fn robust_z(center: Expr, mad: Expr) -> Expr {
    when(mad.clone().gt(lit(0.0)))
        .then(lit(ROBUST_Z_SCALE) * (col(LOG_RETURN) - center) / mad)
        .otherwise(lit(NULL).cast(DataType::Float64))
}

fn exceeds(score: &str, threshold: f64) -> Expr {
    col(score).abs().gt(lit(threshold)).fill_null(lit(false))
}

/// MAD of one rolling window, around that window's own median.
fn window_mad(window: &Series) -> Series {
    let mad = window.f64().ok().and_then(|values| {
        let center = values.median()?;
        values.apply_values(|x| (x - center).abs()).median()
    });
    Series::new(PlSmallStr::EMPTY, [mad])
}

/// MAD-based anomaly detector over daily log-returns.
///
/// # Flags
///
/// - `global_outlier`: whole-history |z| > `global_threshold`
/// - `mild_anomaly` / `major_anomaly`: trailing-window |z| above
///   `mild_threshold` / `major_threshold`
/// - `robust_outlier` / `very_extreme`: whole-history |z| above
///   `entity_threshold` / `extreme_threshold`
/// - `window_ready_<n>`: at least `readiness_fraction * n` defined returns
///   in the trailing `n` rows
#[derive(Debug, Clone, Default)]
pub struct OutlierDetector {
    config: OutlierConfig,
}

impl OutlierDetector {
    /// Runs the detector over every symbol as one partitioned query.
    pub fn detect_all(&self, store: &TimeSeriesStore) -> Result<OutlierReport> {
        let report = OutlierReport {
            symbols: self.detect(store.series(), None)?,
            readiness_windows: self.config.readiness_windows.clone(),
        };
        info!(
            symbols = report.symbols.len(),
            flagged_rows = report.flagged_count(),
            illiquid = report.symbols.iter().filter(|s| s.snapshot.illiquid).count(),
            "Outlier detection complete"
        );
        Ok(report)
    }

    /// Row range of `series` inside `[start_date, reference]`.
    fn bounds(&self, series: &SymbolSeries, reference: Option<NaiveDate>) -> Range<usize> {
        let end = reference.map_or(series.len(), |r| series.count_until(r));
        let first = self
            .config
            .start_date
            .map_or(0, |s| series.dates()[..end].partition_point(|d| *d < s));
        first..end
    }

    /// Adds log-returns, robust z-scores, flags and window readiness to a
    /// `symbol, date, close` frame.
    pub fn score_frame(&self, prices: LazyFrame) -> LazyFrame {
        let config = &self.config;
        let rolling = RollingOptionsFixedWindow {
            window_size: config.rolling_window,
            min_periods: config.rolling_min_periods,
            ..Default::default()
        };

        let mut scored = prices
            .with_column(log_return().alias(LOG_RETURN))
            .with_columns([
                col(LOG_RETURN)
                    .median()
                    .over([col("symbol")])
                    .alias("center"),
                col(LOG_RETURN)
                    .rolling_median(rolling.clone())
                    .over([col("symbol")])
                    .alias("rolling_center"),
                col(LOG_RETURN)
                    .rolling_map(
                        Arc::new(window_mad),
                        GetOutput::from_type(DataType::Float64),
                        rolling,
                    )
                    .over([col("symbol")])
                    .alias("rolling_mad"),
            ])
            .with_column(
                (col(LOG_RETURN) - col("center"))
                    .abs()
                    .median()
                    .over([col("symbol")])
                    .alias("mad"),
            )
            .with_columns([
                robust_z(col("center"), col("mad")).alias("robust_z"),
                robust_z(col("rolling_center"), col("rolling_mad")).alias("robust_z_rolling"),
            ])
            .with_columns([
                exceeds("robust_z", config.global_threshold).alias("global_outlier"),
                exceeds("robust_z_rolling", config.mild_threshold).alias("mild_anomaly"),
                exceeds("robust_z_rolling", config.major_threshold).alias("major_anomaly"),
                exceeds("robust_z", config.entity_threshold).alias("robust_outlier"),
                exceeds("robust_z", config.extreme_threshold).alias("very_extreme"),
            ]);

        for &n in &config.readiness_windows {
            scored = scored.with_column(
                col(LOG_RETURN)
                    .is_not_null()
                    .cast(DataType::Float64)
                    .rolling_sum(RollingOptionsFixedWindow {
                        window_size: n,
                        min_periods: 1,
                        ..Default::default()
                    })
                    .over([col("symbol")])
                    .gt_eq(lit(config.readiness_fraction * n as f64))
                    .alias(format!("window_ready_{n}")),
            );
        }

        scored.drop(["center", "mad", "rolling_center", "rolling_mad"])
    }

    /// Per-symbol moments and tail percentiles of the log-returns in a frame
    /// produced by [`Self::score_frame`].
    pub fn summary_frame(scored: LazyFrame) -> LazyFrame {
        let r = || col(LOG_RETURN);
        let pct = |q: f64| r().quantile(lit(q), QuantileMethod::Linear);

        scored.group_by_stable([col("symbol")]).agg([
            r().count().alias("n_returns"),
            r().mean().alias("mean_return"),
            r().std(0).alias("std_return"),
            r().skew(false).alias("skew_return"),
            r().kurtosis(true, false).alias("kurtosis_return"),
            r().min().alias("min_return"),
            pct(0.01).alias("p1_return"),
            pct(0.05).alias("p5_return"),
            pct(0.95).alias("p95_return"),
            pct(0.99).alias("p99_return"),
            r().max().alias("max_return"),
        ])
    }

    /// Scores every series and splits the result back per symbol.
    fn detect(
        &self,
        series: &[SymbolSeries],
        reference: Option<NaiveDate>,
    ) -> Result<Vec<SymbolOutliers>> {
        let spans: Vec<(&SymbolSeries, Range<usize>)> =
            series.iter().map(|s| (s, self.bounds(s, reference))).collect();

        let mut symbols: Vec<&str> = Vec::new();
        let mut dates: Vec<NaiveDate> = Vec::new();
        let mut closes: Vec<f64> = Vec::new();
        for (s, span) in &spans {
            symbols.extend(std::iter::repeat_n(s.symbol(), span.len()));
            dates.extend_from_slice(&s.dates()[span.clone()]);
            closes.extend_from_slice(&s.closes()[span.clone()]);
        }
        if dates.is_empty() {
            return Ok(spans
                .into_iter()
                .map(|(s, _)| self.empty_result(s))
                .collect());
        }

        let prices = DataFrame::new(vec![
            Column::new("symbol".into(), symbols),
            Column::new("date".into(), dates),
            Column::new("close".into(), closes),
        ])?;
        let scored = self.score_frame(prices.lazy()).collect()?;
        let summary = Self::summary_frame(scored.clone().lazy()).collect()?;

        let rows = ScoredColumns::read(&scored, &self.config.readiness_windows)?;
        let stats = SummaryColumns::read(&summary)?;

        let mut offset = 0;
        let mut group = 0;
        let mut out = Vec::with_capacity(spans.len());
        for (s, span) in spans {
            if span.is_empty() {
                out.push(self.empty_result(s));
                continue;
            }
            let dates = &s.dates()[span.clone()];
            let closes = &s.closes()[span.clone()];
            let rows = (0..span.len())
                .map(|i| rows.row(offset + i, dates[i], closes[i]))
                .collect();
            out.push(SymbolOutliers {
                symbol: s.symbol().to_string(),
                rows,
                snapshot: self.snapshot(dates, &stats, group),
            });
            offset += span.len();
            group += 1;
        }
        Ok(out)
    }

    fn empty_result(&self, series: &SymbolSeries) -> SymbolOutliers {
        SymbolOutliers {
            symbol: series.symbol().to_string(),
            rows: Vec::new(),
            snapshot: self.snapshot(&[], &SummaryColumns::default(), 0),
        }
    }

    fn snapshot(
        &self,
        dates: &[NaiveDate],
        stats: &SummaryColumns,
        group: usize,
    ) -> ReturnSnapshot {
        let n_returns = stats.n_returns.get(group).copied().unwrap_or(0);
        let pct_missing = missing_weekday_pct(dates);
        let stat = |values: &[Option<f64>]| values.get(group).copied().flatten();

        ReturnSnapshot {
            n_returns,
            pct_missing,
            start_date: dates.first().copied(),
            end_date: dates.last().copied(),
            mean: stat(&stats.mean),
            std: stat(&stats.std),
            skew: stat(&stats.skew),
            kurtosis: stat(&stats.kurtosis),
            min: stat(&stats.min),
            p1: stat(&stats.p1),
            p5: stat(&stats.p5),
            p95: stat(&stats.p95),
            p99: stat(&stats.p99),
            max: stat(&stats.max),
            illiquid: n_returns == 0
                || pct_missing > self.config.illiquid_missing_fraction * 100.0,
        }
    }
}

/// Finite values of a float column; NaN and infinities read as undefined.
fn floats(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df
        .column(name)?
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn flags(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    Ok(df
        .column(name)?
        .bool()?
        .into_iter()
        .map(|v| v.unwrap_or(false))
        .collect())
}

/// Materialized columns of a scored frame.
struct ScoredColumns {
    log_return: Vec<Option<f64>>,
    robust_z: Vec<Option<f64>>,
    rolling_z: Vec<Option<f64>>,
    global_outlier: Vec<bool>,
    mild_anomaly: Vec<bool>,
    major_anomaly: Vec<bool>,
    robust_outlier: Vec<bool>,
    very_extreme: Vec<bool>,
    ready: Vec<(usize, Vec<bool>)>,
}

impl ScoredColumns {
    fn read(df: &DataFrame, windows: &[usize]) -> Result<Self> {
        Ok(Self {
            log_return: floats(df, LOG_RETURN)?,
            robust_z: floats(df, "robust_z")?,
            rolling_z: floats(df, "robust_z_rolling")?,
            global_outlier: flags(df, "global_outlier")?,
            mild_anomaly: flags(df, "mild_anomaly")?,
            major_anomaly: flags(df, "major_anomaly")?,
            robust_outlier: flags(df, "robust_outlier")?,
            very_extreme: flags(df, "very_extreme")?,
            ready: windows
                .iter()
                .map(|&n| Ok((n, flags(df, &format!("window_ready_{n}"))?)))
                .collect::<Result<_>>()?,
        })
    }

    fn row(&self, i: usize, date: NaiveDate, close: f64) -> OutlierRow {
        OutlierRow {
            date,
            close,
            log_return: self.log_return[i],
            robust_z: self.robust_z[i],
            rolling_z: self.rolling_z[i],
            flags: OutlierFlags {
                global_outlier: self.global_outlier[i],
                mild_anomaly: self.mild_anomaly[i],
                major_anomaly: self.major_anomaly[i],
                robust_outlier: self.robust_outlier[i],
                very_extreme: self.very_extreme[i],
                window_ready: self.ready.iter().map(|(n, ready)| (*n, ready[i])).collect(),
            },
        }
    }
}

/// Materialized columns of a summary frame, one entry per symbol group.
#[derive(Default)]
struct SummaryColumns {
    n_returns: Vec<usize>,
    mean: Vec<Option<f64>>,
    std: Vec<Option<f64>>,
    skew: Vec<Option<f64>>,
    kurtosis: Vec<Option<f64>>,
    min: Vec<Option<f64>>,
    p1: Vec<Option<f64>>,
    p5: Vec<Option<f64>>,
    p95: Vec<Option<f64>>,
    p99: Vec<Option<f64>>,
    max: Vec<Option<f64>>,
}

impl SummaryColumns {
    fn read(df: &DataFrame) -> Result<Self> {
        let counts = df.column("n_returns")?.cast(&DataType::UInt64)?;
        Ok(Self {
            n_returns: counts
                .u64()?
                .into_iter()
                .map(|n| n.unwrap_or(0) as usize)
                .collect(),
            mean: floats(df, "mean_return")?,
            std: floats(df, "std_return")?,
            skew: floats(df, "skew_return")?,
            kurtosis: floats(df, "kurtosis_return")?,
            min: floats(df, "min_return")?,
            p1: floats(df, "p1_return")?,
            p5: floats(df, "p5_return")?,
            p95: floats(df, "p95_return")?,
            p99: floats(df, "p99_return")?,
            max: floats(df, "max_return")?,
        })
    }
}

impl SeriesEngine for OutlierDetector {
    type Output = Result<SymbolOutliers>;

    fn name(&self) -> &str {
        "robust_outliers"
    }

    fn description(&self) -> &str {
        "MAD robust z-score flags on log-returns: global, rolling and per-entity"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close"]
    }

    fn lookback_days(&self) -> i64 {
        0
    }

    fn compute(&self, series: &SymbolSeries, reference: Option<NaiveDate>) -> Self::Output {
        let mut results = self.detect(std::slice::from_ref(series), reference)?;
        results
            .pop()
            .ok_or_else(|| ScreenerError::Computation("outlier detection returned no rows".into()))
    }
}

impl ConfigurableEngine for OutlierDetector {
    type Config = OutlierConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Percentage of Mon-Fri slots between the first and last date with no
/// observation.
fn missing_weekday_pct(dates: &[NaiveDate]) -> f64 {
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return 100.0;
    };
    let slots = first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| is_weekday(*d))
        .count();
    if slots == 0 {
        return 100.0;
    }
    let present = dates.iter().filter(|d| is_weekday(**d)).count();
    (slots.saturating_sub(present)) as f64 / slots as f64 * 100.0
}
