//! One screening run over a store.
//!
//! The pipeline resolves the reference date, computes returns, turnover and
//! raw scores per symbol in parallel, normalizes the raw scores across the
//! batch, and attaches the historical comparison columns.

use crate::{
    Result, ScreenerError,
    horizon::Horizon,
    model::{PeriodDelta, ScoreRecord, SymbolSeries},
    outlier::{OutlierConfig, OutlierDetector},
    returns::{ReturnConfig, ReturnEngine},
    scoring::{CompositeScorer, ScoringConfig},
    store::{StoreConfig, TimeSeriesStore},
    tracker::{HistoricalScoreTracker, HistoricalScores, TrackerConfig},
    traits::{ConfigurableEngine, EngineInfo, SeriesEngine},
    turnover::{TurnoverConfig, TurnoverEngine},
};
use chrono::NaiveDate;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Raw score column in the output frame.
pub const RAW_SCORE: &str = "raw_score";
/// Normalized score column in the output frame.
pub const NORMALIZED_SCORE: &str = "normalized_score";

/// Configuration for every component of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Row filtering
    pub store: StoreConfig,
    /// Horizon returns
    pub returns: ReturnConfig,
    /// Turnover
    pub turnover: TurnoverConfig,
    /// Raw score and normalization
    pub scoring: ScoringConfig,
    /// Historical comparison
    pub tracker: TrackerConfig,
    /// Outlier detection
    pub outlier: OutlierConfig,
    /// Reference date; the latest date in the data when unset
    pub reference_date: Option<NaiveDate>,
}

impl PipelineConfig {
    /// Validates every component configuration.
    pub fn validate(&self) -> Result<()> {
        self.returns.validate()?;
        self.turnover.validate()?;
        self.scoring.validate()?;
        self.tracker.validate()?;
        self.outlier.validate()?;
        Ok(())
    }
}

/// Result of one screening run.
#[derive(Debug, Clone)]
pub struct ScreenReport {
    reference_date: NaiveDate,
    horizons: Vec<Horizon>,
    history: HistoricalScores,
    records: Vec<ScoreRecord>,
}

impl ScreenReport {
    /// Date the run was anchored on.
    pub const fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// One record per symbol in the universe, ordered by symbol.
    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    /// Record for one symbol.
    pub fn get(&self, symbol: &str) -> Option<&ScoreRecord> {
        self.records
            .binary_search_by(|r| r.symbol.as_str().cmp(symbol))
            .ok()
            .map(|i| &self.records[i])
    }

    /// Historical snapshot scores.
    pub const fn history(&self) -> &HistoricalScores {
        &self.history
    }

    /// Symbols with a defined return, per computed horizon.
    pub fn availability(&self) -> Vec<(Horizon, usize)> {
        self.horizons
            .iter()
            .map(|&h| {
                let n = self
                    .records
                    .iter()
                    .filter(|r| r.returns.get(h).is_some())
                    .count();
                (h, n)
            })
            .collect()
    }

    /// Output table.
    ///
    /// Columns: `symbol, fincode, isin, latest_date, latest_close,
    /// latest_volume, turnover, return_<h>..., raw_score, normalized_score`,
    /// then `<p>_raw_score, %change_<p>, symbol_<p>` per tracked period.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let records = &self.records;
        let mut columns = vec![
            Column::new(
                "symbol".into(),
                records.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(
                "fincode".into(),
                records
                    .iter()
                    .map(|r| r.identifiers.fincode.as_deref())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "isin".into(),
                records
                    .iter()
                    .map(|r| r.identifiers.isin.as_deref())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "latest_date".into(),
                records.iter().map(|r| r.latest_date).collect::<Vec<_>>(),
            ),
            Column::new(
                "latest_close".into(),
                records.iter().map(|r| r.latest_close).collect::<Vec<_>>(),
            ),
            Column::new(
                "latest_volume".into(),
                records.iter().map(|r| r.latest_volume).collect::<Vec<_>>(),
            ),
            Column::new(
                "turnover".into(),
                records.iter().map(|r| r.turnover).collect::<Vec<_>>(),
            ),
        ];

        for &h in &self.horizons {
            columns.push(Column::new(
                format!("return_{}", h.slug()).into(),
                records.iter().map(|r| r.returns.get(h)).collect::<Vec<_>>(),
            ));
        }

        columns.push(Column::new(
            RAW_SCORE.into(),
            records.iter().map(|r| r.raw_score).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            NORMALIZED_SCORE.into(),
            records.iter().map(|r| r.normalized_score).collect::<Vec<_>>(),
        ));

        for period in self.history.periods() {
            let slug = period.slug();
            let deltas: Vec<PeriodDelta> = records
                .iter()
                .map(|r| r.history.get(&period).copied().unwrap_or_default())
                .collect();
            columns.push(Column::new(
                format!("{slug}_raw_score").into(),
                deltas.iter().map(|d| d.raw_score).collect::<Vec<_>>(),
            ));
            columns.push(Column::new(
                format!("%change_{slug}").into(),
                deltas.iter().map(|d| d.percent_change).collect::<Vec<_>>(),
            ));
            columns.push(Column::new(
                format!("symbol_{slug}").into(),
                deltas
                    .iter()
                    .map(|d| d.sign_pattern.map(|p| p.to_string()))
                    .collect::<Vec<_>>(),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// Orchestrates returns, turnover, scoring and historical tracking.
#[derive(Debug, Clone)]
pub struct ScreenerPipeline {
    config: PipelineConfig,
    returns: ReturnEngine,
    turnover: TurnoverEngine,
    scorer: CompositeScorer,
    tracker: HistoricalScoreTracker,
}

impl ScreenerPipeline {
    /// Builds a pipeline after validating the configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let returns = ReturnEngine::with_config(config.returns.clone());
        Ok(Self {
            turnover: TurnoverEngine::with_config(config.turnover.clone()),
            scorer: CompositeScorer::with_config(config.scoring.clone()),
            tracker: HistoricalScoreTracker::with_config(config.tracker.clone())
                .with_return_engine(returns.clone()),
            returns,
            config,
        })
    }

    /// Configuration in use.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Metadata for every per-symbol engine the pipeline can run.
    pub fn engines(&self) -> Vec<EngineInfo> {
        vec![
            EngineInfo::of(&self.returns),
            EngineInfo::of(&self.turnover),
            EngineInfo::of(&OutlierDetector::with_config(self.config.outlier.clone())),
        ]
    }

    /// Runs the screen over a store.
    pub fn run(&self, store: &TimeSeriesStore) -> Result<ScreenReport> {
        let reference = self
            .config
            .reference_date
            .or_else(|| store.latest_date())
            .ok_or(ScreenerError::InsufficientData {
                required: 1,
                available: 0,
            })?;

        let universe: Vec<&SymbolSeries> = store
            .series()
            .iter()
            .filter(|s| s.has_date(reference))
            .collect();
        if universe.is_empty() {
            return Err(ScreenerError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        match self.config.returns.staleness_tolerance_days {
            Some(days) => info!(days, "Return staleness tolerance enabled"),
            None => info!("Return staleness tolerance disabled"),
        }
        info!(
            reference = %reference,
            symbols = universe.len(),
            skipped = store.len() - universe.len(),
            mode = ?self.scorer.config().mode,
            "Screening universe"
        );

        let mut records: Vec<ScoreRecord> = universe
            .par_iter()
            .map(|s| self.score_symbol(s, reference))
            .collect();

        let normalized = self.normalize(&records)?;
        for (record, value) in records.iter_mut().zip(normalized) {
            record.normalized_score = value;
        }

        // Historical scores are best effort whatever the scoring mode.
        let history = self.tracker.historical_scores(store, reference);
        for record in &mut records {
            let current = self.tracker.comparable_score(&record.returns);
            record.history = history.deltas(&record.symbol, current);
        }

        let report = ScreenReport {
            reference_date: reference,
            horizons: self.config.returns.horizons.clone(),
            history,
            records,
        };
        log_availability(&report);
        Ok(report)
    }

    fn score_symbol(&self, series: &SymbolSeries, reference: NaiveDate) -> ScoreRecord {
        let anchor = series.anchor(Some(reference));
        let returns = self.returns.compute(series, Some(reference));
        let raw_score = self.scorer.raw_score(&returns);

        ScoreRecord {
            symbol: series.symbol().to_string(),
            identifiers: series.identifiers().clone(),
            latest_date: anchor.map(|i| series.dates()[i]),
            latest_close: anchor.map(|i| series.closes()[i]),
            latest_volume: anchor.and_then(|i| series.volumes()[i]),
            turnover: self.turnover.compute(series, Some(reference)),
            returns,
            raw_score,
            normalized_score: None,
            history: BTreeMap::new(),
        }
    }

    fn normalize(&self, records: &[ScoreRecord]) -> Result<Vec<Option<f64>>> {
        let raw: Vec<Option<f64>> = records.iter().map(|r| r.raw_score).collect();
        let df = df![RAW_SCORE => raw]?;
        let df = self.scorer.normalize(&df, RAW_SCORE, NORMALIZED_SCORE)?;
        let values = df
            .column(NORMALIZED_SCORE)?
            .f64()?
            .into_iter()
            .collect();
        Ok(values)
    }
}

impl Default for ScreenerPipeline {
    fn default() -> Self {
        let config = PipelineConfig::default();
        let returns = ReturnEngine::with_config(config.returns.clone());
        Self {
            turnover: TurnoverEngine::default(),
            scorer: CompositeScorer::default(),
            tracker: HistoricalScoreTracker::default().with_return_engine(returns.clone()),
            returns,
            config,
        }
    }
}

fn log_availability(report: &ScreenReport) {
    let total = report.records.len();
    for (horizon, available) in report.availability() {
        if Horizon::SCORING.contains(&horizon) {
            info!(horizon = %horizon, available, total, "Return availability");
        }
    }
    let scored = report.records.iter().filter(|r| r.raw_score.is_some()).count();
    if scored == 0 {
        warn!(total, "No symbol received a raw score");
    } else {
        info!(scored, total, "Scoring complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Identifiers, PricePoint},
        normalize::Normalization,
        scoring::ScoringMode,
    };
    use approx::assert_relative_eq;
    use chrono::{Datelike, TimeDelta, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// `days` consecutive calendar days ending on `end`, growing by `rate`
    /// per day.
    fn history(symbol: &str, end: NaiveDate, days: i64, rate: f64) -> Vec<PricePoint> {
        (0..days)
            .map(|i| {
                let d = end - TimeDelta::days(days - 1 - i);
                PricePoint::new(symbol, d, 100.0 * (1.0 + rate).powi(i as i32)).with_volume(1_000)
            })
            .collect()
    }

    /// Mon-Fri rows from `start` through `end`, volume 1000.
    fn weekday_history(
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        close: impl Fn(NaiveDate) -> f64,
    ) -> Vec<PricePoint> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|d| PricePoint::new(symbol, d, close(d)).with_volume(1_000))
            .collect()
    }

    /// Trading-day universe ending Friday 2024-06-28. STEP trades at 100,
    /// steps to 110 on Monday 2024-06-17 and to 121 on Monday 2024-06-24.
    fn weekday_universe() -> TimeSeriesStore {
        let (start, end) = (date(2022, 1, 3), date(2024, 6, 28));
        let mut points = weekday_history("STEP", start, end, |d| {
            if d >= date(2024, 6, 24) {
                121.0
            } else if d >= date(2024, 6, 17) {
                110.0
            } else {
                100.0
            }
        });
        points.extend(weekday_history("FLAT", start, end, |_| 100.0));
        store(points)
    }

    fn store(points: Vec<PricePoint>) -> TimeSeriesStore {
        TimeSeriesStore::from_points(points, &StoreConfig::default())
    }

    fn universe() -> TimeSeriesStore {
        let end = date(2024, 6, 28);
        let mut points = history("AAA", end, 500, 0.001);
        points.extend(history("BBB", end, 500, -0.0005));
        points.extend(history("CCC", end, 500, 0.0002));
        // Listed yesterday: a single observation.
        points.extend(history("NEW", end, 1, 0.0));
        // Stopped trading a month ago.
        points.extend(history("OLD", end - TimeDelta::days(30), 400, 0.001));
        store(points)
    }

    #[test]
    fn test_run_scores_universe_on_reference_date() {
        let report = ScreenerPipeline::default().run(&universe()).unwrap();

        assert_eq!(report.reference_date(), date(2024, 6, 28));
        let symbols: Vec<&str> = report.records().iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC", "NEW"]);

        let aaa = report.get("AAA").unwrap();
        assert_eq!(aaa.latest_date, Some(date(2024, 6, 28)));
        assert_eq!(aaa.latest_volume, Some(1_000));
        assert!(aaa.turnover.is_some());
        assert!(aaa.returns.get(Horizon::OneYear).unwrap() > 0.0);
        assert_eq!(aaa.returns.get(Horizon::ThreeYears), None);

        // Strongest trend ranks highest.
        let best = aaa.normalized_score.unwrap();
        let worst = report.get("BBB").unwrap().normalized_score.unwrap();
        assert!(best > worst);
        assert!((0.0..=100.0).contains(&best));
    }

    #[test]
    fn test_single_point_symbol_has_no_derived_fields() {
        let report = ScreenerPipeline::default().run(&universe()).unwrap();
        let new = report.get("NEW").unwrap();

        assert_eq!(new.latest_close, Some(100.0));
        assert_eq!(new.returns.defined_count(), 0);
        assert_eq!(new.turnover, None);
        assert_eq!(new.raw_score, None);
        assert_eq!(new.normalized_score, None);
        assert!(new.history.values().all(|d| d.percent_change.is_none()));
    }

    #[test]
    fn test_history_columns() {
        let report = ScreenerPipeline::default().run(&universe()).unwrap();
        let aaa = report.get("AAA").unwrap();

        let week = aaa.history[&Horizon::OneWeek];
        let (current, past) = (aaa.raw_score.unwrap(), week.raw_score.unwrap());
        assert_relative_eq!(
            week.percent_change.unwrap(),
            (current - past) / past.abs() * 100.0,
            epsilon = 1e-9
        );
        assert_eq!(week.sign_pattern.unwrap().to_string(), "+, +");

        let bbb = report.get("BBB").unwrap().history[&Horizon::OneMonth];
        assert_eq!(bbb.sign_pattern.unwrap().to_string(), "-, -");
    }

    #[test]
    fn test_weekday_calendar_run() {
        let report = ScreenerPipeline::default().run(&weekday_universe()).unwrap();
        let step = report.get("STEP").unwrap();

        // Every weighted return is 21%; the weights sum to 1.
        assert_relative_eq!(step.raw_score.unwrap(), 21.0, epsilon = 1e-9);

        // The 180 rows before the anchor: 4 at 121, 5 at 110, 171 at 100.
        let avg = (4.0 * 121.0 + 5.0 * 110.0 + 171.0 * 100.0) / 180.0;
        assert_relative_eq!(step.turnover.unwrap(), avg * 1_000.0, epsilon = 1e-6);
        assert_relative_eq!(
            report.get("FLAT").unwrap().turnover.unwrap(),
            100_000.0,
            epsilon = 1e-6
        );

        // Weekend targets fall back to the Friday before.
        let history = report.history();
        assert_eq!(history.resolved_date(Horizon::OneWeek), Some(date(2024, 6, 21)));
        assert_eq!(
            history.resolved_date(Horizon::ThreeMonths),
            Some(date(2024, 3, 29))
        );

        // On 2024-06-21 every weighted return was 10%.
        let week = step.history[&Horizon::OneWeek];
        assert_relative_eq!(week.raw_score.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(week.percent_change.unwrap(), 110.0, epsilon = 1e-6);
        assert_eq!(week.sign_pattern.unwrap().to_string(), "+, +");
    }

    #[test]
    fn test_strict_mode_history_uses_best_effort_scale() {
        let config = PipelineConfig {
            scoring: ScoringConfig {
                mode: ScoringMode::Strict,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = ScreenerPipeline::new(config)
            .unwrap()
            .run(&weekday_universe())
            .unwrap();
        let step = report.get("STEP").unwrap();

        assert_relative_eq!(step.raw_score.unwrap(), 2_100.0, epsilon = 1e-6);
        let week = step.history[&Horizon::OneWeek];
        assert_relative_eq!(week.raw_score.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(week.percent_change.unwrap(), 110.0, epsilon = 1e-6);

        let frame = report.to_frame().unwrap();
        let change = frame.column("%change_1week").unwrap().f64().unwrap();
        let row = report.records().iter().position(|r| r.symbol == "STEP").unwrap();
        assert_relative_eq!(change.get(row).unwrap(), 110.0, epsilon = 1e-6);
    }

    #[test]
    fn test_output_frame_layout() {
        let report = ScreenerPipeline::default().run(&universe()).unwrap();
        let df = report.to_frame().unwrap();

        assert_eq!(df.height(), 4);
        let names: Vec<String> = df
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(&names[..7], &[
            "symbol",
            "fincode",
            "isin",
            "latest_date",
            "latest_close",
            "latest_volume",
            "turnover"
        ]);
        assert_eq!(names[7], "return_1week");
        assert_eq!(names[14], "return_5years");
        assert_eq!(names[15], RAW_SCORE);
        assert_eq!(names[16], NORMALIZED_SCORE);
        assert_eq!(&names[17..20], &["1week_raw_score", "%change_1week", "symbol_1week"]);
        assert_eq!(names.len(), 17 + 3 * Horizon::TRACKED.len());

        let signs = df.column("symbol_1month").unwrap().str().unwrap();
        assert_eq!(signs.get(0), Some("+, +"));
        assert_eq!(signs.get(3), None);
    }

    #[test]
    fn test_reference_date_limits_universe() {
        let config = PipelineConfig {
            reference_date: Some(date(2024, 5, 29)),
            ..Default::default()
        };
        let report = ScreenerPipeline::new(config).unwrap().run(&universe()).unwrap();

        // OLD traded on the earlier date, NEW did not exist yet.
        let symbols: Vec<&str> = report.records().iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC", "OLD"]);
        assert_eq!(
            report.get("AAA").unwrap().latest_date,
            Some(date(2024, 5, 29))
        );
    }

    #[test]
    fn test_strict_mode_and_normalization_choice() {
        let config = PipelineConfig {
            scoring: ScoringConfig {
                mode: ScoringMode::Strict,
                normalization: Normalization::MinMax,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = ScreenerPipeline::new(config).unwrap().run(&universe()).unwrap();

        let scores: Vec<f64> = report
            .records()
            .iter()
            .filter_map(|r| r.normalized_score)
            .collect();
        assert_eq!(scores.len(), 3);
        assert_relative_eq!(scores.iter().copied().fold(f64::MIN, f64::max), 100.0);
        assert_relative_eq!(scores.iter().copied().fold(f64::MAX, f64::min), 0.0);
    }

    #[test]
    fn test_availability_counts() {
        let report = ScreenerPipeline::default().run(&universe()).unwrap();
        let availability: BTreeMap<Horizon, usize> = report.availability().into_iter().collect();
        assert_eq!(availability[&Horizon::OneYear], 3);
        assert_eq!(availability[&Horizon::FiveYears], 0);
    }

    #[test]
    fn test_empty_inputs_are_errors() {
        let pipeline = ScreenerPipeline::default();
        assert!(matches!(
            pipeline.run(&TimeSeriesStore::default()),
            Err(ScreenerError::InsufficientData { .. })
        ));

        let config = PipelineConfig {
            reference_date: Some(date(2030, 1, 1)),
            ..Default::default()
        };
        assert!(matches!(
            ScreenerPipeline::new(config).unwrap().run(&universe()),
            Err(ScreenerError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.turnover.min_rows = 0;
        assert!(matches!(
            ScreenerPipeline::new(config),
            Err(ScreenerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_json_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"turnover": {"min_rows": 100}, "tracker": {"max_gap_days": 3}}"#)
                .unwrap();
        assert_eq!(config.turnover.min_rows, 100);
        assert_eq!(config.turnover.lookback_days, None);
        assert_eq!(config.tracker.periods, Horizon::TRACKED.to_vec());
        assert_eq!(config.tracker.max_gap_days, 3);
        assert!(config.validate().is_ok());

        let json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.returns.horizons, Horizon::ALL.to_vec());
    }

    #[test]
    fn test_partial_component_sections() {
        let json = r#"{
            "store": {"active_only": false},
            "returns": {"staleness_tolerance_days": 5},
            "scoring": {"mode": "strict"},
            "outlier": {"rolling_window": 20}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert!(!config.store.active_only);
        assert_eq!(config.returns.staleness_tolerance_days, Some(5));
        assert_eq!(config.returns.horizons, Horizon::ALL.to_vec());
        assert_eq!(config.scoring.mode, ScoringMode::Strict);
        assert_eq!(config.scoring.normalization, Normalization::Percentile);
        assert_eq!(config.outlier.rolling_window, 20);
        assert_relative_eq!(config.outlier.global_threshold, 6.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identifiers_flow_to_records() {
        let mut points = history("AAA", date(2024, 1, 31), 40, 0.001);
        for p in &mut points {
            p.identifiers = Identifiers {
                fincode: Some("100".into()),
                isin: Some("INE100".into()),
            };
        }
        let report = ScreenerPipeline::default().run(&store(points)).unwrap();
        let aaa = report.get("AAA").unwrap();
        assert_eq!(aaa.identifiers.isin.as_deref(), Some("INE100"));
        // One symbol: percentile range collapses.
        assert_relative_eq!(aaa.normalized_score.unwrap(), 50.0);
    }

    #[test]
    fn test_engines_listing() {
        let engines = ScreenerPipeline::default().engines();
        let names: Vec<&str> = engines.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["horizon_returns", "turnover", "robust_outliers"]);
        assert!(engines[1].required_columns.contains(&"volume".to_string()));
    }
}
