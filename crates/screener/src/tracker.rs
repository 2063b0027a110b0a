//! Time-travel rescoring.
//!
//! For each tracked period the tracker resolves one snapshot date for the
//! whole dataset, recomputes returns and a best-effort raw score for every
//! symbol trading on that date, and compares them with current scores on the
//! same best-effort scale.

use crate::{
    Result, ScreenerError,
    horizon::Horizon,
    model::{PeriodDelta, ReturnSet, Sign, SignPattern},
    returns::{MIN_POINTS, ReturnEngine},
    scoring::CompositeScorer,
    store::TimeSeriesStore,
    traits::{ConfigurableEngine, SeriesEngine},
};
use chrono::{NaiveDate, TimeDelta};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Configuration for the historical tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Periods to look back over (default: 1 week through 1 year)
    pub periods: Vec<Horizon>,
    /// Largest allowed gap between a target date and the resolved snapshot
    /// date (default: 5)
    pub max_gap_days: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            periods: Horizon::TRACKED.to_vec(),
            max_gap_days: 5,
        }
    }
}

impl TrackerConfig {
    /// Rejects a negative gap.
    pub fn validate(&self) -> Result<()> {
        if self.max_gap_days < 0 {
            return Err(ScreenerError::InvalidConfig(
                "tracker max_gap_days must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Historical raw scores per tracked period.
#[derive(Debug, Clone, Default)]
pub struct HistoricalScores {
    resolved: BTreeMap<Horizon, Option<NaiveDate>>,
    scores: BTreeMap<Horizon, HashMap<String, f64>>,
}

impl HistoricalScores {
    /// Snapshot date used for a period, `None` when the period was
    /// unavailable.
    pub fn resolved_date(&self, period: Horizon) -> Option<NaiveDate> {
        self.resolved.get(&period).copied().flatten()
    }

    /// Tracked periods, shortest first.
    pub fn periods(&self) -> impl Iterator<Item = Horizon> + '_ {
        self.resolved.keys().copied()
    }

    /// Historical raw score of a symbol for a period.
    pub fn score(&self, period: Horizon, symbol: &str) -> Option<f64> {
        self.scores.get(&period)?.get(symbol).copied()
    }

    /// Number of symbols scored for a period.
    pub fn scored_count(&self, period: Horizon) -> usize {
        self.scores.get(&period).map_or(0, HashMap::len)
    }

    /// Compares a current raw score with every tracked period.
    pub fn deltas(&self, symbol: &str, current: Option<f64>) -> BTreeMap<Horizon, PeriodDelta> {
        self.periods()
            .map(|period| (period, compare(current, self.score(period, symbol))))
            .collect()
    }
}

/// Percent change and sign transition between two raw scores.
pub fn compare(current: Option<f64>, historical: Option<f64>) -> PeriodDelta {
    let percent_change = match (current, historical) {
        (Some(c), Some(h)) if h != 0.0 => {
            let change = (c - h) / h.abs() * 100.0;
            change.is_finite().then_some(change)
        }
        _ => None,
    };
    let sign_pattern = current.zip(historical).map(|(c, h)| SignPattern {
        current: Sign::of(c),
        historical: Sign::of(h),
    });
    PeriodDelta {
        raw_score: historical,
        percent_change,
        sign_pattern,
    }
}

/// Re-executes return and score computation as of past snapshot dates.
///
/// # Resolution
///
/// `target = latest - days`; the snapshot is the latest date in the whole
/// dataset on or before `target`. No such date, or a gap larger than
/// `max_gap_days`, makes the period unavailable for every symbol.
///
/// Only symbols with an observation exactly on the snapshot date and at
/// least two observations up to it are rescored. Scores always use the
/// best-effort weight table, so current scores must go through
/// [`Self::comparable_score`] before being compared with them.
#[derive(Debug, Clone)]
pub struct HistoricalScoreTracker {
    config: TrackerConfig,
    returns: ReturnEngine,
    scorer: CompositeScorer,
}

impl Default for HistoricalScoreTracker {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}

impl HistoricalScoreTracker {
    /// Uses the given return engine for rescoring.
    pub fn with_return_engine(mut self, returns: ReturnEngine) -> Self {
        self.returns = returns;
        self
    }

    /// Raw score of a return set on the scale of the historical scores.
    pub fn comparable_score(&self, returns: &ReturnSet) -> Option<f64> {
        self.scorer.raw_score(returns)
    }

    /// Snapshot date for a period given the dataset's sorted dates.
    pub fn resolve(
        &self,
        dates: &[NaiveDate],
        latest: NaiveDate,
        period: Horizon,
    ) -> Option<NaiveDate> {
        let target = latest.checked_sub_signed(TimeDelta::days(period.days()))?;
        let idx = dates.partition_point(|d| *d <= target).checked_sub(1)?;
        let resolved = dates[idx];
        ((target - resolved).num_days() <= self.config.max_gap_days).then_some(resolved)
    }

    /// Rescoring pass over every tracked period.
    pub fn historical_scores(
        &self,
        store: &TimeSeriesStore,
        latest: NaiveDate,
    ) -> HistoricalScores {
        let dates = store.all_dates();
        let mut result = HistoricalScores::default();

        for &period in &self.config.periods {
            let resolved = self.resolve(&dates, latest, period);
            result.resolved.insert(period, resolved);

            let Some(resolved) = resolved else {
                warn!(period = %period, "Historical period unavailable, no snapshot date within gap");
                continue;
            };

            let scores: HashMap<String, f64> = store
                .series()
                .par_iter()
                .filter(|s| s.has_date(resolved) && s.count_until(resolved) >= MIN_POINTS)
                .filter_map(|s| {
                    let returns = self.returns.compute(s, Some(resolved));
                    self.scorer
                        .raw_score(&returns)
                        .map(|score| (s.symbol().to_string(), score))
                })
                .collect();

            debug!(
                period = %period,
                resolved = %resolved,
                symbols = scores.len(),
                "Rescored historical snapshot"
            );
            result.scores.insert(period, scores);
        }

        info!(
            periods = self.config.periods.len(),
            available = result.resolved.values().filter(|d| d.is_some()).count(),
            "Historical score tracking complete"
        );
        result
    }
}

impl ConfigurableEngine for HistoricalScoreTracker {
    type Config = TrackerConfig;

    fn with_config(config: Self::Config) -> Self {
        Self {
            config,
            returns: ReturnEngine::default(),
            scorer: CompositeScorer::best_effort(),
        }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
