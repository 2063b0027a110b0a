//! Multi-horizon percentage returns.
//!
//! For a horizon of `d` calendar days the engine looks up the latest
//! observation on or before `anchor_date - d` and reports
//! `(anchor_close - hist_close) / hist_close * 100`.

use crate::{
    Result, ScreenerError,
    horizon::Horizon,
    model::{ReturnSet, SymbolSeries},
    traits::{ConfigurableEngine, SeriesEngine},
};
use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Minimum number of observations up to the reference date.
pub const MIN_POINTS: usize = 2;

/// Configuration for the return engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnConfig {
    /// Horizons to compute (default: all eight)
    pub horizons: Vec<Horizon>,
    /// Maximum calendar days between a target date and its matched
    /// observation. `None` accepts any past match (default: `None`)
    pub staleness_tolerance_days: Option<i64>,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            horizons: Horizon::ALL.to_vec(),
            staleness_tolerance_days: None,
        }
    }
}

impl ReturnConfig {
    /// Rejects an empty horizon set or a negative tolerance.
    pub fn validate(&self) -> Result<()> {
        if self.horizons.is_empty() {
            return Err(ScreenerError::InvalidConfig(
                "return horizons must not be empty".into(),
            ));
        }
        if self.staleness_tolerance_days.is_some_and(|d| d < 0) {
            return Err(ScreenerError::InvalidConfig(
                "staleness tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Percentage returns over named horizons using nearest-past date matching.
///
/// # Computation
///
/// 1. Truncate the series to the reference date; fewer than two points leave
///    every horizon undefined.
/// 2. The anchor is the last remaining observation.
/// 3. For each horizon, `target = anchor_date - days`; the matched
///    observation is the latest one dated on or before `target`.
/// 4. No match, a non-positive matched close, or (when a tolerance is set)
///    a match older than `target - tolerance` leaves the horizon undefined.
#[derive(Debug, Clone, Default)]
pub struct ReturnEngine {
    config: ReturnConfig,
}

impl ReturnEngine {
    fn horizon_return(
        &self,
        series: &SymbolSeries,
        anchor: usize,
        horizon: Horizon,
    ) -> Option<f64> {
        let anchor_date = series.dates()[anchor];
        let anchor_close = series.closes()[anchor];
        let target = anchor_date.checked_sub_signed(TimeDelta::days(horizon.days()))?;

        let matched = series.nearest_past(target, anchor + 1)?;
        if let Some(tolerance) = self.config.staleness_tolerance_days
            && (target - series.dates()[matched]).num_days() > tolerance
        {
            return None;
        }

        let hist_close = series.closes()[matched];
        if hist_close <= 0.0 {
            return None;
        }
        let value = (anchor_close - hist_close) / hist_close * 100.0;
        value.is_finite().then_some(value)
    }
}

impl SeriesEngine for ReturnEngine {
    type Output = ReturnSet;

    fn name(&self) -> &str {
        "horizon_returns"
    }

    fn description(&self) -> &str {
        "Percentage price change over calendar-day horizons, nearest past date matching"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close"]
    }

    fn lookback_days(&self) -> i64 {
        self.config
            .horizons
            .iter()
            .map(|h| h.days())
            .max()
            .unwrap_or_default()
    }

    fn compute(&self, series: &SymbolSeries, reference: Option<NaiveDate>) -> ReturnSet {
        let mut set = ReturnSet::undefined(&self.config.horizons);
        let Some(anchor) = series.anchor(reference) else {
            return set;
        };
        if anchor + 1 < MIN_POINTS {
            return set;
        }
        for &horizon in &self.config.horizons {
            set.insert(horizon, self.horizon_return(series, anchor, horizon));
        }
        set
    }
}

impl ConfigurableEngine for ReturnEngine {
    type Config = ReturnConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
