//! Trailing-average-price turnover.
//!
//! Turnover approximates traded value: the mean close over the rows before
//! the anchor date multiplied by the volume on the anchor date. The window is
//! either the last `min_rows` rows or, with `lookback_days` set, every row in
//! that many calendar days.

use crate::{
    Result, ScreenerError,
    model::SymbolSeries,
    traits::{ConfigurableEngine, SeriesEngine},
};
use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Configuration for the turnover engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnoverConfig {
    /// Calendar days before the anchor that feed the average. `None` averages
    /// the last `min_rows` rows however far back they reach (default: none)
    pub lookback_days: Option<i64>,
    /// Minimum number of trailing rows in the window (default: 180)
    pub min_rows: usize,
}

impl Default for TurnoverConfig {
    fn default() -> Self {
        Self {
            lookback_days: None,
            min_rows: 180,
        }
    }
}

impl TurnoverConfig {
    /// Rejects non-positive windows.
    pub fn validate(&self) -> Result<()> {
        if self.lookback_days.is_some_and(|d| d <= 0) {
            return Err(ScreenerError::InvalidConfig(
                "turnover lookback_days must be positive".into(),
            ));
        }
        if self.min_rows == 0 {
            return Err(ScreenerError::InvalidConfig(
                "turnover min_rows must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Liquidity proxy: trailing mean close times anchor volume.
///
/// # Computation
///
/// The trailing rows are dated strictly before the anchor. Without
/// `lookback_days` they are the last `min_rows` of them; with it, every row no
/// more than `lookback_days` calendar days before the anchor. With fewer than
/// `min_rows` trailing rows, or no volume on the anchor date, turnover is
/// undefined.
///
/// # Required Columns
///
/// - `symbol`: Trading symbol
/// - `date`: Trading date
/// - `close`: Closing price
/// - `volume`: Traded volume
#[derive(Debug, Clone, Default)]
pub struct TurnoverEngine {
    config: TurnoverConfig,
}

impl SeriesEngine for TurnoverEngine {
    type Output = Option<f64>;

    fn name(&self) -> &str {
        "turnover"
    }

    fn description(&self) -> &str {
        "Trailing average close times current volume"
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "close", "volume"]
    }

    fn lookback_days(&self) -> i64 {
        // Weekday rows span about 7/5 as many calendar days.
        self.config
            .lookback_days
            .unwrap_or_else(|| (self.config.min_rows * 7).div_ceil(5) as i64)
    }

    fn compute(&self, series: &SymbolSeries, reference: Option<NaiveDate>) -> Option<f64> {
        let anchor = series.anchor(reference)?;
        if anchor == 0 {
            return None;
        }
        let volume = series.volumes()[anchor]?;

        let first = match self.config.lookback_days {
            Some(days) => {
                let start = series.dates()[anchor].checked_sub_signed(TimeDelta::days(days))?;
                series.dates()[..anchor].partition_point(|d| *d < start)
            }
            None => anchor.saturating_sub(self.config.min_rows),
        };
        let window = &series.closes()[first..anchor];

        if window.len() < self.config.min_rows {
            return None;
        }
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        let turnover = avg * volume as f64;
        turnover.is_finite().then_some(turnover)
    }
}

impl ConfigurableEngine for TurnoverEngine {
    type Config = TurnoverConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Identifiers;
    use approx::assert_relative_eq;
    use chrono::{Datelike, Weekday};
    use rstest::rstest;

    fn daily_series(days: i64, step: i64, anchor_volume: Option<u64>) -> SymbolSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let rows: Vec<_> = (0..days)
            .map(|i| {
                let volume = if i == days - 1 { anchor_volume } else { Some(1) };
                (start + TimeDelta::days(i * step), 10.0 + i as f64, volume)
            })
            .collect();
        SymbolSeries::from_rows("TEST", Identifiers::default(), rows)
    }

    /// Mon-Fri rows only, closes counting up from 10.
    fn weekday_series(rows: usize, anchor_volume: u64) -> SymbolSeries {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let dates: Vec<_> = start
            .iter_days()
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .take(rows)
            .collect();
        let points = dates.iter().enumerate().map(|(i, d)| {
            let volume = if i == rows - 1 { anchor_volume } else { 1 };
            (*d, 10.0 + i as f64, Some(volume))
        });
        SymbolSeries::from_rows("TEST", Identifiers::default(), points)
    }

    #[test]
    fn test_turnover_last_rows() {
        // 200 rows: the 180 rows before the anchor have closes 10+19 ..= 10+198.
        let series = daily_series(200, 1, Some(1_000));
        let turnover = TurnoverEngine::default().compute(&series, None).unwrap();

        let expected_avg = (29.0 + 208.0) / 2.0;
        assert_relative_eq!(turnover, expected_avg * 1_000.0);
    }

    #[test]
    fn test_turnover_on_weekday_calendar() {
        // Two years of trading days, no weekend rows.
        let series = weekday_series(522, 50);
        let turnover = TurnoverEngine::default().compute(&series, None).unwrap();

        // Trailing closes are 10+341 ..= 10+520.
        let expected_avg = (351.0 + 530.0) / 2.0;
        assert_relative_eq!(turnover, expected_avg * 50.0);

        // A 180 calendar-day window holds about 128 weekday rows.
        let calendar = |min_rows| {
            TurnoverEngine::with_config(TurnoverConfig {
                lookback_days: Some(180),
                min_rows,
            })
        };
        assert!(calendar(100).compute(&series, None).is_some());
        assert_eq!(calendar(180).compute(&series, None), None);
    }

    #[test]
    fn test_turnover_calendar_window() {
        let series = daily_series(200, 1, Some(1_000));
        let engine = TurnoverEngine::with_config(TurnoverConfig {
            lookback_days: Some(180),
            min_rows: 100,
        });
        // Rows dated within 180 days before the anchor: closes 10+19 ..= 10+198.
        let expected_avg = (29.0 + 208.0) / 2.0;
        assert_relative_eq!(engine.compute(&series, None).unwrap(), expected_avg * 1_000.0);
    }

    #[rstest]
    #[case(360, 180, true)]
    #[case(360, 181, false)]
    #[case(200, 100, true)]
    #[case(198, 100, false)]
    fn test_calendar_min_rows_threshold(
        #[case] lookback_days: i64,
        #[case] min_rows: usize,
        #[case] defined: bool,
    ) {
        // One row every two days: a window of L days holds L / 2 rows.
        let series = daily_series(400, 2, Some(10));
        let engine = TurnoverEngine::with_config(TurnoverConfig {
            lookback_days: Some(lookback_days),
            min_rows,
        });
        assert_eq!(engine.compute(&series, None).is_some(), defined);
    }

    #[test]
    fn test_too_few_rows_is_undefined_regardless_of_span() {
        // 39 trailing rows spread over more than three years.
        let series = daily_series(40, 30, Some(10));
        assert_eq!(TurnoverEngine::default().compute(&series, None), None);
        let series = daily_series(180, 1, Some(10));
        assert_eq!(TurnoverEngine::default().compute(&series, None), None);
    }

    #[test]
    fn test_missing_anchor_volume_is_undefined() {
        let series = daily_series(200, 1, None);
        assert_eq!(TurnoverEngine::default().compute(&series, None), None);
    }

    #[test]
    fn test_fewer_than_two_points_is_undefined() {
        let series = daily_series(1, 1, Some(10));
        let engine = TurnoverEngine::with_config(TurnoverConfig {
            lookback_days: None,
            min_rows: 1,
        });
        assert_eq!(engine.compute(&series, None), None);
    }

    #[test]
    fn test_lookback_metadata() {
        assert_eq!(TurnoverEngine::default().lookback_days(), 252);
        let engine = TurnoverEngine::with_config(TurnoverConfig {
            lookback_days: Some(180),
            min_rows: 100,
        });
        assert_eq!(engine.lookback_days(), 180);
    }

    #[test]
    fn test_validate() {
        assert!(TurnoverConfig::default().validate().is_ok());
        let bad = TurnoverConfig {
            lookback_days: Some(0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
