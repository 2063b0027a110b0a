//! Shared data model.
//!
//! Raw rows ([`PricePoint`]) are normalized into columnar per-symbol series
//! ([`SymbolSeries`]). Everything derived from a series ([`ReturnSet`],
//! [`ScoreRecord`], [`OutlierFlags`]) is recomputed on every run and never
//! mutated after it is produced.

use crate::horizon::Horizon;
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Listing status of a symbol on a given day.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Actively traded
    #[default]
    Active,
    /// Suspended, delisted or otherwise not tradable
    Inactive,
}

impl Status {
    /// Parses a raw status cell. Blank cells count as active.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// External identifiers carried alongside the trading symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    /// Exchange/vendor company code
    pub fincode: Option<String>,
    /// ISIN
    pub isin: Option<String>,
}

/// A single daily observation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading symbol
    pub symbol: String,
    /// Trading date
    pub date: NaiveDate,
    /// Closing price, expected positive
    pub close: f64,
    /// Traded volume, if reported
    pub volume: Option<u64>,
    /// Listing status
    pub status: Status,
    /// Fincode and ISIN
    pub identifiers: Identifiers,
}

impl PricePoint {
    /// Creates an active observation without volume or identifiers.
    pub fn new(symbol: impl Into<String>, date: NaiveDate, close: f64) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            close,
            volume: None,
            status: Status::Active,
            identifiers: Identifiers::default(),
        }
    }

    /// Sets the traded volume.
    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Date-sorted columnar history for one symbol.
///
/// Invariants: `dates` is strictly increasing and the three columns have
/// equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSeries {
    symbol: String,
    identifiers: Identifiers,
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
    volumes: Vec<Option<u64>>,
}

impl SymbolSeries {
    /// Builds a series from unordered rows.
    ///
    /// Rows are sorted by date; when a date repeats, the row that came last
    /// in the input wins.
    pub fn from_rows(
        symbol: impl Into<String>,
        identifiers: Identifiers,
        rows: impl IntoIterator<Item = (NaiveDate, f64, Option<u64>)>,
    ) -> Self {
        let mut rows: Vec<_> = rows.into_iter().collect();
        // Stable sort keeps input order among equal dates.
        rows.sort_by_key(|(date, _, _)| *date);

        let mut dates: Vec<NaiveDate> = Vec::with_capacity(rows.len());
        let mut closes = Vec::with_capacity(rows.len());
        let mut volumes = Vec::with_capacity(rows.len());
        for (date, close, volume) in rows {
            if dates.last() == Some(&date) {
                let last = dates.len() - 1;
                closes[last] = close;
                volumes[last] = volume;
            } else {
                dates.push(date);
                closes.push(close);
                volumes.push(volume);
            }
        }

        Self {
            symbol: symbol.into(),
            identifiers,
            dates,
            closes,
            volumes,
        }
    }

    /// Trading symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Identifiers taken from the latest input row.
    pub const fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    /// Observation dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Closing prices aligned with [`Self::dates`].
    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    /// Volumes aligned with [`Self::dates`].
    pub fn volumes(&self) -> &[Option<u64>] {
        &self.volumes
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Most recent observation date.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Number of observations dated on or before `as_of`.
    pub fn count_until(&self, as_of: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d <= as_of)
    }

    /// Whether an observation exists exactly on `date`.
    pub fn has_date(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// Index of the anchor observation: the latest one on or before
    /// `reference`, or the last one when no reference is given.
    pub fn anchor(&self, reference: Option<NaiveDate>) -> Option<usize> {
        let end = reference.map_or(self.len(), |r| self.count_until(r));
        end.checked_sub(1)
    }

    /// Index of the latest observation on or before `target`, looking only at
    /// the first `end` observations.
    pub fn nearest_past(&self, target: NaiveDate, end: usize) -> Option<usize> {
        let end = end.min(self.dates.len());
        match self.dates[..end].partition_point(|d| *d <= target) {
            0 => None,
            idx => Some(idx - 1),
        }
    }
}

/// Percentage returns keyed by horizon. `None` marks an undefined return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSet {
    values: BTreeMap<Horizon, Option<f64>>,
}

impl ReturnSet {
    /// A set with every listed horizon undefined.
    pub fn undefined(horizons: &[Horizon]) -> Self {
        Self {
            values: horizons.iter().map(|h| (*h, None)).collect(),
        }
    }

    /// Records the return for a horizon.
    pub fn insert(&mut self, horizon: Horizon, value: Option<f64>) {
        self.values.insert(horizon, value);
    }

    /// Return for a horizon, `None` when undefined or not computed.
    pub fn get(&self, horizon: Horizon) -> Option<f64> {
        self.values.get(&horizon).copied().flatten()
    }

    /// Iterates horizons in ascending length.
    pub fn iter(&self) -> impl Iterator<Item = (Horizon, Option<f64>)> + '_ {
        self.values.iter().map(|(h, v)| (*h, *v))
    }

    /// Number of horizons with a defined return.
    pub fn defined_count(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }
}

/// Sign of a score.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// Zero or above
    #[display("+")]
    Positive,
    /// Below zero
    #[display("-")]
    Negative,
}

impl Sign {
    /// Zero counts as positive.
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            Self::Positive
        } else {
            Self::Negative
        }
    }
}

/// Pairing of the current score sign with a historical score sign,
/// rendered as `"+, -"`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("{current}, {historical}")]
pub struct SignPattern {
    /// Sign of the current raw score
    pub current: Sign,
    /// Sign of the historical raw score
    pub historical: Sign,
}

/// Comparison of the current raw score against one tracked period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodDelta {
    /// Raw score recomputed as of the period's resolved date
    pub raw_score: Option<f64>,
    /// `(current - historical) / |historical| * 100`
    pub percent_change: Option<f64>,
    /// Sign transition tag
    pub sign_pattern: Option<SignPattern>,
}

/// One output row of a screening run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    /// Trading symbol
    pub symbol: String,
    /// Fincode and ISIN
    pub identifiers: Identifiers,
    /// Anchor date of the row
    pub latest_date: Option<NaiveDate>,
    /// Close on the anchor date
    pub latest_close: Option<f64>,
    /// Volume on the anchor date
    pub latest_volume: Option<u64>,
    /// Trailing-average close times anchor volume
    pub turnover: Option<f64>,
    /// Horizon returns in percent
    pub returns: ReturnSet,
    /// Weighted score before normalization
    pub raw_score: Option<f64>,
    /// Cross-sectionally normalized score in `[0, 100]`
    pub normalized_score: Option<f64>,
    /// Historical comparison per tracked period
    pub history: BTreeMap<Horizon, PeriodDelta>,
}

/// Anomaly flags for a single log-return observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlierFlags {
    /// Whole-history robust |z| above the global threshold
    pub global_outlier: bool,
    /// Rolling robust |z| above the mild threshold
    pub mild_anomaly: bool,
    /// Rolling robust |z| above the major threshold
    pub major_anomaly: bool,
    /// Per-entity robust |z| above the outlier threshold
    pub robust_outlier: bool,
    /// Per-entity robust |z| above the extreme threshold
    pub very_extreme: bool,
    /// Window readiness keyed by window size
    pub window_ready: BTreeMap<usize, bool>,
}

impl OutlierFlags {
    /// Whether any anomaly flag is raised. Readiness is not an anomaly.
    pub const fn any(&self) -> bool {
        self.global_outlier
            || self.mild_anomaly
            || self.major_anomaly
            || self.robust_outlier
            || self.very_extreme
    }
}
