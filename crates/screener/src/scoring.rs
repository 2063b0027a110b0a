//! Composite momentum score.
//!
//! The raw score is a weighted sum of horizon returns. Two modes exist:
//! strict scoring needs every weighted horizon and scales by 100, while
//! best-effort scoring uses whatever horizons are defined and flips the
//! 1-month weight depending on the sign of the 1-month return.

use crate::{
    Result, ScreenerError,
    horizon::Horizon,
    model::ReturnSet,
    normalize::{Normalization, normalize_column},
    traits::ConfigurableEngine,
};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// How missing horizons are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Every weighted horizon must be defined
    Strict,
    /// Any non-empty subset of the weighted horizons is scored
    #[default]
    BestEffort,
}

/// Weight applied to one horizon's return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightRule {
    /// Constant weight
    Fixed(f64),
    /// Weight chosen by the sign of the return itself
    SignDependent {
        /// Weight when the return is below zero
        negative: f64,
        /// Weight when the return is zero or above
        non_negative: f64,
    },
}

impl WeightRule {
    /// Effective weight for a return value.
    pub fn weight(&self, value: f64) -> f64 {
        match *self {
            Self::Fixed(w) => w,
            Self::SignDependent {
                negative,
                non_negative,
            } => {
                if value < 0.0 {
                    negative
                } else {
                    non_negative
                }
            }
        }
    }
}

/// A horizon paired with its weight rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonWeight {
    /// Horizon whose return is weighted
    pub horizon: Horizon,
    /// Weight rule
    pub rule: WeightRule,
}

impl HorizonWeight {
    const fn fixed(horizon: Horizon, weight: f64) -> Self {
        Self {
            horizon,
            rule: WeightRule::Fixed(weight),
        }
    }
}

/// Fixed weights: 1M -0.10, 3M +0.25, 6M +0.25, 9M +0.40, 1Y +0.20.
pub const STRICT_WEIGHTS: [HorizonWeight; 5] = [
    HorizonWeight::fixed(Horizon::OneMonth, -0.10),
    HorizonWeight::fixed(Horizon::ThreeMonths, 0.25),
    HorizonWeight::fixed(Horizon::SixMonths, 0.25),
    HorizonWeight::fixed(Horizon::NineMonths, 0.40),
    HorizonWeight::fixed(Horizon::OneYear, 0.20),
];

/// Strict weights with the 1-month short-term reversal flip.
pub const BEST_EFFORT_WEIGHTS: [HorizonWeight; 5] = [
    HorizonWeight {
        horizon: Horizon::OneMonth,
        rule: WeightRule::SignDependent {
            negative: 0.10,
            non_negative: -0.10,
        },
    },
    HorizonWeight::fixed(Horizon::ThreeMonths, 0.25),
    HorizonWeight::fixed(Horizon::SixMonths, 0.25),
    HorizonWeight::fixed(Horizon::NineMonths, 0.40),
    HorizonWeight::fixed(Horizon::OneYear, 0.20),
];

/// Configuration for the composite scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Missing-horizon policy (default: best effort)
    pub mode: ScoringMode,
    /// Weight table. `None` uses the table of the selected mode
    pub weights: Option<Vec<HorizonWeight>>,
    /// Multiplier for strict raw scores (default: 100)
    pub strict_scale: f64,
    /// Cross-sectional normalization (default: percentile)
    pub normalization: Normalization,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::BestEffort,
            weights: None,
            strict_scale: 100.0,
            normalization: Normalization::Percentile,
        }
    }
}

impl ScoringConfig {
    /// Rejects an empty or non-finite weight table.
    pub fn validate(&self) -> Result<()> {
        if let Some(weights) = &self.weights {
            if weights.is_empty() {
                return Err(ScreenerError::InvalidConfig(
                    "scoring weights must not be empty".into(),
                ));
            }
            let finite = weights.iter().all(|w| match w.rule {
                WeightRule::Fixed(v) => v.is_finite(),
                WeightRule::SignDependent {
                    negative,
                    non_negative,
                } => negative.is_finite() && non_negative.is_finite(),
            });
            if !finite {
                return Err(ScreenerError::InvalidConfig(
                    "scoring weights must be finite".into(),
                ));
            }
        }
        if !self.strict_scale.is_finite() {
            return Err(ScreenerError::InvalidConfig(
                "strict_scale must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Weighted combination of horizon returns plus cross-sectional
/// normalization.
///
/// # Example
///
/// Strict mode with returns 1M -5, 3M 10, 6M 8, 9M 12, 1Y 6:
/// `100 * (0.5 + 2.5 + 2.0 + 4.8 + 1.2) = 1100`.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    /// Best-effort scorer with the default weight table.
    pub fn best_effort() -> Self {
        Self::default()
    }

    /// Strict scorer with the default weight table and scale.
    pub fn strict() -> Self {
        Self::with_config(ScoringConfig {
            mode: ScoringMode::Strict,
            ..Default::default()
        })
    }

    /// The weight table in effect.
    pub fn weights(&self) -> &[HorizonWeight] {
        match (&self.config.weights, self.config.mode) {
            (Some(weights), _) => weights,
            (None, ScoringMode::Strict) => &STRICT_WEIGHTS,
            (None, ScoringMode::BestEffort) => &BEST_EFFORT_WEIGHTS,
        }
    }

    /// Raw score for one symbol, `None` when undefined.
    pub fn raw_score(&self, returns: &ReturnSet) -> Option<f64> {
        let mut total = 0.0;
        let mut used = 0usize;
        for weight in self.weights() {
            match returns.get(weight.horizon) {
                Some(value) => {
                    total += weight.rule.weight(value) * value;
                    used += 1;
                }
                None if self.config.mode == ScoringMode::Strict => return None,
                None => {}
            }
        }
        if used == 0 {
            return None;
        }
        let score = match self.config.mode {
            ScoringMode::Strict => total * self.config.strict_scale,
            ScoringMode::BestEffort => total,
        };
        score.is_finite().then_some(score)
    }

    /// Adds a normalized `target` column computed from `source`.
    pub fn normalize(&self, df: &DataFrame, source: &str, target: &str) -> Result<DataFrame> {
        normalize_column(df, source, target, self.config.normalization)
    }
}

impl ConfigurableEngine for CompositeScorer {
    type Config = ScoringConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
