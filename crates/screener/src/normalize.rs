//! Cross-sectional normalization of raw scores onto `[0, 100]`.
//!
//! Every method runs once over the whole batch: statistics are aggregated
//! over the non-null values of the source column and broadcast back. Null
//! inputs stay null, and degenerate distributions map to 50.

use crate::{Result, ScreenerError};
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Score assigned when the distribution has no spread.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Standard deviations at or below this count as zero.
const STD_EPSILON: f64 = 1e-12;

/// Normalization method, selected by name.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Clip to the 1st/99th percentiles and map linearly
    #[default]
    #[display("percentile")]
    Percentile,
    /// `50 + 15 * z`, clipped
    #[display("zscore")]
    ZScore,
    /// Map `[min, max]` linearly
    #[display("minmax")]
    MinMax,
}

impl Normalization {
    /// All methods, in display order.
    pub const ALL: [Self; 3] = [Self::Percentile, Self::ZScore, Self::MinMax];
}

impl FromStr for Normalization {
    type Err = ScreenerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentile" => Ok(Self::Percentile),
            "zscore" | "z-score" => Ok(Self::ZScore),
            "minmax" | "min-max" => Ok(Self::MinMax),
            other => Err(ScreenerError::UnknownNormalization(other.to_string())),
        }
    }
}

/// Normalizes `source` into a new `target` column.
///
/// # Methods
///
/// - `percentile`: p1/p99 by linear interpolation; values are clipped to
///   `[p1, p99]` and mapped to `[0, 100]`. `p1 == p99` gives 50.
/// - `zscore`: `50 + 15 * (x - mean) / std` with sample std, clipped to
///   `[0, 100]`. Zero or undefined std gives 50.
/// - `minmax`: `[min, max]` mapped to `[0, 100]`. `min == max` gives 50.
pub fn normalize_column(
    df: &DataFrame,
    source: &str,
    target: &str,
    method: Normalization,
) -> Result<DataFrame> {
    let x = || col(source).cast(DataType::Float64);
    let null = || lit(NULL).cast(DataType::Float64);

    let result = match method {
        Normalization::Percentile => df
            .clone()
            .lazy()
            .with_columns([
                x().quantile(lit(0.01), QuantileMethod::Linear)
                    .alias("__lower"),
                x().quantile(lit(0.99), QuantileMethod::Linear)
                    .alias("__upper"),
            ])
            .with_column(
                when(x().lt(col("__lower")))
                    .then(col("__lower"))
                    .when(x().gt(col("__upper")))
                    .then(col("__upper"))
                    .otherwise(x())
                    .alias("__clipped"),
            )
            .with_column(
                when(x().is_null())
                    .then(null())
                    .when(col("__upper").eq(col("__lower")))
                    .then(lit(NEUTRAL_SCORE))
                    .otherwise(
                        (col("__clipped") - col("__lower")) / (col("__upper") - col("__lower"))
                            * lit(100.0),
                    )
                    .alias(target),
            )
            .drop(["__lower", "__upper", "__clipped"]),
        Normalization::ZScore => df
            .clone()
            .lazy()
            .with_columns([x().mean().alias("__mean"), x().std(1).alias("__std")])
            .with_column(
                when(x().is_null())
                    .then(null())
                    .when(
                        col("__std")
                            .is_null()
                            .or(col("__std").is_nan())
                            .or(col("__std").lt_eq(lit(STD_EPSILON))),
                    )
                    .then(lit(NEUTRAL_SCORE))
                    .otherwise(
                        lit(NEUTRAL_SCORE) + lit(15.0) * (x() - col("__mean")) / col("__std"),
                    )
                    .alias("__scaled"),
            )
            .with_column(clip_to_scale(col("__scaled")).alias(target))
            .drop(["__mean", "__std", "__scaled"]),
        Normalization::MinMax => df
            .clone()
            .lazy()
            .with_columns([x().min().alias("__min"), x().max().alias("__max")])
            .with_column(
                when(x().is_null())
                    .then(null())
                    .when(col("__max").eq(col("__min")))
                    .then(lit(NEUTRAL_SCORE))
                    .otherwise((x() - col("__min")) / (col("__max") - col("__min")) * lit(100.0))
                    .alias(target),
            )
            .drop(["__min", "__max"]),
    };

    Ok(result.collect()?)
}

fn clip_to_scale(e: Expr) -> Expr {
    when(e.clone().lt(lit(0.0)))
        .then(lit(0.0))
        .when(e.clone().gt(lit(100.0)))
        .then(lit(100.0))
        .otherwise(e)
}
