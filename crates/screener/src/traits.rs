//! Core trait definitions for per-symbol engines.
//!
//! Every engine reads one [`SymbolSeries`] and writes only its own result, so
//! callers can fan engines out over symbols without shared state.

use crate::model::SymbolSeries;
use chrono::NaiveDate;

/// A computation over a single symbol's history.
pub trait SeriesEngine: Send + Sync + std::fmt::Debug {
    /// What the engine produces for one symbol.
    type Output: Send;

    /// Unique identifier for this engine.
    ///
    /// Should be snake_case and stable across versions.
    fn name(&self) -> &str;

    /// Human-readable description of what this engine measures.
    fn description(&self) -> &str;

    /// Input columns the engine reads.
    fn required_columns(&self) -> &[&str];

    /// Calendar days of history read behind the anchor date.
    fn lookback_days(&self) -> i64;

    /// Computes the engine output for one symbol.
    ///
    /// `reference` bounds the history: observations after it are ignored.
    /// `None` uses the whole series.
    fn compute(&self, series: &SymbolSeries, reference: Option<NaiveDate>) -> Self::Output;
}

/// Marker trait for engine configuration types.
///
/// All config types should implement Default, Clone, Send, Sync, and Debug.
pub trait EngineConfig: Default + Clone + Send + Sync + std::fmt::Debug {}

/// Blanket implementation for any type that satisfies the trait bounds.
impl<T: Default + Clone + Send + Sync + std::fmt::Debug> EngineConfig for T {}

/// A component built from an immutable configuration value.
pub trait ConfigurableEngine {
    /// Configuration type for this component.
    type Config: EngineConfig;

    /// Create a new component with the given configuration.
    fn with_config(config: Self::Config) -> Self;

    /// Returns the current configuration.
    fn config(&self) -> &Self::Config;
}

/// Metadata for engine introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// Engine name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Required input columns
    pub required_columns: Vec<String>,
    /// Lookback in calendar days
    pub lookback_days: i64,
}

impl EngineInfo {
    /// Collects metadata from an engine.
    pub fn of<E: SeriesEngine>(engine: &E) -> Self {
        Self {
            name: engine.name().to_string(),
            description: engine.description().to_string(),
            required_columns: engine
                .required_columns()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookback_days: engine.lookback_days(),
        }
    }
}
