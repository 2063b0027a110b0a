#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/screener/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod horizon;
pub mod model;
pub mod normalize;
pub mod outlier;
pub mod pipeline;
pub mod returns;
pub mod scoring;
pub mod store;
pub mod tracker;
pub mod traits;
pub mod turnover;

// Re-export core types
pub use error::{Result, ScreenerError};
pub use horizon::Horizon;
pub use model::{
    Identifiers, OutlierFlags, PeriodDelta, PricePoint, ReturnSet, ScoreRecord, Sign, SignPattern,
    Status, SymbolSeries,
};
pub use normalize::{Normalization, normalize_column};
pub use outlier::{OutlierConfig, OutlierDetector, OutlierReport, ReturnSnapshot};
pub use pipeline::{PipelineConfig, ScreenReport, ScreenerPipeline};
pub use returns::{ReturnConfig, ReturnEngine};
pub use scoring::{CompositeScorer, HorizonWeight, ScoringConfig, ScoringMode, WeightRule};
pub use store::{StoreConfig, TimeSeriesStore};
pub use tracker::{HistoricalScoreTracker, TrackerConfig};
pub use traits::{ConfigurableEngine, EngineConfig, EngineInfo, SeriesEngine};
pub use turnover::{TurnoverConfig, TurnoverEngine};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
