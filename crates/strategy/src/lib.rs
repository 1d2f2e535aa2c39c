pub mod config;
pub mod confluence;
pub mod indicators;
pub mod levels;

pub use config::{ConfluenceFileConfig, IndicatorParams, LayerToggles};
pub use confluence::{
    ConfluenceResult, ConfluenceScorer, DerivativesSnapshot, LayerScore,
};
pub use levels::{generate_levels, TradingLevels};
