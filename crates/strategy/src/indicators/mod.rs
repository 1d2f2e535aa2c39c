//! Technical indicator library.
//!
//! Pure, stateless transforms over a price series or candle sequence. Every
//! function takes the full series and returns a same-length series so callers
//! can inspect history (divergence detection needs it). Warm-up positions
//! hold the documented neutral or fallback value instead of being dropped.

pub mod atr;
pub mod bollinger;
pub mod divergence;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod vwap;

pub use atr::atr;
pub use bollinger::{bollinger, BollingerBands};
pub use divergence::{detect_divergence, Divergence, DivergenceKind};
pub use ema::ema;
pub use macd::{macd, Macd};
pub use rsi::rsi;
pub use sma::sma;
pub use stochastic::{stochastic, Stochastic};
pub use vwap::vwap;
