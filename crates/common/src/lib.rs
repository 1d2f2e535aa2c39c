pub mod config;
pub mod decision;
pub mod error;
pub mod types;

pub use config::Config;
pub use decision::{Decision, DecisionEngine};
pub use error::{Error, Result};
pub use types::*;
