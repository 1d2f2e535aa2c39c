use serde::{Deserialize, Serialize};

/// Confluence configuration file (TOML).
///
/// Example `config/layers.toml`:
/// ```toml
/// [layers]
/// structure = true
/// funding = false
///
/// [indicators]
/// rsi_period = 14
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfluenceFileConfig {
    #[serde(default)]
    pub layers: LayerToggles,
    #[serde(default)]
    pub indicators: IndicatorParams,
}

/// Which analysis layers participate in the score. Disabling a layer omits
/// it from the sum without rescaling the normalization envelope, so sparse
/// configurations drift toward HOLD.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerToggles {
    pub structure: bool,
    pub price_action: bool,
    pub ema: bool,
    pub momentum: bool,
    pub funding: bool,
    pub open_interest: bool,
    pub cvd: bool,
    pub fibonacci: bool,
}

impl Default for LayerToggles {
    fn default() -> Self {
        Self {
            structure: true,
            price_action: true,
            ema: true,
            momentum: true,
            funding: true,
            open_interest: true,
            cvd: true,
            fibonacci: true,
        }
    }
}

/// Indicator periods used by the scoring layers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub divergence_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            divergence_lookback: 14,
        }
    }
}

impl ConfluenceFileConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path).unwrap_or_else(|e| {
            panic!("Failed to read layers config at '{path}': {e}")
        });
        toml::from_str(&content).unwrap_or_else(|e| {
            panic!("Failed to parse layers config at '{path}': {e}")
        })
    }

    /// Load from a TOML file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            Self::default()
        }
    }
}
