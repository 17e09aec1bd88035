use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::postprocess::PostprocessOptions;
use crate::rounding::RoundingBand;
use crate::symbols::DEFAULT_MAX_SYMBOL_LEN;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    pub max_len: usize,
    pub securities_only: bool,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_SYMBOL_LEN,
            securities_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundingConfig {
    pub lower: Decimal,
    pub upper: Decimal,
    pub include_trades: bool,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        let band = RoundingBand::default();
        Self {
            lower: band.lower,
            upper: band.upper,
            include_trades: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub enabled: bool,
    pub keep_unmatched: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keep_unmatched: false,
        }
    }
}

/// Tool defaults, optionally read from a `sieve.toml`. Every field can be
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub symbols: SymbolConfig,
    pub rounding: RoundingConfig,
    pub transfers: TransferConfig,
}

impl Config {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.max_len == 0 {
            return Err(ConfigError::Invalid("symbols.max_len must be at least 1".into()));
        }
        let RoundingConfig { lower, upper, .. } = self.rounding;
        if lower.is_sign_negative() || lower >= upper {
            return Err(ConfigError::Invalid(format!(
                "rounding band must satisfy 0 <= lower < upper (got {lower}..{upper})"
            )));
        }
        Ok(())
    }

    pub fn rounding_band(&self) -> RoundingBand {
        RoundingBand::new(self.rounding.lower, self.rounding.upper)
    }

    /// Postprocess defaults; fix flags and cut-off come from the caller.
    pub fn postprocess_options(&self) -> PostprocessOptions {
        PostprocessOptions {
            securities_only: self.symbols.securities_only,
            max_symbol_len: self.symbols.max_len,
            rounding_band: self.rounding_band(),
            include_trades: self.rounding.include_trades,
            ..PostprocessOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.symbols.max_len, 8);
        assert!(config.transfers.enabled);
        assert_eq!(config.rounding_band(), RoundingBand::default());
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
            [symbols]
            max_len = 6
            securities_only = true

            [rounding]
            lower = "0.02"
            upper = "0.50"
            include_trades = true

            [transfers]
            enabled = false
            keep_unmatched = true
        "#;
        let config = Config::from_toml(toml).unwrap();
        let opts = config.postprocess_options();
        assert_eq!(opts.max_symbol_len, 6);
        assert!(opts.securities_only);
        assert!(opts.include_trades);
        assert!(opts.fix_symbols);
        assert!(!opts.fix_rounding);
        assert_eq!(opts.rounding_band.upper, Decimal::from_str("0.50").unwrap());
        assert!(!config.transfers.enabled);
        assert!(config.transfers.keep_unmatched);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml("[rounding]\ninclude_trades = true\n").unwrap();
        assert!(config.rounding.include_trades);
        assert_eq!(config.rounding.lower, Decimal::new(1, 2));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml("[symbols]\nmax_len = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[rounding]\nlower = \"1.00\"\nupper = \"0.50\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(Config::from_toml("[symbols\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sieve.toml");
        std::fs::write(&path, "[transfers]\nkeep_unmatched = true\n").unwrap();
        assert!(Config::load(&path).unwrap().transfers.keep_unmatched);
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
