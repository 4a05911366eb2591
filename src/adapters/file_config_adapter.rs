//! INI file configuration adapter with environment overrides.
//!
//! Any key can be overridden by an environment variable named
//! `BARSIM_<SECTION>_<KEY>` in upper case, e.g. `BARSIM_RISK_MAX_RISK_PCT`.
//! Overrides take precedence over the file.

use std::collections::HashMap;
use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::BarsimError;
use crate::ports::config_port::ConfigPort;

pub const ENV_PREFIX: &str = "BARSIM_";

pub struct FileConfigAdapter {
    config: Ini,
    overrides: HashMap<String, String>,
}

impl FileConfigAdapter {
    /// Loads `path` and applies overrides from the process environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BarsimError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| BarsimError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        }
        .with_env_overrides(std::env::vars()))
    }

    /// Parses INI text without consulting the environment.
    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self {
            config,
            overrides: HashMap::new(),
        })
    }

    /// Adds every `BARSIM_`-prefixed variable from `vars` as an override.
    pub fn with_env_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(
            vars.into_iter()
                .filter(|(name, _)| name.starts_with(ENV_PREFIX)),
        );
        self
    }

    pub fn env_key(section: &str, key: &str) -> String {
        format!("{ENV_PREFIX}{section}_{key}").to_uppercase()
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.overrides
            .get(&Self::env_key(section, key))
            .cloned()
            .or_else(|| self.config.get(section, key))
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[backtest]
symbol = ETHUSDT
initial_capital = 10000.0

[strategy]
name = Dip Buyer
rules = mean_reversion
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "symbol"),
            Some("ETHUSDT".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("Dip Buyer".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 100\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value() {
        let adapter = FileConfigAdapter::from_string("[risk]\nmax_fills = 3\n").unwrap();
        assert_eq!(adapter.get_int("risk", "max_fills", 0), 3);
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[risk]\nmax_fills = abc\n").unwrap();
        assert_eq!(adapter.get_int("risk", "max_fills", 42), 42);
        assert_eq!(adapter.get_int("risk", "missing", 7), 7);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 100000.5\n").unwrap();
        assert_eq!(
            adapter.get_double("backtest", "initial_capital", 0.0),
            100000.5
        );
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = not_a_number\n").unwrap();
        assert_eq!(
            adapter.get_double("backtest", "initial_capital", 99.9),
            99.9
        );
    }

    #[test]
    fn get_bool_values() {
        let adapter =
            FileConfigAdapter::from_string("[risk]\na = true\nb = yes\nc = 0\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("risk", "a", false));
        assert!(adapter.get_bool("risk", "b", false));
        assert!(!adapter.get_bool("risk", "c", true));
        assert!(adapter.get_bool("risk", "d", true));
        assert!(!adapter.get_bool("risk", "missing", false));
    }

    #[test]
    fn env_override_takes_precedence() {
        let adapter = FileConfigAdapter::from_string("[risk]\nmax_risk_pct = 3.0\n")
            .unwrap()
            .with_env_overrides(env(&[
                ("BARSIM_RISK_MAX_RISK_PCT", "5.5"),
                ("BARSIM_BACKTEST_SYMBOL", "SOLUSDT"),
                ("HOME", "/root"),
            ]));
        assert_eq!(adapter.get_double("risk", "max_risk_pct", 0.0), 5.5);
        assert_eq!(
            adapter.get_string("backtest", "symbol"),
            Some("SOLUSDT".to_string())
        );
    }

    #[test]
    fn unrelated_env_vars_are_ignored() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n")
            .unwrap()
            .with_env_overrides(env(&[("BACKTEST_SYMBOL", "X")]));
        assert_eq!(adapter.get_string("backtest", "symbol"), None);
    }

    #[test]
    fn env_key_format() {
        assert_eq!(
            FileConfigAdapter::env_key("risk", "base_risk_pct"),
            "BARSIM_RISK_BASE_RISK_PCT"
        );
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[indicators]\nrsi_period = 7\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("indicators", "rsi_period", 14), 7);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(BarsimError::ConfigParse { .. })));
    }
}
