//! Domain error types.

/// Top-level error type for barsim.
#[derive(Debug, thiserror::Error)]
pub enum BarsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    InvalidConfig {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data parse error: {reason}")]
    DataParse { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data: have {bars} bars, need {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("transient source failure: {reason}")]
    Transient { reason: String },

    #[error("exchange unavailable after {attempts} attempts: {reason}")]
    ExchangeUnavailable { attempts: u32, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BarsimError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BarsimError::InvalidConfig {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        BarsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether a data source may succeed if the same call is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, BarsimError::Transient { .. })
    }
}

impl From<&BarsimError> for std::process::ExitCode {
    fn from(err: &BarsimError) -> Self {
        let code: u8 = match err {
            BarsimError::Io(_) => 1,
            BarsimError::ConfigParse { .. }
            | BarsimError::ConfigMissing { .. }
            | BarsimError::InvalidConfig { .. } => 2,
            BarsimError::DataParse { .. }
            | BarsimError::NoData { .. }
            | BarsimError::InsufficientData { .. } => 5,
            BarsimError::Transient { .. } | BarsimError::ExchangeUnavailable { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
