use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Screen inspection failed: {0}")]
    InspectionFailure(String),

    #[error("Decision oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Decision oracle busy: a request is already in flight")]
    OracleBusy,

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Sequence violation: {0}")]
    SequenceViolation(String),

    #[error("Automation already running")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Task cancelled")]
    Cancelled,
}

impl ClawError {
    /// Errors that end an automation run instead of being fed back to the oracle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClawError::OracleUnavailable(_)
                | ClawError::OracleBusy
                | ClawError::Executor(_)
                | ClawError::Cancelled
        )
    }
}

impl serde::Serialize for ClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ClawResult<T> = Result<T, ClawError>;
