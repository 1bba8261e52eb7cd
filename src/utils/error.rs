use std::time::Duration;
use thiserror::Error;

/// Startup authentication/navigation failure. Always fatal.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Portal request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Login rejected: {message}")]
    Rejected { message: String },

    #[error("Search page not reached: {message}")]
    NotReady { message: String },

    #[error("Authentication timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Portal request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search for {address} was refused: {message}")]
    Refused { address: String, message: String },

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("No search results are loaded")]
    NoResults,

    #[error("Results view is malformed at row {index}: {message}")]
    Malformed { index: usize, message: String },

    #[error("Row inspection timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure while searching or scanning one query.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to search query: {0}")]
    Search(#[from] SearchError),

    #[error("Failed to check center {index} availability: {source}")]
    Inspect {
        index: usize,
        #[source]
        source: InspectError,
    },
}

/// Text or call delivery failure. Logged, never escalated.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Notifier response missing sid")]
    MissingSid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    High,
    Critical,
}

/// Terminal outcome of the polling loop.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Query '{label}' failed: {source}")]
    Query {
        label: String,
        #[source]
        source: ScanError,
    },
}

impl FatalError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FatalError::Auth(_) => ErrorSeverity::Critical,
            FatalError::Query { .. } => ErrorSeverity::High,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    /// Short summary sent to contacts by text.
    pub fn user_friendly_message(&self) -> String {
        match self {
            FatalError::Auth(e) => format!("Error: {}", e),
            FatalError::Query { label, source } => {
                format!("Stopped while searching {}: {}", label, source)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration field '{field}' is missing")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

impl WatchError {
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            WatchError::IoError(_) => "Check that the config file exists and is readable",
            WatchError::HttpError(_) => "Check network access and TLS setup",
            WatchError::ConfigError { .. } => "Check the TOML syntax of the config file",
            WatchError::MissingConfigError { .. }
            | WatchError::InvalidConfigValueError { .. } => {
                "Fix the named field; ${VAR} placeholders must be set in the environment"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
