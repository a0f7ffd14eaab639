use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Invalid source URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chart rendering failed: {0}")]
    ChartError(#[from] image::ImageError),

    #[error("Upload could not be read: {0}")]
    UploadError(#[from] axum::extract::multipart::MultipartError),

    #[error("Upload is not valid UTF-8: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),

    #[error("questions.txt file is required")]
    MissingUploadError,

    #[error("URL not found in question file")]
    MissingUrlError,

    #[error("{column} column not found")]
    MissingColumnError { column: String },

    #[error("No tables found at {url}")]
    TableNotFoundError { url: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    DataShape,
    Network,
    Processing,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn processing(message: impl Into<String>) -> Self {
        EtlError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::MissingUploadError | EtlError::MissingUrlError => ErrorCategory::Input,
            EtlError::MissingColumnError { .. } => ErrorCategory::DataShape,
            EtlError::ApiError(_) | EtlError::UrlError(_) => ErrorCategory::Network,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) => ErrorCategory::System,
            EtlError::ChartError(_)
            | EtlError::UploadError(_)
            | EtlError::EncodingError(_)
            | EtlError::TableNotFoundError { .. }
            | EtlError::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::DataShape | ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// HTTP status the server answers with when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Input => 400,
            _ => 500,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Input => {
                "Upload a questions.txt file with a line containing the page URL"
            }
            ErrorCategory::DataShape => {
                "Point the URL at a page whose first table has a 'Worldwide gross' or 'Gross' column"
            }
            ErrorCategory::Network => "Check that the URL is correct and the page is reachable",
            ErrorCategory::Processing => "Check that the page contains a well-formed HTML table",
            ErrorCategory::Configuration => "Fix the configuration file or command-line flags",
            ErrorCategory::System => "Check file permissions and available resources",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::ConfigValidationError { field, message } => {
                format!("Invalid configuration for {}: {}", field, message)
            }
            EtlError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid value for {}: {}", field, reason)
            }
            EtlError::ApiError(_) => "Could not fetch the requested page".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
