use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Directions provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    #[error("Directions provider returned status {status}")]
    ProviderStatus { status: String },

    #[error("Malformed polyline encoding at byte {position}: {reason}")]
    MalformedEncoding { position: usize, reason: String },

    #[error("Invalid coordinate ({latitude}, {longitude}): {reason}")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
        reason: String,
    },

    #[error("Tracking session {session} is closed")]
    SessionClosed { session: u64 },

    #[error("Tracking session {session} failed: {reason}")]
    SessionFailed { session: u64, reason: String },

    #[error("No geometry source produced a path for route {route_id}")]
    GeometryExhausted {
        route_id: String,
        attempts: Vec<String>,
    },

    #[error("Store request for '{collection}' failed: {message}")]
    StoreError { collection: String, message: String },

    #[error("Store unavailable: {}", failures.join("; "))]
    StoreUnavailable { failures: Vec<String> },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lookup,
    Provider,
    Geometry,
    Session,
    Store,
    Configuration,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TrackerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn store(collection: impl Into<String>, message: impl ToString) -> Self {
        Self::StoreError {
            collection: collection.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Lookup,
            Self::ProviderUnavailable { .. } | Self::ProviderStatus { .. } => {
                ErrorCategory::Provider
            }
            Self::MalformedEncoding { .. }
            | Self::InvalidCoordinate { .. }
            | Self::GeometryExhausted { .. } => ErrorCategory::Geometry,
            Self::SessionClosed { .. } | Self::SessionFailed { .. } => ErrorCategory::Session,
            Self::StoreError { .. } | Self::StoreUnavailable { .. } | Self::HttpError(_) => {
                ErrorCategory::Store
            }
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SessionClosed { .. } => ErrorSeverity::Low,
            Self::NotFound { .. }
            | Self::ProviderUnavailable { .. }
            | Self::ProviderStatus { .. }
            | Self::MalformedEncoding { .. } => ErrorSeverity::Medium,
            Self::InvalidCoordinate { .. }
            | Self::GeometryExhausted { .. }
            | Self::SessionFailed { .. }
            | Self::StoreError { .. }
            | Self::StoreUnavailable { .. }
            | Self::HttpError(_)
            | Self::SerializationError(_) => ErrorSeverity::High,
            Self::IoError(_)
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::Critical,
        }
    }

    /// Errors that must reach the user instead of degrading to a status
    /// indicator.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinate { .. } | Self::GeometryExhausted { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Lookup => "The link may be stale; refresh the route list and try again",
            ErrorCategory::Provider => "A basic route is shown; check the directions API key or network",
            ErrorCategory::Geometry => "Check the stored route coordinates and stage locations",
            ErrorCategory::Session => "Open live tracking again",
            ErrorCategory::Store => "Check the store endpoint, API key and connectivity",
            ErrorCategory::Configuration => "Fix the configuration file and restart",
            ErrorCategory::Io => "Check file permissions and paths",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NotFound { kind, .. } => format!("The requested {} could not be found", kind),
            Self::InvalidCoordinate { .. } => {
                "Route data contains an invalid location".to_string()
            }
            Self::GeometryExhausted { .. } => "No route geometry is available".to_string(),
            Self::StoreError { .. } | Self::StoreUnavailable { .. } | Self::HttpError(_) => {
                "Failed to load route data".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Turns an expected `NotFound` into `None`, keeping every other error.
pub fn not_found_to_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
