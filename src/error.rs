use thiserror::Error;

/// Trip detection error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Detection service already running")]
    AlreadyRunning,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Location provider failed: {0}")]
    LocationProvider(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Detection task failed: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Whether a supervisor should bring the service back after this error.
    ///
    /// Permission denial, bad configuration and a run already owned by
    /// someone else end supervision; everything else is a crash that a
    /// sticky restart policy recovers from.
    pub fn is_restartable(&self) -> bool {
        !matches!(
            self,
            TrackerError::AlreadyRunning
                | TrackerError::PermissionDenied
                | TrackerError::InvalidConfig(_)
        )
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Storage(err.to_string())
    }
}

/// Result type for detection operations
pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_terminal() {
        assert!(!TrackerError::PermissionDenied.is_restartable());
        assert!(!TrackerError::AlreadyRunning.is_restartable());
        assert!(TrackerError::LocationProvider("gps off".into()).is_restartable());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TrackerError = io.into();
        assert!(matches!(err, TrackerError::Storage(_)));
        assert!(err.to_string().contains("missing"));
    }
}
