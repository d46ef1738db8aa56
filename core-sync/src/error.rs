use thiserror::Error;

/// Failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No network, DNS failure, refused or aborted connection
    Connectivity,
    /// A request attempt exceeded its time bound
    Timeout,
    /// Non-2xx status, non-JSON body or malformed response envelope
    Protocol,
    /// The remote answered `success: false`
    Application,
    /// Missing endpoint or forced offline mode
    Configuration,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Spreadsheet script URL is not configured")]
    NotConfigured,

    #[error("Offline mode is active; wait for the connection to return")]
    OfflineMode,

    #[error("Connectivity error after {attempts} attempt(s): {message}")]
    Connectivity { message: String, attempts: u32 },

    #[error("Request timed out after {timeout_ms} ms ({attempts} attempt(s))")]
    Timeout { timeout_ms: u64, attempts: u32 },

    #[error("Protocol error after {attempts} attempt(s): {message}")]
    Protocol { message: String, attempts: u32 },

    #[error("Remote rejected the request: {0}")]
    Application(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotConfigured | SyncError::OfflineMode => ErrorKind::Configuration,
            SyncError::Connectivity { .. } => ErrorKind::Connectivity,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::Protocol { .. } => ErrorKind::Protocol,
            SyncError::Application(_) => ErrorKind::Application,
            SyncError::InvalidStateTransition { .. } => ErrorKind::Internal,
        }
    }

    /// Transport failures that the client retries.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity | ErrorKind::Timeout | ErrorKind::Protocol
        )
    }

    /// Number of attempts made before giving up, for transport failures.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            SyncError::Connectivity { attempts, .. }
            | SyncError::Timeout { attempts, .. }
            | SyncError::Protocol { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let timeout = SyncError::Timeout {
            timeout_ms: 20_000,
            attempts: 2,
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_transport());
        assert_eq!(timeout.attempts(), Some(2));

        let app = SyncError::Application("sheet locked".into());
        assert_eq!(app.kind(), ErrorKind::Application);
        assert!(!app.is_transport());
        assert_eq!(app.attempts(), None);

        assert_eq!(SyncError::OfflineMode.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_display() {
        let err = SyncError::Protocol {
            message: "HTTP 502".into(),
            attempts: 2,
        };
        assert_eq!(err.to_string(), "Protocol error after 2 attempt(s): HTTP 502");
    }
}
