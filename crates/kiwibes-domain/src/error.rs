//! Shared error taxonomy used across the Kiwibes crates.
//!
//! Mirrors the stable public error-code table: every post-boot error
//! carries a numeric `code()` and an HTTP `status()`, so the REST layer
//! never has to re-derive the mapping.

use serde::Serialize;

/// Post-boot errors, returned by Catalog / CronMatcher / DataStore /
/// Executor / AuthGuard operations and surfaced over REST.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown job: {0}")]
    JobNameUnknown(String),

    #[error("job name already taken: {0}")]
    JobNameTaken(String),

    #[error("invalid job description")]
    JobDescriptionInvalid,

    #[error("empty request body")]
    EmptyRestRequest,

    #[error("job is running: {0}")]
    JobIsRunning(String),

    #[error("job is not running: {0}")]
    JobIsNotRunning(String),

    #[error("invalid cron schedule")]
    JobScheduleInvalid,

    #[error("failed to launch process: {0}")]
    ProcessLaunchFailed(String),

    #[error("data key already taken: {0}")]
    DataKeyTaken(String),

    #[error("unknown data key: {0}")]
    DataKeyUnknown(String),

    #[error("data store is full")]
    DataStoreFull,

    #[error("authentication failed")]
    AuthenticationFail,
}

impl Error {
    /// The stable numeric code from the public taxonomy.
    pub fn code(&self) -> u16 {
        match self {
            Error::JobNameUnknown(_) => 9,
            Error::JobNameTaken(_) => 10,
            Error::JobDescriptionInvalid => 11,
            Error::EmptyRestRequest => 12,
            Error::JobIsRunning(_) => 13,
            Error::JobIsNotRunning(_) => 14,
            Error::JobScheduleInvalid => 15,
            Error::ProcessLaunchFailed(_) => 16,
            Error::DataKeyTaken(_) => 17,
            Error::DataKeyUnknown(_) => 18,
            Error::DataStoreFull => 19,
            Error::AuthenticationFail => 20,
        }
    }

    /// HTTP status to surface this error as, using the "modern" column
    /// from the error table consistently (see design note in SPEC_FULL §7).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::JobNameUnknown(_) => 404,
            Error::JobNameTaken(_) => 409,
            Error::JobDescriptionInvalid => 400,
            Error::EmptyRestRequest => 400,
            Error::JobIsRunning(_) => 403,
            Error::JobIsNotRunning(_) => 403,
            Error::JobScheduleInvalid => 400,
            Error::ProcessLaunchFailed(_) => 500,
            Error::DataKeyTaken(_) => 409,
            Error::DataKeyUnknown(_) => 404,
            Error::DataStoreFull => 507,
            Error::AuthenticationFail => 404,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Boot-time-only errors. These never cross the HTTP boundary; `main`
/// maps a `BootError` directly to a process exit code.
#[derive(thiserror::Error, Debug)]
pub enum BootError {
    #[error("failed to parse command line arguments")]
    CmdlineParse,

    #[error("invalid log level (must be 0, 1 or 2)")]
    CmdlineInvLogLevel,

    #[error("invalid log max size (must be 1..100 MB)")]
    CmdlineInvLogMaxSize,

    #[error("invalid data store max size (must be 1..100 MB)")]
    CmdlineInvDataStoreMaxSize,

    #[error("home directory does not exist: {0}")]
    CmdlineInvHome(String),

    #[error("no database file found")]
    NoDatabaseFile,

    #[error("failed to parse database JSON: {0}")]
    JsonParseFail(String),

    #[error("interrupted before startup completed")]
    MainInterrupted,

    #[error("failed to load HTTPS certificates: {0}")]
    HttpsCertsFail(String),
}

impl BootError {
    /// Process exit code for this boot failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootError::CmdlineParse => 1,
            BootError::CmdlineInvLogLevel => 2,
            BootError::CmdlineInvLogMaxSize => 3,
            BootError::CmdlineInvDataStoreMaxSize => 4,
            BootError::CmdlineInvHome(_) => 5,
            BootError::NoDatabaseFile => 6,
            BootError::JsonParseFail(_) => 7,
            BootError::MainInterrupted => 8,
            BootError::HttpsCertsFail(_) => 21,
        }
    }
}

/// Error body shape returned to REST clients: `{"error": N, "message": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: u16,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        ErrorBody {
            error: e.code(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_public_taxonomy() {
        assert_eq!(Error::JobNameUnknown("x".into()).code(), 9);
        assert_eq!(Error::JobNameTaken("x".into()).code(), 10);
        assert_eq!(Error::JobDescriptionInvalid.code(), 11);
        assert_eq!(Error::EmptyRestRequest.code(), 12);
        assert_eq!(Error::JobIsRunning("x".into()).code(), 13);
        assert_eq!(Error::JobIsNotRunning("x".into()).code(), 14);
        assert_eq!(Error::JobScheduleInvalid.code(), 15);
        assert_eq!(Error::ProcessLaunchFailed("x".into()).code(), 16);
        assert_eq!(Error::DataKeyTaken("x".into()).code(), 17);
        assert_eq!(Error::DataKeyUnknown("x".into()).code(), 18);
        assert_eq!(Error::DataStoreFull.code(), 19);
        assert_eq!(Error::AuthenticationFail.code(), 20);
    }

    #[test]
    fn modern_http_status_column() {
        assert_eq!(Error::JobNameTaken("x".into()).http_status(), 409);
        assert_eq!(Error::JobDescriptionInvalid.http_status(), 400);
        assert_eq!(Error::JobIsRunning("x".into()).http_status(), 403);
        assert_eq!(Error::DataStoreFull.http_status(), 507);
        assert_eq!(Error::AuthenticationFail.http_status(), 404);
        assert_eq!(Error::JobNameUnknown("x".into()).http_status(), 404);
    }

    #[test]
    fn boot_error_exit_codes() {
        assert_eq!(BootError::CmdlineParse.exit_code(), 1);
        assert_eq!(BootError::NoDatabaseFile.exit_code(), 6);
        assert_eq!(BootError::JsonParseFail("bad".into()).exit_code(), 7);
    }
}
