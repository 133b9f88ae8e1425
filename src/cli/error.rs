//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{failed} of {total} records failed to write")]
    Incomplete { failed: usize, total: usize },
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) => crate::exitcode::USAGE,
            CliError::Incomplete { .. } => crate::exitcode::TEMPFAIL,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => crate::exitcode::IOERR,
                InfraError::Http { .. } => crate::exitcode::SOFTWARE,
                InfraError::Auth { .. } => crate::exitcode::NOPERM,
                InfraError::Application(app) => match app {
                    ApplicationError::Config { .. } => crate::exitcode::CONFIG,
                    ApplicationError::Domain(_) => crate::exitcode::DATAERR,
                    ApplicationError::NoData { .. } => crate::exitcode::NOINPUT,
                    ApplicationError::Remote { .. } => crate::exitcode::UNAVAILABLE,
                    ApplicationError::OperationFailed { .. } => crate::exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::infrastructure::RemoteError;

    #[test]
    fn given_error_kinds_when_mapping_exit_codes_then_follow_sysexits() {
        let config: CliError = ApplicationError::Config {
            message: "bad".into(),
        }
        .into();
        assert_eq!(config.exit_code(), crate::exitcode::CONFIG);

        let data: CliError = ApplicationError::from(DomainError::EmptyTree).into();
        assert_eq!(data.exit_code(), crate::exitcode::DATAERR);

        let remote: CliError =
            ApplicationError::remote("list", RemoteError::Transient("503".into())).into();
        assert_eq!(remote.exit_code(), crate::exitcode::UNAVAILABLE);

        let partial = CliError::Incomplete { failed: 1, total: 3 };
        assert_eq!(partial.exit_code(), crate::exitcode::TEMPFAIL);
    }
}
