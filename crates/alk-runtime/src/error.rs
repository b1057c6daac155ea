use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to start interpreter '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("No program has been launched")]
    NoProgram,
}

/// Failure of a single command round-trip.
///
/// Cloneable so that one backend failure can be reported to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No interpreter is attached")]
    NotAttached,
    #[error("Interpreter did not answer '{command}' within {timeout:?}")]
    Unresponsive { command: String, timeout: Duration },
    #[error("Interpreter terminated")]
    Terminated,
    #[error("Selection was abandoned, the interpreter cannot continue")]
    PromptAbandoned,
    #[error("Failed to talk to the interpreter: {0}")]
    Io(String),
    #[error(transparent)]
    Framing(#[from] FramingError),
}

impl DispatchError {
    /// Whether the stream is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::Terminated | DispatchError::PromptAbandoned | DispatchError::Io(_)
        )
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        DispatchError::Io(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Block '{open}' was interrupted by the start of '{next}'")]
    Interrupted { open: String, next: String },
    #[error("End of '{found}' does not match the open block '{open}'")]
    Mismatched { open: String, found: String },
    #[error("End of '{0}' without a matching begin")]
    Unopened(String),
    #[error("Stream ended inside block '{0}'")]
    Truncated(String),
    #[error("Block '{block}' has no readable entries")]
    Unreadable { block: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_attached(DispatchError::NotAttached, false)]
    #[case::unresponsive(
        DispatchError::Unresponsive { command: "next".to_string(), timeout: Duration::from_secs(1) },
        false
    )]
    #[case::terminated(DispatchError::Terminated, true)]
    #[case::abandoned(DispatchError::PromptAbandoned, true)]
    #[case::io(DispatchError::Io("broken pipe".to_string()), true)]
    #[case::framing(
        DispatchError::Framing(FramingError::Unreadable { block: "back".to_string() }),
        false
    )]
    fn test_is_fatal(#[case] error: DispatchError, #[case] expected: bool) {
        assert_eq!(error.is_fatal(), expected);
    }

    #[test]
    fn test_dispatch_error_converts_into_error() {
        let error: Error = DispatchError::Terminated.into();
        assert_eq!(error.to_string(), "Interpreter terminated");
    }
}
