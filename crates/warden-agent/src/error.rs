use std::path::PathBuf;

/// Failures surfaced by the supervisor's public operations.
///
/// None of these cross the supervisor boundary as panics; `start()` and
/// friends log them and return normally. `submit_command` returns
/// `NotRunning` so callers can observe the stop contract.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error(
        "no server jar found, check the configured jar-path, searched dir: '{}'",
        dir.display()
    )]
    JarNotFound { dir: PathBuf },

    #[error(transparent)]
    InterpreterNotFound(#[from] InterpreterError),

    #[error("server is not running")]
    NotRunning,

    #[error("failed to write to server stdin: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while resolving the managed Java runtime.
#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error("managed runtime is enabled but no build id is recorded, run the runtime installer first")]
    MissingBuildId,

    #[error("no runtime installation found in '{}'", dir.display())]
    NoInstallation { dir: PathBuf },

    #[error("no 'bin' directory inside the runtime installation at '{}'", dir.display())]
    MissingBinDir { dir: PathBuf },

    #[error("no java executable inside '{}'", dir.display())]
    MissingExecutable { dir: PathBuf },
}

/// Failures opening a secured channel to the control server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("channel i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("control server rejected the server key")]
    AuthenticationFailed,
}
