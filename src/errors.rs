use std::path::PathBuf;

/// Errors that end a run.
///
/// Anything that goes wrong for a single follower is classified by the
/// delivery state machine instead and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("browser session failed to start: {0}")]
    Session(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
