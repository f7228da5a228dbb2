use std::{io, path::PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(".reg file not found: {}", .0.display())]
    ExportNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    ExportRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no sessions found in {}", .0.display())]
    NoSessions(PathBuf),

    #[error("no usable sessions found (missing HostName)")]
    NoUsableSessions,

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not parse command: {0}")]
    UnparsableCommand(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
