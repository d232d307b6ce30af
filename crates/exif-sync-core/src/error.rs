use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure talking to the metadata transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport session is closed")]
    Closed,

    #[error("could not read metadata of {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("could not write metadata to {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("malformed metadata output for {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure turning a raw timestamp into its output form.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TimestampError {
    #[error("'{0}' is not a yyyy:MM:dd HH:mm:ss timestamp")]
    Parse(String),

    #[error("invalid timezone offset '{0}', expected +HH:MM or -HH:MM")]
    Offset(String),
}

/// Per-pair failure surfaced by the reconciliation loop.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to set modification time of {path}: {source}")]
    Touch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
