//! Structured error types.
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::io;
use std::path::PathBuf;

use stackreel_common::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("failed to write event log to {path}")]
    Dump {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to open event log {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_names_the_path() {
        let err = ReplayError::Open {
            path: PathBuf::from("missing.bin"),
            source: io::Error::new(io::ErrorKind::NotFound, "nope"),
        };
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn unknown_tag_passes_through() {
        let err = ReplayError::from(DecodeError::UnknownTag(9));
        assert!(err.to_string().contains("0x09"));
    }
}
