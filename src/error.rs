use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Start of range ({start}) is after its end ({end})")]
    Inverted {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Failures contacting the image catalog. These never escape the planner; they
/// collapse into an empty plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Catalog answered with status {0}")]
    Status(u16),
    #[error("Catalog response was not a list of suffix strings")]
    Malformed,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Product catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Product catalog must be a JSON array of satellites")]
    NotAnArray,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Unable to prepare frame directory {path:?}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to write frame {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("No frames to assemble")]
    NoFrames,
    #[error("Unable to create video directory {path:?}: {source}")]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to start encoder {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Frames(#[from] FrameError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("Unable to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid url {url:?}: {source}")]
    Url {
        url: String,
        source: url::ParseError,
    },
    #[error("Run task aborted: {0}")]
    Aborted(String),
}
