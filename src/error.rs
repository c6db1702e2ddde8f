//! Error types for the feature pipeline

use serde_json::Value;
use thiserror::Error;

/// Everything a pipeline stage can fail with. Geometric invalidity is not
/// here: self-intersections are repaired, never reported.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: `{field}` {reason}")]
    InputShape { field: &'static str, reason: String },

    #[error("feature {index}: cannot parse geometry ({reason})")]
    GeometryParse { index: usize, reason: String },

    #[error("invalid dissolve input: {reason} (got {value})")]
    DissolveInput { reason: String, value: Value },

    #[error("feature {index}: cannot project geometry of type {kind}")]
    UnsupportedGeometry { index: usize, kind: &'static str },

    #[error("feature {index}: projection failed ({reason})")]
    Projection { index: usize, reason: String },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
