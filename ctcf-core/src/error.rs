use std::{io, path::PathBuf};
use thiserror::Error;

use crate::bed::ParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Required columns are absent from a table header, or required
    /// parameters are absent from a set of posterior draws.
    #[error("{source_name}: missing required column(s): {}", columns.join(", "))]
    MissingColumn {
        source_name: String,
        columns: Vec<String>,
    },

    /// A region string does not have the `chrom:start-end` shape.
    #[error("line {line}: malformed region '{region}', expected chrom:start-end")]
    MalformedRegion { line: usize, region: String },

    /// The inference engine failed to compile or to sample. The diagnostic
    /// is the engine's own output.
    #[error("inference engine failed during {stage}:\n{diagnostic}")]
    ExternalEngine { stage: String, diagnostic: String },

    /// The posterior ratio for a row has no defined value.
    #[error("posterior prediction is indeterminate for row {row} ({region})")]
    ArithmeticIndeterminate { row: usize, region: String },

    #[error("line {line}: invalid interval {chrom}:{start}-{end}, start must be less than end")]
    InvalidInterval {
        line: usize,
        chrom: String,
        start: u64,
        end: u64,
    },

    #[error("line {line}: {source}")]
    Record { line: usize, source: ParseError },

    #[error("line {line}: invalid value for {field}: '{value}'")]
    InvalidValue {
        line: usize,
        field: String,
        value: String,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("cannot access {}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn missing<S, I, C>(source_name: S, columns: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Error::MissingColumn {
            source_name: source_name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a line number to a record-level parse failure.
    pub(crate) fn record(line: usize, err: ParseError) -> Self {
        match err {
            ParseError::InvalidInterval { chrom, start, end } =>
                Error::InvalidInterval { line, chrom, start, end },
            e => Error::Record { line, source: e },
        }
    }

    pub(crate) fn invalid_value<F: Into<String>, V: ToString>(line: usize, field: F, value: V) -> Self {
        Error::InvalidValue { line, field: field.into(), value: value.to_string() }
    }
}
