use std::path::PathBuf;

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompilationError>;

/// Failures that stop the pipeline outright. Per-field problems are
/// [`crate::diagnostics::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum CompilationError {
    #[error("Failed to compile: {0}")]
    CompileError(String),

    #[error("Failed to parse: {0}")]
    ParseError(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Unable to read source code: {0}")]
    UnableToReadSource(PathBuf),

    #[error("Invalid output path")]
    InvalidOutputPath,

    #[error("aborting due to {0} previous error(s)")]
    Aborted(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Helper macro to create a `CompilationError::ParseError`
#[macro_export]
macro_rules! parse_error {
    ( $($arg:tt)* ) => {
        $crate::error::CompilationError::ParseError(format!($($arg)*))
    };
}
