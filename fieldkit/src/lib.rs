//! Kit struct definitions with per-field default values.
//!
//! The library parses Kit sources, validates every `field: T = expr`
//! default as a constant expression of type `T`, and synthesizes a
//! default constructor for structs marked `#[derive(Default)]`.

pub mod codegen;
pub mod diagnostics;
pub mod error;
pub mod lint;

pub use codegen::frontend::{Analysis, Compiler, analyze_source, describe_defaults};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Span};
pub use error::{CompilationError, CompileResult};
pub use lint::{Lint, LintConfig, LintLevel};

use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar/kit.pest"]
pub struct KitParser;
