//! User-facing diagnostics.
//!
//! Recoverable findings (a bad default, a missing capability, a lint) are
//! values, collected into [`Diagnostics`] so that one pass reports every
//! broken default. Fatal failures use [`crate::error::CompilationError`].

use crate::lint::{Lint, LintLevel};

use thiserror::Error;

use std::fmt;

/// A source location: byte range plus the 1-based line/column of its start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub file_id: u32,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub const fn new(file_id: u32, start: usize, end: usize, line: usize, col: usize) -> Self {
        Self {
            file_id,
            start,
            end,
            line,
            col,
        }
    }

    pub fn dummy() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum Diagnostic {
    /// Malformed syntax after a field's `=`.
    #[error("malformed default value: {message}")]
    ParseError { message: String, span: Span },

    /// The expression steps outside the constant-evaluation fragment.
    #[error("default value is not a constant expression: {reason}")]
    NotConstant { reason: String, expr_span: Span },

    #[error("mismatched types: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },

    /// Raised by synthesis for the first field with neither a default nor a
    /// default-value capability.
    #[error(
        "field `{field}` has no default value and its type `{ty}` does not implement `Default`"
    )]
    MissingDefault {
        field: String,
        ty: String,
        span: Span,
    },

    #[error("cannot find `{name}` in this scope")]
    UnresolvedName { name: String, span: Span },

    #[error("evaluation of constant value failed: {message}")]
    EvaluationFailed { message: String, span: Span },

    #[error("default values of `{type_name}` contain errors")]
    ErroneousDefaults { type_name: String, span: Span },

    #[error("{message}")]
    TypeError { message: String, span: Span },

    #[error("the name `{name}` is defined multiple times")]
    DuplicateDefinition { name: String, span: Span },

    #[error("{message}")]
    Lint {
        lint: Lint,
        level: LintLevel,
        message: String,
        span: Span,
    },
}

impl Diagnostic {
    pub fn span(&self) -> Span {
        match self {
            Diagnostic::ParseError { span, .. }
            | Diagnostic::TypeMismatch { span, .. }
            | Diagnostic::MissingDefault { span, .. }
            | Diagnostic::UnresolvedName { span, .. }
            | Diagnostic::EvaluationFailed { span, .. }
            | Diagnostic::ErroneousDefaults { span, .. }
            | Diagnostic::TypeError { span, .. }
            | Diagnostic::DuplicateDefinition { span, .. }
            | Diagnostic::Lint { span, .. } => *span,
            Diagnostic::NotConstant { expr_span, .. } => *expr_span,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::Lint {
                level: LintLevel::Warn,
                ..
            } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// Renders `file:line:col: severity: message`, with the lint name appended
    /// for lint diagnostics.
    pub fn render(&self, file: &str) -> String {
        let span = self.span();
        let mut out = format!(
            "{file}:{}:{}: {}: {self}",
            span.line,
            span.col,
            self.severity()
        );
        if let Diagnostic::Lint { lint, .. } = self {
            out.push_str(&format!(" [{lint}]"));
        }
        out
    }
}

/// An ordered collection of diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_lints_are_not_errors() {
        let warn = Diagnostic::Lint {
            lint: Lint::RedundantFieldDefault,
            level: LintLevel::Warn,
            message: "redundant".into(),
            span: Span::dummy(),
        };
        let deny = Diagnostic::Lint {
            lint: Lint::OverflowingLiterals,
            level: LintLevel::Deny,
            message: "overflow".into(),
            span: Span::dummy(),
        };
        let diagnostics = Diagnostics::from(vec![warn, deny]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn render_includes_location_and_lint_name() {
        let diagnostic = Diagnostic::Lint {
            lint: Lint::OverflowingLiterals,
            level: LintLevel::Deny,
            message: "literal out of range for `Uint8`".into(),
            span: Span::new(0, 10, 13, 3, 22),
        };
        assert_eq!(
            diagnostic.render("demo.kit"),
            "demo.kit:3:22: error: literal out of range for `Uint8` [overflowing_literals]"
        );
    }
}
