//! Lints and lint-level scoping.
//!
//! Levels come from three places, innermost first: `#[allow]`/`#[warn]`/
//! `#[deny]` attributes currently in scope, the command-line
//! [`LintConfig`], and the lint's built-in default.

use crate::codegen::type_ast::Attribute;
use crate::diagnostics::{Diagnostic, Span};

use log::trace;

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lint {
    /// A literal that does not fit its type.
    OverflowingLiterals,
    /// Constant arithmetic whose result does not fit its type.
    ArithmeticOverflow,
    /// A field default equal to the field type's own default.
    RedundantFieldDefault,
    UnknownLints,
}

impl Lint {
    pub const ALL: [Lint; 4] = [
        Lint::OverflowingLiterals,
        Lint::ArithmeticOverflow,
        Lint::RedundantFieldDefault,
        Lint::UnknownLints,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Lint::OverflowingLiterals => "overflowing_literals",
            Lint::ArithmeticOverflow => "arithmetic_overflow",
            Lint::RedundantFieldDefault => "redundant_field_default",
            Lint::UnknownLints => "unknown_lints",
        }
    }

    pub fn default_level(self) -> LintLevel {
        match self {
            Lint::OverflowingLiterals | Lint::ArithmeticOverflow => LintLevel::Deny,
            Lint::RedundantFieldDefault | Lint::UnknownLints => LintLevel::Warn,
        }
    }
}

impl fmt::Display for Lint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Lint {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lint::ALL
            .into_iter()
            .find(|lint| lint.name() == s)
            .ok_or(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LintLevel {
    Allow,
    Warn,
    Deny,
}

impl LintLevel {
    /// Maps an attribute name (`allow`, `warn`, `deny`) to a level.
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "allow" => Some(LintLevel::Allow),
            "warn" => Some(LintLevel::Warn),
            "deny" => Some(LintLevel::Deny),
            _ => None,
        }
    }
}

/// Command-line lint levels. Later settings win over earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LintConfig {
    overrides: Vec<(Lint, LintLevel)>,
}

impl LintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, lint: Lint, level: LintLevel) -> &mut Self {
        self.overrides.push((lint, level));
        self
    }

    pub fn with(mut self, lint: Lint, level: LintLevel) -> Self {
        self.set(lint, level);
        self
    }

    pub fn base_level(&self, lint: Lint) -> LintLevel {
        self.overrides
            .iter()
            .rev()
            .find(|(l, _)| *l == lint)
            .map(|(_, level)| *level)
            .unwrap_or_else(|| lint.default_level())
    }
}

/// Emits lints at the level in effect for the current attribute scope.
///
/// Scopes follow stack discipline: [`LintEmitter::scoped`] pushes a field's
/// (or struct's) attributes, runs the closure and pops them again, so
/// nothing leaks from one field to its sibling.
#[derive(Debug)]
pub struct LintEmitter {
    config: LintConfig,
    scopes: Vec<Vec<(Lint, LintLevel)>>,
    emitted: Vec<Diagnostic>,
}

impl LintEmitter {
    pub fn new(config: LintConfig) -> Self {
        Self {
            config,
            scopes: Vec::new(),
            emitted: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn level(&self, lint: Lint) -> LintLevel {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(l, _)| *l == lint)
            .map(|(_, level)| *level)
            .unwrap_or_else(|| self.config.base_level(lint))
    }

    /// Runs `f` with `attrs` pushed as the innermost lint scope.
    pub fn scoped<R>(&mut self, attrs: &[Attribute], f: impl FnOnce(&mut Self) -> R) -> R {
        let levels = self.scope_from_attributes(attrs);
        self.scopes.push(levels);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn scope_from_attributes(&mut self, attrs: &[Attribute]) -> Vec<(Lint, LintLevel)> {
        let mut levels = Vec::new();
        for attr in attrs {
            let Some(level) = LintLevel::from_attribute(&attr.name) else {
                continue;
            };
            for arg in &attr.args {
                match Lint::from_str(arg) {
                    Ok(lint) => levels.push((lint, level)),
                    Err(()) => self.emit(
                        Lint::UnknownLints,
                        format!("unknown lint: `{arg}`"),
                        attr.span,
                    ),
                }
            }
        }
        levels
    }

    pub fn emit(&mut self, lint: Lint, message: impl Into<String>, span: Span) {
        let level = self.level(lint);
        let message = message.into();
        if level == LintLevel::Allow {
            trace!("suppressed {lint}: {message}");
            return;
        }
        self.emitted.push(Diagnostic::Lint {
            lint,
            level,
            message,
            span,
        });
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, args: &[&str]) -> Attribute {
        Attribute {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            span: Span::dummy(),
        }
    }

    #[test]
    fn innermost_scope_wins() {
        let mut lints = LintEmitter::new(LintConfig::default());
        let outer = [attr("allow", &["arithmetic_overflow"])];
        let inner = [attr("deny", &["arithmetic_overflow"])];

        lints.scoped(&outer, |lints| {
            assert_eq!(lints.level(Lint::ArithmeticOverflow), LintLevel::Allow);
            lints.scoped(&inner, |lints| {
                assert_eq!(lints.level(Lint::ArithmeticOverflow), LintLevel::Deny);
            });
            assert_eq!(lints.level(Lint::ArithmeticOverflow), LintLevel::Allow);
        });
        assert_eq!(lints.depth(), 0);
        assert_eq!(lints.level(Lint::ArithmeticOverflow), LintLevel::Deny);
    }

    #[test]
    fn config_overrides_default_but_not_attributes() {
        let config = LintConfig::new().with(Lint::OverflowingLiterals, LintLevel::Warn);
        let mut lints = LintEmitter::new(config);
        assert_eq!(lints.level(Lint::OverflowingLiterals), LintLevel::Warn);

        lints.scoped(&[attr("allow", &["overflowing_literals"])], |lints| {
            lints.emit(Lint::OverflowingLiterals, "hidden", Span::dummy());
        });
        lints.emit(Lint::OverflowingLiterals, "shown", Span::dummy());

        let emitted = lints.take();
        assert_eq!(emitted.len(), 1);
        assert!(matches!(
            &emitted[0],
            Diagnostic::Lint { level: LintLevel::Warn, message, .. } if message == "shown"
        ));
    }

    #[test]
    fn unknown_lint_names_are_reported() {
        let mut lints = LintEmitter::new(LintConfig::default());
        lints.scoped(&[attr("allow", &["no_such_lint"])], |_| {});
        let emitted = lints.take();
        assert!(matches!(
            emitted.as_slice(),
            [Diagnostic::Lint { lint: Lint::UnknownLints, .. }]
        ));
    }
}
