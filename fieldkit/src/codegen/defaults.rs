use log::debug;

use super::ast::Expr;
use super::consteval::{ConstValidator, ConstValue};
use super::context::TypeContext;
use super::type_ast::{FieldDefault, FieldIdent, StructDefinition};
use super::types::Type;
use crate::diagnostics::{Diagnostic, Span};
use crate::lint::{Lint, LintConfig, LintEmitter};

/// A default expression that passed the constant check and the type check.
///
/// `ty` is always the field's declared type.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedDefault {
    pub field: FieldIdent,
    /// The expression with inferred types filled in.
    pub expr: Expr,
    pub ty: Type,
    pub value: ConstValue,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DefaultSlot {
    /// The field has no `= expr`.
    Absent,
    Validated(ValidatedDefault),
    /// The default failed to parse or validate; its diagnostic has already
    /// been reported.
    Erroneous,
}

/// Per-struct mapping from field to default, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefaultTable {
    type_name: String,
    entries: Vec<(FieldIdent, DefaultSlot)>,
}

impl FieldDefaultTable {
    /// Validates every field default of `def`.
    ///
    /// Each field is handled inside its own lint scope, nested in the
    /// struct's. A failing field yields one diagnostic and an `Erroneous`
    /// slot; its siblings are still checked. A field whose validation
    /// raised an error-level lint is also `Erroneous`.
    pub fn build(
        def: &StructDefinition,
        ctx: &TypeContext,
        config: &LintConfig,
    ) -> (FieldDefaultTable, Vec<Diagnostic>) {
        debug!("Building default table for `{}`", def.name);
        let validator = ConstValidator::new(ctx);
        let derives_default = def.derives("Default");
        let mut lints = LintEmitter::new(config.clone());
        let mut diagnostics = Vec::new();
        let mut entries = Vec::with_capacity(def.fields.len());

        lints.scoped(&def.attributes, |lints| {
            diagnostics.extend(lints.take());

            for field in &def.fields {
                let outcome = lints.scoped(&field.attributes, |lints| match &field.default {
                    None => None,
                    Some(FieldDefault::Malformed { .. }) => Some(Err(None)),
                    Some(FieldDefault::Parsed(expr)) => {
                        let result = validator.validate(&field.ident, expr, &field.ty, &[], lints);
                        if let Ok(validated) = &result
                            && derives_default
                            && ConstValue::zero_of(&field.ty).as_ref() == Some(&validated.value)
                        {
                            lints.emit(
                                Lint::RedundantFieldDefault,
                                format!(
                                    "default value of `{}` is the same as the default of `{}`",
                                    field.ident, field.ty
                                ),
                                validated.span,
                            );
                        }
                        Some(result.map_err(Some))
                    }
                });

                let field_lints = lints.take();
                let denied = field_lints.iter().any(Diagnostic::is_error);
                diagnostics.extend(field_lints);

                let slot = match outcome {
                    None => DefaultSlot::Absent,
                    Some(Ok(validated)) if !denied => DefaultSlot::Validated(validated),
                    Some(Ok(_)) | Some(Err(None)) => DefaultSlot::Erroneous,
                    Some(Err(Some(diagnostic))) => {
                        diagnostics.push(diagnostic);
                        DefaultSlot::Erroneous
                    }
                };
                entries.push((field.ident.clone(), slot));
            }
        });

        let table = FieldDefaultTable {
            type_name: def.name.clone(),
            entries,
        };
        (table, diagnostics)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &FieldIdent) -> Option<&DefaultSlot> {
        self.entries
            .iter()
            .find(|(ident, _)| ident == field)
            .map(|(_, slot)| slot)
    }

    pub fn validated(&self, field: &FieldIdent) -> Option<&ValidatedDefault> {
        match self.get(field)? {
            DefaultSlot::Validated(validated) => Some(validated),
            _ => None,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, slot)| *slot == DefaultSlot::Erroneous)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldIdent, &DefaultSlot)> {
        self.entries.iter().map(|(ident, slot)| (ident, slot))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::parser::Parser;

    fn build(source: &str, name: &str) -> (FieldDefaultTable, Vec<Diagnostic>) {
        let program = Parser::new(0, source).parse_program().expect("parses");
        let (ctx, _) = TypeContext::new(&program);
        let def = ctx.struct_def(name).expect("struct exists");
        FieldDefaultTable::build(def, &ctx, &LintConfig::default())
    }

    #[test]
    fn slots_follow_declaration_order() {
        let (table, diagnostics) = build("struct S(Uint8, Uint8 = 7, Bool);", "S");
        assert!(diagnostics.is_empty());
        let slots: Vec<_> = table.iter().collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], (&FieldIdent::Index(0), &DefaultSlot::Absent));
        assert!(matches!(slots[1].1, DefaultSlot::Validated(v) if v.value == ConstValue::Int(7)));
        assert_eq!(slots[2].1, &DefaultSlot::Absent);
    }

    #[test]
    fn one_diagnostic_per_broken_field() {
        let (table, diagnostics) = build(
            "struct S { a: Uint8 = \"x\", b: Uint8 = 1, c: Bool = 3 }",
            "S",
        );
        assert_eq!(diagnostics.len(), 2);
        assert!(table.has_errors());
        assert_eq!(table.get(&FieldIdent::Named("a".into())), Some(&DefaultSlot::Erroneous));
        assert!(table.validated(&FieldIdent::Named("b".into())).is_some());
        assert_eq!(table.get(&FieldIdent::Named("c".into())), Some(&DefaultSlot::Erroneous));
    }

    #[test]
    fn denied_lint_marks_the_slot_erroneous() {
        let (table, diagnostics) = build("struct S { a: Int8 = 200 }", "S");
        assert!(table.has_errors());
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::Lint { lint: Lint::OverflowingLiterals, .. }]
        ));
    }

    #[test]
    fn struct_level_allow_covers_every_field() {
        let (table, diagnostics) = build(
            "#[allow(overflowing_literals)]\nstruct S { a: Int8 = 200, b: Uint8 = 300 }",
            "S",
        );
        assert!(diagnostics.is_empty());
        assert!(!table.has_errors());
        assert_eq!(
            table.validated(&FieldIdent::Named("a".into())).map(|v| &v.value),
            Some(&ConstValue::Int(-56))
        );
    }

    #[test]
    fn redundant_defaults_on_derived_structs() {
        let (table, diagnostics) = build(
            "#[derive(Default)]\nstruct S { a: Int = 0, b: Bool = true, c: CString = \"\" }",
            "S",
        );
        assert!(!table.has_errors());
        let linted: Vec<_> = diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::Lint { lint: Lint::RedundantFieldDefault, .. }))
            .collect();
        assert_eq!(linted.len(), 2);
    }

    #[test]
    fn building_twice_gives_equal_tables() {
        let source = "struct S { a: Uint16 = 640, b: Uint16, c: Float64 = 0.5 * 3.0 }";
        let first = build(source, "S");
        let second = build(source, "S");
        assert_eq!(first, second);
    }
}
