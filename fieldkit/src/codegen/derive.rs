//! `#[derive(Default)]` as an explicit synthesis pass.
//!
//! [`synthesize`] lowers a struct's [`FieldDefaultTable`] into a
//! [`SynthesizedConstructor`]: one initializer per field, taken from the
//! field's validated default or from its type's default-value capability.

use log::debug;

use super::ast::Expr;
use super::consteval::ConstValue;
use super::context::TypeContext;
use super::defaults::{DefaultSlot, FieldDefaultTable};
use super::type_ast::{FieldIdent, StructDefinition};
use super::types::Type;
use crate::diagnostics::{Diagnostic, Span};
use crate::lint::LintConfig;

/// Answers "does this type provide a zero-argument default value?".
pub trait CapabilityLookup {
    fn has_default_capability(&self, ty: &Type) -> bool;
}

impl<F> CapabilityLookup for F
where
    F: Fn(&Type) -> bool,
{
    fn has_default_capability(&self, ty: &Type) -> bool {
        self(ty)
    }
}

impl CapabilityLookup for TypeContext {
    /// Primitives other than `Void` have one, as does any struct marked
    /// `#[derive(Default)]`. A generic parameter is assumed to have one;
    /// the assumption becomes a required bound of the constructor.
    fn has_default_capability(&self, ty: &Type) -> bool {
        match ty {
            Type::Void | Type::Ptr(_) => false,
            Type::Named(name) => self.struct_def(name).is_some_and(|def| def.derives("Default")),
            _ => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InitKind {
    /// The field's own validated default.
    Constant { value: ConstValue, expr: Expr },
    /// The default-value capability of the field's type.
    Capability(Type),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldInitializer {
    pub field: FieldIdent,
    pub ty: Type,
    pub kind: InitKind,
    pub span: Span,
}

/// The generated default routine for one struct.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesizedConstructor {
    pub type_name: String,
    /// `<Type>_default`.
    pub fn_name: String,
    pub inits: Vec<FieldInitializer>,
    /// Field types mentioning a generic parameter that rely on the
    /// capability. Fields with explicit defaults never appear here.
    pub required_bounds: Vec<Type>,
    pub span: Span,
}

/// Builds the default routine for `def`, failing on the first field that
/// has neither a default nor a capability.
pub fn synthesize(
    def: &StructDefinition,
    table: &FieldDefaultTable,
    capabilities: &impl CapabilityLookup,
) -> Result<SynthesizedConstructor, Diagnostic> {
    if table.type_name() != def.name || table.len() != def.fields.len() {
        return Err(Diagnostic::TypeError {
            message: format!(
                "default table of `{}` does not match the definition of `{}`",
                table.type_name(),
                def.name
            ),
            span: def.span,
        });
    }
    if table.has_errors() {
        return Err(Diagnostic::ErroneousDefaults {
            type_name: def.name.clone(),
            span: def.span,
        });
    }

    let mut inits = Vec::with_capacity(def.fields.len());
    let mut required_bounds: Vec<Type> = Vec::new();
    for (field, (ident, slot)) in def.fields.iter().zip(table.iter()) {
        if &field.ident != ident {
            return Err(Diagnostic::TypeError {
                message: format!("default table entry `{ident}` does not match field `{}`", field.ident),
                span: field.span,
            });
        }
        let kind = match slot {
            DefaultSlot::Validated(validated) => InitKind::Constant {
                value: validated.value.clone(),
                expr: validated.expr.clone(),
            },
            DefaultSlot::Absent => {
                if !capabilities.has_default_capability(&field.ty) {
                    return Err(Diagnostic::MissingDefault {
                        field: field.ident.to_string(),
                        ty: field.ty.to_string(),
                        span: field.span,
                    });
                }
                if field.ty.contains_param() && !required_bounds.contains(&field.ty) {
                    required_bounds.push(field.ty.clone());
                }
                InitKind::Capability(field.ty.clone())
            }
            DefaultSlot::Erroneous => {
                return Err(Diagnostic::ErroneousDefaults {
                    type_name: def.name.clone(),
                    span: def.span,
                });
            }
        };
        inits.push(FieldInitializer {
            field: field.ident.clone(),
            ty: field.ty.clone(),
            kind,
            span: field.span,
        });
    }

    debug!(
        "Synthesized `{}_default` with {} initializer(s)",
        def.name,
        inits.len()
    );
    Ok(SynthesizedConstructor {
        type_name: def.name.clone(),
        fn_name: format!("{}_default", def.name),
        inits,
        required_bounds,
        span: def.span,
    })
}

impl SynthesizedConstructor {
    /// Runs the routine in the constant-value model.
    ///
    /// Nested `#[derive(Default)]` structs are synthesized on demand under
    /// the same lint levels the analysis used, and the result is what the
    /// emitted C function returns.
    pub fn instantiate(
        &self,
        ctx: &TypeContext,
        lints: &LintConfig,
    ) -> Result<ConstValue, Diagnostic> {
        let mut visiting = vec![self.type_name.clone()];
        self.instantiate_in(ctx, lints, &mut visiting)
    }

    fn instantiate_in(
        &self,
        ctx: &TypeContext,
        lints: &LintConfig,
        visiting: &mut Vec<String>,
    ) -> Result<ConstValue, Diagnostic> {
        let mut fields = Vec::with_capacity(self.inits.len());
        for init in &self.inits {
            let value = match &init.kind {
                InitKind::Constant { value, .. } => value.clone(),
                InitKind::Capability(ty) => capability_value(init, ty, ctx, lints, visiting)?,
            };
            fields.push((init.field.clone(), value));
        }
        Ok(ConstValue::Struct {
            name: self.type_name.clone(),
            fields,
        })
    }
}

fn capability_value(
    init: &FieldInitializer,
    ty: &Type,
    ctx: &TypeContext,
    lints: &LintConfig,
    visiting: &mut Vec<String>,
) -> Result<ConstValue, Diagnostic> {
    if let Some(zero) = ConstValue::zero_of(ty) {
        return Ok(zero);
    }
    let span = init.span;
    let missing = || Diagnostic::MissingDefault {
        field: init.field.to_string(),
        ty: ty.to_string(),
        span,
    };
    match ty {
        Type::Named(name) => {
            if visiting.contains(name) {
                return Err(Diagnostic::EvaluationFailed {
                    message: format!("`{name}` contains itself through its default value"),
                    span,
                });
            }
            let Some(def) = ctx.struct_def(name).filter(|d| d.derives("Default")) else {
                return Err(missing());
            };
            let (table, _) = FieldDefaultTable::build(def, ctx, lints);
            let ctor = synthesize(def, &table, ctx)?;
            visiting.push(name.clone());
            let value = ctor.instantiate_in(ctx, lints, visiting);
            visiting.pop();
            value
        }
        Type::Param(name) => Err(Diagnostic::TypeError {
            message: format!("generic parameter `{name}` has no value until the struct is instantiated"),
            span,
        }),
        _ => Err(missing()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::parser::Parser;
    use crate::lint::{Lint, LintLevel};

    fn parts(source: &str, name: &str) -> (TypeContext, StructDefinition, FieldDefaultTable) {
        let program = Parser::new(0, source).parse_program().expect("parses");
        let (ctx, _) = TypeContext::new(&program);
        let def = ctx.struct_def(name).expect("struct exists").clone();
        let (table, _) = FieldDefaultTable::build(&def, &ctx, &LintConfig::default());
        (ctx, def, table)
    }

    #[test]
    fn constants_and_capabilities_in_declaration_order() {
        let (ctx, def, table) = parts("struct S { a: Uint8, b: Uint8 = 7 }", "S");
        let ctor = synthesize(&def, &table, &ctx).expect("synthesizes");
        assert_eq!(ctor.fn_name, "S_default");
        assert!(matches!(ctor.inits[0].kind, InitKind::Capability(Type::Uint8)));
        assert!(matches!(
            &ctor.inits[1].kind,
            InitKind::Constant { value: ConstValue::Int(7), .. }
        ));

        let value = ctor.instantiate(&ctx, &LintConfig::default()).expect("instantiates");
        assert_eq!(value.get("a"), Some(&ConstValue::Int(0)));
        assert_eq!(value.get("b"), Some(&ConstValue::Int(7)));
    }

    #[test]
    fn first_field_without_default_or_capability_fails() {
        let (ctx, def, table) = parts(
            "struct Raw { p: Ptr[Int] }\nstruct S { ok: Int, bad: Raw, worse: Ptr[Int] }",
            "S",
        );
        let err = synthesize(&def, &table, &ctx).unwrap_err();
        assert!(matches!(err, Diagnostic::MissingDefault { field, .. } if field == "bad"));
    }

    #[test]
    fn explicit_defaults_add_no_bounds() {
        let (ctx, def, table) = parts(
            "struct Holder[T, U] { value: T, count: Int = 1, other: Ptr[U] = null }",
            "Holder",
        );
        let ctor = synthesize(&def, &table, &ctx).expect("synthesizes");
        assert_eq!(ctor.required_bounds, vec![Type::Param("T".into())]);
    }

    #[test]
    fn erroneous_table_is_reported_once_as_a_whole() {
        let (ctx, def, table) = parts("struct S { a: Int = \"no\" }", "S");
        assert!(matches!(
            synthesize(&def, &table, &ctx),
            Err(Diagnostic::ErroneousDefaults { type_name, .. }) if type_name == "S"
        ));
    }

    #[test]
    fn nested_derived_structs_instantiate() {
        let (ctx, def, table) = parts(
            "#[derive(Default)]\nstruct Inner { x: Int = 3, y: Bool }\n\
             #[derive(Default)]\nstruct Outer { inner: Inner, tag: Char = 'o' }",
            "Outer",
        );
        let value = synthesize(&def, &table, &ctx)
            .and_then(|ctor| ctor.instantiate(&ctx, &LintConfig::default()))
            .expect("instantiates");
        assert_eq!(value.to_string(), "Outer { inner: Inner { x: 3, y: false }, tag: 'o' }");
    }

    #[test]
    fn closures_are_capability_lookups() {
        let (_, def, table) = parts("struct S { a: Uint8 }", "S");
        let none = |_: &Type| false;
        assert!(matches!(
            synthesize(&def, &table, &none),
            Err(Diagnostic::MissingDefault { .. })
        ));
    }

    #[test]
    fn nested_tables_follow_the_configured_lint_levels() {
        let (ctx, def, _) = parts(
            "#[derive(Default)]\nstruct Inner { x: Int8 = 200 }\n\
             #[derive(Default)]\nstruct Outer { inner: Inner }",
            "Outer",
        );
        let allow = LintConfig::new().with(Lint::OverflowingLiterals, LintLevel::Allow);
        let (table, _) = FieldDefaultTable::build(&def, &ctx, &allow);
        let ctor = synthesize(&def, &table, &ctx).expect("synthesizes");

        let value = ctor.instantiate(&ctx, &allow).expect("instantiates");
        assert_eq!(value.to_string(), "Outer { inner: Inner { x: -56 } }");
        assert!(matches!(
            ctor.instantiate(&ctx, &LintConfig::default()),
            Err(Diagnostic::ErroneousDefaults { type_name, .. }) if type_name == "Inner"
        ));
    }

    #[test]
    fn instantiating_without_a_capability_names_the_field() {
        let (ctx, def, table) = parts("struct Raw { p: Ptr[Int] }\nstruct S { raw: Raw }", "S");
        let everything = |_: &Type| true;
        let ctor = synthesize(&def, &table, &everything).expect("synthesizes");
        assert!(matches!(
            ctor.instantiate(&ctx, &LintConfig::default()),
            Err(Diagnostic::MissingDefault { field, ty, .. }) if field == "raw" && ty == "Raw"
        ));
    }
}
