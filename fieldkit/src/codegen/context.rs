use std::collections::{HashMap, HashSet};

use log::debug;

use super::ast::{ConstDecl, Expr, FnQualifier, Function, Program};
use super::consteval;
use super::inference::TypeInferencer;
use super::type_ast::{StructDefinition, StructKind};
use super::types::{Type, TypeStore};
use crate::diagnostics::{Diagnostic, Span};

/// Declared shape of a function, visible to inference and the evaluator.
#[derive(Clone, Debug, PartialEq)]
pub struct FnSignature {
    pub name: String,
    pub qualifier: FnQualifier,
    pub params: Vec<Type>,
    pub ret: Type,
    pub span: Span,
}

/// Program-wide, read-only view of every struct, constant and function.
///
/// Built once per analysis and shared by reference with the validator,
/// the table builder and the synthesizer; nothing mutates it afterwards.
#[derive(Debug, Default)]
pub struct TypeContext {
    structs: Vec<StructDefinition>,
    struct_index: HashMap<String, usize>,
    consts: Vec<ConstDecl>,
    const_index: HashMap<String, usize>,
    signatures: HashMap<String, FnSignature>,
    /// Function bodies with `Expr::ty` filled in against `fn_store`.
    bodies: HashMap<String, Function>,
    fn_store: TypeStore,
}

impl TypeContext {
    /// Registers every item of `program`, reporting duplicates, unknown
    /// field types and structs that contain themselves by value, then
    /// type-checks function bodies.
    pub fn new(program: &Program) -> (Self, Vec<Diagnostic>) {
        let mut ctx = Self::default();
        let mut diagnostics = Vec::new();

        for def in &program.structs {
            if ctx.struct_index.contains_key(&def.name) {
                diagnostics.push(Diagnostic::DuplicateDefinition {
                    name: def.name.clone(),
                    span: def.span,
                });
                continue;
            }
            for (i, field) in def.fields.iter().enumerate() {
                if def.fields[..i].iter().any(|f| f.ident == field.ident) {
                    diagnostics.push(Diagnostic::DuplicateDefinition {
                        name: format!("{}.{}", def.name, field.ident),
                        span: field.span,
                    });
                }
            }
            ctx.struct_index.insert(def.name.clone(), ctx.structs.len());
            ctx.structs.push(def.clone());
        }

        for decl in &program.consts {
            if ctx.const_index.contains_key(&decl.name) {
                diagnostics.push(Diagnostic::DuplicateDefinition {
                    name: decl.name.clone(),
                    span: decl.span,
                });
                continue;
            }
            ctx.const_index.insert(decl.name.clone(), ctx.consts.len());
            ctx.consts.push(decl.clone());
        }

        for func in &program.functions {
            if ctx.signatures.contains_key(&func.name) || ctx.struct_index.contains_key(&func.name)
            {
                diagnostics.push(Diagnostic::DuplicateDefinition {
                    name: func.name.clone(),
                    span: func.span,
                });
                continue;
            }
            ctx.signatures.insert(
                func.name.clone(),
                FnSignature {
                    name: func.name.clone(),
                    qualifier: func.qualifier,
                    params: func.params.iter().map(|p| p.ty.clone()).collect(),
                    ret: func.return_type.clone().unwrap_or(Type::Void),
                    span: func.span,
                },
            );
        }

        for def in &ctx.structs {
            for field in &def.fields {
                if let Some(name) = ctx.unknown_type_name(&field.ty) {
                    diagnostics.push(Diagnostic::UnresolvedName {
                        name: name.to_string(),
                        span: field.span,
                    });
                }
            }
        }

        // One report per cycle, at its first declared member
        for (index, def) in ctx.structs.iter().enumerate() {
            let Some(path) = ctx.by_value_cycle(&def.name) else {
                continue;
            };
            let first = path
                .iter()
                .all(|name| ctx.struct_index.get(name).is_some_and(|&i| i >= index));
            if first {
                diagnostics.push(Diagnostic::TypeError {
                    message: format!(
                        "recursive struct `{}` has infinite size: {} -> {}",
                        def.name,
                        path.join(" -> "),
                        def.name
                    ),
                    span: def.span,
                });
            }
        }

        // Bodies are checked against the finished item tables, then stored
        // back alongside the store that owns their `TypeId`s.
        let mut bodies: Vec<Function> = program
            .functions
            .iter()
            .filter(|f| f.body.is_some())
            .filter(|f| {
                ctx.signatures
                    .get(&f.name)
                    .is_some_and(|sig| sig.span == f.span)
            })
            .cloned()
            .collect();
        let store = {
            let mut inferencer = TypeInferencer::new(&ctx);
            for func in &mut bodies {
                debug!("Inferring body of function `{}`", func.name);
                if let Err(diagnostic) = inferencer.infer_function(func) {
                    diagnostics.push(diagnostic);
                }
            }
            inferencer.into_store()
        };
        ctx.fn_store = store;
        ctx.bodies = bodies.into_iter().map(|f| (f.name.clone(), f)).collect();

        (ctx, diagnostics)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDefinition> {
        self.struct_index.get(name).map(|&i| &self.structs[i])
    }

    /// Structs in declaration order, duplicates excluded.
    pub fn structs(&self) -> impl Iterator<Item = &StructDefinition> {
        self.structs.iter()
    }

    pub fn const_decl(&self, name: &str) -> Option<&ConstDecl> {
        self.const_index.get(name).map(|&i| &self.consts[i])
    }

    pub fn consts(&self) -> impl Iterator<Item = &ConstDecl> {
        self.consts.iter()
    }

    pub fn signature(&self, name: &str) -> Option<&FnSignature> {
        self.signatures.get(name)
    }

    /// Type-annotated body of a non-extern function.
    pub fn function_body(&self, name: &str) -> Option<&Function> {
        self.bodies.get(name)
    }

    /// The store that resolves `TypeId`s inside [`TypeContext::function_body`].
    pub fn fn_store(&self) -> &TypeStore {
        &self.fn_store
    }

    /// A tuple struct whose name can be called like a function.
    pub fn tuple_constructor(&self, name: &str) -> Option<&StructDefinition> {
        self.struct_def(name)
            .filter(|def| def.kind == StructKind::Tuple)
    }

    /// First struct name in `ty` that is not defined.
    fn unknown_type_name<'t>(&self, ty: &'t Type) -> Option<&'t str> {
        match ty {
            Type::Named(name) if !self.struct_index.contains_key(name) => Some(name),
            Type::Ptr(inner) => self.unknown_type_name(inner),
            _ => None,
        }
    }

    /// Chain of by-value fields leading from `start` back to itself.
    /// Pointer fields break the chain.
    fn by_value_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut path = vec![start.to_string()];
        let mut visited = HashSet::new();
        self.find_cycle(start, start, &mut path, &mut visited)
            .then_some(path)
    }

    fn find_cycle(
        &self,
        start: &str,
        current: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        let Some(def) = self.struct_def(current) else {
            return false;
        };
        for field in &def.fields {
            let Type::Named(next) = &field.ty else {
                continue;
            };
            if next == start {
                return true;
            }
            if !visited.insert(next.clone()) {
                continue;
            }
            path.push(next.clone());
            if self.find_cycle(start, next, path, visited) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Whether `expr` can be given type `expected`.
    ///
    /// Works on a copy with a fresh store, so asking never changes any
    /// later answer.
    pub fn type_unifies(&self, expr: &Expr, expected: &Type) -> bool {
        let mut expr = expr.clone();
        TypeInferencer::new(self)
            .check_expr(&mut expr, expected)
            .is_ok()
    }

    /// Whether `expr` stays inside the constant-evaluation fragment.
    pub fn is_const_context_valid(&self, expr: &Expr) -> bool {
        consteval::check_const_fragment(self, expr).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::parser::Parser;

    fn context(source: &str) -> (TypeContext, Vec<Diagnostic>, Program) {
        let program = Parser::new(0, source).parse_program().expect("parses");
        let (ctx, diagnostics) = TypeContext::new(&program);
        (ctx, diagnostics, program)
    }

    fn default_expr(program: &Program) -> &Expr {
        match &program.structs[0].fields[0].default {
            Some(crate::codegen::type_ast::FieldDefault::Parsed(expr)) => expr,
            other => panic!("expected parsed default, got {other:?}"),
        }
    }

    #[test]
    fn duplicates_and_unknown_types_are_reported() {
        let (ctx, diagnostics, _) = context(
            "struct A { x: Int, x: Int }\nstruct A;\nstruct B { inner: Missing }",
        );
        assert!(ctx.struct_def("A").is_some());
        assert_eq!(ctx.structs().count(), 2);
        let names: Vec<_> = diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::DuplicateDefinition { name, .. }
                | Diagnostic::UnresolvedName { name, .. } => name.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, ["A.x", "A", "Missing"]);
    }

    #[test]
    fn by_value_recursion_is_reported() {
        let (_, diagnostics, _) = context(
            "struct Tree { left: Ptr[Tree], right: Ptr[Tree] }\n\
             struct Loop { again: Loop }",
        );
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::TypeError { message, .. }]
                if message == "recursive struct `Loop` has infinite size: Loop -> Loop"
        ));
    }

    #[test]
    fn unification_queries() {
        let (ctx, diagnostics, program) = context("struct W { width: Uint16 = 640 }");
        assert!(diagnostics.is_empty());
        let expr = default_expr(&program);
        assert!(ctx.type_unifies(expr, &Type::Uint16));
        assert!(!ctx.type_unifies(expr, &Type::CString));
        assert!(!ctx.type_unifies(expr, &Type::Float64));
    }

    #[test]
    fn const_context_queries() {
        let (ctx, _, program) = context(
            "extern function rand(): Int;\nstruct R { seed: Int = rand() }",
        );
        assert!(!ctx.is_const_context_valid(default_expr(&program)));

        let (ctx, _, program) = context(
            "const function seven(): Int { return 7; }\nstruct R { seed: Int = seven() }",
        );
        assert!(ctx.is_const_context_valid(default_expr(&program)));
        assert!(ctx.function_body("seven").is_some());
    }
}
