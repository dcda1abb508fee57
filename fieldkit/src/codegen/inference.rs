use super::ast::{Block, Expr, ExprKind, FieldInit, Function, Literal, Stmt};
use super::context::TypeContext;
use super::symbols::SymbolTable;
use super::type_ast::{FieldIdent, StructDefinition, StructKind};
use super::types::{BinaryOperator, Type, TypeId, TypeStore, UnaryOperator, VarKind};
use crate::diagnostics::{Diagnostic, Span};

/// Type inference engine using Hindley-Milner algorithm.
///
/// Item types (structs, constants, function signatures) come from the
/// read-only [`TypeContext`]; only locals and literals get fresh type
/// variables in `store`.
pub struct TypeInferencer<'ctx> {
    pub store: TypeStore,
    ctx: &'ctx TypeContext,
    symbols: SymbolTable,
    current_return_type: Option<TypeId>,
}

type InferResult<T> = Result<T, Diagnostic>;

impl<'ctx> TypeInferencer<'ctx> {
    pub fn new(ctx: &'ctx TypeContext) -> Self {
        Self {
            store: TypeStore::new(),
            ctx,
            symbols: SymbolTable::new(),
            current_return_type: None,
        }
    }

    pub fn into_store(self) -> TypeStore {
        self.store
    }

    /// Infers `expr` and unifies it with `expected`, reporting a
    /// `TypeMismatch` at the expression on failure.
    pub fn check_expr(&mut self, expr: &mut Expr, expected: &Type) -> InferResult<TypeId> {
        let found = self.infer_expr(expr)?;
        let expected_id = self.store.new_known(expected.clone());
        self.unify_at(expected_id, found, expr.span)?;
        Ok(expected_id)
    }

    /// Infer types for a function definition
    pub fn infer_function(&mut self, func: &mut Function) -> InferResult<()> {
        let Some(body) = &mut func.body else {
            return Ok(());
        };

        self.symbols.push_scope();
        for param in &func.params {
            let ty = self.store.new_known(param.ty.clone());
            self.symbols.define_var(&param.name, ty);
        }
        let ret = func.return_type.clone().unwrap_or(Type::Void);
        self.current_return_type = Some(self.store.new_known(ret));

        let result = self.infer_block(body);

        self.current_return_type = None;
        self.symbols.pop_scope();
        result
    }

    /// Infer types for a block of statements
    fn infer_block(&mut self, block: &mut Block) -> InferResult<()> {
        self.symbols.push_scope();
        let result = block
            .stmts
            .iter_mut()
            .try_for_each(|stmt| self.infer_stmt(stmt));
        self.symbols.pop_scope();
        result
    }

    /// Infer types for a single statement
    fn infer_stmt(&mut self, stmt: &mut Stmt) -> InferResult<()> {
        match stmt {
            Stmt::VarDecl {
                name,
                annotation,
                inferred,
                init,
                span,
            } => {
                *inferred = match (annotation.as_ref(), init.as_mut()) {
                    (Some(ann), Some(init_expr)) => self.check_expr(init_expr, ann)?,
                    (None, Some(init_expr)) => self.infer_expr(init_expr)?,
                    // Declaration without initializer -> just use annotation
                    (Some(ann), None) => self.store.new_known(ann.clone()),
                    (None, None) => {
                        return Err(Diagnostic::TypeError {
                            message: format!(
                                "variable `{name}` declared without type annotation or initializer"
                            ),
                            span: *span,
                        });
                    }
                };
                self.symbols.define_var(name, *inferred);
            }

            Stmt::Expr(expr) => {
                self.infer_expr(expr)?;
            }

            Stmt::Return(value, span) => {
                let Some(ret_ty) = self.current_return_type else {
                    return Err(Diagnostic::TypeError {
                        message: "return statement outside of function".into(),
                        span: *span,
                    });
                };
                match value {
                    Some(expr) => {
                        let expr_ty = self.infer_expr(expr)?;
                        self.unify_at(ret_ty, expr_ty, expr.span)?;
                    }
                    // Void return - check if function expects void
                    None => {
                        let void_ty = self.store.new_known(Type::Void);
                        self.unify_at(ret_ty, void_ty, *span)?;
                    }
                }
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond, &Type::Bool)?;
                self.infer_block(then_branch)?;
                if let Some(else_b) = else_branch {
                    self.infer_block(else_b)?;
                }
            }

            Stmt::While { cond, body } => {
                self.check_expr(cond, &Type::Bool)?;
                self.infer_block(body)?;
            }
        }
        Ok(())
    }

    /// Infer types for an expression
    pub fn infer_expr(&mut self, expr: &mut Expr) -> InferResult<TypeId> {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Identifier(name) => {
                if let Some(var_ty) = self.symbols.lookup_var(name) {
                    var_ty
                } else if let Some(decl) = self.ctx.const_decl(name) {
                    self.store.new_known(decl.ty.clone())
                } else {
                    return Err(Diagnostic::UnresolvedName {
                        name: name.clone(),
                        span,
                    });
                }
            }

            ExprKind::Literal(lit) => match lit {
                // Literal numbers stay open until something pins them down
                Literal::Int(_) => self.store.new_var(VarKind::Integral),
                Literal::Float(_) => self.store.new_var(VarKind::Floating),
                Literal::Bool(_) => self.store.new_known(Type::Bool),
                Literal::Char(_) => self.store.new_known(Type::Char),
                Literal::String(_) => self.store.new_known(Type::CString),
                Literal::Null => self.store.new_known(Type::Ptr(Box::new(Type::Void))),
            },

            ExprKind::Call { callee, args } => self.infer_call(callee, args, span)?,

            ExprKind::UnaryOp { op, expr: operand } => {
                let operand_ty = self.infer_expr(operand)?;
                match op {
                    UnaryOperator::Neg => {
                        self.require(operand_ty, Type::is_numeric, "-", span)?;
                        operand_ty
                    }
                    UnaryOperator::Not => {
                        self.require(operand_ty, |t| *t == Type::Bool || t.is_integer(), "!", span)?;
                        operand_ty
                    }
                    UnaryOperator::BitNot => {
                        self.require(operand_ty, Type::is_integer, "~", span)?;
                        operand_ty
                    }
                    UnaryOperator::AddressOf => {
                        let Some(resolved) = self.store.resolve_or_default(operand_ty) else {
                            return Err(Diagnostic::TypeError {
                                message: "cannot take the address of a value of unknown type"
                                    .into(),
                                span,
                            });
                        };
                        self.store.new_known(Type::Ptr(Box::new(resolved)))
                    }
                    UnaryOperator::Dereference => match self.store.resolve(operand_ty) {
                        Ok(Type::Ptr(inner)) => self.store.new_known(*inner),
                        _ => {
                            return Err(Diagnostic::TypeError {
                                message: format!(
                                    "type `{}` cannot be dereferenced",
                                    self.store.describe(operand_ty)
                                ),
                                span,
                            });
                        }
                    },
                }
            }

            ExprKind::BinaryOp { op, left, right } => {
                let op = *op;
                let left_ty = self.infer_expr(left)?;
                let right_ty = self.infer_expr(right)?;
                let right_span = right.span;
                self.infer_binary(op, left_ty, right_ty, span, right_span)?
            }

            ExprKind::Assign { op, left, right } => {
                if !matches!(
                    left.kind,
                    ExprKind::Identifier(_)
                        | ExprKind::UnaryOp {
                            op: UnaryOperator::Dereference,
                            ..
                        }
                ) {
                    return Err(Diagnostic::TypeError {
                        message: "invalid left-hand side of assignment".into(),
                        span: left.span,
                    });
                }
                let left_ty = self.infer_expr(left)?;
                let right_ty = self.infer_expr(right)?;
                match op.binary() {
                    Some(bin) => {
                        self.infer_binary(bin, left_ty, right_ty, span, right.span)?;
                    }
                    None => self.unify_at(left_ty, right_ty, right.span)?,
                }
                self.store.new_known(Type::Void)
            }

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(cond, &Type::Bool)?;
                let then_ty = self.infer_expr(then_branch)?;
                let else_ty = self.infer_expr(else_branch)?;
                self.unify_at(then_ty, else_ty, else_branch.span)?;
                then_ty
            }

            ExprKind::StructLiteral { name, fields, rest } => {
                let ctx = self.ctx;
                let Some(def) = ctx.struct_def(name) else {
                    return Err(Diagnostic::UnresolvedName {
                        name: name.clone(),
                        span,
                    });
                };
                self.infer_struct_literal(def, fields, *rest, span)?
            }
        };

        expr.ty = ty;
        Ok(ty)
    }

    fn infer_call(&mut self, callee: &str, args: &mut [Expr], span: Span) -> InferResult<TypeId> {
        let (params, ret) = if let Some(sig) = self.ctx.signature(callee) {
            (sig.params.clone(), sig.ret.clone())
        } else if let Some(def) = self.ctx.tuple_constructor(callee) {
            if def.is_generic() {
                return Err(Diagnostic::TypeError {
                    message: format!("cannot construct generic struct `{callee}` here"),
                    span,
                });
            }
            let params = def.fields.iter().map(|f| f.ty.clone()).collect();
            (params, Type::Named(def.name.clone()))
        } else {
            return Err(Diagnostic::UnresolvedName {
                name: callee.to_string(),
                span,
            });
        };

        if args.len() != params.len() {
            return Err(Diagnostic::TypeError {
                message: format!(
                    "`{callee}` takes {} argument(s) but {} were supplied",
                    params.len(),
                    args.len()
                ),
                span,
            });
        }
        for (arg, param_ty) in args.iter_mut().zip(&params) {
            self.check_expr(arg, param_ty)?;
        }
        Ok(self.store.new_known(ret))
    }

    fn infer_binary(
        &mut self,
        op: BinaryOperator,
        left_ty: TypeId,
        right_ty: TypeId,
        span: Span,
        right_span: Span,
    ) -> InferResult<TypeId> {
        let sym = op.as_str();
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let bool_ty = self.store.new_known(Type::Bool);
                self.unify_at(bool_ty, left_ty, span)?;
                self.unify_at(bool_ty, right_ty, right_span)?;
                Ok(bool_ty)
            }
            _ if op.is_comparison() => {
                self.unify_at(left_ty, right_ty, right_span)?;
                Ok(self.store.new_known(Type::Bool))
            }
            BinaryOperator::Shl | BinaryOperator::Shr => {
                // The shift amount keeps its own integer type
                self.require(left_ty, Type::is_integer, sym, span)?;
                self.require(right_ty, Type::is_integer, sym, right_span)?;
                Ok(left_ty)
            }
            BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor => {
                self.unify_at(left_ty, right_ty, right_span)?;
                self.require(left_ty, |t| *t == Type::Bool || t.is_integer(), sym, span)?;
                Ok(left_ty)
            }
            _ => {
                self.unify_at(left_ty, right_ty, right_span)?;
                self.require(left_ty, Type::is_numeric, sym, span)?;
                Ok(left_ty)
            }
        }
    }

    fn infer_struct_literal(
        &mut self,
        def: &StructDefinition,
        fields: &mut [FieldInit],
        rest: Option<Span>,
        span: Span,
    ) -> InferResult<TypeId> {
        if def.is_generic() {
            return Err(Diagnostic::TypeError {
                message: format!("struct literals of generic struct `{}` are not supported", def.name),
                span,
            });
        }
        if def.kind == StructKind::Tuple {
            return Err(Diagnostic::TypeError {
                message: format!("tuple struct `{}` is constructed with `{}(..)`", def.name, def.name),
                span,
            });
        }

        for i in 0..fields.len() {
            let (name, init_span) = (fields[i].name.clone(), fields[i].span);
            let Some(field) = def.field_named(&name) else {
                return Err(Diagnostic::TypeError {
                    message: format!("struct `{}` has no field named `{name}`", def.name),
                    span: init_span,
                });
            };
            if fields[..i].iter().any(|prev| prev.name == name) {
                return Err(Diagnostic::TypeError {
                    message: format!("field `{name}` specified more than once"),
                    span: init_span,
                });
            }
            self.check_expr(&mut fields[i].value, &field.ty)?;
        }

        let omitted: Vec<&FieldIdent> = def
            .fields
            .iter()
            .map(|f| &f.ident)
            .filter(|ident| !fields.iter().any(|init| ident.to_string() == init.name))
            .collect();
        match rest {
            None if !omitted.is_empty() => {
                let names: Vec<String> = omitted.iter().map(|i| format!("`{i}`")).collect();
                return Err(Diagnostic::TypeError {
                    message: format!(
                        "missing field(s) {} in initializer of `{}`",
                        names.join(", "),
                        def.name
                    ),
                    span,
                });
            }
            Some(rest_span) => {
                for ident in omitted {
                    let has_default = def.field(ident).is_some_and(|f| f.default.is_some());
                    if !has_default {
                        return Err(Diagnostic::TypeError {
                            message: format!(
                                "field `{ident}` of `{}` has no default value for `..`",
                                def.name
                            ),
                            span: rest_span,
                        });
                    }
                }
            }
            None => {}
        }

        Ok(self.store.new_known(Type::Named(def.name.clone())))
    }

    /// Checks that `id` can still be a type accepted by `accepts`.
    fn require(
        &self,
        id: TypeId,
        accepts: impl Fn(&Type) -> bool,
        op: &str,
        span: Span,
    ) -> InferResult<()> {
        match self.store.resolve_or_default(id) {
            Some(ty) if !accepts(&ty) => Err(Diagnostic::TypeError {
                message: format!("cannot apply `{op}` to type `{ty}`"),
                span,
            }),
            _ => Ok(()),
        }
    }

    /// Unify two type IDs
    fn unify_at(&mut self, expected: TypeId, found: TypeId, span: Span) -> InferResult<()> {
        self.store
            .unify(expected, found)
            .map_err(|e| Diagnostic::TypeMismatch {
                expected: e.expected,
                found: e.found,
                span,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ast::Program;
    use crate::codegen::parser::Parser;
    use crate::codegen::type_ast::FieldDefault;

    fn setup(source: &str) -> (Program, TypeContext) {
        let program = Parser::new(0, source).parse_program().expect("parses");
        let (ctx, diagnostics) = TypeContext::new(&program);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        (program, ctx)
    }

    fn first_default(program: &Program) -> Expr {
        match &program.structs[0].fields[0].default {
            Some(FieldDefault::Parsed(expr)) => expr.clone(),
            other => panic!("expected parsed default, got {other:?}"),
        }
    }

    #[test]
    fn integer_literal_takes_field_type() {
        let (program, ctx) = setup("struct W { width: Uint16 = 600 + 40 }");
        let mut expr = first_default(&program);
        let mut inferencer = TypeInferencer::new(&ctx);
        inferencer.check_expr(&mut expr, &Type::Uint16).expect("checks");
        let ExprKind::BinaryOp { left, .. } = &expr.kind else {
            panic!("expected binary op");
        };
        assert_eq!(inferencer.store.resolve(left.ty), Ok(Type::Uint16));
    }

    #[test]
    fn string_for_integer_is_a_mismatch() {
        let (program, ctx) = setup("struct W { width: Uint8 = \"wide\" }");
        let mut expr = first_default(&program);
        let err = TypeInferencer::new(&ctx)
            .check_expr(&mut expr, &Type::Uint8)
            .unwrap_err();
        assert_eq!(
            err,
            Diagnostic::TypeMismatch {
                expected: "Uint8".into(),
                found: "CString".into(),
                span: expr.span,
            }
        );
    }

    #[test]
    fn no_implicit_widening() {
        let (program, ctx) = setup(
            "const SMALL: Uint8 = 1;\nstruct W { width: Uint16 = SMALL }",
        );
        let mut expr = first_default(&program);
        let err = TypeInferencer::new(&ctx)
            .check_expr(&mut expr, &Type::Uint16)
            .unwrap_err();
        assert!(matches!(err, Diagnostic::TypeMismatch { .. }));
    }

    #[test]
    fn struct_literal_rules() {
        let (program, ctx) = setup(
            "struct P { x: Int = 1, y: Int }\n\
             struct Q { a: P = P { x: 2, .. } }",
        );
        let Some(FieldDefault::Parsed(expr)) = &program.structs[1].fields[0].default else {
            panic!("expected parsed default");
        };
        let err = TypeInferencer::new(&ctx)
            .check_expr(&mut expr.clone(), &Type::Named("P".into()))
            .unwrap_err();
        assert!(
            matches!(&err, Diagnostic::TypeError { message, .. } if message.contains("`y`")),
            "{err:?}"
        );
    }

    #[test]
    fn function_bodies_are_checked() {
        let program = Parser::new(
            0,
            "const function f(x: Int): Bool { var y = x + 1; return y; }",
        )
        .parse_program()
        .expect("parses");
        let (_, diagnostics) = TypeContext::new(&program);
        assert!(matches!(
            diagnostics.as_slice(),
            [Diagnostic::TypeMismatch { expected, found, .. }] if expected == "Bool" && found == "Int"
        ));
    }
}
