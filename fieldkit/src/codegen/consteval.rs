//! Constant expressions.
//!
//! A field default (or a `const` item) is accepted in three steps: a
//! syntactic walk that rejects anything outside the constant fragment, a
//! type check against the declared type, and folding to a [`ConstValue`]
//! under the lint scope of the item being checked.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use log::trace;

use super::ast::{Block, ConstDecl, Expr, ExprKind, FieldInit, FnQualifier, Function, Literal, Stmt};
use super::context::TypeContext;
use super::defaults::ValidatedDefault;
use super::inference::TypeInferencer;
use super::type_ast::{Attribute, FieldDefault, FieldIdent, StructDefinition};
use super::types::{AssignmentOperator, BinaryOperator, Type, TypeStore, UnaryOperator};
use crate::diagnostics::{Diagnostic, Span};
use crate::lint::{Lint, LintEmitter};

/// Upper bound on evaluation steps for one constant.
pub const MAX_STEPS: u64 = 1_000_000;
/// Upper bound on nested `const function` calls.
pub const MAX_CALL_DEPTH: usize = 64;

/// A folded compile-time value.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    /// Any integer, already in range of its type.
    Int(i128),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
    /// Result of an assignment or a function without a return value.
    Unit,
    /// Fields in declaration order.
    Struct {
        name: String,
        fields: Vec<(FieldIdent, ConstValue)>,
    },
}

impl ConstValue {
    /// The value a primitive type's default-value capability produces.
    /// Struct types have no zero value of their own; see
    /// [`crate::codegen::derive::SynthesizedConstructor::instantiate`].
    pub fn zero_of(ty: &Type) -> Option<Self> {
        match ty {
            t if t.is_integer() => Some(ConstValue::Int(0)),
            t if t.is_float() => Some(ConstValue::Float(0.0)),
            Type::Bool => Some(ConstValue::Bool(false)),
            Type::Char => Some(ConstValue::Char('\0')),
            Type::CString => Some(ConstValue::Str(String::new())),
            _ => None,
        }
    }

    pub fn field(&self, ident: &FieldIdent) -> Option<&ConstValue> {
        match self {
            ConstValue::Struct { fields, .. } => {
                fields.iter().find(|(i, _)| i == ident).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Shorthand for `field(&FieldIdent::Named(name))`.
    pub fn get(&self, name: &str) -> Option<&ConstValue> {
        self.field(&FieldIdent::Named(name.to_string()))
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
            ConstValue::Char(c) => write!(f, "{c:?}"),
            ConstValue::Str(s) => write!(f, "{s:?}"),
            ConstValue::Null => f.write_str("null"),
            ConstValue::Unit => f.write_str("()"),
            ConstValue::Struct { name, fields } => {
                let tuple = matches!(fields.first(), Some((FieldIdent::Index(_), _)));
                if tuple {
                    write!(f, "{name}(")?;
                    for (i, (_, value)) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{value}")?;
                    }
                    f.write_str(")")
                } else if fields.is_empty() {
                    f.write_str(name)
                } else {
                    write!(f, "{name} {{ ")?;
                    for (i, (ident, value)) in fields.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{ident}: {value}")?;
                    }
                    f.write_str(" }")
                }
            }
        }
    }
}

/// Checks that `expr` only uses constant operations, stopping at the first
/// violation in source order.
pub fn check_const_fragment(ctx: &TypeContext, expr: &Expr) -> Result<(), Diagnostic> {
    FragmentChecker::new(ctx).expr(expr)
}

/// Checks the body of a `const function` against the same rules as a
/// default expression. Locals and parameters may be read and assigned.
pub fn check_const_function(ctx: &TypeContext, func: &Function) -> Result<(), Diagnostic> {
    let Some(body) = &func.body else {
        return Ok(());
    };
    let mut checker = FragmentChecker::new(ctx);
    checker.locals = func.params.iter().map(|p| p.name.clone()).collect();
    checker.in_function = true;
    checker.block(body)
}

struct FragmentChecker<'a> {
    ctx: &'a TypeContext,
    locals: Vec<String>,
    in_function: bool,
}

impl<'a> FragmentChecker<'a> {
    fn new(ctx: &'a TypeContext) -> Self {
        Self {
            ctx,
            locals: Vec::new(),
            in_function: false,
        }
    }

    fn block(&mut self, block: &Block) -> Result<(), Diagnostic> {
        let mark = self.locals.len();
        let result = block.stmts.iter().try_for_each(|stmt| self.stmt(stmt));
        self.locals.truncate(mark);
        result
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::VarDecl { name, init, .. } => {
                if let Some(init) = init {
                    self.expr(init)?;
                }
                self.locals.push(name.clone());
                Ok(())
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr), _) => self.expr(expr),
            Stmt::Return(None, _) => Ok(()),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                self.block(then_branch)?;
                else_branch.as_ref().map_or(Ok(()), |b| self.block(b))
            }
            Stmt::While { cond, body } => {
                self.expr(cond)?;
                self.block(body)
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        let not_constant = |reason: String| Diagnostic::NotConstant {
            reason,
            expr_span: expr.span,
        };
        match &expr.kind {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Identifier(name) => {
                if self.locals.contains(name) || self.ctx.const_decl(name).is_some() {
                    Ok(())
                } else if self.ctx.signature(name).is_some() {
                    Err(not_constant(format!("function `{name}` used as a value")))
                } else {
                    Err(Diagnostic::UnresolvedName {
                        name: name.clone(),
                        span: expr.span,
                    })
                }
            }
            ExprKind::Call { callee, args } => {
                match self.ctx.signature(callee).map(|sig| sig.qualifier) {
                    Some(FnQualifier::Const) => {}
                    Some(FnQualifier::Extern) => {
                        return Err(not_constant(format!(
                            "call to extern function `{callee}` cannot be evaluated at compile time"
                        )));
                    }
                    Some(FnQualifier::Plain) => {
                        return Err(not_constant(format!(
                            "call to non-const function `{callee}`"
                        )));
                    }
                    None if self.ctx.tuple_constructor(callee).is_some() => {}
                    None => {
                        return Err(Diagnostic::UnresolvedName {
                            name: callee.clone(),
                            span: expr.span,
                        });
                    }
                }
                args.iter().try_for_each(|arg| self.expr(arg))
            }
            ExprKind::UnaryOp { op, expr: operand } => match op {
                UnaryOperator::AddressOf => Err(not_constant(
                    "taking the address of a value is not allowed in constants".into(),
                )),
                UnaryOperator::Dereference => Err(not_constant(
                    "dereferencing a pointer is not allowed in constants".into(),
                )),
                _ => self.expr(operand),
            },
            ExprKind::BinaryOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            ExprKind::Assign { left, right, .. } => match &left.kind {
                ExprKind::Identifier(name) if self.in_function && self.locals.contains(name) => {
                    self.expr(right)
                }
                _ => Err(not_constant(
                    "assignment is not allowed in constant expressions".into(),
                )),
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                self.expr(then_branch)?;
                self.expr(else_branch)
            }
            ExprKind::StructLiteral { name, fields, .. } => {
                if self.ctx.struct_def(name).is_none() {
                    return Err(Diagnostic::UnresolvedName {
                        name: name.clone(),
                        span: expr.span,
                    });
                }
                fields.iter().try_for_each(|init| self.expr(&init.value))
            }
        }
    }
}

/// Accepts or rejects default expressions and `const` items.
pub struct ConstValidator<'a> {
    ctx: &'a TypeContext,
}

impl<'a> ConstValidator<'a> {
    pub fn new(ctx: &'a TypeContext) -> Self {
        Self { ctx }
    }

    /// Validates the default `expr` of `field` against `expected`.
    ///
    /// `attrs` are pushed as a lint scope for the whole check, so a lint
    /// the field allows is also allowed inside its default.
    pub fn validate(
        &self,
        field: &FieldIdent,
        expr: &Expr,
        expected: &Type,
        attrs: &[Attribute],
        lints: &mut LintEmitter,
    ) -> Result<ValidatedDefault, Diagnostic> {
        lints.scoped(attrs, |lints| -> Result<ValidatedDefault, Diagnostic> {
            let (typed, store) = self.check(expr, expected)?;
            let value = Evaluator::new(self.ctx, lints).eval_root(&typed, &store)?;
            trace!("default of `{field}` folded to {value}");
            Ok(ValidatedDefault {
                field: field.clone(),
                expr: typed,
                ty: expected.clone(),
                value,
                span: expr.span,
            })
        })
    }

    /// Validates a `const` item and returns its value.
    pub fn validate_const(
        &self,
        decl: &ConstDecl,
        lints: &mut LintEmitter,
    ) -> Result<ConstValue, Diagnostic> {
        let (typed, store) = self.check(&decl.value, &decl.ty)?;
        let mut evaluator = Evaluator::new(self.ctx, lints);
        evaluator.stack.push(decl.name.clone());
        evaluator.eval_root(&typed, &store)
    }

    /// Steps 1 and 2: constant fragment, then type.
    fn check(&self, expr: &Expr, expected: &Type) -> Result<(Expr, TypeStore), Diagnostic> {
        check_const_fragment(self.ctx, expr)?;
        let mut typed = expr.clone();
        let mut inferencer = TypeInferencer::new(self.ctx);
        inferencer.check_expr(&mut typed, expected)?;
        Ok((typed, inferencer.into_store()))
    }
}

enum Flow {
    Normal,
    Return(ConstValue),
}

/// Locals of one `const function` call.
struct Frame {
    scopes: Vec<HashMap<String, Option<ConstValue>>>,
}

impl Frame {
    fn lookup(&self, name: &str) -> Option<&Option<ConstValue>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Option<ConstValue>> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

/// Folds type-checked expressions to values.
///
/// Evaluation is strictly left to right. Referenced `const` items are
/// derived from their definitions once per root evaluation and `..`
/// defaults every time they are used. Nothing outlives one root
/// evaluation, so a result does not depend on what was processed before
/// it. Lints raised while re-deriving are not reported again.
struct Evaluator<'a, 'l> {
    ctx: &'a TypeContext,
    lints: &'l mut LintEmitter,
    steps: u64,
    frames: Vec<Frame>,
    /// Constants and field defaults being evaluated, for cycle detection.
    stack: Vec<String>,
    /// `const` items already folded during this evaluation.
    consts: HashMap<String, ConstValue>,
    quiet: usize,
}

type EvalResult = Result<ConstValue, Diagnostic>;

fn failed(message: impl Into<String>, span: Span) -> Diagnostic {
    Diagnostic::EvaluationFailed {
        message: message.into(),
        span,
    }
}

impl<'a, 'l> Evaluator<'a, 'l> {
    fn new(ctx: &'a TypeContext, lints: &'l mut LintEmitter) -> Self {
        Self {
            ctx,
            lints,
            steps: 0,
            frames: Vec::new(),
            stack: Vec::new(),
            consts: HashMap::new(),
            quiet: 0,
        }
    }

    fn eval_root(&mut self, expr: &Expr, store: &TypeStore) -> EvalResult {
        self.eval(expr, store)
    }

    fn lint(&mut self, lint: Lint, message: String, span: Span) {
        if self.quiet == 0 && self.frames.is_empty() {
            self.lints.emit(lint, message, span);
        }
    }

    fn step(&mut self, span: Span) -> Result<(), Diagnostic> {
        self.steps += 1;
        if self.steps > MAX_STEPS {
            return Err(failed(
                format!("exceeded the limit of {MAX_STEPS} evaluation steps"),
                span,
            ));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr, store: &TypeStore) -> EvalResult {
        self.step(expr.span)?;
        let ty = store.resolve_or_default(expr.ty);
        match &expr.kind {
            ExprKind::Literal(lit) => self.literal(lit, ty.as_ref(), expr.span),
            ExprKind::Identifier(name) => self.identifier(name, expr.span),
            ExprKind::Call { callee, args } => self.call(callee, args, store, expr.span),
            ExprKind::UnaryOp { op, expr: operand } => {
                self.unary(*op, operand, ty.as_ref(), store, expr.span)
            }
            ExprKind::BinaryOp { op, left, right } => {
                let lhs = self.eval(left, store)?;
                // Short-circuit like the runtime would
                match (op, &lhs) {
                    (BinaryOperator::And, ConstValue::Bool(false)) => return Ok(lhs),
                    (BinaryOperator::Or, ConstValue::Bool(true)) => return Ok(lhs),
                    _ => {}
                }
                let rhs = self.eval(right, store)?;
                self.binary(*op, lhs, rhs, ty.as_ref(), expr.span)
            }
            ExprKind::Assign { op, left, right } => self.assign(*op, left, right, store),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, store)? {
                ConstValue::Bool(true) => self.eval(then_branch, store),
                ConstValue::Bool(false) => self.eval(else_branch, store),
                other => Err(failed(format!("`if` condition is not a bool: {other}"), cond.span)),
            },
            ExprKind::StructLiteral { name, fields, rest } => {
                self.struct_literal(name, fields, *rest, store, expr.span)
            }
        }
    }

    fn literal(&mut self, lit: &Literal, ty: Option<&Type>, span: Span) -> EvalResult {
        match lit {
            Literal::Int(value) => self.int_literal(*value, ty, span),
            Literal::Float(value) => Ok(ConstValue::Float(round_float(*value, ty))),
            Literal::Bool(b) => Ok(ConstValue::Bool(*b)),
            Literal::Char(c) => Ok(ConstValue::Char(*c)),
            Literal::String(s) => Ok(ConstValue::Str(s.clone())),
            Literal::Null => Ok(ConstValue::Null),
        }
    }

    /// Like arithmetic overflow, an out-of-range literal is a hard error
    /// inside `const function` bodies and an `overflowing_literals` lint
    /// everywhere else.
    fn int_literal(&mut self, value: i128, ty: Option<&Type>, span: Span) -> EvalResult {
        if let Some(ty) = ty
            && let Some((lo, hi)) = ty.int_bounds()
            && !(lo..=hi).contains(&value)
        {
            let message =
                format!("literal out of range for `{ty}`: `{value}` does not fit in `{lo}..={hi}`");
            if !self.frames.is_empty() {
                return Err(failed(message, span));
            }
            self.lint(Lint::OverflowingLiterals, message, span);
            return Ok(ConstValue::Int(ty.wrap(value)));
        }
        Ok(ConstValue::Int(value))
    }

    fn identifier(&mut self, name: &str, span: Span) -> EvalResult {
        if let Some(slot) = self.frames.last().and_then(|frame| frame.lookup(name)) {
            return slot
                .clone()
                .ok_or_else(|| failed(format!("use of uninitialized variable `{name}`"), span));
        }
        if let Some(value) = self.consts.get(name) {
            return Ok(value.clone());
        }
        let ctx = self.ctx;
        let Some(decl) = ctx.const_decl(name) else {
            return Err(Diagnostic::UnresolvedName {
                name: name.to_string(),
                span,
            });
        };
        let value = self.rederive(name.to_string(), &decl.value, &decl.ty, span)?;
        self.consts.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Validates and folds another definition's expression on demand.
    fn rederive(&mut self, key: String, expr: &Expr, ty: &Type, span: Span) -> EvalResult {
        if self.stack.contains(&key) {
            return Err(failed(format!("cycle detected when evaluating `{key}`"), span));
        }
        check_const_fragment(self.ctx, expr)?;
        let mut typed = expr.clone();
        let mut inferencer = TypeInferencer::new(self.ctx);
        inferencer.check_expr(&mut typed, ty)?;
        let store = inferencer.into_store();

        self.stack.push(key);
        self.quiet += 1;
        let frames = std::mem::take(&mut self.frames);
        let result = self.eval(&typed, &store);
        self.frames = frames;
        self.quiet -= 1;
        self.stack.pop();
        result
    }

    fn call(&mut self, callee: &str, args: &[Expr], store: &TypeStore, span: Span) -> EvalResult {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, store)?);
        }

        let ctx = self.ctx;
        if let Some(def) = ctx.tuple_constructor(callee) {
            let fields = def.fields.iter().map(|f| f.ident.clone()).zip(values).collect();
            return Ok(ConstValue::Struct {
                name: def.name.clone(),
                fields,
            });
        }

        let Some(func) = ctx.function_body(callee).filter(|f| f.is_const()) else {
            return Err(failed(format!("`{callee}` is not a const function"), span));
        };
        let Some(body) = &func.body else {
            return Err(failed(format!("`{callee}` has no body"), span));
        };
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(failed(
                format!("reached the call depth limit of {MAX_CALL_DEPTH} while evaluating `{callee}`"),
                span,
            ));
        }

        let params = func
            .params
            .iter()
            .map(|p| p.name.clone())
            .zip(values.into_iter().map(Some))
            .collect();
        self.frames.push(Frame {
            scopes: vec![params],
        });
        let flow = self.block(body, ctx.fn_store());
        self.frames.pop();

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(ConstValue::Unit),
        }
    }

    fn block(&mut self, block: &Block, store: &TypeStore) -> Result<Flow, Diagnostic> {
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.push(HashMap::new());
        }
        let mut flow = Ok(Flow::Normal);
        for stmt in &block.stmts {
            flow = self.stmt(stmt, store);
            if !matches!(flow, Ok(Flow::Normal)) {
                break;
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.scopes.pop();
        }
        flow
    }

    fn stmt(&mut self, stmt: &Stmt, store: &TypeStore) -> Result<Flow, Diagnostic> {
        match stmt {
            Stmt::VarDecl { name, init, .. } => {
                let value = init.as_ref().map(|e| self.eval(e, store)).transpose()?;
                if let Some(scope) = self.frames.last_mut().and_then(|f| f.scopes.last_mut()) {
                    scope.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, store)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value, _) => {
                let value = match value {
                    Some(expr) => self.eval(expr, store)?,
                    None => ConstValue::Unit,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, store)? {
                ConstValue::Bool(true) => self.block(then_branch, store),
                ConstValue::Bool(false) => match else_branch {
                    Some(else_b) => self.block(else_b, store),
                    None => Ok(Flow::Normal),
                },
                other => Err(failed(format!("`if` condition is not a bool: {other}"), cond.span)),
            },
            Stmt::While { cond, body } => loop {
                self.step(cond.span)?;
                match self.eval(cond, store)? {
                    ConstValue::Bool(true) => {}
                    ConstValue::Bool(false) => break Ok(Flow::Normal),
                    other => {
                        break Err(failed(
                            format!("`while` condition is not a bool: {other}"),
                            cond.span,
                        ));
                    }
                }
                if let Flow::Return(value) = self.block(body, store)? {
                    break Ok(Flow::Return(value));
                }
            },
        }
    }

    fn assign(
        &mut self,
        op: AssignmentOperator,
        left: &Expr,
        right: &Expr,
        store: &TypeStore,
    ) -> EvalResult {
        let ExprKind::Identifier(name) = &left.kind else {
            return Err(failed("assignment to a non-local place", left.span));
        };
        let rhs = self.eval(right, store)?;
        let value = match op.binary() {
            Some(bin) => {
                let current = self.identifier(name, left.span)?;
                let ty = store.resolve_or_default(left.ty);
                self.binary(bin, current, rhs, ty.as_ref(), left.span)?
            }
            None => rhs,
        };
        match self.frames.last_mut().and_then(|f| f.lookup_mut(name)) {
            Some(slot) => {
                *slot = Some(value);
                Ok(ConstValue::Unit)
            }
            None => Err(failed(format!("cannot assign to `{name}`"), left.span)),
        }
    }

    fn unary(
        &mut self,
        op: UnaryOperator,
        operand: &Expr,
        ty: Option<&Type>,
        store: &TypeStore,
        span: Span,
    ) -> EvalResult {
        if op == UnaryOperator::Neg
            && let Some(ty) = ty
            && ty.is_integer()
            && !ty.is_signed()
        {
            return Err(Diagnostic::TypeError {
                message: format!("cannot apply unary operator `-` to type `{ty}`"),
                span,
            });
        }

        // `-128` is one literal for range purposes, not `-(128)`
        if op == UnaryOperator::Neg
            && let ExprKind::Literal(Literal::Int(value)) = operand.kind
        {
            self.step(operand.span)?;
            return self.int_literal(-value, ty, span);
        }

        let value = self.eval(operand, store)?;
        match (op, value) {
            (UnaryOperator::Neg, ConstValue::Int(v)) => {
                self.checked_int(-v, ty, span, || "negate".to_string())
            }
            (UnaryOperator::Neg, ConstValue::Float(v)) => Ok(ConstValue::Float(-v)),
            (UnaryOperator::Not, ConstValue::Bool(b)) => Ok(ConstValue::Bool(!b)),
            (UnaryOperator::Not | UnaryOperator::BitNot, ConstValue::Int(v)) => {
                let ty = ty.cloned().unwrap_or(Type::Int);
                Ok(ConstValue::Int(ty.wrap(!v)))
            }
            (op, value) => Err(failed(
                format!("cannot apply `{}` to `{value}`", op.as_str()),
                span,
            )),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        lhs: ConstValue,
        rhs: ConstValue,
        ty: Option<&Type>,
        span: Span,
    ) -> EvalResult {
        match (lhs, rhs) {
            (ConstValue::Int(a), ConstValue::Int(b)) => self.int_binary(op, a, b, ty, span),
            (ConstValue::Float(a), ConstValue::Float(b)) => {
                if op.is_comparison() {
                    return compare(op, a.partial_cmp(&b), span);
                }
                let value = match op {
                    BinaryOperator::Add => a + b,
                    BinaryOperator::Sub => a - b,
                    BinaryOperator::Mul => a * b,
                    BinaryOperator::Div => a / b,
                    BinaryOperator::Mod => a % b,
                    _ => return Err(failed(format!("cannot apply `{}` to floats", op.as_str()), span)),
                };
                Ok(ConstValue::Float(round_float(value, ty)))
            }
            (ConstValue::Bool(a), ConstValue::Bool(b)) => match op {
                BinaryOperator::And | BinaryOperator::BitAnd => Ok(ConstValue::Bool(a & b)),
                BinaryOperator::Or | BinaryOperator::BitOr => Ok(ConstValue::Bool(a | b)),
                BinaryOperator::BitXor => Ok(ConstValue::Bool(a ^ b)),
                _ if op.is_comparison() => compare(op, Some(a.cmp(&b)), span),
                _ => Err(failed(format!("cannot apply `{}` to bools", op.as_str()), span)),
            },
            (ConstValue::Char(a), ConstValue::Char(b)) if op.is_comparison() => {
                compare(op, Some(a.cmp(&b)), span)
            }
            (lhs, rhs) if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) => {
                Ok(ConstValue::Bool((lhs == rhs) == (op == BinaryOperator::Eq)))
            }
            (lhs, rhs) => Err(failed(
                format!("cannot apply `{}` to `{lhs}` and `{rhs}`", op.as_str()),
                span,
            )),
        }
    }

    fn int_binary(
        &mut self,
        op: BinaryOperator,
        a: i128,
        b: i128,
        ty: Option<&Type>,
        span: Span,
    ) -> EvalResult {
        if op.is_comparison() {
            return compare(op, Some(a.cmp(&b)), span);
        }
        let ty = ty.cloned().unwrap_or(Type::Int);
        let raw = match op {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Sub => a.checked_sub(b),
            BinaryOperator::Mul => a.checked_mul(b),
            BinaryOperator::Div if b == 0 => {
                return Err(failed(format!("attempt to divide `{a}` by zero"), span));
            }
            BinaryOperator::Mod if b == 0 => {
                return Err(failed(
                    format!("attempt to calculate the remainder of `{a}` with a divisor of zero"),
                    span,
                ));
            }
            BinaryOperator::Div => a.checked_div(b),
            BinaryOperator::Mod => a.checked_rem(b),
            BinaryOperator::BitAnd => Some(a & b),
            BinaryOperator::BitOr => Some(a | b),
            BinaryOperator::BitXor => Some(a ^ b),
            BinaryOperator::Shl | BinaryOperator::Shr => {
                let bits = i128::from(ty.bit_width().unwrap_or(32));
                if !(0..bits).contains(&b) {
                    self.overflow(op.verb(), span)?;
                }
                // Out-of-range amounts are masked, as in wrapping arithmetic
                let amount = b.rem_euclid(bits) as u32;
                let value = if op == BinaryOperator::Shl {
                    a.wrapping_shl(amount)
                } else {
                    a >> amount
                };
                return Ok(ConstValue::Int(ty.wrap(value)));
            }
            _ => return Err(failed(format!("cannot apply `{}` to integers", op.as_str()), span)),
        };
        let Some(value) = raw else {
            // Past `i128` the low bits still hold the wrapped result
            self.overflow(op.verb(), span)?;
            let wrapped = match op {
                BinaryOperator::Add => a.wrapping_add(b),
                BinaryOperator::Sub => a.wrapping_sub(b),
                BinaryOperator::Mul => a.wrapping_mul(b),
                BinaryOperator::Div => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            };
            return Ok(ConstValue::Int(ty.wrap(wrapped)));
        };
        self.checked_int(value, Some(&ty), span, || op.verb().to_string())
    }

    /// Range-checks an arithmetic result, wrapping it after reporting.
    fn checked_int(
        &mut self,
        value: i128,
        ty: Option<&Type>,
        span: Span,
        verb: impl FnOnce() -> String,
    ) -> EvalResult {
        if let Some(ty) = ty
            && let Some((lo, hi)) = ty.int_bounds()
            && !(lo..=hi).contains(&value)
        {
            self.overflow(&verb(), span)?;
            return Ok(ConstValue::Int(ty.wrap(value)));
        }
        Ok(ConstValue::Int(value))
    }

    /// Overflow is a hard error inside `const function` bodies and an
    /// `arithmetic_overflow` lint everywhere else.
    fn overflow(&mut self, verb: &str, span: Span) -> Result<(), Diagnostic> {
        let message = format!("attempt to {verb} with overflow");
        if !self.frames.is_empty() {
            return Err(failed(message, span));
        }
        self.lint(
            Lint::ArithmeticOverflow,
            format!("this arithmetic operation will overflow: {message}"),
            span,
        );
        Ok(())
    }

    fn struct_literal(
        &mut self,
        name: &str,
        inits: &[FieldInit],
        rest: Option<Span>,
        store: &TypeStore,
        span: Span,
    ) -> EvalResult {
        let ctx = self.ctx;
        let Some(def) = ctx.struct_def(name) else {
            return Err(Diagnostic::UnresolvedName {
                name: name.to_string(),
                span,
            });
        };

        // Written fields first, in source order
        let mut written = Vec::with_capacity(inits.len());
        for init in inits {
            written.push((init.name.as_str(), self.eval(&init.value, store)?));
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let ident_name = field.ident.to_string();
            if let Some(pos) = written.iter().position(|(n, _)| *n == ident_name) {
                let (_, value) = written.swap_remove(pos);
                fields.push((field.ident.clone(), value));
                continue;
            }
            let rest_span = rest.unwrap_or(span);
            let value = self.field_default(def, &field.ident, rest_span)?;
            fields.push((field.ident.clone(), value));
        }

        Ok(ConstValue::Struct {
            name: def.name.clone(),
            fields,
        })
    }

    fn field_default(
        &mut self,
        def: &StructDefinition,
        ident: &FieldIdent,
        span: Span,
    ) -> EvalResult {
        let key = format!("{}.{ident}", def.name);
        match def.field(ident).and_then(|f| f.default.as_ref().map(|d| (f, d))) {
            Some((field, FieldDefault::Parsed(expr))) => {
                self.rederive(key, expr, &field.ty, span)
            }
            Some((_, FieldDefault::Malformed { .. })) => {
                Err(failed(format!("default value of `{key}` contains errors"), span))
            }
            None => Err(failed(format!("field `{key}` has no default value"), span)),
        }
    }
}

fn compare(op: BinaryOperator, ordering: Option<Ordering>, span: Span) -> EvalResult {
    let Some(ordering) = ordering else {
        // NaN compares unequal to everything
        return Ok(ConstValue::Bool(op == BinaryOperator::Ne));
    };
    let result = match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::Ne => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::Le => ordering != Ordering::Greater,
        BinaryOperator::Ge => ordering != Ordering::Less,
        _ => return Err(failed(format!("`{}` is not a comparison", op.as_str()), span)),
    };
    Ok(ConstValue::Bool(result))
}

/// Single-precision types keep single-precision values.
fn round_float(value: f64, ty: Option<&Type>) -> f64 {
    match ty {
        Some(Type::Float32 | Type::Float) => f64::from(value as f32),
        _ => value,
    }
}
