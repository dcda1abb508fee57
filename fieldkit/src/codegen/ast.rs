use crate::codegen::type_ast::StructDefinition;
use crate::codegen::types::*;
use crate::diagnostics::{Diagnostic, Span};

/// Represents a C header inclusion.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Include {
    /// Path to the header file (e.g., "stdio.h").
    pub path: String,
}

/// How a function may be used from constant contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnQualifier {
    /// `const function`: callable from field defaults and other constants.
    Const,
    /// `extern function`: body lives outside Kit; never constant.
    Extern,
    /// Plain `function`.
    Plain,
}

/// Represents a function definition in Kit.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    /// Function name.
    pub name: String,
    pub qualifier: FnQualifier,
    /// List of function parameters.
    pub params: Vec<Param>,
    /// Return type (`None` for void functions).
    pub return_type: Option<Type>,
    /// Function body; `None` for `extern` declarations.
    pub body: Option<Block>,
    pub span: Span,
}

impl Function {
    pub fn is_const(&self) -> bool {
        self.qualifier == FnQualifier::Const
    }
}

/// Represents a function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
}

/// A top-level `const NAME: Type = expr;` item.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Type,
    pub value: Expr,
    pub span: Span,
}

/// Represents a block of statements (e.g., function body or scope block).
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// List of statements in the block.
    pub stmts: Vec<Stmt>,
}

/// Represents a statement in Kit.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Variable declaration (with optional type annotation and initializer).
    VarDecl {
        /// Variable name.
        name: String,
        /// Type annotation (`None` for type inference).
        annotation: Option<Type>,
        /// Type settled by inference.
        inferred: TypeId,
        /// Initializer expression (`None` for uninitialized).
        init: Option<Expr>,
        span: Span,
    },
    /// Expression statement.
    Expr(Expr),
    /// Return statement (with optional return value).
    Return(Option<Expr>, Span),
    /// If-else statement.
    If {
        /// The condition to evaluate.
        cond: Expr,
        /// The block to execute if the condition is true.
        then_branch: Block,
        /// The block to execute if the condition is false.
        else_branch: Option<Block>,
    },
    /// While loop statement.
    While {
        /// The condition to evaluate.
        cond: Expr,
        /// The block to execute as long as the condition is true.
        body: Block,
    },
}

/// An expression together with its source span and the type inference
/// assigned to it (`TypeId::default()` until inference runs).
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: TypeId,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: TypeId::default(),
        }
    }
}

/// One `name: value` entry of a struct literal.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Variable, constant or function identifier.
    Identifier(String),
    /// Literal value.
    Literal(Literal),
    /// Function call, or construction of a tuple struct.
    Call {
        /// Name of the callee function.
        callee: String,
        /// Arguments passed to the function.
        args: Vec<Expr>,
    },
    /// Unary operation.
    UnaryOp {
        /// The unary operator.
        op: UnaryOperator,
        /// The operand expression.
        expr: Box<Expr>,
    },
    /// Binary operation.
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Assignment operation.
    Assign {
        op: AssignmentOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// If-then-else expression.
    If {
        /// The condition to evaluate.
        cond: Box<Expr>,
        /// The expression to evaluate if the condition is true.
        then_branch: Box<Expr>,
        /// The expression to evaluate if the condition is false.
        else_branch: Box<Expr>,
    },
    /// `Name { field: value, .. }`. `rest` is the span of a trailing `..`,
    /// which fills omitted fields from their default values.
    StructLiteral {
        name: String,
        fields: Vec<FieldInit>,
        rest: Option<Span>,
    },
}

/// Represents literal values in Kit.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// Integer literal; its type is settled by inference.
    Int(i128),
    /// Floating-point literal.
    Float(f64),
    /// String literal (without quotes).
    String(String),
    /// Character literal.
    Char(char),
    /// Boolean literal.
    Bool(bool),
    /// Null pointer literal.
    Null,
}

/// A fully parsed Kit program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    /// C header inclusions required by the program.
    pub includes: Vec<Include>,
    pub structs: Vec<StructDefinition>,
    pub consts: Vec<ConstDecl>,
    /// Top-level function definitions.
    pub functions: Vec<Function>,
    /// Errors the parser recovered from (malformed field defaults).
    pub diagnostics: Vec<Diagnostic>,
}

impl Program {
    /// Appends the items of another file's program.
    pub fn merge(&mut self, other: Program) {
        self.includes.extend(other.includes);
        self.structs.extend(other.structs);
        self.consts.extend(other.consts);
        self.functions.extend(other.functions);
        self.diagnostics.extend(other.diagnostics);
    }
}
