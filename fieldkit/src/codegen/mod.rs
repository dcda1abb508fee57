//! The `codegen` module turns parsed Kit sources into checked field
//! default tables, synthesized default constructors and C code.

pub mod ast;
pub mod parser;
pub mod type_ast;
pub use ast::{Block, ConstDecl, Expr, ExprKind, Function, Include, Literal, Param, Program, Stmt};
pub use type_ast::{Attribute, FieldDefault, FieldDefinition, FieldIdent, StructDefinition};

/// Parses Kit source files, runs the analysis pipeline and generates C
/// code from the result.
pub mod frontend;

/// Kit types, their C representation, and the operators of the
/// expression language.
pub mod types;

/// Scoped local-variable table used during type inference.
pub mod symbols;

/// Type inference engine using Hindley-Milner algorithm.
pub mod inference;

/// Program-wide read-only view of structs, constants and functions.
pub mod context;

/// Constant-fragment check and compile-time evaluation.
pub mod consteval;

/// Per-struct table of validated field defaults.
pub mod defaults;

/// `#[derive(Default)]` constructor synthesis.
pub mod derive;
