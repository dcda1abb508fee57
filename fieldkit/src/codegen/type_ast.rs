use crate::codegen::ast::Expr;
use crate::diagnostics::Span;

use super::types::Type;

use std::fmt;

/// `#[name]` or `#[name(arg, ...)]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructKind {
    /// `struct Name { a: T, ... }`
    Named,
    /// `struct Name(T, ...);`
    Tuple,
    /// `struct Name;`
    Unit,
}

/// Identity of a field: its name, or its position in a tuple struct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldIdent {
    Named(String),
    Index(usize),
}

impl FieldIdent {
    /// Member name used in generated C.
    pub fn c_name(&self) -> String {
        match self {
            FieldIdent::Named(name) => name.clone(),
            FieldIdent::Index(index) => format!("_{index}"),
        }
    }
}

impl fmt::Display for FieldIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldIdent::Named(name) => f.write_str(name),
            FieldIdent::Index(index) => write!(f, "{index}"),
        }
    }
}

/// The raw `= expr` suffix of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldDefault {
    Parsed(Expr),
    /// The text after `=` did not parse. The parse error has already been
    /// reported at `eq_span`.
    Malformed { eq_span: Span },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub ident: FieldIdent,
    pub ty: Type,
    /// Attributes written on the field; lint levels among them also govern
    /// the field's default expression.
    pub attributes: Vec<Attribute>,
    pub visibility: Visibility,
    pub default: Option<FieldDefault>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDefinition {
    pub name: String,
    pub generics: Vec<String>,
    pub kind: StructKind,
    pub fields: Vec<FieldDefinition>,
    pub attributes: Vec<Attribute>,
    pub visibility: Visibility,
    pub span: Span,
}

impl StructDefinition {
    /// Whether the struct carries `#[derive(.., trait_name, ..)]`.
    pub fn derives(&self, trait_name: &str) -> bool {
        self.attributes
            .iter()
            .any(|attr| attr.name == "derive" && attr.args.iter().any(|a| a == trait_name))
    }

    pub fn field(&self, ident: &FieldIdent) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| &f.ident == ident)
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| matches!(&f.ident, FieldIdent::Named(n) if n == name))
    }

    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }
}
