use crate::Rule;
use crate::error::CompilationError;

use pest::iterators::Pair;
use thiserror::Error;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identity handle for a type in `TypeStore`.
///
/// Types need stable identity for inference - we can't use the enum alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl Default for TypeId {
    fn default() -> Self {
        Self(u32::MAX)
    }
}

/// Identity handle for a type variable (unknown type during inference).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeVarId(u32);

/// What an unbound type variable may still become.
///
/// Integer literals start as `Integral` variables so that `640` can become
/// a `Uint16` while `"640"` cannot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Any,
    Integral,
    Floating,
}

impl VarKind {
    fn accepts(self, ty: &Type) -> bool {
        match self {
            VarKind::Any => true,
            VarKind::Integral => ty.is_integer(),
            VarKind::Floating => ty.is_float(),
        }
    }

    fn merge(self, other: VarKind) -> Option<VarKind> {
        match (self, other) {
            (VarKind::Any, k) | (k, VarKind::Any) => Some(k),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

/// Represents a type variable used during inference.
///
/// Type variables start unbound and may later be bound to a `TypeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeVar {
    binding: Option<TypeId>,
    kind: VarKind,
}

/// Two types that could not be made to agree.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("expected `{expected}`, found `{found}`")]
pub struct UnifyError {
    pub expected: String,
    pub found: String,
}

/// Central type storage for type inference.
///
/// All type mutations go through here, making inference predictable.
#[derive(Debug, Clone, Default)]
pub struct TypeStore {
    nodes: Vec<TypeNode>,
    type_vars: Vec<TypeVar>,
}

#[derive(Debug, Clone)]
enum TypeNode {
    /// Fully known Kit type
    Known(Type),
    /// Inference-only placeholder
    Unknown(TypeVarId),
}

impl TypeStore {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            type_vars: Vec::new(),
        }
    }

    /// Create a new known type from a Type enum.
    pub fn new_known(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode::Known(ty));
        id
    }

    /// Create a new unknown type (type variable) for inference.
    pub fn new_unknown(&mut self) -> TypeId {
        self.new_var(VarKind::Any)
    }

    /// Create a type variable restricted to `kind`.
    pub fn new_var(&mut self, kind: VarKind) -> TypeId {
        let var_id = TypeVarId(self.type_vars.len() as u32);
        self.type_vars.push(TypeVar {
            binding: None,
            kind,
        });
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode::Unknown(var_id));
        id
    }

    /// Bind a type variable to a specific type ID.
    fn bind_type_var(&mut self, var_id: TypeVarId, ty: TypeId) -> Result<(), String> {
        let Some(existing) = self.type_vars.get_mut(var_id.0 as usize) else {
            return Err(format!("Type variable {var_id:?} does not exist"));
        };
        if let Some(binding) = existing.binding {
            return Err(format!(
                "Type variable {var_id:?} already bound to {binding:?}"
            ));
        }
        existing.binding = Some(ty);
        Ok(())
    }

    /// Resolve a `TypeId` to its concrete Type.
    ///
    /// Follows type variable bindings. Returns error if any type variables remain unbound.
    pub fn resolve(&self, id: TypeId) -> Result<Type, String> {
        let rep = self.find_rep(id);
        match self.nodes.get(rep.0 as usize) {
            Some(TypeNode::Known(ty)) => Ok(ty.clone()),
            Some(TypeNode::Unknown(var_id)) => Err(format!(
                "Cannot resolve type ID {id:?}: type variable {var_id:?} is unbound"
            )),
            None => Err(format!("Type ID {id:?} does not exist")),
        }
    }

    /// Like [`TypeStore::resolve`], but unbound literal variables fall back to
    /// `Int` and `Float`.
    pub fn resolve_or_default(&self, id: TypeId) -> Option<Type> {
        let rep = self.find_rep(id);
        match self.nodes.get(rep.0 as usize)? {
            TypeNode::Known(ty) => Some(ty.clone()),
            TypeNode::Unknown(var_id) => match self.var(*var_id)?.kind {
                VarKind::Integral => Some(Type::Int),
                VarKind::Floating => Some(Type::Float),
                VarKind::Any => None,
            },
        }
    }

    /// Human-readable form of a possibly unresolved type.
    pub fn describe(&self, id: TypeId) -> String {
        let rep = self.find_rep(id);
        match self.nodes.get(rep.0 as usize) {
            Some(TypeNode::Known(ty)) => ty.to_string(),
            Some(TypeNode::Unknown(var_id)) => match self.var(*var_id).map(|v| v.kind) {
                Some(VarKind::Integral) => "{integer}".to_string(),
                Some(VarKind::Floating) => "{float}".to_string(),
                _ => "_".to_string(),
            },
            None => "<invalid>".to_string(),
        }
    }

    fn var(&self, var_id: TypeVarId) -> Option<&TypeVar> {
        self.type_vars.get(var_id.0 as usize)
    }

    /// Follow bindings to find the representative `TypeId`.
    pub fn find_rep(&self, mut id: TypeId) -> TypeId {
        loop {
            match self.nodes.get(id.0 as usize) {
                Some(TypeNode::Unknown(var_id)) => match self.var(*var_id) {
                    Some(TypeVar {
                        binding: Some(next_id),
                        ..
                    }) => id = *next_id,
                    _ => return id, // Unbound
                },
                _ => return id, // Known
            }
        }
    }

    /// Unify two type IDs (the core inference algorithm).
    ///
    /// Makes two types agree by either binding unknowns or comparing known
    /// types structurally. `expected` and `found` only matter for the error.
    pub fn unify(&mut self, expected: TypeId, found: TypeId) -> Result<(), UnifyError> {
        let rep_a = self.find_rep(expected);
        let rep_b = self.find_rep(found);

        if rep_a == rep_b {
            return Ok(());
        }

        let mismatch = |store: &Self| UnifyError {
            expected: store.describe(rep_a),
            found: store.describe(rep_b),
        };

        let node_a = self.nodes[rep_a.0 as usize].clone();
        let node_b = self.nodes[rep_b.0 as usize].clone();
        let bound = match (node_a, node_b) {
            (TypeNode::Unknown(va), TypeNode::Unknown(vb)) => {
                let (Some(a), Some(b)) = (self.var(va), self.var(vb)) else {
                    return Err(mismatch(self));
                };
                let Some(kind) = a.kind.merge(b.kind) else {
                    return Err(mismatch(self));
                };
                self.type_vars[vb.0 as usize].kind = kind;
                self.bind_type_var(va, rep_b)
            }
            (TypeNode::Unknown(var_id), TypeNode::Known(ty)) => {
                if !self.var(var_id).is_some_and(|v| v.kind.accepts(&ty)) {
                    return Err(mismatch(self));
                }
                self.bind_type_var(var_id, rep_b)
            }
            (TypeNode::Known(ty), TypeNode::Unknown(var_id)) => {
                if !self.var(var_id).is_some_and(|v| v.kind.accepts(&ty)) {
                    return Err(mismatch(self));
                }
                self.bind_type_var(var_id, rep_a)
            }
            // Both Known -> structural comparison
            (TypeNode::Known(ty_a), TypeNode::Known(ty_b)) => {
                if Self::unify_types(&ty_a, &ty_b) {
                    Ok(())
                } else {
                    Err(String::new())
                }
            }
        };
        bound.map_err(|_| mismatch(self))
    }

    /// Structural agreement of two known types. No implicit widening: an
    /// `Int8` is never a `Int16`. The only coercion is `null`'s `Ptr[Void]`.
    fn unify_types(a: &Type, b: &Type) -> bool {
        match (a, b) {
            (Type::Ptr(t1), Type::Ptr(t2)) => {
                **t1 == Type::Void || **t2 == Type::Void || Self::unify_types(t1, t2)
            }
            _ => a == b,
        }
    }
}

/// Represents a type in the Kit language.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// User-defined struct type, referenced by name.
    Named(String),
    /// Generic parameter of the enclosing struct.
    Param(String),
    /// Pointer type (e.g., `Ptr(Int)` represents `int*`).
    Ptr(Box<Type>),
    /// 8-bit signed integer (`int8_t` in C).
    Int8,
    /// 16-bit signed integer (`int16_t` in C).
    Int16,
    /// 32-bit signed integer (`int32_t` in C).
    Int32,
    /// 64-bit signed integer (`int64_t` in C).
    Int64,
    /// 8-bit unsigned integer (`uint8_t` in C).
    Uint8,
    /// 16-bit unsigned integer (`uint16_t` in C).
    Uint16,
    /// 32-bit unsigned integer (`uint32_t` in C).
    Uint32,
    /// 64-bit unsigned integer (`uint64_t` in C).
    Uint64,
    /// 32-bit floating point (`float` in C).
    Float32,
    /// 64-bit floating point (`double` in C).
    Float64,
    /// Platform integer (`int` in C), treated as 32 bits.
    Int,
    /// Single-precision floating point (`float` in C).
    Float,
    /// Platform-dependent size type (`size_t` in C), treated as 64 bits.
    Size,
    /// Character type (`char` in C).
    Char,
    /// Boolean type (`bool` from <stdbool.h> in C).
    Bool,
    /// C-style null-terminated string (`char*` in C).
    CString,
    /// Represents a void type (e.g., for functions with no return value).
    Void,
}

impl Type {
    pub fn from_kit(name: &str) -> Self {
        match name {
            "Int8" => Type::Int8,
            "Int16" => Type::Int16,
            "Int32" => Type::Int32,
            "Int64" => Type::Int64,
            "Uint8" => Type::Uint8,
            "Uint16" => Type::Uint16,
            "Uint32" => Type::Uint32,
            "Uint64" => Type::Uint64,
            "Float32" => Type::Float32,
            "Float64" => Type::Float64,
            "Int" => Type::Int,
            "Float" => Type::Float,
            "Size" => Type::Size,
            "Char" => Type::Char,
            "Bool" => Type::Bool,
            "CString" => Type::CString,
            "Void" => Type::Void,
            _ => Type::Named(name.to_string()),
        }
    }

    pub fn is_integer(&self) -> bool {
        self.int_bounds().is_some()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float32 | Type::Float64 | Type::Float)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 | Type::Int
        )
    }

    /// Bit width of integer types.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Int8 | Type::Uint8 => Some(8),
            Type::Int16 | Type::Uint16 => Some(16),
            Type::Int32 | Type::Uint32 | Type::Int => Some(32),
            Type::Int64 | Type::Uint64 | Type::Size => Some(64),
            _ => None,
        }
    }

    /// Inclusive value range of integer types.
    pub fn int_bounds(&self) -> Option<(i128, i128)> {
        let bits = self.bit_width()?;
        if self.is_signed() {
            let max = (1i128 << (bits - 1)) - 1;
            Some((-max - 1, max))
        } else {
            Some((0, (1i128 << bits) - 1))
        }
    }

    /// Wraps `value` into the range of this integer type.
    pub fn wrap(&self, value: i128) -> i128 {
        let Some(bits) = self.bit_width() else {
            return value;
        };
        let modulus = 1i128 << bits;
        let wrapped = value.rem_euclid(modulus);
        if self.is_signed() && wrapped >= modulus / 2 {
            wrapped - modulus
        } else {
            wrapped
        }
    }

    pub fn contains_param(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Ptr(inner) => inner.contains_param(),
            _ => false,
        }
    }

    /// Turns names that refer to one of `params` into [`Type::Param`].
    pub fn substitute_params(self, params: &[String]) -> Type {
        match self {
            Type::Named(name) if params.contains(&name) => Type::Param(name),
            Type::Ptr(inner) => Type::Ptr(Box::new(inner.substitute_params(params))),
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Named(name) | Type::Param(name) => f.write_str(name),
            Type::Ptr(inner) => write!(f, "Ptr[{inner}]"),
            Type::Int8 => f.write_str("Int8"),
            Type::Int16 => f.write_str("Int16"),
            Type::Int32 => f.write_str("Int32"),
            Type::Int64 => f.write_str("Int64"),
            Type::Uint8 => f.write_str("Uint8"),
            Type::Uint16 => f.write_str("Uint16"),
            Type::Uint32 => f.write_str("Uint32"),
            Type::Uint64 => f.write_str("Uint64"),
            Type::Float32 => f.write_str("Float32"),
            Type::Float64 => f.write_str("Float64"),
            Type::Int => f.write_str("Int"),
            Type::Float => f.write_str("Float"),
            Type::Size => f.write_str("Size"),
            Type::Char => f.write_str("Char"),
            Type::Bool => f.write_str("Bool"),
            Type::CString => f.write_str("CString"),
            Type::Void => f.write_str("Void"),
        }
    }
}

/// The C spelling of a type plus the headers it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CRepr {
    pub name: String,
    pub headers: BTreeSet<String>,
}

pub trait ToCRepr {
    fn to_c_repr(&self) -> CRepr;
}

impl ToCRepr for Type {
    fn to_c_repr(&self) -> CRepr {
        match self {
            Type::Int8 => simple_c_type("int8_t", &["stdint.h"]),
            Type::Int16 => simple_c_type("int16_t", &["stdint.h"]),
            Type::Int32 => simple_c_type("int32_t", &["stdint.h"]),
            Type::Int64 => simple_c_type("int64_t", &["stdint.h"]),
            Type::Uint8 => simple_c_type("uint8_t", &["stdint.h"]),
            Type::Uint16 => simple_c_type("uint16_t", &["stdint.h"]),
            Type::Uint32 => simple_c_type("uint32_t", &["stdint.h"]),
            Type::Uint64 => simple_c_type("uint64_t", &["stdint.h"]),
            Type::Float32 | Type::Float => simple_c_type("float", &[]),
            Type::Float64 => simple_c_type("double", &[]),
            Type::Int => simple_c_type("int", &[]),
            Type::Size => simple_c_type("size_t", &["stddef.h"]),
            Type::Char => simple_c_type("char", &[]),
            Type::Bool => simple_c_type("bool", &["stdbool.h"]),
            Type::CString => simple_c_type("char*", &[]),
            Type::Void => simple_c_type("void", &[]),
            Type::Ptr(inner) => {
                let mut inner_repr = inner.to_c_repr();
                // `NULL` lives in stddef.h
                inner_repr.headers.insert("<stddef.h>".to_string());
                CRepr {
                    name: format!("{}*", inner_repr.name),
                    headers: inner_repr.headers,
                }
            }
            Type::Named(name) => CRepr {
                name: format!("struct {name}"),
                headers: BTreeSet::new(),
            },
            Type::Param(name) => CRepr {
                name: format!("/* {name} */ void*"),
                headers: BTreeSet::new(),
            },
        }
    }
}

fn simple_c_type(name: &str, headers: &[&str]) -> CRepr {
    CRepr {
        name: name.to_string(),
        headers: headers.iter().map(|h| format!("<{h}>")).collect(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less than or equal
    Le,
    /// Greater than or equal
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    /// Shift Left
    Shl,
    /// Shift Right
    Shr,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
        }
    }

    /// Verb used in overflow messages ("attempt to add with overflow").
    pub fn verb(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "subtract",
            BinaryOperator::Mul => "multiply",
            BinaryOperator::Div => "divide",
            BinaryOperator::Mod => "calculate the remainder",
            BinaryOperator::Shl => "shift left",
            BinaryOperator::Shr => "shift right",
            _ => "compute",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Le
                | BinaryOperator::Ge
        )
    }

    pub fn from_rule_pair(pair: &Pair<Rule>) -> Result<Self, CompilationError> {
        match pair.as_rule() {
            Rule::additive_op => match pair.as_str() {
                "+" => Ok(BinaryOperator::Add),
                "-" => Ok(BinaryOperator::Sub),
                _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
            },
            Rule::multiplicative_op => match pair.as_str() {
                "*" => Ok(BinaryOperator::Mul),
                "/" => Ok(BinaryOperator::Div),
                "%" => Ok(BinaryOperator::Mod),
                _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
            },
            Rule::eq_op => match pair.as_str() {
                "==" => Ok(BinaryOperator::Eq),
                "!=" => Ok(BinaryOperator::Ne),
                _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
            },
            Rule::comp_op => match pair.as_str() {
                "<" => Ok(BinaryOperator::Lt),
                ">" => Ok(BinaryOperator::Gt),
                "<=" => Ok(BinaryOperator::Le),
                ">=" => Ok(BinaryOperator::Ge),
                _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
            },
            Rule::and_ops => Ok(BinaryOperator::And),
            Rule::logical_or_op => Ok(BinaryOperator::Or),
            Rule::bitwise_and_op => Ok(BinaryOperator::BitAnd),
            Rule::bitwise_or_op => Ok(BinaryOperator::BitOr),
            Rule::bitwise_xor_op => Ok(BinaryOperator::BitXor),
            Rule::shift_op => match pair.as_str() {
                "<<" => Ok(BinaryOperator::Shl),
                ">>" => Ok(BinaryOperator::Shr),
                _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
            },
            _ => Err(CompilationError::InvalidOperator(format!(
                "{:?}",
                pair.as_rule()
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
    BitNot,
    AddressOf,
    Dereference,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "!",
            UnaryOperator::BitNot => "~",
            UnaryOperator::AddressOf => "&",
            UnaryOperator::Dereference => "*",
        }
    }
}

impl FromStr for UnaryOperator {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-" => Ok(UnaryOperator::Neg),
            "!" => Ok(UnaryOperator::Not),
            "~" => Ok(UnaryOperator::BitNot),
            "*" => Ok(UnaryOperator::Dereference),
            // AddressOf is its own grammar rule
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssignmentOperator {
    /// Simple assignment
    Assign,
    /// Add assignment (+=)
    AddAssign,
    /// Subtract assignment (-=)
    SubAssign,
    /// Multiply assignment (*=)
    MulAssign,
    /// Divide assignment (/=)
    DivAssign,
    /// Modulo assignment (%=)
    ModAssign,
    /// Bitwise and assignment (&=)
    AndAssign,
    /// Bitwise or assignment (|=)
    OrAssign,
    /// Bitwise xor assignment (^=)
    XorAssign,
    /// Shift left assignment (<<=)
    ShlAssign,
    /// Shift right assignment (>>=)
    ShrAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary(&self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubAssign => Some(BinaryOperator::Sub),
            AssignmentOperator::MulAssign => Some(BinaryOperator::Mul),
            AssignmentOperator::DivAssign => Some(BinaryOperator::Div),
            AssignmentOperator::ModAssign => Some(BinaryOperator::Mod),
            AssignmentOperator::AndAssign => Some(BinaryOperator::BitAnd),
            AssignmentOperator::OrAssign => Some(BinaryOperator::BitOr),
            AssignmentOperator::XorAssign => Some(BinaryOperator::BitXor),
            AssignmentOperator::ShlAssign => Some(BinaryOperator::Shl),
            AssignmentOperator::ShrAssign => Some(BinaryOperator::Shr),
        }
    }

    pub fn from_rule_pair(pair: &Pair<Rule>) -> Result<Self, CompilationError> {
        match pair.as_str() {
            "=" => Ok(AssignmentOperator::Assign),
            "+=" => Ok(AssignmentOperator::AddAssign),
            "-=" => Ok(AssignmentOperator::SubAssign),
            "*=" => Ok(AssignmentOperator::MulAssign),
            "/=" => Ok(AssignmentOperator::DivAssign),
            "%=" => Ok(AssignmentOperator::ModAssign),
            "&=" => Ok(AssignmentOperator::AndAssign),
            "|=" => Ok(AssignmentOperator::OrAssign),
            "^=" => Ok(AssignmentOperator::XorAssign),
            "<<=" => Ok(AssignmentOperator::ShlAssign),
            ">>=" => Ok(AssignmentOperator::ShrAssign),
            _ => Err(CompilationError::InvalidOperator(pair.as_str().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_literal_unifies_with_any_integer_type() {
        let mut store = TypeStore::new();
        let lit = store.new_var(VarKind::Integral);
        let field = store.new_known(Type::Uint16);
        assert!(store.unify(field, lit).is_ok());
        assert_eq!(store.resolve(lit), Ok(Type::Uint16));
    }

    #[test]
    fn integer_literal_rejects_text() {
        let mut store = TypeStore::new();
        let lit = store.new_var(VarKind::Integral);
        let text = store.new_known(Type::CString);
        let err = store.unify(text, lit).unwrap_err();
        assert_eq!(err.expected, "CString");
        assert_eq!(err.found, "{integer}");
    }

    #[test]
    fn no_implicit_widening() {
        let mut store = TypeStore::new();
        let a = store.new_known(Type::Uint8);
        let b = store.new_known(Type::Uint16);
        assert!(store.unify(a, b).is_err());
    }

    #[test]
    fn null_pointer_unifies_with_any_pointer() {
        let mut store = TypeStore::new();
        let field = store.new_known(Type::Ptr(Box::new(Type::Int)));
        let null = store.new_known(Type::Ptr(Box::new(Type::Void)));
        assert!(store.unify(field, null).is_ok());
    }

    #[test]
    fn unbound_literals_default() {
        let mut store = TypeStore::new();
        let int = store.new_var(VarKind::Integral);
        let float = store.new_var(VarKind::Floating);
        let any = store.new_unknown();
        assert_eq!(store.resolve_or_default(int), Some(Type::Int));
        assert_eq!(store.resolve_or_default(float), Some(Type::Float));
        assert_eq!(store.resolve_or_default(any), None);
    }

    #[test]
    fn wrap_and_bounds() {
        assert_eq!(Type::Uint8.int_bounds(), Some((0, 255)));
        assert_eq!(Type::Int8.int_bounds(), Some((-128, 127)));
        assert_eq!(Type::Uint8.wrap(256), 0);
        assert_eq!(Type::Int8.wrap(128), -128);
        assert_eq!(Type::Uint16.wrap(-1), 65535);
    }
}
