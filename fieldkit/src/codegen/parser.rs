use pest::Parser as PestParser;
use pest::iterators::{Pair, Pairs};

use crate::codegen::types::{BinaryOperator, UnaryOperator};
use crate::diagnostics::{Diagnostic, Span};
use crate::error::{CompilationError, CompileResult};
use crate::{KitParser, Rule, parse_error};

use super::ast::{
    Block, ConstDecl, Expr, ExprKind, FieldInit, FnQualifier, Function, Include, Literal, Param,
    Program, Stmt,
};
use super::type_ast::{
    Attribute, FieldDefault, FieldDefinition, FieldIdent, StructDefinition, StructKind,
    Visibility,
};
use super::types::{AssignmentOperator, Type, TypeId};

use std::path::PathBuf;
use std::str::FromStr;

/// Builds the Kit AST from the pest parse tree of one source file.
#[derive(Default, Debug)]
pub struct Parser {
    file_id: u32,
    current_file: Option<PathBuf>,
    source_content: String,
    /// Byte offset of every line start, for span line/column lookup.
    line_starts: Vec<usize>,
    /// Added to spans while a field default is parsed on its own.
    base_offset: usize,
    /// Generic parameters of the struct being parsed.
    generics: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(file_id: u32, source: impl Into<String>) -> Self {
        let source_content = source.into();
        let line_starts = std::iter::once(0)
            .chain(source_content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            file_id,
            source_content,
            line_starts,
            ..Self::default()
        }
    }

    pub fn with_file(file_id: u32, file: PathBuf) -> CompileResult<Self> {
        let source = std::fs::read_to_string(&file)
            .map_err(|_| CompilationError::UnableToReadSource(file.clone()))?;
        let mut parser = Self::new(file_id, source);
        parser.current_file = Some(file);
        Ok(parser)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let start = start + self.base_offset;
        let end = end + self.base_offset;
        let line = self.line_starts.partition_point(|&s| s <= start).max(1);
        let line_start = self.line_starts.get(line - 1).copied().unwrap_or(0);
        Span::new(self.file_id, start, end, line, start - line_start + 1)
    }

    fn pair_span(&self, pair: &Pair<Rule>) -> Span {
        let span = pair.as_span();
        self.span(span.start(), span.end())
    }

    /// Parses the whole file. Grammar failures outside field defaults are
    /// fatal; malformed defaults are recorded in `Program::diagnostics`.
    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let source = self.source_content.clone();
        let mut pairs = KitParser::parse(Rule::program, &source).map_err(|e| {
            let e = match &self.current_file {
                Some(path) => e.with_path(&path.display().to_string()),
                None => e,
            };
            CompilationError::ParseError(e.to_string())
        })?;
        let root = expect_child(&mut pairs, "program")?;

        let mut program = Program::default();
        for pair in root.into_inner() {
            match pair.as_rule() {
                Rule::include_stmt => program.includes.push(self.parse_include(pair)?),
                Rule::struct_decl => program.structs.push(self.parse_struct(pair)?),
                Rule::const_decl => program.consts.push(self.parse_const(pair)?),
                Rule::function_decl => program.functions.push(self.parse_function(pair)?),
                _ => { /* EOI */ }
            }
        }
        program.diagnostics = std::mem::take(&mut self.diagnostics);
        Ok(program)
    }

    pub fn parse_include(&self, pair: Pair<Rule>) -> CompileResult<Include> {
        // include_stmt = { "include" ~ string ~ ";" }
        let path_literal = expect_child(&mut pair.into_inner(), "include path")?;
        let path_str = path_literal.as_str();

        // Strip the quotes from the string literal
        let path = path_str[1..path_str.len() - 1].to_string();
        Ok(Include { path })
    }

    fn parse_attribute(&self, pair: Pair<Rule>) -> CompileResult<Attribute> {
        // attribute = { "#" ~ "[" ~ identifier ~ attr_args? ~ "]" }
        let span = self.pair_span(&pair);
        let mut inner = pair.into_inner();
        let name = expect_child(&mut inner, "attribute name")?.as_str().to_string();
        let args = inner
            .next()
            .map(|args| args.into_inner().map(|a| a.as_str().to_string()).collect())
            .unwrap_or_default();
        Ok(Attribute { name, args, span })
    }

    fn parse_struct(&mut self, pair: Pair<Rule>) -> CompileResult<StructDefinition> {
        let span = self.pair_span(&pair);
        let mut attributes = Vec::new();
        let mut visibility = Visibility::default();
        let mut name: Option<String> = None;
        let mut generics = Vec::new();
        let mut body: Option<Pair<Rule>> = None;

        for node in pair.into_inner() {
            match node.as_rule() {
                Rule::attribute => attributes.push(self.parse_attribute(node)?),
                Rule::visibility => visibility = parse_visibility(node.as_str()),
                Rule::identifier => name = Some(node.as_str().to_string()),
                Rule::generic_params => {
                    generics = node.into_inner().map(|p| p.as_str().to_string()).collect();
                }
                Rule::named_fields | Rule::positional_fields | Rule::unit_body => body = Some(node),
                _ => {}
            }
        }

        let name = name.ok_or(parse_error!("struct declaration missing a name"))?;
        let body = body.ok_or(parse_error!("struct `{name}` is missing a body"))?;

        let kind = match body.as_rule() {
            Rule::named_fields => StructKind::Named,
            Rule::positional_fields => StructKind::Tuple,
            _ => StructKind::Unit,
        };

        self.generics = generics.clone();
        let fields = body
            .into_inner()
            .enumerate()
            .map(|(index, field)| self.parse_field(field, index))
            .collect::<CompileResult<Vec<_>>>();
        self.generics.clear();

        Ok(StructDefinition {
            name,
            generics,
            kind,
            fields: fields?,
            attributes,
            visibility,
            span,
        })
    }

    fn parse_field(&mut self, pair: Pair<Rule>, index: usize) -> CompileResult<FieldDefinition> {
        // named_field      = { attribute* ~ visibility? ~ identifier ~ ":" ~ type_annotation ~ field_default? }
        // positional_field = { attribute* ~ visibility? ~ type_annotation ~ field_default? }
        let span = self.pair_span(&pair);
        let mut ident = (pair.as_rule() == Rule::positional_field).then_some(FieldIdent::Index(index));
        let mut attributes = Vec::new();
        let mut visibility = Visibility::default();
        let mut ty: Option<Type> = None;
        let mut default: Option<FieldDefault> = None;

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::attribute => attributes.push(self.parse_attribute(child)?),
                Rule::visibility => visibility = parse_visibility(child.as_str()),
                Rule::identifier => ident = Some(FieldIdent::Named(child.as_str().to_string())),
                Rule::type_annotation => {
                    ty = Some(self.parse_type(child)?.substitute_params(&self.generics));
                }
                Rule::field_default => default = Some(self.parse_field_default(child)?),
                _ => {}
            }
        }

        let ident = ident.ok_or(parse_error!("field declaration missing a name"))?;
        let ty = ty.ok_or(parse_error!("field `{ident}` is missing a type"))?;
        Ok(FieldDefinition {
            ident,
            ty,
            attributes,
            visibility,
            default,
            span,
        })
    }

    /// Parses the text after a field's `=` as a standalone expression.
    ///
    /// A failure is recorded as a diagnostic at the `=` token and leaves the
    /// field `Malformed`; it never aborts the surrounding struct.
    fn parse_field_default(&mut self, pair: Pair<Rule>) -> CompileResult<FieldDefault> {
        // field_default = { default_eq ~ default_text }
        let mut inner = pair.into_inner();
        let eq = expect_child(&mut inner, "`=`")?;
        let text = expect_child(&mut inner, "default value")?;
        let eq_span = self.pair_span(&eq);

        let raw = text.as_str().trim_end();
        let parsed = if raw.is_empty() {
            Err("expected an expression after `=`".to_string())
        } else {
            self.parse_default_expr(raw, text.as_span().start())
        };

        match parsed {
            Ok(expr) => Ok(FieldDefault::Parsed(expr)),
            Err(message) => {
                self.diagnostics.push(Diagnostic::ParseError {
                    message,
                    span: eq_span,
                });
                Ok(FieldDefault::Malformed { eq_span })
            }
        }
    }

    fn parse_default_expr(&mut self, text: &str, offset: usize) -> Result<Expr, String> {
        let mut pairs = KitParser::parse(Rule::default_expr_input, text)
            .map_err(|e| e.variant.message().into_owned())?;
        let expr_pair = pairs
            .next()
            .and_then(|input| input.into_inner().find(|p| p.as_rule() == Rule::expr))
            .ok_or_else(|| "expected an expression".to_string())?;

        let saved = std::mem::replace(&mut self.base_offset, offset);
        let expr = self.parse_expr(expr_pair).map_err(|e| e.to_string());
        self.base_offset = saved;
        expr
    }

    fn parse_const(&self, pair: Pair<Rule>) -> CompileResult<ConstDecl> {
        // const_decl = { "const" ~ identifier ~ ":" ~ type_annotation ~ "=" ~ expr ~ ";" }
        let span = self.pair_span(&pair);
        let mut inner = pair.into_inner();
        let name = expect_child(&mut inner, "constant name")?.as_str().to_string();
        let ty = self.parse_type(expect_child(&mut inner, "constant type")?)?;
        let value = self.parse_expr(expect_child(&mut inner, "constant value")?)?;
        Ok(ConstDecl {
            name,
            ty,
            value,
            span,
        })
    }

    pub fn parse_function(&self, pair: Pair<Rule>) -> CompileResult<Function> {
        let span = self.pair_span(&pair);
        let mut qualifier = FnQualifier::Plain;
        let mut name: Option<String> = None;
        let mut params: Vec<Param> = Vec::new();
        let mut return_type: Option<Type> = None;
        let mut body: Option<Block> = None;

        // consume child nodes and match on their rules
        for node in pair.into_inner() {
            match node.as_rule() {
                Rule::function_qualifier => {
                    qualifier = if node.as_str().starts_with("const") {
                        FnQualifier::Const
                    } else {
                        FnQualifier::Extern
                    };
                }
                Rule::identifier => name = Some(node.as_str().to_string()),
                Rule::params => params = self.parse_params(node)?,
                Rule::type_annotation => return_type = Some(self.parse_type(node)?),
                Rule::block => body = Some(self.parse_block(node)?),
                _ => {
                    // skip punctuation/other tokens
                }
            }
        }

        let name = name.ok_or(parse_error!("function declaration missing a name"))?;
        match (qualifier, &body) {
            (FnQualifier::Extern, Some(_)) => {
                return Err(parse_error!("extern function `{name}` cannot have a body"));
            }
            (FnQualifier::Const | FnQualifier::Plain, None) => {
                return Err(parse_error!("function `{name}` is missing a body"));
            }
            _ => {}
        }

        Ok(Function {
            name,
            qualifier,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_params(&self, pair: Pair<Rule>) -> CompileResult<Vec<Param>> {
        // params = { param ~ ("," ~ param )* }
        pair.into_inner()
            .filter(|p: &Pair<Rule>| p.as_rule() == Rule::param)
            .map(|p: Pair<Rule>| {
                let mut inner = p.into_inner();
                let name = expect_child(&mut inner, "parameter name")?.as_str().to_string();
                let ty = self.parse_type(expect_child(&mut inner, "parameter type")?)?;
                Ok(Param { name, ty })
            })
            .collect()
    }

    fn parse_block(&self, pair: Pair<Rule>) -> CompileResult<Block> {
        // block = { "{" ~ (statement)* ~ "}" }
        let stmts = pair
            .into_inner()
            // grammar gives us a wrapper Rule::statement
            .filter(|p: &Pair<Rule>| p.as_rule() == Rule::statement)
            .map(|stmt_pair: Pair<Rule>| {
                let inner = expect_child(&mut stmt_pair.into_inner(), "statement")?;
                match inner.as_rule() {
                    Rule::var_decl => self.parse_var_decl(inner),
                    Rule::expr_stmt => self.parse_expr_stmt(inner),
                    Rule::return_stmt => self.parse_return(inner),
                    Rule::if_stmt => self.parse_if_stmt(inner),
                    Rule::while_stmt => self.parse_while_stmt(inner),
                    other => Err(parse_error!("unexpected statement: {other:?}")),
                }
            })
            .collect::<Result<_, _>>()?; // Collect and propagate errors
        Ok(Block { stmts })
    }

    fn parse_var_decl(&self, pair: Pair<Rule>) -> CompileResult<Stmt> {
        // var_decl = { ("var"|"const") ~ ident ~ (":" ~ type_annotation)? ~ ("=" ~ expr)? ~ ";" }
        let span = self.pair_span(&pair);
        let mut name: Option<String> = None;
        let mut annotation: Option<Type> = None;
        let mut init: Option<Expr> = None;

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::identifier if name.is_none() => {
                    // first identifier is the var name
                    name = Some(child.as_str().to_string());
                }
                Rule::type_annotation => annotation = Some(self.parse_type(child)?),
                Rule::expr => init = Some(self.parse_expr(child)?),
                _ => { /* skip punctuation and the 'var'/'const' keyword */ }
            }
        }

        let name = name.ok_or(parse_error!("var_decl missing identifier"))?;
        Ok(Stmt::VarDecl {
            name,
            annotation,
            inferred: TypeId::default(),
            init,
            span,
        })
    }

    fn parse_type(&self, pair: Pair<Rule>) -> CompileResult<Type> {
        // Get the actual type rule (base_type, pointer_type)
        let inner_rule = expect_child(&mut pair.into_inner(), "type")?;
        match inner_rule.as_rule() {
            Rule::base_type => {
                let base_name = expect_child(&mut inner_rule.into_inner(), "type name")?;
                Ok(Type::from_kit(base_name.as_str().trim()))
            }
            Rule::pointer_type => {
                let pointee = expect_child(&mut inner_rule.into_inner(), "pointee type")?;
                Ok(Type::Ptr(Box::new(self.parse_type(pointee)?)))
            }
            other => Err(parse_error!("Unexpected rule in type_annotation: {other:?}")),
        }
    }

    fn parse_expr_stmt(&self, pair: Pair<Rule>) -> CompileResult<Stmt> {
        // expr_stmt = { expr ~ ";" }
        let expr_pair = expect_child(&mut pair.into_inner(), "expression")?;
        Ok(Stmt::Expr(self.parse_expr(expr_pair)?))
    }

    fn parse_return(&self, pair: Pair<Rule>) -> CompileResult<Stmt> {
        // return_stmt = { return_kw ~ expr? ~ ";" }
        let span = self.pair_span(&pair);
        let expr = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::expr)
            .map(|p| self.parse_expr(p))
            .transpose()?;
        Ok(Stmt::Return(expr, span))
    }

    fn parse_if_stmt(&self, pair: Pair<Rule>) -> CompileResult<Stmt> {
        // if_stmt = { "if" ~ expr ~ block ~ else_part? }
        // else_part = { "else" ~ (block | if_stmt) }
        let mut inner = pair.into_inner();
        let cond = self.parse_expr(expect_child(&mut inner, "if condition")?)?;
        let then_branch = self.parse_block(expect_child(&mut inner, "if body")?)?;

        let mut else_branch = None;
        if let Some(else_pair) = inner.next() {
            let else_content = expect_child(&mut else_pair.into_inner(), "else body")?;
            let else_block = match else_content.as_rule() {
                Rule::block => self.parse_block(else_content)?,
                Rule::if_stmt => Block {
                    stmts: vec![self.parse_if_stmt(else_content)?],
                },
                other => return Err(parse_error!("Unexpected rule in else: {other:?}")),
            };
            else_branch = Some(else_block);
        }

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while_stmt(&self, pair: Pair<Rule>) -> CompileResult<Stmt> {
        // while_stmt = { "while" ~ expr ~ block }
        let mut inner = pair.into_inner();
        let cond = self.parse_expr(expect_child(&mut inner, "while condition")?)?;
        let body = self.parse_block(expect_child(&mut inner, "while body")?)?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_expr(&self, pair: Pair<Rule>) -> CompileResult<Expr> {
        let span = self.pair_span(&pair);
        match pair.as_rule() {
            Rule::expr | Rule::primary => {
                // Wrapper rules have exactly one child
                let inner = expect_child(&mut pair.into_inner(), "expression")?;
                self.parse_expr(inner)
            }
            Rule::assign => self.parse_assign_expr(pair),
            Rule::logical_or
            | Rule::logical_and
            | Rule::equality
            | Rule::comparison
            | Rule::additive
            | Rule::multiplicative
            | Rule::bitwise_or
            | Rule::bitwise_xor
            | Rule::bitwise_and
            | Rule::shift => {
                let mut inner = pair.into_inner();
                let mut left = self.parse_expr(expect_child(&mut inner, "operand")?)?;

                while let Some(op_pair) = inner.next() {
                    let op = BinaryOperator::from_rule_pair(&op_pair)?;
                    let right = self.parse_expr(expect_child(&mut inner, "operand")?)?;
                    let span = join(left.span, right.span);
                    left = Expr::new(
                        ExprKind::BinaryOp {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    );
                }
                Ok(left)
            }
            Rule::unary => {
                let mut inner_pairs = pair.into_inner();
                let first_pair = expect_child(&mut inner_pairs, "unary operand")?;

                let op = match first_pair.as_rule() {
                    Rule::unary_op => {
                        let op_str = first_pair.as_str();
                        UnaryOperator::from_str(op_str)
                            .map_err(|_| parse_error!("invalid unary operation: {op_str}"))?
                    }
                    Rule::ADDRESS_OF_OP => UnaryOperator::AddressOf,
                    Rule::primary => return self.parse_expr(first_pair),
                    other => return Err(parse_error!("Unexpected rule in unary: {other:?}")),
                };
                let expr = self.parse_expr(expect_child(&mut inner_pairs, "unary operand")?)?;
                Ok(Expr::new(
                    ExprKind::UnaryOp {
                        op,
                        expr: Box::new(expr),
                    },
                    span,
                ))
            }
            Rule::identifier => Ok(Expr::new(
                ExprKind::Identifier(pair.as_str().to_string()),
                span,
            )),
            Rule::literal => {
                let literal = self.parse_literal(expect_child(&mut pair.into_inner(), "literal")?)?;
                Ok(Expr::new(ExprKind::Literal(literal), span))
            }
            Rule::string => {
                let full = pair.as_str();
                let inner = &full[1..full.len() - 1];
                let unescaped = unescape(inner).unwrap_or_else(|| inner.to_string());
                Ok(Expr::new(
                    ExprKind::Literal(Literal::String(unescaped)),
                    span,
                ))
            }
            Rule::function_call_expr => {
                let mut inner = pair.into_inner();
                let callee = expect_child(&mut inner, "callee")?.as_str().to_string();
                let args = inner
                    .filter(|p: &Pair<Rule>| p.as_rule() == Rule::expr)
                    .map(|p: Pair<Rule>| self.parse_expr(p))
                    .collect::<Result<Vec<_>, _>>()?; // Collect and propagate errors
                Ok(Expr::new(ExprKind::Call { callee, args }, span))
            }
            Rule::if_expr => {
                let mut inner = pair.into_inner();
                let cond = self.parse_expr(expect_child(&mut inner, "condition")?)?;
                let then_branch = self.parse_expr(expect_child(&mut inner, "then branch")?)?;
                let else_branch = self.parse_expr(expect_child(&mut inner, "else branch")?)?;
                Ok(Expr::new(
                    ExprKind::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                    span,
                ))
            }
            Rule::struct_literal => self.parse_struct_literal(pair),
            other => Err(parse_error!("Unexpected expr rule: {other:?}")),
        }
    }

    fn parse_literal(&self, inner: Pair<Rule>) -> CompileResult<Literal> {
        match inner.as_rule() {
            Rule::number => {
                // Number always has exactly one child (integer/float)
                let num_pair = expect_child(&mut inner.into_inner(), "number")?;
                let s = num_pair.as_str();
                match num_pair.as_rule() {
                    Rule::integer => {
                        let digits = s.replace('_', "");
                        let parsed = match digits.strip_prefix("0x") {
                            Some(hex) => i128::from_str_radix(hex, 16),
                            None => digits.parse::<i128>(),
                        };
                        parsed
                            .map(Literal::Int)
                            .map_err(|e| parse_error!("invalid integer literal '{s}': {e}"))
                    }
                    Rule::float => s
                        .parse::<f64>()
                        .map(Literal::Float)
                        .map_err(|e| parse_error!("invalid float literal '{s}': {e}")),
                    _ => Err(parse_error!("Unexpected number type")),
                }
            }
            Rule::boolean => match inner.as_str() {
                "true" => Ok(Literal::Bool(true)),
                "false" => Ok(Literal::Bool(false)),
                s => Err(parse_error!("invalid boolean literal: {s}")),
            },
            Rule::char_literal => {
                let full = inner.as_str();
                let body = &full[1..full.len() - 1];
                let unescaped = unescape(body).unwrap_or_else(|| body.to_string());
                let mut chars = unescaped.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Literal::Char(c)),
                    _ => Err(parse_error!("invalid char literal: {full}")),
                }
            }
            Rule::null_lit => Ok(Literal::Null),
            other => Err(parse_error!("Unexpected literal type: {other:?}")),
        }
    }

    fn parse_struct_literal(&self, pair: Pair<Rule>) -> CompileResult<Expr> {
        // struct_literal = { type_name ~ "{" ~ (field_init ~ ("," ~ field_init)*)? ~ rest_marker? ~ "}" }
        let span = self.pair_span(&pair);
        let mut inner = pair.into_inner();
        let name = expect_child(&mut inner, "struct name")?.as_str().to_string();
        let mut fields = Vec::new();
        let mut rest = None;

        for node in inner {
            match node.as_rule() {
                Rule::field_init => {
                    let field_span = self.pair_span(&node);
                    let mut parts = node.into_inner();
                    let field = expect_child(&mut parts, "field name")?.as_str().to_string();
                    let value = self.parse_expr(expect_child(&mut parts, "field value")?)?;
                    fields.push(FieldInit {
                        name: field,
                        value,
                        span: field_span,
                    });
                }
                Rule::rest_marker => rest = Some(self.pair_span(&node)),
                _ => {}
            }
        }

        Ok(Expr::new(ExprKind::StructLiteral { name, fields, rest }, span))
    }

    /// Parses an assignment expression (right-associative).
    fn parse_assign_expr(&self, pair: Pair<Rule>) -> CompileResult<Expr> {
        let span = self.pair_span(&pair);
        let mut inner = pair.into_inner();
        // This is always the LHS (logical_or)
        let left = self.parse_expr(expect_child(&mut inner, "assignment target")?)?;

        // `assign = { logical_or ~ ASSIGN_OP ~ assign | logical_or }`: after
        // the LHS we either see ASSIGN_OP or nothing.
        let Some(assign_op_pair) = inner.next() else {
            return Ok(left);
        };
        let op = AssignmentOperator::from_rule_pair(&assign_op_pair)?;
        let right = self.parse_assign_expr(expect_child(&mut inner, "assigned value")?)?;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }
}

fn expect_child<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> CompileResult<Pair<'i, Rule>> {
    pairs.next().ok_or_else(|| parse_error!("expected {what}"))
}

fn parse_visibility(s: &str) -> Visibility {
    if s == "public" {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn join(first: Span, last: Span) -> Span {
    Span {
        end: last.end,
        ..first
    }
}

/// Returns None on a dangling trailing backslash.
fn unescape(s: impl AsRef<str>) -> Option<String> {
    let s = s.as_ref();
    if !s.contains('\\') {
        return Some(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                // For this grammar, `\` escapes any character
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(0, source).parse_program().expect("program parses")
    }

    #[test]
    fn named_fields_with_and_without_defaults() {
        let program = parse("struct Window { width: Uint16 = 640, title: CString }");
        let def = &program.structs[0];
        assert_eq!(def.kind, StructKind::Named);
        assert_eq!(def.fields.len(), 2);
        assert!(matches!(
            &def.fields[0].default,
            Some(FieldDefault::Parsed(Expr { kind: ExprKind::Literal(Literal::Int(640)), .. }))
        ));
        assert_eq!(def.fields[1].default, None);
        assert_eq!(def.fields[1].ty, Type::CString);
    }

    #[test]
    fn positional_fields_with_defaults() {
        let program = parse("struct Pair(Uint8, public Uint8 = 7);");
        let def = &program.structs[0];
        assert_eq!(def.kind, StructKind::Tuple);
        assert_eq!(def.fields[0].ident, FieldIdent::Index(0));
        assert_eq!(def.fields[1].ident, FieldIdent::Index(1));
        assert_eq!(def.fields[1].visibility, Visibility::Public);
        assert!(matches!(def.fields[1].default, Some(FieldDefault::Parsed(_))));
    }

    #[test]
    fn default_text_stops_at_top_level_comma() {
        let program = parse(
            "struct P { a: Int = add(1, 2), b: Int = if true then 1 else 2, c: CString = \"x, y\" }",
        );
        let def = &program.structs[0];
        assert!(program.diagnostics.is_empty());
        assert!(
            def.fields
                .iter()
                .all(|f| matches!(f.default, Some(FieldDefault::Parsed(_))))
        );
    }

    #[test]
    fn malformed_default_is_recovered_at_the_equals_sign() {
        let source = "struct P {\n    a: Int = 1 +,\n    b: Int = 2,\n}";
        let program = parse(source);
        let def = &program.structs[0];
        assert!(matches!(def.fields[0].default, Some(FieldDefault::Malformed { .. })));
        assert!(matches!(def.fields[1].default, Some(FieldDefault::Parsed(_))));

        let [Diagnostic::ParseError { span, .. }] = program.diagnostics.as_slice() else {
            panic!("expected one parse error, got {:?}", program.diagnostics);
        };
        assert_eq!(span.line, 2);
        assert_eq!(&source[span.start..span.end], "=");
    }

    #[test]
    fn empty_default_is_a_parse_error() {
        let program = parse("struct P { a: Int = , b: Int }");
        assert_eq!(program.diagnostics.len(), 1);
        assert!(matches!(
            program.structs[0].fields[0].default,
            Some(FieldDefault::Malformed { .. })
        ));
    }

    #[test]
    fn default_spans_point_into_the_file() {
        let source = "struct P { a: Int = 40 + 2 }";
        let program = parse(source);
        let Some(FieldDefault::Parsed(expr)) = &program.structs[0].fields[0].default else {
            panic!("expected parsed default");
        };
        assert_eq!(&source[expr.span.start..expr.span.end], "40 + 2");
    }

    #[test]
    fn attributes_generics_and_struct_literals() {
        let program = parse(
            "#[derive(Default)]\n\
             struct Wrapper[T] { #[allow(overflowing_literals)] value: T, origin: Point = Point { x: 1, .. } }",
        );
        let def = &program.structs[0];
        assert!(def.derives("Default"));
        assert_eq!(def.generics, vec!["T".to_string()]);
        assert_eq!(def.fields[0].ty, Type::Param("T".into()));
        assert_eq!(def.fields[0].attributes[0].args, vec!["overflowing_literals"]);
        let Some(FieldDefault::Parsed(expr)) = &def.fields[1].default else {
            panic!("expected parsed default");
        };
        assert!(matches!(
            &expr.kind,
            ExprKind::StructLiteral { fields, rest: Some(_), .. } if fields.len() == 1
        ));
    }

    #[test]
    fn functions_and_constants() {
        let program = parse(
            "const LIMIT: Uint16 = 0x1_00;\n\
             extern function rand(): Int;\n\
             const function double(x: Int): Int { return x * 2; }",
        );
        assert_eq!(program.consts[0].name, "LIMIT");
        assert!(matches!(
            program.consts[0].value.kind,
            ExprKind::Literal(Literal::Int(256))
        ));
        assert_eq!(program.functions[0].qualifier, FnQualifier::Extern);
        assert!(program.functions[0].body.is_none());
        assert!(program.functions[1].is_const());
    }
}
