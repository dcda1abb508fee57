use crate::{
    codegen::{
        ast::Program,
        consteval::{self, ConstValidator, ConstValue},
        context::TypeContext,
        defaults::{DefaultSlot, FieldDefaultTable},
        derive::{self, InitKind, SynthesizedConstructor},
        parser::Parser,
        type_ast::{FieldIdent, StructDefinition},
        types::*,
    },
    diagnostics::Diagnostics,
    error::{CompilationError, CompileResult},
    lint::{LintConfig, LintEmitter},
};
use log::{debug, warn};

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Everything the pipeline derived from a program.
#[derive(Debug)]
pub struct Analysis {
    pub program: Program,
    pub context: TypeContext,
    /// One table per struct, in declaration order.
    pub tables: Vec<FieldDefaultTable>,
    /// One constructor per `#[derive(Default)]` struct whose synthesis
    /// succeeded.
    pub constructors: Vec<SynthesizedConstructor>,
    pub diagnostics: Diagnostics,
    /// Lint levels the analysis ran under.
    pub lints: LintConfig,
}

impl Analysis {
    pub fn table(&self, type_name: &str) -> Option<&FieldDefaultTable> {
        self.tables.iter().find(|t| t.type_name() == type_name)
    }

    pub fn constructor(&self, type_name: &str) -> Option<&SynthesizedConstructor> {
        self.constructors.iter().find(|c| c.type_name == type_name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Parses and analyses a single in-memory source.
pub fn analyze_source(source: &str, lints: &LintConfig) -> CompileResult<Analysis> {
    let program = Parser::new(0, source).parse_program()?;
    Ok(analyze_program(program, lints))
}

/// Runs the analysis pipeline: type context, `const` items and functions,
/// one default table per struct, then synthesis for derived structs.
pub fn analyze_program(program: Program, lints: &LintConfig) -> Analysis {
    let mut diagnostics = Diagnostics::from(program.diagnostics.clone());
    let (context, context_diagnostics) = TypeContext::new(&program);
    diagnostics.extend(context_diagnostics);

    let validator = ConstValidator::new(&context);
    for decl in context.consts() {
        let mut emitter = LintEmitter::new(lints.clone());
        match validator.validate_const(decl, &mut emitter) {
            Ok(value) => debug!("const `{}` = {value}", decl.name),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
        diagnostics.extend(emitter.take());
    }
    for func in program.functions.iter().filter(|f| f.is_const()) {
        if let Err(diagnostic) = consteval::check_const_function(&context, func) {
            diagnostics.push(diagnostic);
        }
    }

    let mut tables = Vec::new();
    let mut constructors = Vec::new();
    for def in context.structs() {
        let (table, table_diagnostics) = FieldDefaultTable::build(def, &context, lints);
        diagnostics.extend(table_diagnostics);

        if def.derives("Default") {
            match derive::synthesize(def, &table, &context) {
                Ok(ctor) => constructors.push(ctor),
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        tables.push(table);
    }

    debug!(
        "Analysis finished: {} table(s), {} constructor(s), {} diagnostic(s)",
        tables.len(),
        constructors.len(),
        diagnostics.len()
    );
    Analysis {
        program,
        context,
        tables,
        constructors,
        diagnostics,
        lints: lints.clone(),
    }
}

pub struct Compiler {
    files: Vec<PathBuf>,
    output: PathBuf,
    lints: LintConfig,
}

impl Compiler {
    pub fn new(files: Vec<PathBuf>, output: impl AsRef<Path>) -> Self {
        Self {
            files,
            output: output.as_ref().to_path_buf(),
            lints: LintConfig::default(),
        }
    }

    pub fn with_lints(mut self, lints: LintConfig) -> Self {
        self.lints = lints;
        self
    }

    /// Source files; a `Span::file_id` indexes into this list.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn analyze(&self) -> CompileResult<Analysis> {
        let mut program = Program::default();
        for (file_id, file) in self.files.iter().enumerate() {
            debug!("Parsing {}", file.display());
            let mut parser = Parser::with_file(file_id as u32, file.clone())?;
            program.merge(parser.parse_program()?);
        }
        Ok(analyze_program(program, &self.lints))
    }

    /// Writes the C translation of `analysis` to the output path. Refuses
    /// to emit anything while error-level diagnostics exist.
    pub fn emit(&self, analysis: &Analysis) -> CompileResult<()> {
        let errors = analysis.diagnostics.error_count();
        if errors > 0 {
            return Err(CompilationError::Aborted(errors));
        }
        if self.output.extension().is_some_and(|ext| ext != "c") {
            return Err(CompilationError::InvalidOutputPath);
        }
        let c_code = generate_c_code(analysis)?;
        std::fs::write(&self.output, c_code)?;
        Ok(())
    }

    pub fn compile(&self) -> CompileResult<Analysis> {
        let analysis = self.analyze()?;
        self.emit(&analysis)?;
        Ok(analysis)
    }
}

/// Generates a C translation unit holding the struct definitions and one
/// `struct T T_default(void)` per synthesized constructor.
pub fn generate_c_code(analysis: &Analysis) -> CompileResult<String> {
    let ctx = &analysis.context;
    let mut out = String::new();

    // emit regular includes from the source `include` statements
    for inc in &analysis.program.includes {
        let line = if inc.path.starts_with('<') || inc.path.ends_with(".h>") {
            format!("#include {}\n", inc.path)
        } else {
            format!("#include \"{}\"\n", inc.path.trim_matches('"'))
        };
        out.push_str(&line);
    }

    let structs: Vec<&StructDefinition> = ctx
        .structs()
        .filter(|def| {
            if def.is_generic() {
                warn!("Skipping C emission of generic struct `{}`", def.name);
            }
            !def.is_generic()
        })
        .collect();
    let ordered = dependency_order(ctx, &structs);

    // BTreeSet keeps header order stable
    let mut seen_headers = BTreeSet::new();
    for def in &ordered {
        for field in &def.fields {
            seen_headers.extend(field.ty.to_c_repr().headers);
        }
    }
    for hdr in &seen_headers {
        writeln!(out, "#include {hdr}").ok();
    }
    out.push('\n');

    for def in &ordered {
        writeln!(out, "struct {};", def.name).ok();
    }
    if !ordered.is_empty() {
        out.push('\n');
    }

    for def in &ordered {
        writeln!(out, "struct {} {{", def.name).ok();
        if def.fields.is_empty() {
            // C forbids empty structs
            out.push_str("    char _empty;\n");
        }
        for field in &def.fields {
            writeln!(
                out,
                "    {} {};",
                field.ty.to_c_repr().name,
                field.ident.c_name()
            )
            .ok();
        }
        out.push_str("};\n\n");
    }

    let emitted: Vec<&SynthesizedConstructor> = analysis
        .constructors
        .iter()
        .filter(|ctor| ordered.iter().any(|def| def.name == ctor.type_name))
        .collect();
    for ctor in &emitted {
        writeln!(out, "struct {} {}(void);", ctor.type_name, ctor.fn_name).ok();
    }
    if !emitted.is_empty() {
        out.push('\n');
    }
    for ctor in &emitted {
        out.push_str(&transpile_constructor(ctx, ctor)?);
        out.push('\n');
    }
    Ok(out)
}

/// Orders structs so that every by-value field type is defined before use.
/// Pointer fields only need the forward declaration.
fn dependency_order<'a>(
    ctx: &TypeContext,
    structs: &[&'a StructDefinition],
) -> Vec<&'a StructDefinition> {
    fn visit<'a>(
        def: &'a StructDefinition,
        structs: &[&'a StructDefinition],
        ctx: &TypeContext,
        done: &mut HashSet<String>,
        active: &mut HashSet<String>,
        out: &mut Vec<&'a StructDefinition>,
    ) {
        if done.contains(&def.name) || !active.insert(def.name.clone()) {
            return;
        }
        for field in &def.fields {
            if let Type::Named(dep) = &field.ty
                && ctx.struct_def(dep).is_some()
                && let Some(dep_def) = structs.iter().find(|s| &s.name == dep)
            {
                visit(dep_def, structs, ctx, done, active, out);
            }
        }
        active.remove(&def.name);
        done.insert(def.name.clone());
        out.push(def);
    }

    let mut done = HashSet::new();
    let mut active = HashSet::new();
    let mut out = Vec::with_capacity(structs.len());
    for def in structs {
        visit(def, structs, ctx, &mut done, &mut active, &mut out);
    }
    out
}

fn transpile_constructor(ctx: &TypeContext, ctor: &SynthesizedConstructor) -> CompileResult<String> {
    let mut body = format!(
        "struct {name} {fn_name}(void) {{\n    return (struct {name}){{\n",
        name = ctor.type_name,
        fn_name = ctor.fn_name
    );
    if ctor.inits.is_empty() {
        body.push_str("        0,\n");
    }
    for init in &ctor.inits {
        let value = match &init.kind {
            InitKind::Constant { value, .. } => const_to_c(ctx, value, &init.ty)?,
            InitKind::Capability(Type::Named(name)) => format!("{name}_default()"),
            InitKind::Capability(ty) => {
                let zero = ConstValue::zero_of(ty).ok_or_else(|| {
                    CompilationError::CompileError(format!("no C default for type `{ty}`"))
                })?;
                const_to_c(ctx, &zero, ty)?
            }
        };
        writeln!(body, "        .{} = {value},", init.field.c_name()).ok();
    }
    body.push_str("    };\n}\n");
    Ok(body)
}

/// Spells a folded value as a C expression of type `ty`.
fn const_to_c(ctx: &TypeContext, value: &ConstValue, ty: &Type) -> CompileResult<String> {
    Ok(match value {
        ConstValue::Int(v) => int_to_c(*v, ty),
        ConstValue::Float(f) => float_to_c(*f, ty),
        ConstValue::Bool(b) => b.to_string(),
        ConstValue::Char(c) => format!("'{}'", escape_c(&c.to_string(), '\'')),
        ConstValue::Str(s) => format!("\"{}\"", escape_c(s, '"')),
        ConstValue::Null => "NULL".to_string(),
        ConstValue::Struct { name, fields } => {
            let def = ctx.struct_def(name).ok_or_else(|| {
                CompilationError::CompileError(format!("unknown struct `{name}`"))
            })?;
            let mut parts = Vec::with_capacity(fields.len());
            for (ident, field_value) in fields {
                let field_ty = def.field(ident).map(|f| &f.ty).ok_or_else(|| {
                    CompilationError::CompileError(format!("`{name}` has no field `{ident}`"))
                })?;
                parts.push(format!(
                    ".{} = {}",
                    ident.c_name(),
                    const_to_c(ctx, field_value, field_ty)?
                ));
            }
            if parts.is_empty() {
                parts.push("0".to_string());
            }
            format!("(struct {name}){{ {} }}", parts.join(", "))
        }
        ConstValue::Unit => {
            return Err(CompilationError::CompileError(
                "a value of type `Void` cannot be emitted".into(),
            ));
        }
    })
}

fn int_to_c(value: i128, ty: &Type) -> String {
    let suffix = match ty {
        Type::Uint64 | Type::Size => "ULL",
        Type::Int64 => "LL",
        Type::Uint32 => "U",
        _ => "",
    };
    // `-2147483648` is a negated unsigned literal in C
    match ty.int_bounds() {
        Some((lo, _)) if value == lo && value < 0 => format!("({}{suffix} - 1)", lo + 1),
        _ => format!("{value}{suffix}"),
    }
}

fn float_to_c(value: f64, ty: &Type) -> String {
    let single = matches!(ty, Type::Float32 | Type::Float);
    if value.is_nan() {
        return "(0.0 / 0.0)".to_string();
    }
    if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        return format!("({sign}1.0 / 0.0)");
    }
    // Ensure float literals carry a decimal point (and `f` in single precision)
    let mut text = format!("{value:?}");
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    if single {
        text.push('f');
    }
    text
}

fn escape_c(s: &str, quote: char) -> String {
    s.chars()
        .map(|c| match c {
            '\\' => "\\\\".to_string(),
            '\n' => "\\n".to_string(),
            '\t' => "\\t".to_string(),
            '\r' => "\\r".to_string(),
            '\0' => "\\0".to_string(),
            c if c == quote => format!("\\{c}"),
            _ => c.to_string(),
        })
        .collect()
}

/// Human-readable dump of every table and constructor, one struct per
/// paragraph.
pub fn describe_defaults(analysis: &Analysis) -> String {
    let ctx = &analysis.context;
    let mut out = String::new();
    for table in &analysis.tables {
        let Some(def) = ctx.struct_def(table.type_name()) else {
            continue;
        };
        writeln!(out, "struct {}", def.name).ok();
        for (ident, slot) in table.iter() {
            let ty = def
                .field(ident)
                .map(|f| f.ty.to_string())
                .unwrap_or_default();
            let label = field_label(ident);
            let value = match slot {
                DefaultSlot::Absent => String::new(),
                DefaultSlot::Validated(v) => format!(" = {}", v.value),
                DefaultSlot::Erroneous => " = <error>".to_string(),
            };
            writeln!(out, "  {label}: {ty}{value}").ok();
        }
        if let Some(ctor) = analysis.constructor(&def.name) {
            if ctor.required_bounds.is_empty() {
                let result = match ctor.instantiate(ctx, &analysis.lints) {
                    Ok(value) => format!("= {value}"),
                    Err(e) => format!("fails: {e}"),
                };
                writeln!(out, "  {}() {result}", ctor.fn_name).ok();
            } else {
                let bounds: Vec<String> = ctor
                    .required_bounds
                    .iter()
                    .map(|b| format!("{b}: Default"))
                    .collect();
                writeln!(out, "  {}() where {}", ctor.fn_name, bounds.join(", ")).ok();
            }
        }
        out.push('\n');
    }
    out
}

fn field_label(ident: &FieldIdent) -> String {
    match ident {
        FieldIdent::Named(name) => name.clone(),
        FieldIdent::Index(index) => format!("#{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::{Lint, LintLevel};

    fn analyze(source: &str) -> Analysis {
        analyze_source(source, &LintConfig::default()).expect("parses")
    }

    #[test]
    fn c_output_shape() {
        let analysis = analyze(
            "#[derive(Default)]\n\
             struct Window { width: Uint16 = 640, height: Uint16 = 480, title: CString, pos: Point }\n\
             #[derive(Default)]\n\
             struct Point(Int32 = -2147483648, Int32);",
        );
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);
        let c = generate_c_code(&analysis).expect("emits");

        assert!(c.contains("#include <stdint.h>"));
        let point = c.find("struct Point {").expect("Point defined");
        let window = c.find("struct Window {").expect("Window defined");
        assert!(point < window, "by-value dependency first:\n{c}");
        assert!(c.contains("    int32_t _0;\n"));
        assert!(c.contains("struct Window Window_default(void) {"));
        assert!(c.contains("        .width = 640,\n"));
        assert!(c.contains("        .title = \"\",\n"));
        assert!(c.contains("        .pos = Point_default(),\n"));
        assert!(c.contains("        ._0 = (-2147483647 - 1),\n"));
    }

    #[test]
    fn generic_structs_are_not_emitted() {
        let analysis = analyze("#[derive(Default)]\nstruct Box[T] { value: T }");
        assert_eq!(analysis.constructors.len(), 1);
        let c = generate_c_code(&analysis).expect("emits");
        assert!(!c.contains("Box"));
    }

    #[test]
    fn literal_spellings() {
        assert_eq!(int_to_c(7, &Type::Uint64), "7ULL");
        assert_eq!(int_to_c(-1, &Type::Int64), "-1LL");
        assert_eq!(float_to_c(2.0, &Type::Float32), "2.0f");
        assert_eq!(float_to_c(0.25, &Type::Float64), "0.25");
        assert_eq!(escape_c("a\"b\n", '"'), "a\\\"b\\n");
    }

    #[test]
    fn describe_lists_slots_and_constructors() {
        let analysis = analyze(
            "#[derive(Default)]\nstruct S { a: Uint8, b: Uint8 = 7 }",
        );
        let text = describe_defaults(&analysis);
        assert!(text.contains("  a: Uint8\n"), "{text}");
        assert!(text.contains("  b: Uint8 = 7\n"), "{text}");
        assert!(text.contains("  S_default() = S { a: 0, b: 7 }"), "{text}");
    }

    #[test]
    fn describe_uses_the_analysis_lint_levels() {
        let lints = LintConfig::new().with(Lint::OverflowingLiterals, LintLevel::Allow);
        let analysis = analyze_source(
            "#[derive(Default)]\nstruct Inner { x: Int8 = 200 }\n\
             #[derive(Default)]\nstruct Outer { inner: Inner }",
            &lints,
        )
        .expect("parses");
        assert!(!analysis.has_errors(), "{:?}", analysis.diagnostics);

        let text = describe_defaults(&analysis);
        assert!(text.contains("  x: Int8 = -56\n"), "{text}");
        assert!(
            text.contains("  Outer_default() = Outer { inner: Inner { x: -56 } }"),
            "{text}"
        );
    }

    #[test]
    fn recursive_by_value_structs_are_rejected() {
        let analysis = analyze(
            "#[derive(Default)]\nstruct A { b: B }\n#[derive(Default)]\nstruct B { a: A }",
        );
        assert!(analysis.has_errors());
        let tmp = std::env::temp_dir().join(format!("fieldkit_cycle_{}.c", std::process::id()));
        let compiler = Compiler::new(Vec::new(), &tmp);
        assert!(matches!(
            compiler.emit(&analysis),
            Err(CompilationError::Aborted(_))
        ));
        assert!(!tmp.exists());
    }
}
