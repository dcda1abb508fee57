use fieldkit::codegen::consteval::ConstValue;
use fieldkit::codegen::context::TypeContext;
use fieldkit::codegen::defaults::{DefaultSlot, FieldDefaultTable};
use fieldkit::codegen::derive::{self, InitKind};
use fieldkit::codegen::parser::Parser;
use fieldkit::codegen::types::Type;
use fieldkit::codegen::FieldIdent;
use fieldkit::{Analysis, Diagnostic, Lint, LintConfig, analyze_source};
use std::sync::OnceLock;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

fn setup_logging() {
    LOGGER_INIT.get_or_init(|| {
        env_logger::builder().is_test(true).init();
    });
}

fn analyze(source: &str) -> Analysis {
    setup_logging();
    analyze_source(source, &LintConfig::default()).expect("source parses")
}

fn named(name: &str) -> FieldIdent {
    FieldIdent::Named(name.to_string())
}

fn constructed(analysis: &Analysis, type_name: &str) -> ConstValue {
    analysis
        .constructor(type_name)
        .expect("constructor synthesized")
        .instantiate(&analysis.context, &analysis.lints)
        .expect("constructor runs")
}

#[test]
fn width_and_height_defaults() {
    let analysis = analyze(
        "#[derive(Default)]\nstruct Window { width: Uint16 = 640, height: Uint16 = 480 }",
    );
    assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);

    let value = constructed(&analysis, "Window");
    assert_eq!(value.get("width"), Some(&ConstValue::Int(640)));
    assert_eq!(value.get("height"), Some(&ConstValue::Int(480)));
}

#[test]
fn missing_default_uses_type_capability() {
    let analysis = analyze("#[derive(Default)]\nstruct S { a: Uint8, b: Uint8 = 7 }");
    let ctor = analysis.constructor("S").expect("constructor synthesized");
    assert!(matches!(ctor.inits[0].kind, InitKind::Capability(Type::Uint8)));

    let value = constructed(&analysis, "S");
    assert_eq!(value.get("a"), Some(&ConstValue::Int(0)));
    assert_eq!(value.get("b"), Some(&ConstValue::Int(7)));
}

#[test]
fn no_default_and_no_capability_names_the_field() {
    setup_logging();
    let program = Parser::new(0, "struct S { bad: Uint8 }")
        .parse_program()
        .expect("source parses");
    let (ctx, _) = TypeContext::new(&program);
    let def = ctx.struct_def("S").expect("struct exists");
    let (table, diagnostics) = FieldDefaultTable::build(def, &ctx, &LintConfig::default());
    assert!(diagnostics.is_empty());

    let no_capabilities = |_: &Type| false;
    let err = derive::synthesize(def, &table, &no_capabilities).unwrap_err();
    assert!(matches!(err, Diagnostic::MissingDefault { field, .. } if field == "bad"));
}

#[test]
fn missing_default_through_the_frontend() {
    let analysis = analyze(
        "struct Handle { raw: Ptr[Void] }\n#[derive(Default)]\nstruct Device { handle: Handle }",
    );
    assert!(analysis.constructor("Device").is_none());
    assert!(analysis.diagnostics.iter().any(
        |d| matches!(d, Diagnostic::MissingDefault { field, ty, .. } if field == "handle" && ty == "Handle")
    ));
}

#[test]
fn non_constant_default_is_rejected() {
    let analysis = analyze("extern function rand(): Int;\nstruct S { seed: Int = rand() }");
    assert!(matches!(
        analysis.diagnostics.iter().collect::<Vec<_>>().as_slice(),
        [Diagnostic::NotConstant { .. }]
    ));
    let table = analysis.table("S").expect("table built");
    assert_eq!(table.get(&named("seed")), Some(&DefaultSlot::Erroneous));
}

#[test]
fn mismatched_default_type_is_rejected() {
    let analysis = analyze("struct S { count: Int32 = \"many\" }");
    assert!(matches!(
        analysis.diagnostics.iter().collect::<Vec<_>>().as_slice(),
        [Diagnostic::TypeMismatch { expected, .. }] if expected == "Int32"
    ));
}

#[test]
fn build_is_idempotent() {
    setup_logging();
    let program = Parser::new(0, "struct S(Uint8 = 1 << 3, Float32 = 0.5, CString);")
        .parse_program()
        .expect("source parses");
    let (ctx, _) = TypeContext::new(&program);
    let def = ctx.struct_def("S").expect("struct exists");

    let first = FieldDefaultTable::build(def, &ctx, &LintConfig::default());
    let second = FieldDefaultTable::build(def, &ctx, &LintConfig::default());
    assert_eq!(first, second);
}

#[test]
fn processing_order_of_other_types_does_not_matter() {
    setup_logging();
    let source = "const BASE: Int = 10;\n\
                  struct Inner { x: Int = BASE * 2, y: Int = 1 }\n\
                  struct Other { z: Int = 1 / 0 }\n\
                  #[derive(Default)]\n\
                  struct Target { inner: Inner = Inner { y: 5, .. }, n: Int = BASE + 1, flag: Bool }";
    let program = Parser::new(0, source).parse_program().expect("source parses");
    let (ctx, _) = TypeContext::new(&program);
    let config = LintConfig::default();
    let def = |name: &str| ctx.struct_def(name).expect("struct exists");

    let mut forward = Vec::new();
    for name in ["Inner", "Other", "Target"] {
        forward.push(FieldDefaultTable::build(def(name), &ctx, &config));
    }
    let mut backward = Vec::new();
    for name in ["Target", "Other", "Inner"] {
        backward.push(FieldDefaultTable::build(def(name), &ctx, &config));
    }
    assert_eq!(forward[2], backward[0]);

    let table = &forward[2].0;
    let ctor_a = derive::synthesize(def("Target"), table, &ctx).expect("synthesizes");
    let ctor_b = derive::synthesize(def("Target"), &backward[0].0, &ctx).expect("synthesizes");
    assert_eq!(ctor_a, ctor_b);
    assert_eq!(
        ctor_a.instantiate(&ctx, &config).expect("runs").to_string(),
        "Target { inner: Inner { x: 20, y: 5 }, n: 11, flag: false }"
    );
}

#[test]
fn source_order_of_other_types_does_not_change_values() {
    let a = analyze(
        "struct Inner { x: Int = 3 }\n#[derive(Default)]\nstruct Outer { i: Inner = Inner { .. } }",
    );
    let b = analyze(
        "#[derive(Default)]\nstruct Outer { i: Inner = Inner { .. } }\nstruct Inner { x: Int = 3 }",
    );
    assert_eq!(constructed(&a, "Outer"), constructed(&b, "Outer"));
}

#[test]
fn field_allow_does_not_leak_to_siblings() {
    let analysis = analyze(
        "struct S {\n    #[allow(overflowing_literals)]\n    a: Uint8 = 256,\n    b: Uint8 = 256,\n}",
    );
    let lints: Vec<_> = analysis.diagnostics.iter().collect();
    assert_eq!(lints.len(), 1);
    assert!(matches!(
        lints[0],
        Diagnostic::Lint { lint: Lint::OverflowingLiterals, span, .. } if span.line == 4
    ));

    let table = analysis.table("S").expect("table built");
    assert_eq!(
        table.validated(&named("a")).map(|v| &v.value),
        Some(&ConstValue::Int(0))
    );
    assert_eq!(table.get(&named("b")), Some(&DefaultSlot::Erroneous));
}

#[test]
fn malformed_default_keeps_siblings() {
    let analysis = analyze("struct S { a: Int = 1 +, b: Int = 2, c: Int = (3 }");
    let table = analysis.table("S").expect("table built");
    assert_eq!(table.get(&named("a")), Some(&DefaultSlot::Erroneous));
    assert!(table.validated(&named("b")).is_some());
    assert!(
        analysis
            .diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::ParseError { .. }))
    );
}

#[test]
fn generic_struct_requires_bounds_only_for_capability_fields() {
    let analysis = analyze(
        "#[derive(Default)]\nstruct Pair[K, V] { key: K, value: V, count: Size = 0x10 }",
    );
    let ctor = analysis.constructor("Pair").expect("constructor synthesized");
    assert_eq!(
        ctor.required_bounds,
        vec![Type::Param("K".into()), Type::Param("V".into())]
    );
}

#[test]
fn const_function_defaults() {
    let analysis = analyze(
        "const function clamp(v: Int, lo: Int, hi: Int): Int {\n\
             if v < lo { return lo; }\n\
             if v > hi { return hi; }\n\
             return v;\n\
         }\n\
         #[derive(Default)]\n\
         struct Volume { level: Int = clamp(140, 0, 100) }",
    );
    assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
    assert_eq!(
        constructed(&analysis, "Volume").get("level"),
        Some(&ConstValue::Int(100))
    );
}

#[test]
fn cyclic_rest_defaults_fail() {
    let analysis = analyze("struct A { b: B = B { .. } }\nstruct B { a: A = A { .. } }");
    assert!(analysis.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::EvaluationFailed { message, .. } if message.contains("cycle detected")
    )));
    assert!(analysis.table("A").is_some_and(|t| t.has_errors()));
}

#[test]
fn recursive_by_value_structs_are_reported_once() {
    let analysis = analyze(
        "#[derive(Default)]\nstruct A { b: B }\n#[derive(Default)]\nstruct B { a: A }\n\
         struct Link { next: Ptr[Link] }",
    );
    let recursive: Vec<_> = analysis
        .diagnostics
        .iter()
        .filter_map(|d| match d {
            Diagnostic::TypeError { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(recursive, ["recursive struct `A` has infinite size: A -> B -> A"]);
}

#[test]
fn large_chains_of_shared_constants_stay_within_limits() {
    let mut source = String::from("const C0: Int64 = 1;\n");
    for i in 1..=21 {
        source.push_str(&format!("const C{i}: Int64 = C{} + C{};\n", i - 1, i - 1));
    }
    source.push_str("#[derive(Default)]\nstruct S { x: Int64 = C21 }");
    let analysis = analyze(&source);
    assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
    assert_eq!(constructed(&analysis, "S").get("x"), Some(&ConstValue::Int(1 << 21)));
}
