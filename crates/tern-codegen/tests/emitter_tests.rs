//! Emitter tests: calling conventions, register discipline, instruction
//! selection, jump layout and semantic diagnostics.

use tern_bytecode::{
    decode_function, ArithOp, Cond, FileType, FunctionKind, ImmOp, Instruction, NumKind,
};
use tern_codegen::{emit, CallingConvention, CodegenError, EmitOptions, EmitOutput, OptLevel};
use tern_parser::parse_source;
use tern_types::{ErrorCode, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn emit_with(source: &str, options: EmitOptions) -> EmitOutput {
    let sf = SourceFile::new("test.tn", source);
    let parsed = parse_source(&sf);
    if parsed.errors.has_errors() {
        for e in &parsed.errors.errors {
            eprintln!("  PARSE ERROR: {e}");
        }
        panic!("unexpected parse errors (see above)");
    }
    let program = parsed.program.expect("no program returned");
    emit(&program, &sf, options).expect("emit failed")
}

/// Emit with default options, panicking on any diagnostic.
fn emit_ok(source: &str) -> EmitOutput {
    emit_ok_with(source, EmitOptions::default())
}

fn emit_ok_with(source: &str, options: EmitOptions) -> EmitOutput {
    let out = emit_with(source, options);
    if out.errors.has_errors() {
        for e in &out.errors.errors {
            eprintln!("  ERROR: {e}");
        }
        panic!("unexpected emit errors (see above)");
    }
    out
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    emit_with(source, EmitOptions::default())
        .errors
        .errors
        .iter()
        .map(|e| e.code)
        .collect()
}

/// Decoded body of function `name`.
fn body(out: &EmitOutput, name: &str) -> Vec<Instruction> {
    let stats = out.stats(name).expect("no such function");
    match &out.codefile.functions[stats.index as usize].kind {
        FunctionKind::Bytecode { code, .. } => decode_function(code)
            .expect("body does not decode")
            .into_iter()
            .map(|(_, insn)| insn)
            .collect(),
        FunctionKind::Native { .. } => panic!("'{name}' is native"),
    }
}

/// `fn Name(p0: Int, .., pN: Int): Int { return pN; }`
fn function_with_params(name: &str, count: usize) -> String {
    let params: Vec<String> = (0..count).map(|i| format!("p{i}: Int")).collect();
    let ret = if count == 0 {
        "0".to_string()
    } else {
        format!("p{}", count - 1)
    };
    format!("fn {name}({}): Int {{ return {ret}; }}\n", params.join(", "))
}

// ─────────────────────────────────────────────────────────────────────
// Calling conventions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_convention_switches_after_ten_register_args() {
    let mut source = String::new();
    for (name, count) in [("P0", 0), ("P5", 5), ("P10", 10), ("P11", 11)] {
        source.push_str(&function_with_params(name, count));
    }
    source.push_str("fn Main(): Int { return 0; }");
    let out = emit_ok(&source);

    let expect = [
        ("P0", CallingConvention::Register, 0, 0),
        ("P5", CallingConvention::Register, 5, 0),
        ("P10", CallingConvention::Register, 10, 0),
        ("P11", CallingConvention::RegS, 10, 1),
    ];
    for (name, convention, register_args, stack_args) in expect {
        let stats = out.stats(name).unwrap();
        assert_eq!(stats.convention, convention, "{name}");
        assert_eq!(stats.register_args, register_args, "{name}");
        assert_eq!(stats.stack_args, stack_args, "{name}");
    }
}

#[test]
fn test_unoptimized_build_passes_everything_on_the_stack() {
    let source = format!("{}fn Main(): Int {{ return 0; }}", function_with_params("P3", 3));
    let out = emit_ok_with(&source, EmitOptions::default().with_opt_level(OptLevel::None));
    let stats = out.stats("P3").unwrap();
    assert_eq!(stats.convention, CallingConvention::Stack);
    assert_eq!(stats.register_args, 0);
    assert_eq!(stats.stack_args, 3);
    // The last parameter sits deepest, at slot 0, and is returned in place.
    assert_eq!(body(&out, "P3"), vec![Instruction::RetLocal { slot: 0 }]);
}

#[test]
fn test_extern_functions_use_registers_and_are_native() {
    let out = emit_ok(
        r#"@extern("c", "labs") fn Abs(x: Int): Int;
fn Main(): Int { return Abs(3); }"#,
    );
    let entry = &out.codefile.functions[0];
    assert!(entry.is_native());
    assert!(out.stats("Abs").is_none());
    assert_eq!(
        body(&out, "Main"),
        vec![
            Instruction::Ldi4 { dst: 1, value: 3 },
            Instruction::Call8 { func: 0 },
            Instruction::Mov { dst: 1, src: 0 },
            Instruction::Mov { dst: 0, src: 1 },
            Instruction::Ret,
        ]
    );
}

#[test]
fn test_extern_with_too_many_params_is_rejected() {
    let params: Vec<String> = (0..11).map(|i| format!("p{i}: Int")).collect();
    let source = format!(
        "@extern(\"c\") fn Wide({}): Int;\nfn Main(): Int {{ return 0; }}",
        params.join(", ")
    );
    assert_eq!(error_codes(&source), vec![ErrorCode::LIMIT_EXCEEDED]);
}

// ─────────────────────────────────────────────────────────────────────
// Instruction selection
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_register_param_returns_with_a_move() {
    let out = emit_ok("fn Id(x: Int): Int { return x; }\nfn Main(): Int { return 0; }");
    assert_eq!(
        body(&out, "Id"),
        vec![Instruction::Mov { dst: 0, src: 1 }, Instruction::Ret]
    );
}

#[test]
fn test_stack_local_returned_with_retlocal() {
    let out = emit_ok("fn Main(): Int { var x: Int = 5; return x; }");
    assert_eq!(
        body(&out, "Main"),
        vec![
            Instruction::Ldi4 { dst: 1, value: 5 },
            Instruction::LocalSet { reg: 1, slot: 0 },
            Instruction::RetLocal { slot: 0 },
        ]
    );
    assert_eq!(out.stats("Main").unwrap().local_reserve, 1);
}

#[test]
fn test_fast_build_keeps_locals_in_registers() {
    let out = emit_ok_with(
        "fn Main(): Int { var x: Int = 5; return x; }",
        EmitOptions::default().with_opt_level(OptLevel::Fast),
    );
    assert_eq!(
        body(&out, "Main"),
        vec![
            Instruction::Ldi4 { dst: 1, value: 5 },
            Instruction::Mov { dst: 0, src: 1 },
            Instruction::Ret,
        ]
    );
    assert_eq!(out.stats("Main").unwrap().local_reserve, 0);
}

#[test]
fn test_immediate_arithmetic_forms() {
    let out = emit_ok(
        "fn Big(a: Int): Int { return a + 300; }
fn Step(a: Int): Int { return a - 1; }
fn Main(): Int { return 0; }",
    );
    assert_eq!(
        body(&out, "Big"),
        vec![
            Instruction::ArithImm16 {
                op: ImmOp::Add,
                dst: 2,
                src: 1,
                imm: 300
            },
            Instruction::Mov { dst: 0, src: 2 },
            Instruction::Ret,
        ]
    );
    assert_eq!(
        body(&out, "Step"),
        vec![
            Instruction::Mov { dst: 2, src: 1 },
            Instruction::Dec { reg: 2 },
            Instruction::Mov { dst: 0, src: 2 },
            Instruction::Ret,
        ]
    );
}

#[test]
fn test_register_operands_use_three_address_form() {
    let out = emit_ok("fn Add(a: Int, b: Int): Int { return a + b; }\nfn Main(): Int { return Add(2, 3); }");
    assert_eq!(
        body(&out, "Add"),
        vec![
            Instruction::Arith {
                op: ArithOp::Add,
                kind: NumKind::Signed,
                dst: 3,
                a: 1,
                b: 2
            },
            Instruction::Mov { dst: 0, src: 3 },
            Instruction::Ret,
        ]
    );
    // Constant arguments load straight into their registers.
    assert_eq!(
        body(&out, "Main"),
        vec![
            Instruction::Ldi4 { dst: 2, value: 3 },
            Instruction::Ldi4 { dst: 1, value: 2 },
            Instruction::Call8 { func: 0 },
            Instruction::Mov { dst: 1, src: 0 },
            Instruction::Mov { dst: 0, src: 1 },
            Instruction::Ret,
        ]
    );
}

#[test]
fn test_live_registers_are_saved_around_calls() {
    let out = emit_ok(
        "fn One(): Int { return 1; }
fn F(x: Int): Int { return x + One(); }
fn Main(): Int { return F(1); }",
    );
    assert_eq!(
        body(&out, "F"),
        vec![
            Instruction::Push { reg: 1 },
            Instruction::Call8 { func: 0 },
            Instruction::Mov { dst: 2, src: 0 },
            Instruction::Pop { reg: 1 },
            Instruction::Arith {
                op: ArithOp::Add,
                kind: NumKind::Signed,
                dst: 3,
                a: 1,
                b: 2
            },
            Instruction::Mov { dst: 0, src: 3 },
            Instruction::Ret,
        ]
    );
}

#[test]
fn test_consts_fold_into_immediates() {
    let out = emit_ok("const k: Int = 7;\nfn Main(): Int { return k; }");
    assert_eq!(
        body(&out, "Main"),
        vec![Instruction::Ldi4 { dst: 0, value: 7 }, Instruction::Ret]
    );
    assert!(out.codefile.globals.is_empty());
}

#[test]
fn test_comparison_against_zero_uses_testz() {
    let out = emit_ok("fn F(x: Int): Int { if x == 0 { return 1; } return 2; }\nfn Main(): Int { return 0; }");
    let insns = body(&out, "F");
    assert_eq!(insns[0], Instruction::TestZ { reg: 1 });
    assert!(matches!(insns[1], Instruction::Jump8 { cond: Cond::Ne, .. }));
    assert!(!insns
        .iter()
        .any(|i| matches!(i, Instruction::Compare { .. })));
}

// ─────────────────────────────────────────────────────────────────────
// Jumps and register discipline
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_small_branch_uses_short_jump() {
    let out = emit_ok("fn F(x: Int): Int { if x < 1 { return 1; } return x; }\nfn Main(): Int { return 0; }");
    let stats = out.stats("F").unwrap();
    assert_eq!(stats.wide_jumps, 0);
    assert!(stats.short_jumps >= 1);
}

#[test]
fn test_long_branch_is_widened() {
    let mut then_block = String::new();
    for _ in 0..40 {
        then_block.push_str("g = g + 1000; ");
    }
    let source = format!(
        "var g: Int = 0;\nfn F(x: Int): Int {{ if x < 1 {{ {then_block} }} return x; }}\nfn Main(): Int {{ return 0; }}"
    );
    let out = emit_ok(&source);
    let stats = out.stats("F").unwrap();
    assert_eq!(stats.wide_jumps, 1);
    assert_eq!(stats.short_jumps, 0);
    let insns = body(&out, "F");
    assert!(matches!(
        insns[2],
        Instruction::Jump16 { cond: Cond::Ge, .. }
    ));
}

#[test]
fn test_multiple_returns_jump_to_shared_epilogue() {
    let out = emit_ok(
        "fn Sign(x: Int): Int { if x < 0 { return -1; } if x == 0 { return 0; } return 1; }
fn Main(): Int { return Sign(5); }",
    );
    let stats = out.stats("Sign").unwrap();
    // Two conditional jumps, two jumps to the epilogue.
    assert_eq!(stats.short_jumps, 4);
    assert_eq!(stats.wide_jumps, 0);
    assert_eq!(body(&out, "Sign").last(), Some(&Instruction::Ret));
}

#[test]
fn test_no_registers_leak() {
    let source = "var total: Int = 0;
fn Sum3(a: Int, b: Int, c: Int): Int { return a + b + c; }
fn Work(n: Int): Int {
    var t: Int = n * 2;
    var a: Int[3] = [1, 2, 3];
    a[1] = Sum3(t, n, a[0]);
    if t > 10 { total = total + a[1]; } elif t > 5 { total = total - 1; } else { return a[2]; }
    return total + Sum3(1, 2, 3);
}
fn Main(): Int { return Work(4); }";
    for level in [OptLevel::None, OptLevel::Default, OptLevel::Fast] {
        let out = emit_ok_with(source, EmitOptions::default().with_opt_level(level));
        for stats in &out.functions {
            assert_eq!(stats.leaked_registers, 0, "{} at {level:?}", stats.name);
        }
    }
}

/// `F(1) * (F(1) * (...))`, `depth` calls deep. Each level holds its left
/// operand in a register while the right side is lowered.
fn nested_call_chain(depth: usize) -> String {
    let mut expr = "F(1)".to_string();
    for _ in 1..depth {
        expr = format!("F(1) * ({expr})");
    }
    format!("fn F(x: Int): Int {{ return x; }}\nfn Main(): Int {{ return {expr}; }}")
}

#[test]
fn test_register_exhaustion_is_an_error() {
    let source = nested_call_chain(20);
    let sf = SourceFile::new("test.tn", &source);
    let parsed = parse_source(&sf);
    assert!(!parsed.errors.has_errors());
    let program = parsed.program.expect("no program returned");

    match emit(&program, &sf, EmitOptions::default()) {
        Err(CodegenError::RegisterAllocationExhausted { function }) => assert_eq!(function, "Main"),
        other => panic!("expected register exhaustion, got {other:?}"),
    }

    // A shallow chain fits.
    emit_ok(&nested_call_chain(4));
}

#[test]
fn test_array_locals_are_destroyed_at_exit() {
    let out = emit_ok("fn Main(): Int { var a: Int[3] = [4, 5]; a[2] = 6; return a[0] + a[2]; }");
    let insns = body(&out, "Main");
    assert!(insns
        .iter()
        .any(|i| matches!(i, Instruction::ArrayNew { .. })));
    assert!(insns
        .iter()
        .any(|i| matches!(i, Instruction::ArrayDestroy { .. })));
    assert!(!insns
        .iter()
        .any(|i| matches!(i, Instruction::RetLocal { .. })));
}

// ─────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_strings_are_interned_once() {
    let out = emit_ok(
        r#"@extern("c", "abs") fn Abs(x: Int): Int;
@extern("c", "labs") fn LAbs(x: Int): Int;
fn Main(): Int { var s: const Byte* = "c"; return Abs(1); }"#,
    );
    assert_eq!(
        out.codefile.strings,
        vec![b"c".to_vec(), b"abs".to_vec(), b"labs".to_vec()]
    );
}

#[test]
fn test_globals_and_entry_point() {
    let out = emit_ok("var g: Int = 10;\nvar h: Float = 1.5;\nfn Helper() { }\nfn Main(): Int { return g; }");
    assert_eq!(out.codefile.globals.len(), 2);
    assert_eq!(out.codefile.globals[0].bits, 10);
    assert_eq!(out.codefile.globals[1].bits, 1.5f64.to_bits());
    assert_eq!(out.codefile.entry, 1);
}

#[test]
fn test_module_needs_no_main() {
    let out = emit_with(
        "fn Helper(): Int { return 1; }",
        EmitOptions::default().with_file_type(FileType::Module),
    );
    assert!(!out.errors.has_errors());
    assert_eq!(out.codefile.file_type, FileType::Module);
}

// ─────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_main() {
    assert_eq!(
        error_codes("fn Helper() { }"),
        vec![ErrorCode::MISSING_ENTRY_POINT]
    );
}

#[test]
fn test_uninitialized_local() {
    assert_eq!(
        error_codes("fn Main(): Int { var x: Int; return x; }"),
        vec![ErrorCode::UNINITIALIZED_LOCAL]
    );
}

#[test]
fn test_global_initializer_must_be_literal() {
    assert_eq!(
        error_codes("var g: Int = 1 + 2;\nfn Main(): Int { return 0; }"),
        vec![ErrorCode::INVALID_GLOBAL_INITIALIZER]
    );
}

#[test]
fn test_unsupported_constructs() {
    assert_eq!(
        error_codes("fn Main(): Int { var a: Int = [1, 2]; return 0; }"),
        vec![ErrorCode::NOT_IMPLEMENTED]
    );
    assert_eq!(
        error_codes("fn Main(): Int { var b: Int = 1 < 2; return 0; }"),
        vec![ErrorCode::NOT_IMPLEMENTED]
    );
}

#[test]
fn test_semantic_errors() {
    let cases = [
        ("fn Main(): Int { return Nope(); }", ErrorCode::UNDEFINED_FUNCTION),
        ("fn Main(): Int { return y; }", ErrorCode::UNDEFINED_IDENTIFIER),
        (
            "fn F(a: Int): Int { return a; }\nfn Main(): Int { return F(1, 2); }",
            ErrorCode::WRONG_ARG_COUNT,
        ),
        (
            "fn Main(): Int { var x: Int = 1; var x: Int = 2; return x; }",
            ErrorCode::REDEFINITION,
        ),
        (
            "var g: Int = 0;\nfn Main(): Int { var g: Int = 1; return 0; }",
            ErrorCode::SHADOWED_GLOBAL,
        ),
        (
            "const k: Int = 1;\nfn Main(): Int { k = 2; return k; }",
            ErrorCode::INVALID_ASSIGN_TARGET,
        ),
        ("fn Main(): Int { }", ErrorCode::MISSING_RETURN),
        (
            "fn F(x: Int): Int { if x < 1 { return 1; } }\nfn Main(): Int { return F(0); }",
            ErrorCode::MISSING_RETURN,
        ),
        (
            "fn F(x: Int): Int { if x < 1 { return 1; } elif x < 2 { return 2; } }\nfn Main(): Int { return F(0); }",
            ErrorCode::MISSING_RETURN,
        ),
        (
            "fn V() { }\nfn Main(): Int { return V(); }",
            ErrorCode::TYPE_MISMATCH,
        ),
        (
            "fn Main(): Int { var s: const Byte* = \"hi\"; return s + 1; }",
            ErrorCode::INVALID_OPERAND,
        ),
        (
            "fn Main(): Int { var f: Float = 1.5; var i: Int = f; return i; }",
            ErrorCode::TYPE_MISMATCH,
        ),
    ];
    for (source, code) in cases {
        assert_eq!(error_codes(source), vec![code], "{source}");
    }
}

#[test]
fn test_errors_carry_source_location() {
    let out = emit_with("fn Main(): Int {\n    return missing;\n}", EmitOptions::default());
    let error = &out.errors.errors[0];
    assert_eq!(error.span.start_line, 2);
    assert_eq!(error.source_line, "    return missing;");
}
