//! VM integration tests: programs compiled from source and run end to end.
//!
//! Covers:
//! - arithmetic, globals and every calling convention
//! - branches, early returns and recursion
//! - arrays and their cleanup
//! - extern functions bound to host functions, and link failures
//! - runtime faults and limits
//! - jump targets for short and widened branches
//! - codefile loading errors

use std::ffi::{c_char, CStr};

use tern_bytecode::{decode_function, CodeFile, FunctionKind, Instruction, LoadError};
use tern_codegen::{emit, EmitOptions, OptLevel};
use tern_parser::parse_source;
use tern_types::SourceFile;
use tern_vm::{load_assembly, Assembly, HostFunctions, Value, Vm, VmError, VmOptions};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Compile source to a codefile, panicking on any diagnostic.
fn compile(source: &str, options: EmitOptions) -> CodeFile {
    let sf = SourceFile::new("test.tn", source);
    let parsed = parse_source(&sf);
    assert!(
        !parsed.errors.has_errors(),
        "parse errors:\n{}",
        parsed.errors.render()
    );
    let program = parsed.program.expect("no program after successful parse");
    let out = emit(&program, &sf, options).expect("emit failed");
    assert!(
        !out.errors.has_errors(),
        "emit errors:\n{}",
        out.errors.render()
    );
    out.codefile
}

fn vm_for(file: &CodeFile, options: VmOptions) -> Vm {
    let bytes = file.to_bytes().expect("codefile serialises");
    let assembly = Assembly::from_bytes(&bytes).expect("codefile loads");
    let mut vm = Vm::new(options);
    vm.set_assembly(assembly);
    vm
}

fn run_with(source: &str, emit_options: EmitOptions, vm_options: VmOptions) -> Result<Value, VmError> {
    let file = compile(source, emit_options);
    vm_for(&file, vm_options).execute_main()
}

/// Run `Main` under every optimisation level and check they agree.
fn run_i64(source: &str) -> i64 {
    let results: Vec<i64> = [OptLevel::None, OptLevel::Default, OptLevel::Fast]
        .into_iter()
        .map(|level| {
            run_with(
                source,
                EmitOptions::default().with_opt_level(level),
                VmOptions::default(),
            )
            .unwrap_or_else(|e| panic!("execution failed at {level:?}: {e}"))
            .as_i64()
        })
        .collect();
    assert!(
        results.windows(2).all(|w| w[0] == w[1]),
        "optimisation levels disagree: {results:?}"
    );
    results[0]
}

fn run_err(source: &str, vm_options: VmOptions) -> VmError {
    run_with(source, EmitOptions::default(), vm_options).expect_err("execution should fail")
}

fn main_code(file: &CodeFile) -> Vec<(usize, Instruction)> {
    match &file.functions[file.entry as usize].kind {
        FunctionKind::Bytecode { code, .. } => decode_function(code).expect("body decodes"),
        FunctionKind::Native { .. } => panic!("entry is native"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic and globals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_precedence_and_small_immediates() {
    assert_eq!(run_i64("fn Main(): Int { return 2 + 3 * 4; }"), 14);
}

#[test]
fn test_global_read() {
    let file = compile(
        "var g: Int = 10;\nfn Main(): Int { return g; }",
        EmitOptions::default(),
    );
    assert_eq!(file.globals.len(), 1);
    assert_eq!(file.globals[0].bits, 10);
    assert!(main_code(&file)
        .iter()
        .any(|(_, i)| matches!(i, Instruction::GlobalGet { .. })));
    assert_eq!(vm_for(&file, VmOptions::default()).execute_main().unwrap().as_i64(), 10);
}

#[test]
fn test_global_writes_are_visible_after_the_run() {
    let file = compile(
        "var r: Float = 0.0;\nvar n: Int = 1;\nfn Main(): Int { r = 1.5 * 4.0; n = n + 41; return n; }",
        EmitOptions::default(),
    );
    let mut vm = vm_for(&file, VmOptions::default());
    assert_eq!(vm.execute_main().unwrap().as_i64(), 42);
    assert_eq!(vm.global(0).unwrap().as_f64(), 6.0);
    assert_eq!(vm.global(1).unwrap().as_i64(), 42);

    // A second run starts from the initial values again.
    assert_eq!(vm.execute_main().unwrap().as_i64(), 42);
}

#[test]
fn test_signed_and_unsigned_semantics() {
    assert_eq!(
        run_i64("fn Div(a: Int, b: Int): Int { return a / b; }\nfn Main(): Int { return Div(-7, 2); }"),
        -3
    );
    assert_eq!(
        run_i64("fn Neg(x: Int): Int { return -x; }\nfn Main(): Int { return Neg(5) + 10; }"),
        5
    );
    // 0 - 1 wraps to the largest UInt, which is greater than 5 unsigned.
    assert_eq!(
        run_i64("fn Main(): Int { var big: UInt = 0; big = big - 1; if big > 5 { return 1; } return 0; }"),
        1
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls and control flow
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_every_return_reaches_the_exit() {
    let sign = "fn Sign(x: Int): Int { if x < 0 { return -1; } if x == 0 { return 0; } return 1; }\n";
    assert_eq!(run_i64(&format!("{sign}fn Main(): Int {{ return Sign(-5); }}")), -1);
    assert_eq!(run_i64(&format!("{sign}fn Main(): Int {{ return Sign(0); }}")), 0);
    assert_eq!(run_i64(&format!("{sign}fn Main(): Int {{ return Sign(7); }}")), 1);
    assert_eq!(
        run_i64(&format!(
            "{sign}fn Main(): Int {{ return Sign(-5) * 100 + Sign(0) * 10 + Sign(7); }}"
        )),
        -99
    );
}

#[test]
fn test_elif_chain() {
    let source = "fn Pick(x: Int): Int { if x < 1 { return 10; } elif x < 2 { return 20; } else { return 30; } }
fn Main(): Int { return Pick(0) + Pick(1) + Pick(5); }";
    assert_eq!(run_i64(source), 60);
}

#[test]
fn test_recursion_preserves_caller_registers() {
    let source = "fn Fact(n: Int): Int { if n < 2 { return 1; } return n * Fact(n - 1); }
fn Main(): Int { return Fact(10); }";
    assert_eq!(run_i64(source), 3_628_800);
}

#[test]
fn test_stack_passed_arguments_arrive_in_order() {
    let names: Vec<String> = (b'a'..=b'l').map(|c| (c as char).to_string()).collect();
    let params: Vec<String> = names.iter().map(|n| format!("{n}: Int")).collect();
    // Weight each parameter by its position so a swap changes the result.
    let terms: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, n)| format!("{n} * {}", i + 1))
        .collect();
    let args: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
    let source = format!(
        "fn Weigh({}): Int {{ return {}; }}\nfn Main(): Int {{ return Weigh({}); }}",
        params.join(", "),
        terms.join(" + "),
        args.join(", ")
    );
    // sum of i * i for i in 1..=12
    assert_eq!(run_i64(&source), 650);
}

#[test]
fn test_arguments_computed_from_registers() {
    let source = "fn Sub(a: Int, b: Int): Int { return a - b; }
fn Swap(a: Int, b: Int): Int { return Sub(b, a); }
fn Main(): Int { return Swap(3, 10); }";
    assert_eq!(run_i64(source), 7);
}

#[test]
fn test_prototypes_before_and_after_the_definition() {
    let before = "fn Two(): Int;\nfn Main(): Int { return Two(); }\nfn Two(): Int { return 2; }";
    assert_eq!(run_i64(before), 2);

    let after = "fn Two(): Int { return 2; }\nfn Two(): Int;\nfn Main(): Int { return Two() + 1; }";
    assert_eq!(run_i64(after), 3);
}

#[test]
fn test_global_arguments_are_read_right_to_left() {
    let prelude = "var G: Int = 1;
fn Set(): Int { G = 5; return 0; }
fn Add(a: Int, b: Int): Int { return a + b; }
";
    // G is read before Set runs.
    assert_eq!(run_i64(&format!("{prelude}fn Main(): Int {{ return Add(Set(), G); }}")), 1);
    // Set runs before G is read.
    assert_eq!(run_i64(&format!("{prelude}fn Main(): Int {{ return Add(G, Set()); }}")), 5);
}

#[test]
fn test_element_index_is_read_before_the_stored_value() {
    let source = "var G: Int = 0;
fn Set(): Int { G = 1; return 7; }
fn Main(): Int { var a: Int[2] = [0, 0]; a[G] = Set(); return a[0] * 10 + a[1] + G * 100; }";
    assert_eq!(run_i64(source), 170);
}

#[test]
fn test_arrays_are_filled_and_freed() {
    let source = "fn Main(): Int { var a: Int[3] = [4, 5]; a[2] = 6; return a[0] + a[1] + a[2]; }";
    assert_eq!(run_i64(source), 15);

    let file = compile(source, EmitOptions::default());
    let mut vm = vm_for(&file, VmOptions::default());
    vm.execute_main().unwrap();
    assert_eq!(vm.live_arrays(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Externs
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_extern_bound_to_host_function() {
    let file = compile(
        "@extern(\"host\", \"triple\") fn Triple(x: Int): Int;\nfn Main(): Int { return Triple(14) + 1; }",
        EmitOptions::default(),
    );
    let mut host = HostFunctions::new();
    host.register("host", "triple", |args| Value::from_i64(args[0].as_i64() * 3));
    let mut vm = vm_for(&file, VmOptions::default()).with_host_functions(host);
    assert_eq!(vm.execute_main().unwrap().as_i64(), 43);
}

#[test]
fn test_string_literals_are_c_strings() {
    let file = compile(
        "@extern(\"host\", \"len\") fn Len(s: const Byte*): Int;\nfn Main(): Int { return Len(\"hello\"); }",
        EmitOptions::default(),
    );
    let mut vm = vm_for(&file, VmOptions::default());
    vm.host_functions_mut().register("host", "len", |args| {
        // SAFETY: `ldstr` hands out pointers to NUL-terminated table entries.
        let s = unsafe { CStr::from_ptr(args[0].as_ptr::<c_char>()) };
        Value::from_u64(s.to_bytes().len() as u64)
    });
    assert_eq!(vm.execute_main().unwrap().as_i64(), 5);
}

#[test]
fn test_unresolvable_extern_fails_before_running() {
    let source = "var touched: Int = 0;
@extern(\"tern_missing_library_zz\") fn Gone(): Int;
fn Main(): Int { touched = 1; return Gone(); }";
    let file = compile(source, EmitOptions::default());
    let mut vm = vm_for(&file, VmOptions::default());
    let err = vm.execute_main().unwrap_err();
    assert!(matches!(err, VmError::Link { ref library, .. } if library == "tern_missing_library_zz"));
    assert_eq!(vm.steps(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Faults and limits
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_division_by_zero_is_a_fault() {
    let err = run_err(
        "fn Div(a: Int, b: Int): Int { return a / b; }\nfn Main(): Int { return Div(1, 0); }",
        VmOptions::default(),
    );
    assert!(matches!(err, VmError::DivisionByZero { .. }), "{err}");
}

#[test]
fn test_runaway_recursion_hits_the_depth_limit() {
    let options = VmOptions {
        max_call_depth: 50,
        ..VmOptions::default()
    };
    let err = run_err(
        "fn R(n: Int): Int { return R(n + 1); }\nfn Main(): Int { return R(0); }",
        options,
    );
    assert!(matches!(err, VmError::CallDepthExceeded { limit: 50 }), "{err}");
}

#[test]
fn test_step_limit() {
    let err = run_err(
        "fn Main(): Int { var x: Int = 1; x = x + 1; x = x + 1; return x; }",
        VmOptions::default().with_max_steps(3),
    );
    assert!(matches!(err, VmError::StepLimitExceeded { limit: 3 }), "{err}");
}

#[test]
fn test_array_index_out_of_bounds() {
    let err = run_err(
        "fn Main(): Int { var a: Int[2]; a[2] = 1; return 0; }",
        VmOptions::default(),
    );
    assert!(
        matches!(err, VmError::ArrayIndexOutOfBounds { index: 2, len: 2 }),
        "{err}"
    );
}

#[test]
fn test_module_has_no_entry_point() {
    let file = compile(
        "fn Helper(): Int { return 1; }",
        EmitOptions::default().with_file_type(tern_bytecode::FileType::Module),
    );
    let err = vm_for(&file, VmOptions::default()).execute_main().unwrap_err();
    assert!(matches!(err, VmError::NoEntryPoint));
    assert!(matches!(
        Vm::new(VmOptions::default()).execute_main(),
        Err(VmError::NoAssembly)
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Jump targets
// ══════════════════════════════════════════════════════════════════════════════

/// Run a skipped `if` whose body has `statements` statements; return the
/// taken jump's target and the offset of the instruction after the body.
fn skipped_branch(statements: usize) -> (Instruction, usize, usize) {
    let body = "g = g + 1000; ".repeat(statements);
    let source = format!(
        "var g: Int = 0;\nfn Main(): Int {{ var x: Int = 0; if x > 1 {{ {body} }} return x; }}"
    );
    let file = compile(&source, EmitOptions::default());
    let code = main_code(&file);
    let (jump_at, jump) = code
        .iter()
        .find(|(_, i)| matches!(i, Instruction::Jump8 { .. } | Instruction::Jump16 { .. }))
        .copied()
        .expect("no jump emitted");
    let (after_body, _) = code
        .iter()
        .find(|(_, i)| matches!(i, Instruction::RetLocal { .. }))
        .copied()
        .expect("no retlocal emitted");

    let options = VmOptions {
        trace_jumps: true,
        ..VmOptions::default()
    };
    let mut vm = vm_for(&file, options);
    assert_eq!(vm.execute_main().unwrap().as_i64(), 0);
    assert_eq!(vm.global(0).unwrap().as_i64(), 0, "body must not run");
    let trace = vm.jump_trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].from, jump_at);
    (jump, trace[0].to, after_body)
}

#[test]
fn test_short_jump_lands_after_body() {
    let (jump, to, after_body) = skipped_branch(1);
    assert!(matches!(jump, Instruction::Jump8 { .. }));
    assert_eq!(to, after_body);
}

#[test]
fn test_widened_jump_lands_after_body() {
    let (jump, to, after_body) = skipped_branch(40);
    assert!(matches!(jump, Instruction::Jump16 { .. }));
    assert_eq!(to, after_body);
    assert!(to > 255);
}

// ══════════════════════════════════════════════════════════════════════════════
// Loading
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.tbc");
    compile("fn Main(): Int { return 3; }", EmitOptions::default())
        .write_file(&path)
        .unwrap();

    let mut vm = Vm::new(VmOptions::default());
    vm.set_assembly(load_assembly(&path).unwrap());
    assert_eq!(vm.execute_main().unwrap().as_i64(), 3);
}

#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = load_assembly(dir.path().join("nope.tbc")).unwrap_err();
    assert!(matches!(missing, LoadError::NotExists { .. }));

    let mut bytes = compile("fn Main(): Int { return 3; }", EmitOptions::default())
        .to_bytes()
        .unwrap();
    bytes.push(0);
    let path = dir.path().join("grown.tbc");
    std::fs::write(&path, &bytes).unwrap();
    let corrupt = load_assembly(&path).unwrap_err();
    assert!(matches!(corrupt, LoadError::CorruptFile { .. }));

    let vm_error: VmError = corrupt.into();
    assert!(vm_error.to_string().contains("corrupt codefile"));
}
