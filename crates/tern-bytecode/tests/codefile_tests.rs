//! Codefile container tests: header validation, table layout and the
//! string-length convention.

use tern_bytecode::*;
use tern_types::Primitive;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn body(insns: &[Instruction]) -> Vec<u8> {
    let mut code = Vec::new();
    for insn in insns {
        insn.encode(&mut code);
    }
    code
}

/// `Main` returning 14, one Int global, one string.
fn small_executable() -> CodeFile {
    let mut file = CodeFile::new(FileType::Executable);
    file.functions.push(FunctionEntry {
        kind: FunctionKind::Bytecode {
            local_reserve: 0,
            stack_args: 0,
            code: body(&[Instruction::Ldi4 { dst: 0, value: 14 }, Instruction::Ret]),
        },
    });
    file.globals.push(GlobalEntry {
        primitive: Primitive::Int,
        bits: 10,
    });
    file.strings.push(b"hello".to_vec());
    file
}

fn set_check_size(bytes: &mut [u8], size: u64) {
    bytes[8..16].copy_from_slice(&size.to_le_bytes());
}

// ─────────────────────────────────────────────────────────────────────
// Round trip
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_counts_and_check_size_survive_reload() {
    let file = small_executable();
    let bytes = file.to_bytes().unwrap();
    let loaded = CodeFile::from_bytes(&bytes).unwrap();

    assert_eq!(loaded.functions.len(), 1);
    assert_eq!(loaded.globals.len(), 1);
    assert_eq!(loaded.strings.len(), 1);
    assert_eq!(loaded.globals[0].bits, 10);
    assert_eq!(
        u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        bytes.len() as u64
    );
}

#[test]
fn test_string_length_excludes_terminator() {
    let bytes = small_executable().to_bytes().unwrap();
    // The string table is the last thing in the file: count, len, "hello".
    let tail = &bytes[bytes.len() - (4 + 2 + 5)..];
    assert_eq!(u32::from_le_bytes(tail[..4].try_into().unwrap()), 1);
    assert_eq!(u16::from_le_bytes([tail[4], tail[5]]), 5);
    assert_eq!(&tail[6..], b"hello");
}

#[test]
fn test_module_may_have_no_functions() {
    let file = CodeFile::new(FileType::Module);
    let loaded = CodeFile::from_bytes(&file.to_bytes().unwrap()).unwrap();
    assert_eq!(loaded.file_type, FileType::Module);
    assert!(loaded.functions.is_empty());
}

#[test]
fn test_write_and_read_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.tbc");
    small_executable().write_file(&path).unwrap();
    let loaded = CodeFile::read_file(&path).unwrap();
    assert_eq!(loaded, small_executable());
}

// ─────────────────────────────────────────────────────────────────────
// Rejection
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_size_mismatch_is_corrupt() {
    let mut bytes = small_executable().to_bytes().unwrap();
    let real = bytes.len() as u64;
    set_check_size(&mut bytes, real + 1);
    match CodeFile::from_bytes(&bytes) {
        Err(LoadError::CorruptFile { declared, actual }) => {
            assert_eq!(declared, real + 1);
            assert_eq!(actual, real);
        }
        other => panic!("expected CorruptFile, got {other:?}"),
    }
}

#[test]
fn test_truncated_file_is_corrupt_not_garbage() {
    let bytes = small_executable().to_bytes().unwrap();
    let cut = &bytes[..bytes.len() - 3];
    assert!(matches!(
        CodeFile::from_bytes(cut),
        Err(LoadError::CorruptFile { .. })
    ));
}

#[test]
fn test_altered_signature_is_bad_file() {
    let mut bytes = small_executable().to_bytes().unwrap();
    bytes[1] = b'X';
    assert!(matches!(
        CodeFile::from_bytes(&bytes),
        Err(LoadError::BadFile { .. })
    ));
}

#[test]
fn test_shorter_than_header_is_bad_file() {
    assert!(matches!(
        CodeFile::from_bytes(&SIGNATURE),
        Err(LoadError::BadFile { .. })
    ));
}

#[test]
fn test_unsupported_major_version() {
    let mut bytes = small_executable().to_bytes().unwrap();
    bytes[17] = VERSION_MAJOR + 1;
    assert!(matches!(
        CodeFile::from_bytes(&bytes),
        Err(LoadError::BadFile { .. })
    ));
}

#[test]
fn test_entry_out_of_range() {
    let mut file = small_executable();
    file.entry = 1;
    let bytes = file.to_bytes().unwrap();
    assert!(matches!(
        CodeFile::from_bytes(&bytes),
        Err(LoadError::BadFile { .. })
    ));
}

#[test]
fn test_missing_path_is_not_exists() {
    let dir = tempfile::tempdir().unwrap();
    let err = CodeFile::read_file(dir.path().join("absent.tbc")).unwrap_err();
    assert!(matches!(err, LoadError::NotExists { .. }));
}

#[test]
fn test_oversized_string_is_refused_on_write() {
    let mut file = CodeFile::new(FileType::Module);
    file.strings.push(vec![b'a'; u16::MAX as usize + 1]);
    assert!(file.to_bytes().is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Disassembly
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_disassembly_lists_tables_and_body() {
    let text = disassemble(&small_executable());
    assert!(text.contains("g0: Int = 0xa"), "{text}");
    assert!(text.contains("str#0: \"hello\""), "{text}");
    assert!(text.contains("ldi4 r0, 14"), "{text}");
    assert!(text.contains("0002  ret"), "{text}");
}
