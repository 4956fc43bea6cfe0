//! Human-readable listing of a codefile.

use std::fmt::Write;

use crate::codefile::{CodeFile, FunctionKind};
use crate::instruction::{DecodeError, Instruction};

/// Decode a whole function body into `(offset, instruction)` pairs.
pub fn decode_function(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < code.len() {
        let (insn, len) = Instruction::decode(code, at)?;
        out.push((at, insn));
        at += len;
    }
    Ok(out)
}

fn string_at(file: &CodeFile, index: u32) -> String {
    file.strings
        .get(index as usize)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_else(|| format!("<str#{index}?>"))
}

/// Render the header, tables and every function body.
pub fn disassemble(file: &CodeFile) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_listing(file, &mut out);
    out
}

fn write_listing(file: &CodeFile, out: &mut String) -> std::fmt::Result {
    writeln!(
        out,
        "; codefile v{}.{} {:?} entry=fn#{}",
        file.major, file.minor, file.file_type, file.entry
    )?;

    if !file.globals.is_empty() {
        writeln!(out, "\n.globals")?;
        for (i, g) in file.globals.iter().enumerate() {
            writeln!(out, "  g{i}: {} = 0x{:x}", g.primitive.name(), g.bits)?;
        }
    }

    if !file.strings.is_empty() {
        writeln!(out, "\n.strings")?;
        for (i, s) in file.strings.iter().enumerate() {
            writeln!(out, "  str#{i}: {:?}", String::from_utf8_lossy(s))?;
        }
    }

    for (index, f) in file.functions.iter().enumerate() {
        writeln!(out)?;
        match &f.kind {
            FunctionKind::Native { library, symbol } => {
                writeln!(
                    out,
                    "fn#{index}: native {}!{}",
                    string_at(file, *library),
                    string_at(file, *symbol)
                )?;
            }
            FunctionKind::Bytecode {
                local_reserve,
                stack_args,
                code,
            } => {
                writeln!(
                    out,
                    "fn#{index}: locals={local_reserve} stack_args={stack_args} size={}",
                    code.len()
                )?;
                write_body(code, out)?;
            }
        }
    }
    Ok(())
}

fn write_body(code: &[u8], out: &mut String) -> std::fmt::Result {
    let mut at = 0;
    while at < code.len() {
        match Instruction::decode(code, at) {
            Ok((insn, len)) => {
                write!(out, "  {at:04x}  {insn}")?;
                let target = match insn {
                    Instruction::Jump8 { offset, .. } => Some(at + len + offset as usize),
                    Instruction::Jump16 { offset, .. } => Some(at + len + offset as usize),
                    _ => None,
                };
                if let Some(target) = target {
                    write!(out, "    ; -> {target:04x}")?;
                }
                writeln!(out)?;
                at += len;
            }
            Err(e) => {
                writeln!(out, "  {at:04x}  <{e}>")?;
                break;
            }
        }
    }
    Ok(())
}
