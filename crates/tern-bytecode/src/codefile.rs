//! The codefile container: header, function table, global table, string table.
//!
//! ```text
//! Header (23 bytes)
//!   signature  [u8; 8]  7F 'T' 'E' 'R' 'N' 'B' 'C' 00
//!   check_size u64      total file length
//!   file_type  u8
//!   major      u8
//!   minor      u8
//!   entry      u32      function index of Main
//! Function table: u32 count, then { flags u32, field_a u32, field_b u32, code }
//! Global table:   u32 count, then { tag u8, payload (1 byte for Byte, else 8) }
//! String table:   u32 count, then { len u16, bytes }   (no terminator on disk)
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tern_types::Primitive;

pub const SIGNATURE: [u8; 8] = [0x7F, b'T', b'E', b'R', b'N', b'B', b'C', 0x00];
pub const HEADER_SIZE: usize = 23;
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum FileType {
    #[default]
    Executable = 0,
    /// A library of functions; no entry point is required.
    Module = 1,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FunctionFlags: u32 {
        const NATIVE = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKind {
    Bytecode {
        /// Stack slots reserved for locals above the stack arguments.
        local_reserve: u16,
        /// Arguments the caller pushed on the stack.
        stack_args: u16,
        code: Vec<u8>,
    },
    Native {
        /// String-table index of the library name.
        library: u32,
        /// String-table index of the symbol name.
        symbol: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub kind: FunctionKind,
}

impl FunctionEntry {
    pub fn flags(&self) -> FunctionFlags {
        match self.kind {
            FunctionKind::Native { .. } => FunctionFlags::NATIVE,
            FunctionKind::Bytecode { .. } => FunctionFlags::empty(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.flags().contains(FunctionFlags::NATIVE)
    }
}

/// A global slot with its initial value as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEntry {
    pub primitive: Primitive,
    pub bits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFile {
    pub file_type: FileType,
    pub major: u8,
    pub minor: u8,
    pub entry: u32,
    pub functions: Vec<FunctionEntry>,
    pub globals: Vec<GlobalEntry>,
    /// String contents without terminators.
    pub strings: Vec<Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("codefile '{path}' does not exist")]
    NotExists { path: String },
    #[error("malformed codefile: {reason}")]
    BadFile { reason: String },
    #[error("corrupt codefile: header declares {declared} bytes but file has {actual}")]
    CorruptFile { declared: u64, actual: u64 },
    #[error("failed to read codefile: {0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    fn bad(reason: impl Into<String>) -> Self {
        LoadError::BadFile {
            reason: reason.into(),
        }
    }
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

// ─────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────

fn wr_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}
fn wr_u16le<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_u32le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_u64le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn count_u32(n: usize, what: &str) -> io::Result<u32> {
    u32::try_from(n).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("too many {what} for a codefile"),
        )
    })
}

impl CodeFile {
    pub fn new(file_type: FileType) -> Self {
        Self {
            file_type,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            entry: 0,
            functions: Vec::new(),
            globals: Vec::new(),
            strings: Vec::new(),
        }
    }

    /// Serialise to bytes. The header's `check_size` is filled in last.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_all(&SIGNATURE)?;
        wr_u64le(&mut out, 0)?;
        wr_u8(&mut out, self.file_type as u8)?;
        wr_u8(&mut out, self.major)?;
        wr_u8(&mut out, self.minor)?;
        wr_u32le(&mut out, self.entry)?;

        wr_u32le(&mut out, count_u32(self.functions.len(), "functions")?)?;
        for f in &self.functions {
            wr_u32le(&mut out, f.flags().bits())?;
            match &f.kind {
                FunctionKind::Bytecode {
                    local_reserve,
                    stack_args,
                    code,
                } => {
                    wr_u32le(&mut out, (*local_reserve as u32) | ((*stack_args as u32) << 16))?;
                    wr_u32le(&mut out, count_u32(code.len(), "code bytes")?)?;
                    out.write_all(code)?;
                }
                FunctionKind::Native { library, symbol } => {
                    wr_u32le(&mut out, *library)?;
                    wr_u32le(&mut out, *symbol)?;
                }
            }
        }

        wr_u32le(&mut out, count_u32(self.globals.len(), "globals")?)?;
        for g in &self.globals {
            wr_u8(&mut out, g.primitive.tag())?;
            if g.primitive == Primitive::Byte {
                wr_u8(&mut out, g.bits as u8)?;
            } else {
                wr_u64le(&mut out, g.bits)?;
            }
        }

        wr_u32le(&mut out, count_u32(self.strings.len(), "strings")?)?;
        for s in &self.strings {
            let len = u16::try_from(s.len()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "string constant longer than 65535 bytes",
                )
            })?;
            wr_u16le(&mut out, len)?;
            out.write_all(s)?;
        }

        let size = out.len() as u64;
        out[8..16].copy_from_slice(&size.to_le_bytes());
        Ok(out)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.to_bytes()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────

    pub fn read_file(path: impl AsRef<Path>) -> LoadResult<CodeFile> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::NotExists {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_bytes(&bytes)
    }

    /// Parse and validate a complete codefile image.
    pub fn from_bytes(bytes: &[u8]) -> LoadResult<CodeFile> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::bad(format!(
                "file is {} bytes, shorter than the {HEADER_SIZE}-byte header",
                bytes.len()
            )));
        }
        if bytes[..8] != SIGNATURE {
            return Err(LoadError::bad("bad signature"));
        }

        let mut r = Reader { bytes, pos: 8 };
        let declared = r.u64()?;
        let actual = bytes.len() as u64;
        if declared != actual {
            return Err(LoadError::CorruptFile { declared, actual });
        }

        let file_type = match r.u8()? {
            0 => FileType::Executable,
            1 => FileType::Module,
            other => return Err(LoadError::bad(format!("unknown file type {other}"))),
        };
        let major = r.u8()?;
        let minor = r.u8()?;
        if major != VERSION_MAJOR {
            return Err(LoadError::bad(format!(
                "unsupported version {major}.{minor}"
            )));
        }
        let entry = r.u32()?;

        let function_count = r.u32()?;
        let mut functions = Vec::new();
        for _ in 0..function_count {
            let flags = FunctionFlags::from_bits(r.u32()?)
                .ok_or_else(|| LoadError::bad("unknown function flags"))?;
            let field_a = r.u32()?;
            let field_b = r.u32()?;
            let kind = if flags.contains(FunctionFlags::NATIVE) {
                FunctionKind::Native {
                    library: field_a,
                    symbol: field_b,
                }
            } else {
                FunctionKind::Bytecode {
                    local_reserve: (field_a & 0xFFFF) as u16,
                    stack_args: (field_a >> 16) as u16,
                    code: r.take(field_b as usize)?.to_vec(),
                }
            };
            functions.push(FunctionEntry { kind });
        }

        let global_count = r.u32()?;
        let mut globals = Vec::new();
        for _ in 0..global_count {
            let tag = r.u8()?;
            let primitive = Primitive::from_tag(tag)
                .ok_or_else(|| LoadError::bad(format!("unknown global tag {tag}")))?;
            let bits = if primitive == Primitive::Byte {
                r.u8()? as u64
            } else {
                r.u64()?
            };
            globals.push(GlobalEntry { primitive, bits });
        }

        let string_count = r.u32()?;
        let mut strings = Vec::new();
        for _ in 0..string_count {
            let len = r.u16()? as usize;
            strings.push(r.take(len)?.to_vec());
        }

        if r.pos != bytes.len() {
            return Err(LoadError::bad(format!(
                "{} trailing bytes after string table",
                bytes.len() - r.pos
            )));
        }

        if file_type == FileType::Executable && entry as usize >= functions.len() {
            return Err(LoadError::bad(format!(
                "entry point {entry} outside function table of {}",
                functions.len()
            )));
        }

        for (index, f) in functions.iter().enumerate() {
            if let FunctionKind::Native { library, symbol } = f.kind {
                if library as usize >= strings.len() || symbol as usize >= strings.len() {
                    return Err(LoadError::bad(format!(
                        "native function {index} names a missing string"
                    )));
                }
            }
        }

        Ok(CodeFile {
            file_type,
            major,
            minor,
            entry,
            functions,
            globals,
            strings,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> LoadResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| LoadError::bad(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> LoadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> LoadResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> LoadResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> LoadResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeFile {
        let mut file = CodeFile::new(FileType::Executable);
        file.strings = vec![b"c".to_vec(), b"abs".to_vec()];
        file.functions = vec![
            FunctionEntry {
                kind: FunctionKind::Native {
                    library: 0,
                    symbol: 1,
                },
            },
            FunctionEntry {
                kind: FunctionKind::Bytecode {
                    local_reserve: 2,
                    stack_args: 1,
                    code: vec![0x02, 0x05, 0x62],
                },
            },
        ];
        file.entry = 1;
        file.globals = vec![
            GlobalEntry {
                primitive: Primitive::Int,
                bits: 10,
            },
            GlobalEntry {
                primitive: Primitive::Byte,
                bits: 7,
            },
        ];
        file
    }

    #[test]
    fn header_layout_is_fixed() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..8], &SIGNATURE);
        assert_eq!(
            u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            bytes.len() as u64
        );
        assert_eq!(bytes[16], 0);
        assert_eq!(bytes[17], VERSION_MAJOR);
        assert_eq!(u32::from_le_bytes(bytes[19..23].try_into().unwrap()), 1);
    }

    #[test]
    fn function_fields_pack_reserve_and_stack_args() {
        let bytes = sample().to_bytes().unwrap();
        // Second function starts after the table count and the 12-byte native entry.
        let at = HEADER_SIZE + 4 + 12;
        let field_a = u32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap());
        assert_eq!(field_a, 2 | (1 << 16));
    }

    #[test]
    fn byte_globals_use_one_byte_payload() {
        let mut file = CodeFile::new(FileType::Module);
        file.globals = vec![GlobalEntry {
            primitive: Primitive::Byte,
            bits: 0xAB,
        }];
        let bytes = file.to_bytes().unwrap();
        // header + 0 functions + global count + tag + payload + 0 strings
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 4 + 1 + 1 + 4);
    }

    #[test]
    fn reads_back_what_it_wrote() {
        let file = sample();
        let loaded = CodeFile::from_bytes(&file.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded, file);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.push(0);
        let size = bytes.len() as u64;
        bytes[8..16].copy_from_slice(&size.to_le_bytes());
        assert!(matches!(
            CodeFile::from_bytes(&bytes),
            Err(LoadError::BadFile { .. })
        ));
    }

    #[test]
    fn dangling_native_string_is_rejected() {
        let mut file = sample();
        file.strings.truncate(1);
        let bytes = file.to_bytes().unwrap();
        assert!(matches!(
            CodeFile::from_bytes(&bytes),
            Err(LoadError::BadFile { .. })
        ));
    }
}
