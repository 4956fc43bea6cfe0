//! The loaded program image.

use std::path::Path;

use tern_bytecode::{CodeFile, FileType, FunctionKind, LoadError, LoadResult};
use tern_types::Primitive;
use tracing::debug;

use crate::value::Value;

/// A function ready to run.
#[derive(Debug, Clone)]
pub enum RtFunction {
    Bytecode {
        local_reserve: u16,
        stack_args: u16,
        code: Vec<u8>,
    },
    Native {
        library: String,
        symbol: String,
    },
}

/// A validated codefile, with strings terminated and globals decoded.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub file_type: FileType,
    pub entry: u32,
    pub functions: Vec<RtFunction>,
    /// Initial global values.
    pub globals: Vec<Value>,
    /// String table entries, each followed by a NUL so `ldstr` can hand out
    /// C strings.
    pub strings: Vec<Box<[u8]>>,
}

impl Assembly {
    /// Build from an already validated [`CodeFile`].
    pub fn from_codefile(file: CodeFile) -> LoadResult<Self> {
        let text = |index: u32| -> LoadResult<String> {
            file.strings
                .get(index as usize)
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .ok_or_else(|| LoadError::BadFile {
                    reason: format!("string index {index} out of range"),
                })
        };

        let mut functions = Vec::with_capacity(file.functions.len());
        for entry in &file.functions {
            functions.push(match &entry.kind {
                FunctionKind::Bytecode {
                    local_reserve,
                    stack_args,
                    code,
                } => RtFunction::Bytecode {
                    local_reserve: *local_reserve,
                    stack_args: *stack_args,
                    code: code.clone(),
                },
                FunctionKind::Native { library, symbol } => RtFunction::Native {
                    library: text(*library)?,
                    symbol: text(*symbol)?,
                },
            });
        }

        let globals = file
            .globals
            .iter()
            .map(|g| match g.primitive {
                Primitive::Byte => Value::from_u64(g.bits & 0xFF),
                _ => Value::from_bits(g.bits),
            })
            .collect();

        let strings = file
            .strings
            .iter()
            .map(|s| {
                let mut bytes = Vec::with_capacity(s.len() + 1);
                bytes.extend_from_slice(s);
                bytes.push(0);
                bytes.into_boxed_slice()
            })
            .collect();

        Ok(Self {
            file_type: file.file_type,
            entry: file.entry,
            functions,
            globals,
            strings,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> LoadResult<Self> {
        Self::from_codefile(CodeFile::from_bytes(bytes)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> LoadResult<Self> {
        Self::from_codefile(CodeFile::read_file(path)?)
    }

    pub fn function(&self, index: u32) -> Option<&RtFunction> {
        self.functions.get(index as usize)
    }
}

/// Load and validate the codefile at `path`.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_assembly(path: impl AsRef<Path>) -> LoadResult<Assembly> {
    let assembly = Assembly::from_file(path)?;
    debug!(
        functions = assembly.functions.len(),
        globals = assembly.globals.len(),
        strings = assembly.strings.len(),
        "assembly loaded"
    );
    Ok(assembly)
}
