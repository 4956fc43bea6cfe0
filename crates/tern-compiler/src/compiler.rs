//! The file-level facade used by the CLI and embedders.

use std::fs;
use std::path::{Path, PathBuf};

use tern_bytecode::{disassemble, CodeFile};
use tern_codegen::EmitOptions;
use tern_types::CompileErrors;
use tracing::{info, warn};

use crate::error::{CompilerError, CompilerResult};

/// Default output for `source`: the source path with `.tbc` appended.
pub fn codefile_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".tbc");
    PathBuf::from(name)
}

/// Compiles source files to codefiles and disassembles codefiles.
///
/// The `bool` methods report success and keep details on the facade: compile
/// diagnostics in [`Compiler::errors`], anything else in
/// [`Compiler::last_error`]. The `try_` forms return them directly.
#[derive(Debug, Default)]
pub struct Compiler {
    options: EmitOptions,
    output: Option<PathBuf>,
    errors: CompileErrors,
    last_error: Option<CompilerError>,
}

impl Compiler {
    pub fn new(options: EmitOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Write the next codefile to `path` instead of next to the source.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Diagnostics from the latest compile.
    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    /// The failure behind the latest `false` result.
    pub fn last_error(&self) -> Option<&CompilerError> {
        self.last_error.as_ref()
    }

    pub fn compile_from_source(&mut self, path: impl AsRef<Path>) -> bool {
        let result = self.try_compile_from_source(path.as_ref());
        self.record(result)
    }

    /// Compile `path` and write the codefile. Nothing is written when the
    /// source has errors. Returns the output path.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub fn try_compile_from_source(&mut self, path: &Path) -> CompilerResult<PathBuf> {
        self.errors = CompileErrors::empty();
        let source = fs::read_to_string(path).map_err(|source| CompilerError::ReadSource {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path.to_string_lossy();
        let bytes = match crate::compile_with(&source, &filename, self.options) {
            Ok(bytes) => bytes,
            Err(errors) => {
                let count = errors.total_errors;
                self.errors = errors;
                return Err(CompilerError::Diagnostics { count });
            }
        };

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| codefile_path(path));
        fs::write(&output, &bytes).map_err(|source| CompilerError::WriteOutput {
            path: output.clone(),
            source,
        })?;
        info!(output = %output.display(), bytes = bytes.len(), "wrote codefile");
        Ok(output)
    }

    pub fn disassembly(&mut self, path: impl AsRef<Path>, output: impl AsRef<Path>) -> bool {
        let result = self.try_disassembly(path.as_ref(), output.as_ref());
        self.record(result)
    }

    /// Load the codefile at `path` and write its listing to `output`.
    pub fn try_disassembly(&mut self, path: &Path, output: &Path) -> CompilerResult<()> {
        let file = CodeFile::read_file(path)?;
        fs::write(output, disassemble(&file)).map_err(|source| CompilerError::WriteOutput {
            path: output.to_path_buf(),
            source,
        })
    }

    fn record<T>(&mut self, result: CompilerResult<T>) -> bool {
        match result {
            Ok(_) => {
                self.last_error = None;
                true
            }
            Err(e) => {
                warn!(error = %e, "compiler operation failed");
                self.last_error = Some(e);
                false
            }
        }
    }
}
