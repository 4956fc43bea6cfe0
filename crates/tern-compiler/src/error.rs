//! Facade errors: file I/O and failed compiles.

use std::io;
use std::path::PathBuf;

use tern_bytecode::LoadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("failed to read '{path}': {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source had diagnostics; they are kept on the [`crate::Compiler`].
    #[error("compilation failed with {count} error(s)")]
    Diagnostics { count: usize },

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type CompilerResult<T> = Result<T, CompilerError>;
