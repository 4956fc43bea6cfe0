//! Emitter configuration.

use serde::{Deserialize, Serialize};
use tern_bytecode::FileType;

/// How aggressively the emitter uses registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// Every parameter and local lives on the stack.
    None,
    /// Register calling conventions; locals on the stack.
    #[default]
    Default,
    /// As `Default`, and scalar locals take free registers.
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    pub opt_level: OptLevel,
    pub file_type: FileType,
}

impl EmitOptions {
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: EmitOptions = serde_json::from_str(r#"{"opt_level":"fast"}"#).unwrap();
        assert_eq!(opts.opt_level, OptLevel::Fast);
        assert_eq!(opts.file_type, FileType::Executable);
    }
}
