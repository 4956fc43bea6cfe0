//! VM configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Deepest bytecode call nesting before `CallDepthExceeded`.
    pub max_call_depth: usize,
    /// Instruction budget for one `execute_main`; `None` is unlimited.
    pub max_steps: Option<u64>,
    /// Directories searched for extern libraries before the system paths.
    pub library_paths: Vec<PathBuf>,
    /// Record every taken jump in the execution context.
    pub trace_jumps: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_steps: None,
            library_paths: Vec::new(),
            trace_jumps: false,
        }
    }
}

impl VmOptions {
    pub fn with_max_steps(mut self, limit: u64) -> Self {
        self.max_steps = Some(limit);
        self
    }

    pub fn with_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_paths.push(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: VmOptions = serde_json::from_str(r#"{"trace_jumps":true}"#).unwrap();
        assert!(opts.trace_jumps);
        assert_eq!(opts.max_call_depth, 1024);
        assert_eq!(opts.max_steps, None);
    }
}
