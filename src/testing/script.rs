//! Canned yt-dlp runs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_chunk_size() -> usize {
    7
}

fn default_exit_code() -> Option<i32> {
    Some(0)
}

/// Everything one scripted download process does, in order: write `stdout`
/// and `stderr`, optionally create the `--output` file, then exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunScript {
    /// Description shown in test failure messages
    #[serde(default)]
    pub name: String,
    /// Raw stdout bytes (as text), delimiters included
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Write all of stderr before any stdout, holding stdout open meanwhile.
    /// A reader that waits for stdout EOF before touching stderr stalls on
    /// this once stderr exceeds the pipe buffer.
    #[serde(default)]
    pub stderr_first: bool,
    /// Pipe writes are cut into pieces of this many bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Size of the output file to create; `None` creates nothing
    #[serde(default)]
    pub output_bytes: Option<u64>,
    /// `None` simulates death by signal
    #[serde(default = "default_exit_code")]
    pub exit_code: Option<i32>,
    /// When set, `spawn` itself fails with this message
    #[serde(default)]
    pub spawn_error: Option<String>,
}

impl Default for RunScript {
    fn default() -> Self {
        Self {
            name: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            stderr_first: false,
            chunk_size: default_chunk_size(),
            output_bytes: None,
            exit_code: default_exit_code(),
            spawn_error: None,
        }
    }
}

impl RunScript {
    /// Exits 0 after writing an output file of `output_bytes`
    pub fn success(output_bytes: u64) -> Self {
        Self {
            name: "success".to_string(),
            output_bytes: Some(output_bytes),
            ..Default::default()
        }
    }

    /// Exits with `code` without creating any file
    pub fn exit(code: i32) -> Self {
        Self {
            name: format!("exit {}", code),
            exit_code: Some(code),
            ..Default::default()
        }
    }

    pub fn spawn_failure(message: &str) -> Self {
        Self {
            name: "spawn failure".to_string(),
            spawn_error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn with_stderr_first(mut self) -> Self {
        self.stderr_first = true;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Load a script from a JSON file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let script = serde_json::from_str(&json)?;
        Ok(script)
    }

    /// Get default scripts directory
    pub fn scripts_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/scripts")
    }

    /// Load script by name from default directory
    pub fn load_by_name(name: &str) -> anyhow::Result<Self> {
        Self::load(Self::scripts_dir().join(format!("{}.json", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_defaults() {
        let script: RunScript = serde_json::from_str(r#"{"stdout": "PROGRESS: 1%\r"}"#).unwrap();
        assert_eq!(script.exit_code, Some(0));
        assert_eq!(script.chunk_size, 7);
        assert_eq!(script.output_bytes, None);
        assert!(!script.stderr_first);
        assert_eq!(script.stdout, "PROGRESS: 1%\r");
    }

    #[test]
    fn test_builders() {
        let script = RunScript::success(5).with_exit_code(None).with_chunk_size(1);
        assert_eq!(script.output_bytes, Some(5));
        assert_eq!(script.exit_code, None);
        assert_eq!(script.chunk_size, 1);
    }
}
