//! Archive inspection via the external `divine` tool.
//!
//! The inspector wraps two operations on a package file: extracting selected
//! entries into a directory and listing every entry path the archive
//! contains. Both shell out to the Divine executable (part of LSLib) and map
//! its exit status to a success or a per-file, retryable failure.
//!
//! The [`PakInspector`] trait is the seam used by the extraction pipeline;
//! tests substitute a fake implementation.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Errors produced by archive inspection.
#[derive(Debug, Error)]
pub enum InspectorError {
    /// The external tool exited non-zero or could not be launched while
    /// extracting. Isolated to one package file.
    #[error("failed to extract {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    /// The external tool exited non-zero or could not be launched while
    /// listing. Isolated to one package file.
    #[error("failed to list {path}: {reason}")]
    ListFailed { path: PathBuf, reason: String },

    /// The tool binary itself is absent. This is the only fatal condition:
    /// no package can be processed without it.
    #[error("inspection tool not found at {path}")]
    ToolMissing { path: PathBuf },
}

/// Archive inspection operations needed by the extraction pipeline.
pub trait PakInspector: Send + Sync {
    /// Verify the inspection tool is usable before any task is dispatched.
    fn check_tool(&self) -> Result<(), InspectorError> {
        Ok(())
    }

    /// Extract the package's metadata descriptor files into `dest`.
    fn extract(&self, pak: &Path, dest: &Path) -> Result<(), InspectorError>;

    /// List every entry path contained in the package, one string per entry.
    fn list(&self, pak: &Path) -> Result<Vec<String>, InspectorError>;
}

/// Inspector backed by the Divine command-line tool.
#[derive(Debug, Clone)]
pub struct DivineInspector {
    tool_path: PathBuf,
    game: String,
}

impl DivineInspector {
    /// Default game identifier passed to Divine.
    pub const DEFAULT_GAME: &'static str = "bg3";

    /// Glob passed to Divine so only module descriptors are extracted.
    const DESCRIPTOR_GLOB: &'static str = "*/meta.lsx";

    /// Create an inspector invoking the tool at `tool_path`.
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            game: Self::DEFAULT_GAME.to_string(),
        }
    }

    /// Override the game identifier (builder pattern).
    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = game.into();
        self
    }

    /// Path to the configured tool binary.
    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }
}

impl PakInspector for DivineInspector {
    fn check_tool(&self) -> Result<(), InspectorError> {
        if self.tool_path.is_file() {
            Ok(())
        } else {
            Err(InspectorError::ToolMissing {
                path: self.tool_path.clone(),
            })
        }
    }

    fn extract(&self, pak: &Path, dest: &Path) -> Result<(), InspectorError> {
        debug!(pak = %pak.display(), dest = %dest.display(), "extracting package");

        let output = Command::new(&self.tool_path)
            .arg("-a")
            .arg("extract-package")
            .arg("-g")
            .arg(&self.game)
            .arg("-s")
            .arg(pak)
            .arg("-d")
            .arg(dest)
            .arg("-x")
            .arg(Self::DESCRIPTOR_GLOB)
            .arg("-l")
            .arg("off")
            .output()
            .map_err(|e| InspectorError::ExtractionFailed {
                path: pak.to_path_buf(),
                reason: format!("failed to run {}: {}", self.tool_path.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InspectorError::ExtractionFailed {
                path: pak.to_path_buf(),
                reason: format!("tool exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }

    fn list(&self, pak: &Path) -> Result<Vec<String>, InspectorError> {
        debug!(pak = %pak.display(), "listing package");

        let output = Command::new(&self.tool_path)
            .arg("-a")
            .arg("list-package")
            .arg("-g")
            .arg(&self.game)
            .arg("-s")
            .arg(pak)
            .output()
            .map_err(|e| InspectorError::ListFailed {
                path: pak.to_path_buf(),
                reason: format!("failed to run {}: {}", self.tool_path.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InspectorError::ListFailed {
                path: pak.to_path_buf(),
                reason: format!("tool exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_tool_missing() {
        let inspector = DivineInspector::new("/nonexistent/divine");
        let result = inspector.check_tool();
        assert!(matches!(result, Err(InspectorError::ToolMissing { .. })));
    }

    #[test]
    fn test_check_tool_present() {
        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("divine");
        fs::write(&tool, b"").unwrap();

        let inspector = DivineInspector::new(&tool);
        assert!(inspector.check_tool().is_ok());
    }

    #[test]
    fn test_extract_launch_failure_is_retryable() {
        let inspector = DivineInspector::new("/nonexistent/divine");
        let result = inspector.extract(Path::new("mod.pak"), Path::new("/tmp/out"));
        assert!(matches!(
            result,
            Err(InspectorError::ExtractionFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_parses_stdout_lines() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("divine");
        fs::write(
            &tool,
            "#!/bin/sh\nprintf 'Mods/MyMod/meta.lsx\\n  Public/Shared/x.lsf  \\n\\n'\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let inspector = DivineInspector::new(&tool);
        let entries = inspector.list(Path::new("mod.pak")).unwrap();

        assert_eq!(
            entries,
            vec![
                "Mods/MyMod/meta.lsx".to_string(),
                "Public/Shared/x.lsf".to_string(),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_list_nonzero_exit_fails() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let tool = temp.path().join("divine");
        fs::write(&tool, "#!/bin/sh\nexit 3\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let inspector = DivineInspector::new(&tool);
        let result = inspector.list(Path::new("mod.pak"));
        assert!(matches!(result, Err(InspectorError::ListFailed { .. })));
    }
}
