//! External watch-face compiler
//!
//! Invocation contract:
//! `<tool> -b <project> output <stem>.face 1461256429`
//! run with the output dir as working directory. The tool writes
//! `<output dir>/output/<stem>.face`; its exit status is not reliable, so
//! success is judged by the presence of that file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

/// Default executable name of the compiler.
pub const DEFAULT_TOOL: &str = "compile.exe";

/// Protocol constant the tool expects as its last argument.
pub const PROTOCOL_CONSTANT: &str = "1461256429";

/// Subdirectory (of the working directory) the tool writes into.
pub const OUTPUT_SUBDIR: &str = "output";

/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "face";

/// Toolchain errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("compiler tool not found: {}", .0.display())]
    ToolNotFound(PathBuf),

    #[error("project file not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("project path has no file stem: {}", .0.display())]
    InvalidProjectPath(PathBuf),

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("compiler produced no output at {} (stderr: {stderr})", expected.display())]
    OutputMissing {
        expected: PathBuf,
        stdout: String,
        stderr: String,
    },
}

/// `<stem>.face` for a project file.
pub fn artifact_file_name(project: &Path) -> Result<String, ToolchainError> {
    let stem = project
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolchainError::InvalidProjectPath(project.to_path_buf()))?;
    Ok(format!("{}.{}", stem, ARTIFACT_EXTENSION))
}

/// `<output_dir>/output/<stem>.face` for a project file.
pub fn artifact_path(output_dir: &Path, project: &Path) -> Result<PathBuf, ToolchainError> {
    Ok(output_dir
        .join(OUTPUT_SUBDIR)
        .join(artifact_file_name(project)?))
}

/// Handle to the external compiler executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCompiler {
    tool: PathBuf,
    protocol_constant: String,
}

impl ExternalCompiler {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            protocol_constant: PROTOCOL_CONSTANT.to_string(),
        }
    }

    /// Override the trailing protocol constant
    pub fn with_protocol_constant(mut self, constant: impl Into<String>) -> Self {
        self.protocol_constant = constant.into();
        self
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Arguments after the tool path, in contract order.
    pub fn command_args(&self, project: &Path) -> Result<Vec<OsString>, ToolchainError> {
        Ok(vec![
            OsString::from("-b"),
            project.as_os_str().to_os_string(),
            OsString::from(OUTPUT_SUBDIR),
            OsString::from(artifact_file_name(project)?),
            OsString::from(&self.protocol_constant),
        ])
    }

    /// Run the compiler and return the artifact path.
    ///
    /// `output_dir` becomes the tool's working directory; its `output`
    /// subdirectory is created if needed.
    pub fn compile(&self, project: &Path, output_dir: &Path) -> Result<PathBuf, ToolchainError> {
        if !project.exists() {
            return Err(ToolchainError::ProjectNotFound(project.to_path_buf()));
        }
        if !self.tool.exists() {
            return Err(ToolchainError::ToolNotFound(self.tool.clone()));
        }

        let expected = artifact_path(output_dir, project)?;
        let out_subdir = output_dir.join(OUTPUT_SUBDIR);
        std::fs::create_dir_all(&out_subdir).map_err(|source| ToolchainError::CreateDir {
            path: out_subdir.clone(),
            source,
        })?;

        // The tool runs elsewhere, so hand it absolute paths.
        let tool = absolute(&self.tool);
        let project = absolute(project);
        let args = self.command_args(&project)?;
        debug!(tool = %tool.display(), ?args, cwd = %output_dir.display(), "running compiler");

        let output = Command::new(&tool)
            .args(&args)
            .current_dir(output_dir)
            .output()
            .map_err(|source| ToolchainError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !expected.exists() {
            return Err(ToolchainError::OutputMissing {
                expected,
                stdout,
                stderr,
            });
        }
        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %stderr,
                "compiler exited unsuccessfully but produced output"
            );
        }

        info!(artifact = %expected.display(), "compiler produced artifact");
        Ok(expected)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
