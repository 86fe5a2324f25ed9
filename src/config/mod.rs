//! Project configuration (facepack.toml)
//!
//! Every field has a built-in default, so a missing or partial file is
//! valid. Precedence: built-in defaults → config file → CLI flags.
//!
//! ```toml
//! image_dir = "images"
//! face_id = "123456789"
//! backend = "native"
//!
//! [compiler]
//! tool = "compile.exe"
//! protocol_constant = "1461256429"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::identifier::{FaceId, PatchError};
use crate::serializer::DEFAULT_IMAGE_DIR;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "facepack.toml";

/// Face ID written when none is configured.
pub const DEFAULT_FACE_ID: &str = "123456789";

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid face_id: {0}")]
    FaceId(#[from] PatchError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// How the artifact is produced before patching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Built in-process by the container serializer
    #[default]
    Native,
    /// Built by the external compiler executable
    External,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::External => "external",
        }
    }
}

/// External compiler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Path to the compiler executable
    pub tool: PathBuf,

    /// Trailing protocol constant the tool requires
    pub protocol_constant: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from(crate::toolchain::DEFAULT_TOOL),
            protocol_constant: crate::toolchain::PROTOCOL_CONSTANT.to_string(),
        }
    }
}

/// Configuration from facepack.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Image directory, relative to the project file
    pub image_dir: PathBuf,

    /// Face ID patched into every produced artifact
    pub face_id: String,

    /// Artifact producer
    pub backend: Backend,

    /// External compiler settings
    pub compiler: CompilerConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            face_id: DEFAULT_FACE_ID.to_string(),
            backend: Backend::default(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl ForgeConfig {
    /// Load and parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: ForgeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `facepack.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.face_id()?;

        if self.compiler.protocol_constant.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "compiler.protocol_constant must not be empty".to_string(),
            ));
        }

        if self.image_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "image_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Validated face ID
    pub fn face_id(&self) -> Result<FaceId, ConfigError> {
        Ok(FaceId::new(&self.face_id)?)
    }

    /// Apply CLI overrides (layer 3) and re-validate
    pub fn with_overrides(
        mut self,
        face_id: Option<String>,
        backend: Option<Backend>,
        image_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let Some(id) = face_id {
            self.face_id = id;
        }
        if let Some(backend) = backend {
            self.backend = backend;
        }
        if let Some(dir) = image_dir {
            self.image_dir = dir;
        }
        self.validate()?;
        Ok(self)
    }
}
