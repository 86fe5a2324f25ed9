//! Compile pipeline
//!
//! Produces `<output dir>/output/<stem>.face` from a project file, either
//! with the native serializer or the external compiler, then patches the
//! configured face ID into it. Also hosts `inspect`, which decodes a
//! container produced by the native serializer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use facepack_format::{Container, FormatError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::{Backend, ConfigError, ForgeConfig};
use crate::descriptor::{DescriptorError, ProjectDescriptor};
use crate::identifier::{self, PatchError, PatchOutcome, SlotStrategy};
use crate::serializer::{
    decode_payload, BuildError, ContainerSerializer, DecodedPayload, PayloadError,
};
use crate::toolchain::{self, ExternalCompiler, ToolchainError, OUTPUT_SUBDIR};

/// Error category, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Face ID is not exactly 9 ASCII characters.
    Validation,
    /// Project text or container bytes are malformed.
    Format,
    /// Computed ID offset lies outside the file.
    Bounds,
    /// A referenced image could not be read.
    ComponentRead,
    /// A component could not be encoded.
    ComponentEncode,
    /// Open, read, write or flush failure.
    Io,
    /// Configuration is invalid.
    Config,
    /// The external compiler failed.
    Toolchain,
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("container error in {}: {source}", path.display())]
    Container {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("record {index} ({kind}) could not be decoded: {source}")]
    Payload {
        index: usize,
        kind: String,
        #[source]
        source: PayloadError,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForgeError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForgeError::Config(ConfigError::FaceId(_)) => ErrorKind::Validation,
            ForgeError::Config(_) => ErrorKind::Config,
            ForgeError::Patch(e) => match e {
                PatchError::InvalidIdentifier { .. } => ErrorKind::Validation,
                PatchError::PositionOutOfBounds { .. } => ErrorKind::Bounds,
                PatchError::Io { .. } => ErrorKind::Io,
            },
            ForgeError::Build(e) => match e {
                BuildError::Descriptor(DescriptorError::Io { .. }) => ErrorKind::Io,
                BuildError::Descriptor(_) => ErrorKind::Format,
                BuildError::MissingImageSource { .. }
                | BuildError::InvalidImageSource { .. }
                | BuildError::ComponentRead { .. } => ErrorKind::ComponentRead,
                BuildError::ComponentEncode { .. } | BuildError::Format(_) => {
                    ErrorKind::ComponentEncode
                }
                BuildError::Write { .. } => ErrorKind::Io,
            },
            ForgeError::Descriptor(DescriptorError::Io { .. }) => ErrorKind::Io,
            ForgeError::Descriptor(_) => ErrorKind::Format,
            ForgeError::Toolchain(_) => ErrorKind::Toolchain,
            ForgeError::Container { .. } | ForgeError::Payload { .. } => ErrorKind::Format,
            ForgeError::Io { .. } => ErrorKind::Io,
            ForgeError::Serialization(_) => ErrorKind::Format,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Config => 1,
            ErrorKind::Validation => 2,
            ErrorKind::Format => 3,
            ErrorKind::Bounds => 4,
            ErrorKind::ComponentRead => 5,
            ErrorKind::ComponentEncode => 6,
            ErrorKind::Io => 7,
            ErrorKind::Toolchain => 20,
        }
    }
}

/// Result type for pipeline operations
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Outcome of a compile
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    /// Produced artifact
    pub artifact: PathBuf,
    /// Producer used
    pub backend: &'static str,
    /// Face ID written
    pub face_id: String,
    /// Where the ID landed
    pub patch: PatchSummary,
    /// Artifact size after patching
    pub size: u64,
    /// SHA-256 of the patched artifact
    pub sha256: String,
}

/// Serializable view of a [`PatchOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PatchSummary {
    PatchedAt { offset: usize, strategy: String },
    Appended { new_len: u64 },
}

impl From<PatchOutcome> for PatchSummary {
    fn from(outcome: PatchOutcome) -> Self {
        match outcome {
            PatchOutcome::PatchedAt { offset, strategy } => PatchSummary::PatchedAt {
                offset,
                strategy: strategy.as_str().to_string(),
            },
            PatchOutcome::Appended { new_len } => PatchSummary::Appended { new_len },
        }
    }
}

impl PatchSummary {
    pub fn to_human(&self) -> String {
        match self {
            PatchSummary::PatchedAt { offset, strategy } => {
                format!("patched at offset {} ({})", offset, strategy)
            }
            PatchSummary::Appended { new_len } => {
                format!("appended, file is now {} bytes", new_len)
            }
        }
    }
}

/// Build (or externally compile) `project` into `output_dir` and patch the face ID.
pub fn compile(
    config: &ForgeConfig,
    project: &Path,
    output_dir: &Path,
) -> ForgeResult<CompileReport> {
    let face_id = config.face_id()?;

    let artifact = match config.backend {
        Backend::Native => {
            let descriptor = ProjectDescriptor::from_file(project)?;
            let artifact = toolchain::artifact_path(output_dir, project)?;
            let out_subdir = output_dir.join(OUTPUT_SUBDIR);
            fs::create_dir_all(&out_subdir).map_err(|source| ForgeError::Io {
                path: out_subdir.clone(),
                source,
            })?;

            ContainerSerializer::for_project(project, &config.image_dir)
                .build_to_file(&descriptor, &artifact)?;
            artifact
        }
        Backend::External => ExternalCompiler::new(&config.compiler.tool)
            .with_protocol_constant(&config.compiler.protocol_constant)
            .compile(project, output_dir)?,
    };

    let outcome = identifier::patch_file(&artifact, &face_id)?;

    let bytes = fs::read(&artifact).map_err(|source| ForgeError::Io {
        path: artifact.clone(),
        source,
    })?;
    let sha256 = hex::encode(Sha256::digest(&bytes));

    info!(
        artifact = %artifact.display(),
        backend = config.backend.as_str(),
        size = bytes.len(),
        "face compiled"
    );

    Ok(CompileReport {
        artifact,
        backend: config.backend.as_str(),
        face_id: face_id.to_string(),
        patch: outcome.into(),
        size: bytes.len() as u64,
        sha256,
    })
}

/// One decoded record of an inspected container
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub index: usize,
    pub kind: String,
    pub payload_len: usize,
    /// Inflated data for non-image records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Decoded view of a container file
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub name: String,
    pub records: Vec<RecordReport>,
}

impl InspectReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let mut out = format!("{} ({} components)\n", self.name, self.records.len());
        for record in &self.records {
            out.push_str(&format!(
                "  [{}] {} - {} bytes\n",
                record.index, record.kind, record.payload_len
            ));
            if let Some(ref data) = record.data {
                out.push_str(&format!("      {}\n", data));
            }
        }
        out
    }
}

/// Decode a container produced by the native serializer.
pub fn inspect(path: &Path) -> ForgeResult<InspectReport> {
    let bytes = fs::read(path).map_err(|source| ForgeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let container = Container::parse(&bytes).map_err(|source| ForgeError::Container {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::with_capacity(container.records.len());
    for (index, record) in container.records.iter().enumerate() {
        let decoded = decode_payload(record).map_err(|source| ForgeError::Payload {
            index,
            kind: record.kind.clone(),
            source,
        })?;
        records.push(RecordReport {
            index,
            kind: record.kind.clone(),
            payload_len: record.payload.len(),
            data: match decoded {
                DecodedPayload::Image(_) => None,
                DecodedPayload::Data(value) => Some(value),
            },
        });
    }

    Ok(InspectReport {
        name: container.name,
        records,
    })
}

/// `true` when a patch overwrote the start of the file.
pub fn is_risky_patch(outcome: &PatchOutcome) -> bool {
    matches!(
        outcome,
        PatchOutcome::PatchedAt {
            strategy: SlotStrategy::FileStart,
            ..
        }
    )
}
