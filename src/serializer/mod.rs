//! Native container serializer
//!
//! Builds a watch-face container straight from a [`ProjectDescriptor`],
//! without the external compiler. Records follow descriptor order:
//! - `Image` components carry the raw bytes of their source file
//! - every other kind carries its data as JCS-canonical JSON, deflated
//!
//! The whole container is assembled in memory; nothing is written unless
//! every component encoded successfully.

mod payload;

pub use payload::{decode_payload, encode_data, DecodedPayload, PayloadError};

use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path, PathBuf};

use facepack_format::{Container, FormatError, Record};
use tracing::{debug, info};

use crate::descriptor::{Component, ComponentKind, DescriptorError, ProjectDescriptor};

/// Default image directory, relative to the project file.
pub const DEFAULT_IMAGE_DIR: &str = "images";

/// Errors for container builds
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("component {index} (Image) does not name a source file")]
    MissingImageSource { index: usize },

    #[error("component {index} (Image) source is outside the image dir: {}", requested.display())]
    InvalidImageSource { index: usize, requested: PathBuf },

    #[error("failed to read image for component {index} from {}: {source}", path.display())]
    ComponentRead {
        index: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode component {index} ({kind}): {message}")]
    ComponentEncode {
        index: usize,
        kind: String,
        message: String,
    },

    #[error("container encoding failed: {0}")]
    Format(#[from] FormatError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Serializer for watch-face containers
#[derive(Debug, Clone)]
pub struct ContainerSerializer {
    /// Directory image sources are resolved against
    image_dir: PathBuf,
}

impl ContainerSerializer {
    /// Create a serializer resolving images against `image_dir`
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    /// Create a serializer for a project file, using `<project dir>/<image_dir>`
    pub fn for_project(project_path: &Path, image_dir: &Path) -> Self {
        let base = project_path.parent().unwrap_or_else(|| Path::new(""));
        Self::new(base.join(image_dir))
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Encode `descriptor` into container bytes.
    pub fn build(&self, descriptor: &ProjectDescriptor) -> Result<Vec<u8>, BuildError> {
        let mut container = Container::new(descriptor.name.clone());
        for (index, component) in descriptor.components.iter().enumerate() {
            let payload = self.encode_component(index, component)?;
            debug!(
                index,
                kind = component.kind.type_name(),
                bytes = payload.len(),
                "encoded component"
            );
            container.push(Record::new(component.kind.type_name(), payload));
        }
        Ok(container.to_bytes()?)
    }

    /// Encode `descriptor` and write it to `out`.
    ///
    /// The file is only created once the full byte buffer exists.
    pub fn build_to_file(
        &self,
        descriptor: &ProjectDescriptor,
        out: &Path,
    ) -> Result<u64, BuildError> {
        let bytes = self.build(descriptor)?;
        fs::write(out, &bytes).map_err(|source| BuildError::Write {
            path: out.to_path_buf(),
            source,
        })?;
        info!(
            path = %out.display(),
            bytes = bytes.len(),
            components = descriptor.components.len(),
            "wrote container"
        );
        Ok(bytes.len() as u64)
    }

    /// Parse a project file (either encoding) and encode it.
    pub fn build_project(&self, project_path: &Path) -> Result<Vec<u8>, BuildError> {
        let descriptor = ProjectDescriptor::from_file(project_path)?;
        self.build(&descriptor)
    }

    fn encode_component(&self, index: usize, component: &Component) -> Result<Vec<u8>, BuildError> {
        match &component.kind {
            ComponentKind::Image => {
                let source = component
                    .image_source()
                    .ok_or(BuildError::MissingImageSource { index })?;
                let path = self.resolve_image(index, source)?;
                fs::read(&path).map_err(|source| BuildError::ComponentRead {
                    index,
                    path,
                    source,
                })
            }
            ComponentKind::Data(kind) => {
                encode_data(&component.data).map_err(|e| BuildError::ComponentEncode {
                    index,
                    kind: kind.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// `image_dir/<source>`; the source must stay inside the image directory.
    fn resolve_image(&self, index: usize, source: &str) -> Result<PathBuf, BuildError> {
        let relative = Path::new(source);
        let contained = relative
            .components()
            .all(|c| matches!(c, PathComponent::Normal(_) | PathComponent::CurDir));
        if !contained || relative.as_os_str().is_empty() {
            return Err(BuildError::InvalidImageSource {
                index,
                requested: relative.to_path_buf(),
            });
        }
        Ok(self.image_dir.join(relative))
    }
}
