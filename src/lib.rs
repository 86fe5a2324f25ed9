//! Facepack - watch-face container builder
//!
//! This crate builds compiled watch-face containers from project files
//! and patches the device-visible face ID into any produced artifact,
//! whether it came from the native serializer or the external compiler.

pub mod config;
pub mod descriptor;
pub mod identifier;
pub mod pipeline;
pub mod serializer;
pub mod toolchain;

pub use config::{Backend, ConfigError, ForgeConfig};
pub use descriptor::{Component, ComponentKind, DescriptorError, ProjectDescriptor, SourceFormat};
pub use identifier::{set_identifier, FaceId, PatchError, PatchOutcome, SlotStrategy};
pub use pipeline::{compile, inspect, CompileReport, ErrorKind, ForgeError, InspectReport};
pub use serializer::{BuildError, ContainerSerializer};
pub use toolchain::{ExternalCompiler, ToolchainError};

pub use facepack_format as format;
