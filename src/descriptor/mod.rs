//! Project descriptors
//!
//! A project is a name plus an ordered list of typed components. Two text
//! encodings are accepted and normalized to the same [`ProjectDescriptor`]:
//! - flat: TOML with one `[[component]]` table per component
//! - nested: XML with one `<Component>` element per component
//!
//! The serializer only ever sees the normalized descriptor.

mod flat;
mod nested;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Name used when the project does not declare one.
pub const DEFAULT_PROJECT_NAME: &str = "Untitled";

/// Type name of the image component kind.
pub const IMAGE_KIND: &str = "Image";

/// Data keys that name an image component's source file, in lookup order.
pub const IMAGE_SOURCE_KEYS: &[&str] = &["src", "source"];

/// Errors for descriptor parsing
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to read project file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {format} project: {message}")]
    Parse {
        format: SourceFormat,
        message: String,
    },

    #[error("component {index} in {format} project is missing its type")]
    MissingType { format: SourceFormat, index: usize },
}

/// Text encoding of a project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// TOML key-value tables.
    Flat,
    /// XML elements and attributes.
    Nested,
}

impl SourceFormat {
    /// Pick a format from a file extension, if it is a known one.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(SourceFormat::Flat),
            "xml" | "fprj" => Some(SourceFormat::Nested),
            _ => None,
        }
    }

    /// Guess a format from the text itself.
    pub fn sniff(text: &str) -> Self {
        let start = text.trim_start_matches('\u{feff}').trim_start();
        if start.starts_with('<') {
            SourceFormat::Nested
        } else {
            SourceFormat::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Flat => "flat",
            SourceFormat::Nested => "nested",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of component kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// Raw image bytes read from the image directory.
    Image,
    /// Any other kind; its mapping is stored as compressed JSON.
    Data(String),
}

impl ComponentKind {
    pub fn from_type_name(name: &str) -> Self {
        if name == IMAGE_KIND {
            ComponentKind::Image
        } else {
            ComponentKind::Data(name.to_string())
        }
    }

    /// Type name as written in the container record.
    pub fn type_name(&self) -> &str {
        match self {
            ComponentKind::Image => IMAGE_KIND,
            ComponentKind::Data(name) => name,
        }
    }
}

/// One renderable component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    pub data: Map<String, Value>,
}

impl Component {
    pub fn new(kind: ComponentKind, data: Map<String, Value>) -> Self {
        Self { kind, data }
    }

    /// Build a component from its declared type name.
    pub fn typed(type_name: &str, data: Map<String, Value>) -> Self {
        Self::new(ComponentKind::from_type_name(type_name), data)
    }

    /// Source filename of an image component, if declared.
    pub fn image_source(&self) -> Option<&str> {
        IMAGE_SOURCE_KEYS
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
    }
}

/// Normalized project description.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDescriptor {
    pub name: String,
    pub components: Vec<Component>,
}

impl Default for ProjectDescriptor {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_string(),
            components: Vec::new(),
        }
    }
}

impl ProjectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    /// Append a component, keeping declaration order.
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Parse project text in the given encoding.
    pub fn parse(text: &str, format: SourceFormat) -> Result<Self, DescriptorError> {
        match format {
            SourceFormat::Flat => flat::parse(text),
            SourceFormat::Nested => nested::parse(text),
        }
    }

    /// Parse project text, detecting its encoding from the content.
    pub fn parse_detect(text: &str) -> Result<Self, DescriptorError> {
        Self::parse(text, SourceFormat::sniff(text))
    }

    /// Load a project file; the extension decides the encoding when known.
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let text = fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format =
            SourceFormat::from_extension(path).unwrap_or_else(|| SourceFormat::sniff(&text));
        Self::parse(&text, format)
    }
}
