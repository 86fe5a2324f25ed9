//! Nested (XML) project encoding
//!
//! ```xml
//! <Project name="Sport">
//!   <Component type="Image" src="bg.png"/>
//!   <Component type="Text" font="mono">
//!     <Color r="255" g="0" b="0"/>
//!     <Label>Steps</Label>
//!   </Component>
//! </Project>
//! ```
//!
//! Component data is built from the element tree: attributes become
//! string entries, child elements become entries keyed by tag. A leaf
//! child without attributes maps to its text, any other child to an
//! object (text under `#text`). Repeated tags collect into an array.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use super::{Component, DescriptorError, ProjectDescriptor, SourceFormat, DEFAULT_PROJECT_NAME};

const FORMAT: SourceFormat = SourceFormat::Nested;

/// Tag of a component element under the root.
const COMPONENT_TAG: &str = "Component";

/// Key holding element text when the element also has attributes or children.
const TEXT_KEY: &str = "#text";

fn parse_error(message: impl Into<String>) -> DescriptorError {
    DescriptorError::Parse {
        format: FORMAT,
        message: message.into(),
    }
}

#[derive(Debug, Default)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub(super) fn parse(text: &str) -> Result<ProjectDescriptor, DescriptorError> {
    let root = read_tree(text)?;

    let name = root
        .attribute("name")
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

    let mut components = Vec::new();
    for (index, element) in root
        .children
        .into_iter()
        .filter(|c| c.tag == COMPONENT_TAG)
        .enumerate()
    {
        let mut type_name = None;
        let mut data = Map::new();
        for (key, value) in element.attributes {
            if key == "type" {
                type_name = Some(value);
            } else {
                data.insert(key, Value::String(value));
            }
        }
        let type_name = match type_name {
            Some(t) if !t.is_empty() => t,
            _ => return Err(DescriptorError::MissingType { format: FORMAT, index }),
        };
        insert_children(&mut data, element.children);
        components.push(Component::typed(&type_name, data));
    }

    Ok(ProjectDescriptor { name, components })
}

fn read_tree(text: &str) -> Result<Element, DescriptorError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            parse_error(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let element = open(&start)?;
                close(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                // End-name mismatches are rejected by the reader itself.
                let element = stack
                    .pop()
                    .ok_or_else(|| parse_error("unexpected closing tag"))?;
                close(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let content = t
                    .unescape()
                    .map_err(|e| parse_error(format!("bad text content: {}", e)))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&content);
                } else if !content.trim().is_empty() {
                    return Err(parse_error("text outside the root element"));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(parse_error(format!("unclosed element <{}>", open.tag)));
    }
    root.ok_or_else(|| parse_error("document has no root element"))
}

fn open(start: &BytesStart<'_>) -> Result<Element, DescriptorError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(format!("bad attribute on <{}>: {}", tag, e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(format!("bad value for '{}' on <{}>: {}", key, tag, e)))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        tag,
        attributes,
        ..Element::default()
    })
}

fn close(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), DescriptorError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(parse_error(format!(
                "multiple root elements (second is <{}>)",
                element.tag
            )))
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn insert_children(map: &mut Map<String, Value>, children: Vec<Element>) {
    for child in children {
        let tag = child.tag.clone();
        let value = element_value(child);
        match map.get_mut(&tag) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(tag, value);
            }
        }
    }
}

fn element_value(element: Element) -> Value {
    if element.attributes.is_empty() && element.children.is_empty() {
        return Value::String(element.text);
    }
    let mut map = Map::new();
    for (key, value) in element.attributes {
        map.insert(key, Value::String(value));
    }
    insert_children(&mut map, element.children);
    if !element.text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::String(element.text));
    }
    Value::Object(map)
}
