//! Flat (TOML) project encoding
//!
//! ```toml
//! name = "Sport"
//!
//! [[component]]
//! type = "Image"
//! src = "bg.png"
//!
//! [[component]]
//! type = "Text"
//! font = "mono"
//! ```
//!
//! Every key of a component table other than `type` belongs to that
//! component's data.

use serde_json::{Map, Number, Value};

use super::{Component, DescriptorError, ProjectDescriptor, SourceFormat, DEFAULT_PROJECT_NAME};

const FORMAT: SourceFormat = SourceFormat::Flat;

fn parse_error(message: impl Into<String>) -> DescriptorError {
    DescriptorError::Parse {
        format: FORMAT,
        message: message.into(),
    }
}

pub(super) fn parse(text: &str) -> Result<ProjectDescriptor, DescriptorError> {
    let mut table: toml::Table = text
        .parse()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

    let name = match table.remove("name") {
        None => DEFAULT_PROJECT_NAME.to_string(),
        Some(toml::Value::String(name)) => name,
        Some(other) => {
            return Err(parse_error(format!(
                "'name' must be a string, got {}",
                other.type_str()
            )))
        }
    };

    let entries = match (table.remove("component"), table.remove("components")) {
        (Some(_), Some(_)) => {
            return Err(parse_error(
                "both 'component' and 'components' are present; use one",
            ))
        }
        (one, other) => one.or(other),
    };
    let entries = match entries {
        None => Vec::new(),
        Some(toml::Value::Array(entries)) => entries,
        Some(other) => {
            return Err(parse_error(format!(
                "'component' must be an array of tables, got {}",
                other.type_str()
            )))
        }
    };

    let mut components = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let toml::Value::Table(mut fields) = entry else {
            return Err(parse_error(format!("component {} is not a table", index)));
        };
        let type_name = match fields.remove("type") {
            Some(toml::Value::String(t)) if !t.is_empty() => t,
            Some(toml::Value::String(_)) | None => {
                return Err(DescriptorError::MissingType { format: FORMAT, index })
            }
            Some(other) => {
                return Err(parse_error(format!(
                    "component {} 'type' must be a string, got {}",
                    index,
                    other.type_str()
                )))
            }
        };

        let mut data = Map::new();
        for (key, value) in fields {
            data.insert(key, to_json(value)?);
        }
        components.push(Component::typed(&type_name, data));
    }

    Ok(ProjectDescriptor { name, components })
}

fn to_json(value: toml::Value) -> Result<Value, DescriptorError> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| parse_error(format!("non-finite float {} cannot be encoded", f)))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        toml::Value::Table(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key, to_json(value)?);
            }
            Value::Object(map)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ComponentKind;
    use serde_json::json;

    #[test]
    fn test_parse_components_in_order() {
        let text = r#"
name = "W"

[[component]]
type = "Text"
k = "v"

[[component]]
type = "Image"
src = "bg.png"

[[component]]
type = "Arc"
radius = 12
color = { r = 255, g = 0, b = 0 }
"#;
        let project = parse(text).unwrap();
        assert_eq!(project.name, "W");

        let kinds: Vec<_> = project.components.iter().map(|c| c.kind.type_name()).collect();
        assert_eq!(kinds, vec!["Text", "Image", "Arc"]);

        assert_eq!(Value::Object(project.components[0].data.clone()), json!({"k": "v"}));
        assert_eq!(project.components[1].kind, ComponentKind::Image);
        assert_eq!(
            Value::Object(project.components[2].data.clone()),
            json!({"radius": 12, "color": {"r": 255, "g": 0, "b": 0}})
        );
    }

    #[test]
    fn test_defaults() {
        let project = parse("").unwrap();
        assert_eq!(project.name, DEFAULT_PROJECT_NAME);
        assert!(project.components.is_empty());
    }

    #[test]
    fn test_datetime_becomes_string() {
        let text = "[[component]]\ntype = \"Clock\"\nat = 1979-05-27T07:32:00Z\n";
        let project = parse(text).unwrap();
        assert_eq!(project.components[0].data["at"], json!("1979-05-27T07:32:00Z"));
    }

    #[test]
    fn test_missing_type() {
        let err = parse("[[component]]\nk = \"v\"\n").unwrap_err();
        assert!(matches!(err, DescriptorError::MissingType { index: 0, .. }));
    }

    #[test]
    fn test_wrong_name_type() {
        let err = parse("name = 5\n").unwrap_err();
        assert!(err.to_string().contains("'name' must be a string"));
    }

    #[test]
    fn test_components_alias() {
        let project = parse("[[components]]\ntype = \"Text\"\n").unwrap();
        assert_eq!(project.components.len(), 1);
    }

    #[test]
    fn test_component_and_components_both_present() {
        let text = "[[component]]\ntype = \"Text\"\n\n[[components]]\ntype = \"Image\"\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, DescriptorError::Parse { format: SourceFormat::Flat, .. }));
        assert!(err.to_string().contains("'components'"));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse("name = \n").unwrap_err();
        assert!(matches!(err, DescriptorError::Parse { format: SourceFormat::Flat, .. }));
    }
}
