//! Conversion between JSON Schema documents and [`SchemaNode`] trees.

use serde_json::{Map, Value, json};

use crate::descriptor::{ArraySchema, NumberSchema, ObjectSchema, SchemaNode, StringSchema};
use crate::error::{SchemaError, SchemaResult};

impl SchemaNode {
    /// Parses the supported JSON Schema subset.
    ///
    /// Annotation keywords (`description`, `title`, `$schema`, ...) are
    /// ignored. `true` and `{}` accept anything.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the document is not an object, a keyword
    /// carries a value of the wrong shape, or a type name is unknown.
    pub fn from_json(document: &Value) -> SchemaResult<Self> {
        parse_node(document, "#")
    }

    /// Renders the tree back to a JSON Schema document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::Object(object) => {
                let mut properties = Map::new();
                for (name, node) in object.properties() {
                    properties.insert(name.clone(), node.to_json());
                }
                let mut out = Map::new();
                out.insert("type".into(), json!("object"));
                out.insert("properties".into(), Value::Object(properties));
                if !object.required().is_empty() {
                    out.insert("required".into(), json!(object.required()));
                }
                if object.is_closed() {
                    out.insert("additionalProperties".into(), json!(false));
                }
                Value::Object(out)
            }
            Self::Array(array) => {
                let mut out = Map::new();
                out.insert("type".into(), json!("array"));
                if let Some(items) = &array.items {
                    out.insert("items".into(), items.to_json());
                }
                insert_opt(&mut out, "minItems", array.min_items);
                insert_opt(&mut out, "maxItems", array.max_items);
                Value::Object(out)
            }
            Self::String(string) => {
                let mut out = Map::new();
                out.insert("type".into(), json!("string"));
                if let Some(allowed) = &string.allowed {
                    out.insert("enum".into(), json!(allowed));
                }
                insert_opt(&mut out, "minLength", string.min_length);
                insert_opt(&mut out, "maxLength", string.max_length);
                Value::Object(out)
            }
            Self::Number(number) => {
                let mut out = Map::new();
                let name = if number.integer { "integer" } else { "number" };
                out.insert("type".into(), json!(name));
                insert_opt(&mut out, "minimum", number.minimum);
                insert_opt(&mut out, "maximum", number.maximum);
                Value::Object(out)
            }
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Null => json!({ "type": "null" }),
            Self::Enum(values) => json!({ "enum": values }),
            Self::Union(options) => {
                json!({ "anyOf": options.iter().map(SchemaNode::to_json).collect::<Vec<_>>() })
            }
        }
    }
}

fn insert_opt<T: Into<Value>>(out: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        out.insert(key.to_owned(), value.into());
    }
}

fn parse_node(document: &Value, path: &str) -> SchemaResult<SchemaNode> {
    let map = match document {
        Value::Bool(true) => return Ok(SchemaNode::Any),
        Value::Object(map) => map,
        _ => return Err(SchemaError::malformed(path, "expected a schema object")),
    };

    if let Some(constant) = map.get("const") {
        return Ok(SchemaNode::Enum(vec![constant.clone()]));
    }

    if let Some(values) = map.get("enum") {
        let Value::Array(values) = values else {
            return Err(SchemaError::malformed(path, "`enum` must be an array"));
        };
        if values.is_empty() {
            return Err(SchemaError::malformed(path, "`enum` must not be empty"));
        }
        if let Some(strings) = values.iter().map(Value::as_str).collect::<Option<Vec<_>>>() {
            if map.get("type").is_none_or(|ty| ty == "string") {
                return Ok(SchemaNode::String(StringSchema {
                    allowed: Some(strings.into_iter().map(str::to_owned).collect()),
                    ..string_bounds(map, path)?
                }));
            }
        }
        return Ok(SchemaNode::Enum(values.clone()));
    }

    for keyword in ["anyOf", "oneOf"] {
        if let Some(options) = map.get(keyword) {
            let Value::Array(options) = options else {
                return Err(SchemaError::malformed(path, format!("`{keyword}` must be an array")));
            };
            let nodes = options
                .iter()
                .enumerate()
                .map(|(index, option)| parse_node(option, &format!("{path}/{keyword}/{index}")))
                .collect::<SchemaResult<Vec<_>>>()?;
            return Ok(SchemaNode::Union(nodes));
        }
    }

    match map.get("type") {
        None => {
            if map.contains_key("properties") || map.contains_key("required") {
                parse_typed("object", map, path)
            } else if map.contains_key("items") {
                parse_typed("array", map, path)
            } else {
                Ok(SchemaNode::Any)
            }
        }
        Some(Value::String(name)) => parse_typed(name, map, path),
        Some(Value::Array(names)) => {
            let mut nodes = names
                .iter()
                .map(|name| match name {
                    Value::String(name) => parse_typed(name, map, path),
                    _ => Err(SchemaError::malformed(path, "`type` entries must be strings")),
                })
                .collect::<SchemaResult<Vec<_>>>()?;
            match nodes.len() {
                0 => Err(SchemaError::malformed(path, "`type` must not be empty")),
                1 => Ok(nodes.remove(0)),
                _ => Ok(SchemaNode::Union(nodes)),
            }
        }
        Some(_) => Err(SchemaError::malformed(path, "`type` must be a string or array")),
    }
}

fn parse_typed(name: &str, map: &Map<String, Value>, path: &str) -> SchemaResult<SchemaNode> {
    match name {
        "object" => parse_object(map, path).map(SchemaNode::Object),
        "array" => {
            let items = match map.get("items") {
                Some(items) => Some(Box::new(parse_node(items, &format!("{path}/items"))?)),
                None => None,
            };
            Ok(SchemaNode::Array(ArraySchema {
                items,
                min_items: usize_keyword(map, "minItems", path)?,
                max_items: usize_keyword(map, "maxItems", path)?,
            }))
        }
        "string" => Ok(SchemaNode::String(string_bounds(map, path)?)),
        "number" | "integer" => Ok(SchemaNode::Number(NumberSchema {
            integer: name == "integer",
            minimum: f64_keyword(map, "minimum", path)?,
            maximum: f64_keyword(map, "maximum", path)?,
        })),
        "boolean" => Ok(SchemaNode::Boolean),
        "null" => Ok(SchemaNode::Null),
        other => Err(SchemaError::UnsupportedType {
            path: path.to_owned(),
            name: other.to_owned(),
        }),
    }
}

fn parse_object(map: &Map<String, Value>, path: &str) -> SchemaResult<ObjectSchema> {
    let properties = match map.get("properties") {
        None => Vec::new(),
        Some(Value::Object(properties)) => properties
            .iter()
            .map(|(name, node)| {
                parse_node(node, &format!("{path}/properties/{name}"))
                    .map(|node| (name.clone(), node))
            })
            .collect::<SchemaResult<Vec<_>>>()?,
        Some(_) => return Err(SchemaError::malformed(path, "`properties` must be an object")),
    };

    let required = match map.get("required") {
        None => Vec::new(),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| SchemaError::malformed(path, "`required` entries must be strings"))
            })
            .collect::<SchemaResult<Vec<_>>>()?,
        Some(_) => return Err(SchemaError::malformed(path, "`required` must be an array")),
    };

    let closed = matches!(map.get("additionalProperties"), Some(Value::Bool(false)));
    Ok(ObjectSchema::from_parts(properties, required, closed))
}

fn string_bounds(map: &Map<String, Value>, path: &str) -> SchemaResult<StringSchema> {
    Ok(StringSchema {
        allowed: None,
        min_length: usize_keyword(map, "minLength", path)?,
        max_length: usize_keyword(map, "maxLength", path)?,
    })
}

fn usize_keyword(map: &Map<String, Value>, key: &str, path: &str) -> SchemaResult<Option<usize>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|raw| usize::try_from(raw).ok())
            .map(Some)
            .ok_or_else(|| SchemaError::malformed(path, format!("`{key}` must be a non-negative integer"))),
    }
}

fn f64_keyword(map: &Map<String, Value>, key: &str, path: &str) -> SchemaResult<Option<f64>> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SchemaError::malformed(path, format!("`{key}` must be a number"))),
    }
}
