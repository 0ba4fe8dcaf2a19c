//! Tagged schema descriptor tree.

use serde_json::Value;

/// Structural description of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Accepts any value.
    Any,
    /// JSON object with ordered property declarations.
    Object(ObjectSchema),
    /// JSON array.
    Array(ArraySchema),
    /// JSON string.
    String(StringSchema),
    /// JSON number, optionally restricted to integers.
    Number(NumberSchema),
    /// JSON boolean.
    Boolean,
    /// JSON null.
    Null,
    /// One of a fixed set of literal values.
    Enum(Vec<Value>),
    /// Any of the alternatives, tried in declaration order.
    Union(Vec<SchemaNode>),
}

impl SchemaNode {
    /// Unrestricted string.
    #[must_use]
    pub fn string() -> Self {
        Self::String(StringSchema::default())
    }

    /// Non-empty string.
    #[must_use]
    pub fn non_empty_string() -> Self {
        Self::String(StringSchema {
            min_length: Some(1),
            ..StringSchema::default()
        })
    }

    /// String restricted to the supplied literals.
    #[must_use]
    pub fn string_enum(allowed: &[&str]) -> Self {
        Self::String(StringSchema {
            allowed: Some(allowed.iter().map(|value| (*value).to_owned()).collect()),
            ..StringSchema::default()
        })
    }

    /// Any number.
    #[must_use]
    pub fn number() -> Self {
        Self::Number(NumberSchema::default())
    }

    /// Number within an inclusive range.
    #[must_use]
    pub fn number_range(minimum: f64, maximum: f64) -> Self {
        Self::Number(NumberSchema {
            integer: false,
            minimum: Some(minimum),
            maximum: Some(maximum),
        })
    }

    /// Integer with an inclusive lower bound.
    #[must_use]
    pub fn integer_at_least(minimum: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Self::Number(NumberSchema {
            integer: true,
            minimum: Some(minimum as f64),
            maximum: None,
        })
    }

    /// Array of items matching `items`.
    #[must_use]
    pub fn array_of(items: SchemaNode) -> Self {
        Self::Array(ArraySchema {
            items: Some(Box::new(items)),
            min_items: None,
            max_items: None,
        })
    }

    /// Short name of the node's JSON type, used in messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Any => "any".to_owned(),
            Self::Object(_) => "object".to_owned(),
            Self::Array(_) => "array".to_owned(),
            Self::String(_) => "string".to_owned(),
            Self::Number(number) if number.integer => "integer".to_owned(),
            Self::Number(_) => "number".to_owned(),
            Self::Boolean => "boolean".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Enum(_) => "enum".to_owned(),
            Self::Union(options) => options
                .iter()
                .map(SchemaNode::type_name)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

impl From<ObjectSchema> for SchemaNode {
    fn from(value: ObjectSchema) -> Self {
        Self::Object(value)
    }
}

/// Object descriptor. Property order is declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    properties: Vec<(String, SchemaNode)>,
    required: Vec<String>,
    closed: bool,
}

impl ObjectSchema {
    /// Creates an open object with no declared properties.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property. Required properties are also appended to the
    /// required list in declaration order.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, node: SchemaNode, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.push((name, node));
        self
    }

    /// Rejects undeclared properties.
    #[must_use]
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub(crate) fn from_parts(
        properties: Vec<(String, SchemaNode)>,
        required: Vec<String>,
        closed: bool,
    ) -> Self {
        Self {
            properties,
            required,
            closed,
        }
    }

    /// Returns the declared properties in order.
    #[must_use]
    pub fn properties(&self) -> &[(String, SchemaNode)] {
        &self.properties
    }

    /// Returns the required property names in order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns `true` when undeclared properties are rejected.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Looks up a declared property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find_map(|(key, node)| (key == name).then_some(node))
    }
}

/// Array descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArraySchema {
    /// Schema every item must satisfy; `None` accepts any item.
    pub items: Option<Box<SchemaNode>>,
    /// Inclusive lower bound on length.
    pub min_items: Option<usize>,
    /// Inclusive upper bound on length.
    pub max_items: Option<usize>,
}

/// String descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringSchema {
    /// Allowed literals, when restricted.
    pub allowed: Option<Vec<String>>,
    /// Inclusive lower bound on character count.
    pub min_length: Option<usize>,
    /// Inclusive upper bound on character count.
    pub max_length: Option<usize>,
}

/// Number descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberSchema {
    /// Restrict to whole numbers.
    pub integer: bool,
    /// Inclusive lower bound.
    pub minimum: Option<f64>,
    /// Inclusive upper bound.
    pub maximum: Option<f64>,
}
