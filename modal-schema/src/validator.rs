//! Deterministic depth-first validation.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{ArraySchema, NumberSchema, ObjectSchema, SchemaNode, StringSchema};

/// How strictly missing data is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every violation is fatal.
    Strict,
    /// Missing required fields become warnings; everything else stays fatal.
    BestEffort,
}

/// Category of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required field is absent.
    MissingField,
    /// A closed object carries an undeclared field.
    UnexpectedField,
    /// The value has the wrong JSON type.
    TypeMismatch,
    /// The value is not one of the allowed literals.
    EnumMismatch,
    /// A number lies outside its bounds.
    OutOfRange,
    /// A string or array length lies outside its bounds.
    LengthOutOfRange,
}

/// First violation found during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location of the offending value, e.g. `$.rows[2].name`.
    pub path: String,
    /// Failure category.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Result of validating one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The value satisfies the schema.
    Valid,
    /// The value was accepted in best-effort mode with the listed gaps.
    ValidWithWarnings(Vec<String>),
    /// The value violates the schema.
    Invalid(Violation),
}

impl ValidationOutcome {
    /// Returns `true` unless the outcome is [`ValidationOutcome::Invalid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    /// Returns the accumulated warnings (empty unless best-effort).
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::ValidWithWarnings(warnings) => warnings,
            _ => &[],
        }
    }
}

/// Validates `value` against `schema`.
///
/// Objects are checked in a fixed order: required-field presence in
/// `required` order, then declared properties in declaration order, then
/// undeclared fields of closed objects in the value's own order. The first
/// violation ends the walk.
#[must_use]
pub fn validate(value: &Value, schema: &SchemaNode, mode: ValidationMode) -> ValidationOutcome {
    let mut walker = Walker::new(mode);
    let outcome = match walker.check(value, schema, "$") {
        Err(violation) => ValidationOutcome::Invalid(violation),
        Ok(()) if walker.warnings.is_empty() => ValidationOutcome::Valid,
        Ok(()) => ValidationOutcome::ValidWithWarnings(walker.warnings),
    };
    if let ValidationOutcome::Invalid(violation) = &outcome {
        debug!(path = %violation.path, kind = ?violation.kind, "schema violation");
    }
    outcome
}

struct Walker {
    mode: ValidationMode,
    warnings: Vec<String>,
}

type Step = Result<(), Violation>;

impl Walker {
    fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            warnings: Vec::new(),
        }
    }

    fn check(&mut self, value: &Value, schema: &SchemaNode, path: &str) -> Step {
        match schema {
            SchemaNode::Any => Ok(()),
            SchemaNode::Object(object) => self.check_object(value, object, path),
            SchemaNode::Array(array) => self.check_array(value, array, path),
            SchemaNode::String(string) => check_string(value, string, path),
            SchemaNode::Number(number) => check_number(value, number, path),
            SchemaNode::Boolean if value.is_boolean() => Ok(()),
            SchemaNode::Null if value.is_null() => Ok(()),
            SchemaNode::Boolean | SchemaNode::Null => Err(type_mismatch(path, schema, value)),
            SchemaNode::Enum(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(violation(
                        path,
                        ViolationKind::EnumMismatch,
                        format!("value {value} is not one of {}", render_values(allowed)),
                    ))
                }
            }
            SchemaNode::Union(options) => self.check_union(value, options, schema, path),
        }
    }

    fn check_object(&mut self, value: &Value, object: &ObjectSchema, path: &str) -> Step {
        let Value::Object(fields) = value else {
            return Err(type_mismatch(path, &SchemaNode::Object(object.clone()), value));
        };

        for name in object.required() {
            if fields.contains_key(name) {
                continue;
            }
            let field_path = child(path, name);
            match self.mode {
                ValidationMode::Strict => {
                    return Err(violation(
                        &field_path,
                        ViolationKind::MissingField,
                        "required field is missing".to_owned(),
                    ));
                }
                ValidationMode::BestEffort => {
                    self.warnings
                        .push(format!("{field_path}: required field is missing"));
                }
            }
        }

        for (name, node) in object.properties() {
            if let Some(field) = fields.get(name) {
                self.check(field, node, &child(path, name))?;
            }
        }

        if object.is_closed() {
            if let Some(name) = fields.keys().find(|name| object.property(name).is_none()) {
                return Err(violation(
                    &child(path, name),
                    ViolationKind::UnexpectedField,
                    "field is not allowed".to_owned(),
                ));
            }
        }
        Ok(())
    }

    fn check_array(&mut self, value: &Value, array: &ArraySchema, path: &str) -> Step {
        let Value::Array(items) = value else {
            return Err(violation(
                path,
                ViolationKind::TypeMismatch,
                format!("expected array, found {}", json_type(value)),
            ));
        };
        check_length(path, items.len(), array.min_items, array.max_items, "items")?;
        if let Some(node) = &array.items {
            for (index, item) in items.iter().enumerate() {
                self.check(item, node, &format!("{path}[{index}]"))?;
            }
        }
        Ok(())
    }

    fn check_union(
        &mut self,
        value: &Value,
        options: &[SchemaNode],
        schema: &SchemaNode,
        path: &str,
    ) -> Step {
        for option in options {
            let mut trial = Walker::new(self.mode);
            if trial.check(value, option, path).is_ok() {
                self.warnings.extend(trial.warnings);
                return Ok(());
            }
        }
        Err(type_mismatch(path, schema, value))
    }
}

fn check_string(value: &Value, schema: &StringSchema, path: &str) -> Step {
    let Some(text) = value.as_str() else {
        return Err(violation(
            path,
            ViolationKind::TypeMismatch,
            format!("expected string, found {}", json_type(value)),
        ));
    };
    if let Some(allowed) = &schema.allowed {
        if !allowed.iter().any(|candidate| candidate == text) {
            return Err(violation(
                path,
                ViolationKind::EnumMismatch,
                format!("`{text}` is not one of {}", allowed.join(", ")),
            ));
        }
    }
    check_length(
        path,
        text.chars().count(),
        schema.min_length,
        schema.max_length,
        "characters",
    )
}

fn check_number(value: &Value, schema: &NumberSchema, path: &str) -> Step {
    let Some(number) = value.as_f64() else {
        return Err(violation(
            path,
            ViolationKind::TypeMismatch,
            format!(
                "expected {}, found {}",
                if schema.integer { "integer" } else { "number" },
                json_type(value)
            ),
        ));
    };
    if schema.integer && !(value.is_i64() || value.is_u64() || number.fract() == 0.0) {
        return Err(violation(
            path,
            ViolationKind::TypeMismatch,
            format!("expected integer, found {number}"),
        ));
    }
    if let Some(minimum) = schema.minimum {
        if number < minimum {
            return Err(violation(
                path,
                ViolationKind::OutOfRange,
                format!("{number} is below the minimum {minimum}"),
            ));
        }
    }
    if let Some(maximum) = schema.maximum {
        if number > maximum {
            return Err(violation(
                path,
                ViolationKind::OutOfRange,
                format!("{number} is above the maximum {maximum}"),
            ));
        }
    }
    Ok(())
}

fn check_length(
    path: &str,
    len: usize,
    min: Option<usize>,
    max: Option<usize>,
    unit: &str,
) -> Step {
    if let Some(min) = min.filter(|min| len < *min) {
        return Err(violation(
            path,
            ViolationKind::LengthOutOfRange,
            format!("expected at least {min} {unit}, found {len}"),
        ));
    }
    if let Some(max) = max.filter(|max| len > *max) {
        return Err(violation(
            path,
            ViolationKind::LengthOutOfRange,
            format!("expected at most {max} {unit}, found {len}"),
        ));
    }
    Ok(())
}

fn child(path: &str, name: &str) -> String {
    format!("{path}.{name}")
}

fn violation(path: &str, kind: ViolationKind, message: String) -> Violation {
    Violation {
        path: path.to_owned(),
        kind,
        message,
    }
}

fn type_mismatch(path: &str, schema: &SchemaNode, value: &Value) -> Violation {
    violation(
        path,
        ViolationKind::TypeMismatch,
        format!("expected {}, found {}", schema.type_name(), json_type(value)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
