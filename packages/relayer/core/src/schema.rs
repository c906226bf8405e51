//! Configuration schemas declared by modules.
//!
//! The framework treats a module's configuration as opaque JSON. The schema
//! only lets it reject obviously malformed input before a factory runs and
//! render help text for `modules schema`.

use std::fmt::{self, Write as _};

use serde_json::Value;
use thiserror::Error;

/// The JSON type of a configuration field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// A JSON number without a fractional part.
    Integer,
    /// A JSON boolean.
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// Any JSON value.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        })
    }
}

/// A named, typed configuration parameter.
#[derive(Clone, Debug)]
pub struct Field {
    /// The JSON key.
    pub name: &'static str,
    /// The expected JSON type.
    pub kind: FieldKind,
    /// Whether the key must be present.
    pub required: bool,
    /// Help text.
    pub description: &'static str,
    /// The value used when the key is absent.
    pub default: Option<Value>,
}

/// Describes the configuration a module's factory expects.
#[derive(Clone, Debug, Default)]
pub struct ConfigSchema {
    fields: Vec<Field>,
}

/// A configuration value that does not satisfy its schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The configuration is not a JSON object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// The JSON type that was found.
        found: &'static str,
    },
    /// A required field is absent.
    #[error("missing required field `{name}`")]
    MissingField {
        /// The missing key.
        name: &'static str,
    },
    /// A field has the wrong JSON type.
    #[error("field `{name}` must be {expected}, found {found}")]
    WrongType {
        /// The offending key.
        name: &'static str,
        /// The declared type.
        expected: FieldKind,
        /// The JSON type that was found.
        found: &'static str,
    },
    /// A field is not declared by the schema.
    #[error("unknown field `{name}`")]
    UnknownField {
        /// The undeclared key.
        name: String,
    },
}

impl ConfigSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    #[must_use]
    pub fn required(mut self, name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: true,
            description,
            default: None,
        });
        self
    }

    /// Add an optional field with the value used when it is absent.
    #[must_use]
    pub fn optional(
        mut self,
        name: &'static str,
        kind: FieldKind,
        description: &'static str,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.push(Field {
            name,
            kind,
            required: false,
            description,
            default: Some(default.into()),
        });
        self
    }

    /// The declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Check `config` against the schema.
    ///
    /// An absent configuration (`null`) is accepted when no field is required.
    /// An explicit `null` for a field is only accepted for [`FieldKind::Any`];
    /// leave the key out to get the default.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self, config: &Value) -> Result<(), SchemaError> {
        let empty = serde_json::Map::new();
        let object = match config {
            Value::Object(object) => object,
            Value::Null => &empty,
            other => {
                return Err(SchemaError::NotAnObject {
                    found: json_type(other),
                })
            }
        };

        if let Some(name) = object
            .keys()
            .find(|key| !self.fields.iter().any(|f| f.name == key.as_str()))
        {
            return Err(SchemaError::UnknownField { name: name.clone() });
        }

        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::MissingField { name: field.name });
                }
                Some(value) if !field.kind.matches(value) => {
                    return Err(SchemaError::WrongType {
                        name: field.name,
                        expected: field.kind,
                        found: json_type(value),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Render the schema as help text, one field per line.
    #[must_use]
    pub fn help(&self) -> String {
        if self.fields.is_empty() {
            return "(no configuration)\n".to_string();
        }
        let width = self.fields.iter().map(|f| f.name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for field in &self.fields {
            let presence = match &field.default {
                _ if field.required => "required".to_string(),
                Some(default) => format!("default: {default}"),
                None => "optional".to_string(),
            };
            let _ = writeln!(
                out,
                "{:width$}  {:<8} {} [{presence}]",
                field.name, field.kind, field.description
            );
        }
        out
    }
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
