//! Tool input schemas
//!
//! An [`InputSchema`] is an ordered list of named parameters, each tagged with
//! the primitive shape its value must have. Schemas render to the JSON Schema
//! object MCP clients expect in `inputSchema`, and validate incoming argument
//! maps structurally before any handler runs.
//!
//! # Example
//!
//! ```
//! use orch_dispatch::{InputSchema, ParamKind};
//! use serde_json::json;
//!
//! let schema = InputSchema::new()
//!     .required("feature_path", ParamKind::String, "Feature file to run")
//!     .optional("tags", ParamKind::String, "Tag filter, e.g. @smoke");
//!
//! let args = json!({"feature_path": "users.feature"});
//! assert!(schema.validate(args.as_object().unwrap()).is_ok());
//!
//! let args = json!({"tags": "@smoke"});
//! let err = schema.validate(args.as_object().unwrap()).unwrap_err();
//! assert_eq!(err.field(), "feature_path");
//! ```

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// The shape a parameter value must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    /// An integer in `0..=max`
    Unsigned { max: u64 },
    Boolean,
    Object,
    Array(Box<ParamKind>),
    /// A string restricted to one of the listed values
    Enum(Vec<String>),
}

impl ParamKind {
    /// Array whose items all have the given kind
    pub fn array_of(item: ParamKind) -> Self {
        Self::Array(Box::new(item))
    }

    /// Non-negative integer with no upper bound
    pub fn unsigned() -> Self {
        Self::Unsigned { max: u64::MAX }
    }

    /// Non-negative integer that fits in a `u32`
    pub fn unsigned_u32() -> Self {
        Self::Unsigned {
            max: u64::from(u32::MAX),
        }
    }

    /// String restricted to the given values
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Human-readable name used in validation messages
    pub fn describe(&self) -> String {
        match self {
            Self::String => "a string".to_string(),
            Self::Number => "a number".to_string(),
            Self::Integer => "an integer".to_string(),
            Self::Unsigned { max: u64::MAX } => "a non-negative integer".to_string(),
            Self::Unsigned { max } => format!("an integer between 0 and {max}"),
            Self::Boolean => "a boolean".to_string(),
            Self::Object => "an object".to_string(),
            Self::Array(item) => format!("an array of {}", item.describe_plural()),
            Self::Enum(values) => format!("one of [{}]", values.join(", ")),
        }
    }

    fn describe_plural(&self) -> String {
        match self {
            Self::String | Self::Enum(_) => "strings".to_string(),
            Self::Number => "numbers".to_string(),
            Self::Integer | Self::Unsigned { .. } => "integers".to_string(),
            Self::Boolean => "booleans".to_string(),
            Self::Object => "objects".to_string(),
            Self::Array(_) => "arrays".to_string(),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer | Self::Unsigned { .. } => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array(_) => value.is_array(),
            Self::Enum(values) => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v == s)),
        }
    }

    /// Render as a JSON Schema fragment
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Number => json!({"type": "number"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Unsigned { max: u64::MAX } => json!({"type": "integer", "minimum": 0}),
            Self::Unsigned { max } => json!({"type": "integer", "minimum": 0, "maximum": max}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Object => json!({"type": "object"}),
            Self::Array(item) => json!({"type": "array", "items": item.to_json_schema()}),
            Self::Enum(values) => json!({"type": "string", "enum": values}),
        }
    }
}

/// One named parameter of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: Option<String>,
}

/// Declared arguments of a tool
///
/// Parameters keep their declaration order, which is also the order in which
/// validation reports the first failing field. Unknown fields are tolerated
/// unless the schema is [closed](InputSchema::closed).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
    closed: bool,
}

impl InputSchema {
    /// An empty, open schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter
    pub fn required(self, name: impl Into<String>, kind: ParamKind, description: &str) -> Self {
        self.param(name.into(), kind, true, description)
    }

    /// Add an optional parameter
    pub fn optional(self, name: impl Into<String>, kind: ParamKind, description: &str) -> Self {
        self.param(name.into(), kind, false, description)
    }

    fn param(mut self, name: String, kind: ParamKind, required: bool, description: &str) -> Self {
        let description = (!description.is_empty()).then(|| description.to_string());
        self.params.push(ParamSpec {
            name,
            kind,
            required,
            description,
        });
        self
    }

    /// Reject fields that are not declared
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Look up a declared parameter by name
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as the JSON Schema object advertised in `inputSchema`
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut property = param.kind.to_json_schema();
            if let (Some(description), Some(obj)) = (&param.description, property.as_object_mut())
            {
                obj.insert("description".to_string(), json!(description));
            }
            properties.insert(param.name.clone(), property);
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        if let Some(obj) = schema.as_object_mut() {
            if !required.is_empty() {
                obj.insert("required".to_string(), json!(required));
            }
            if self.closed {
                obj.insert("additionalProperties".to_string(), json!(false));
            }
        }
        schema
    }

    /// Validate an argument map, reporting the first violation
    ///
    /// Parameters are checked in declaration order. A `null` value for an
    /// optional parameter counts as absent.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), SchemaViolation> {
        for param in &self.params {
            match arguments.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(SchemaViolation::Missing {
                        field: param.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) => check_value(&param.name, &param.kind, value)?,
            }
        }

        if self.closed {
            if let Some(unknown) = arguments.keys().find(|k| self.get(k).is_none()) {
                return Err(SchemaViolation::Unknown {
                    field: unknown.clone(),
                });
            }
        }

        Ok(())
    }
}

fn check_value(field: &str, kind: &ParamKind, value: &Value) -> Result<(), SchemaViolation> {
    if !kind.matches(value) {
        return Err(SchemaViolation::WrongType {
            field: field.to_string(),
            expected: kind.describe(),
            found: json_type_name(value),
        });
    }
    match (kind, value) {
        (ParamKind::Array(item), Value::Array(items)) => {
            for (i, element) in items.iter().enumerate() {
                check_value(&format!("{field}[{i}]"), item, element)?;
            }
        }
        (ParamKind::Unsigned { max }, _) if !value.as_u64().is_some_and(|n| n <= *max) => {
            return Err(SchemaViolation::OutOfRange {
                field: field.to_string(),
                expected: kind.describe(),
                found: value.to_string(),
            });
        }
        _ => {}
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

/// A single argument that does not satisfy the schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("missing required field '{field}'")]
    Missing { field: String },

    #[error("field '{field}' must be {expected}, got {found}")]
    WrongType {
        field: String,
        expected: String,
        found: &'static str,
    },

    #[error("field '{field}' must be {expected}, got {found}")]
    OutOfRange {
        field: String,
        expected: String,
        found: String,
    },

    #[error("unknown field '{field}'")]
    Unknown { field: String },
}

impl SchemaViolation {
    /// Name of the offending field (array items are reported as `name[i]`)
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::WrongType { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::Unknown { field } => field,
        }
    }
}
