//! Structural schemas for stage outputs.
//!
//! A [`Schema`] is written once per stage in its complete form. The deep
//! partial form used while a stage is still streaming is not a second type:
//! it is the same schema validated in [`Mode::Partial`], where every object
//! field becomes optional at every depth, arrays keep their element schema
//! (validated partially) and `min_items` is not enforced.

use serde_json::{Map, Value};

use crate::errors::SchemaError;

/// Validation strictness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Required fields and minimum lengths are enforced.
    Full,
    /// Deep-partial: any subset of fields may be missing, recursively.
    Partial,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// Any JSON value, including null.
    Any,
    String,
    Number,
    Boolean,
    Array {
        items: Box<Schema>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object {
        fields: Vec<Field>,
        /// Keep keys that are not declared instead of stripping them.
        passthrough: bool,
    },
    /// First matching alternative wins.
    Union(Vec<Schema>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

impl Schema {
    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::Object {
            fields: fields.into_iter().collect(),
            passthrough: false,
        }
    }

    pub fn array(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    /// Array of strings, the most common leaf collection.
    pub fn strings() -> Self {
        Self::array(Self::String)
    }

    pub fn min_items(mut self, n: usize) -> Self {
        if let Self::Array { min_items, .. } = &mut self {
            *min_items = Some(n);
        }
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        if let Self::Array { max_items, .. } = &mut self {
            *max_items = Some(n);
        }
        self
    }

    pub fn passthrough(mut self) -> Self {
        if let Self::Object { passthrough, .. } = &mut self {
            *passthrough = true;
        }
        self
    }

    /// Validates `value` and returns its normalized form (undeclared keys
    /// stripped unless the object is passthrough).
    pub fn validate(&self, value: &Value, mode: Mode) -> Result<Value, SchemaError> {
        self.validate_at(value, mode, "$")
    }

    /// Deep-partial validation of an in-progress value.
    pub fn validate_partial(&self, value: &Value) -> Result<Value, SchemaError> {
        self.validate(value, Mode::Partial)
    }

    fn validate_at(&self, value: &Value, mode: Mode, path: &str) -> Result<Value, SchemaError> {
        match (self, value) {
            (Self::Any, _) => Ok(value.clone()),
            (Self::String, Value::String(_))
            | (Self::Number, Value::Number(_))
            | (Self::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (
                Self::Array {
                    items,
                    min_items,
                    max_items,
                },
                Value::Array(values),
            ) => {
                if let Some(max) = max_items
                    && values.len() > *max
                {
                    return Err(SchemaError::new(
                        path,
                        format!("at most {max} items"),
                        format!("{} items", values.len()),
                    ));
                }
                if mode == Mode::Full
                    && let Some(min) = min_items
                    && values.len() < *min
                {
                    return Err(SchemaError::new(
                        path,
                        format!("at least {min} items"),
                        format!("{} items", values.len()),
                    ));
                }
                values
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| items.validate_at(item, mode, &format!("{path}[{idx}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            (
                Self::Object {
                    fields,
                    passthrough,
                },
                Value::Object(map),
            ) => validate_object(fields, *passthrough, map, mode, path),
            (Self::Union(alternatives), _) => {
                let mut last_err = None;
                for alternative in alternatives {
                    match alternative.validate_at(value, mode, path) {
                        Ok(valid) => return Ok(valid),
                        Err(err) => last_err = Some(err),
                    }
                }
                Err(last_err.unwrap_or_else(|| SchemaError::new(path, "union", describe(value))))
            }
            (expected, found) => Err(SchemaError::new(path, expected.name(), describe(found))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Union(_) => "union",
        }
    }
}

fn validate_object(
    fields: &[Field],
    passthrough: bool,
    map: &Map<String, Value>,
    mode: Mode,
    path: &str,
) -> Result<Value, SchemaError> {
    let mut out = Map::new();
    for field in fields {
        let field_path = format!("{path}.{}", field.name);
        match map.get(&field.name) {
            Some(value) => {
                out.insert(
                    field.name.clone(),
                    field.schema.validate_at(value, mode, &field_path)?,
                );
            }
            None if field.required && mode == Mode::Full => {
                return Err(SchemaError::new(&field_path, field.schema.name(), "missing"));
            }
            None => {}
        }
    }
    if passthrough {
        for (key, value) in map {
            if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Value::Object(out))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
