//! Self-describing payloads
//!
//! Arguments and results travel as JSON values. That keeps frames readable
//! without a schema: when a receiver cannot decode argument 2 as a `u64`, the
//! error can still say that argument 2 was a `string`.

use crate::error::{CodecError, Result};
use crate::scan::{scan, TopLevel};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Short human-readable description of a value's shape
pub fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "float".to_string(),
        Value::Number(_) => "integer".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array[{}]", items.len()),
        Value::Object(fields) => {
            let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
            format!("object{{{}}}", keys.join(","))
        }
    }
}

/// Convert to JSON, refusing values JSON would silently change
fn to_json<T: Serialize + ?Sized>(value: &T, context: &str) -> Result<(TopLevel, Value)> {
    let top = scan(value).map_err(|e| CodecError::serialization(context, e))?;
    let json = serde_json::to_value(value).map_err(|e| CodecError::serialization(context, e))?;
    Ok((top, json))
}

/// Result value of an invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    /// Empty result
    pub fn unit() -> Self {
        Self(Value::Null)
    }

    /// Encode any serializable value.
    ///
    /// Fails for values with no JSON form, e.g. maps keyed by tuples or NaN.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        to_json(value, "result").map(|(_, json)| Self(json))
    }

    /// Decode into the type the caller expects
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.0).map_err(|e| {
            CodecError::serialization(
                format!("result of shape {}", describe_shape(&self.0)),
                e,
            )
        })
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn shape(&self) -> String {
        describe_shape(&self.0)
    }
}

/// Ordered positional arguments of an invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spread a tuple (or sequence) into positional arguments.
    ///
    /// Only `()` (or a unit struct) packs to no arguments; `None` is one
    /// `null` argument. Any other non-sequence value packs to a single
    /// argument. To pass one sequence as a single argument wrap it in a
    /// 1-tuple: `(vec,)`.
    pub fn pack<T: Serialize + ?Sized>(args: &T) -> Result<Self> {
        match to_json(args, "arguments")? {
            (TopLevel::Unit, _) => Ok(Self::new()),
            (_, Value::Array(items)) => Ok(Self(items)),
            (_, single) => Ok(Self(vec![single])),
        }
    }

    /// Append one argument
    pub fn push<T: Serialize + ?Sized>(&mut self, arg: &T) -> Result<()> {
        let index = self.0.len();
        let (_, value) = to_json(arg, &format!("argument {}", index))?;
        self.0.push(value);
        Ok(())
    }

    /// Builder form of [`Arguments::push`]
    pub fn with<T: Serialize + ?Sized>(mut self, arg: &T) -> Result<Self> {
        self.push(arg)?;
        Ok(self)
    }

    /// Decode the argument at `index`
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.0.get(index).ok_or_else(|| {
            CodecError::serialization(
                format!("argument {}", index),
                format!("missing, only {} supplied", self.0.len()),
            )
        })?;
        T::deserialize(value).map_err(|e| {
            CodecError::serialization(
                format!("argument {} of shape {}", index, describe_shape(value)),
                e,
            )
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shape of every argument, for error reporting
    pub fn shapes(&self) -> Vec<String> {
        self.0.iter().map(describe_shape).collect()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }
}
