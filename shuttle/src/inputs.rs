//! Typed application inputs and runtime arguments

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One input value
///
/// Serialized untagged, except file references which serialize as
/// `{"file": "<path>"}` so that they survive a save/load round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    File { file: PathBuf },
    List(Vec<InputValue>),
}

/// Parameter name → value, in key order
pub type Inputs = BTreeMap<String, InputValue>;

impl InputValue {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        InputValue::File { file: path.into() }
    }

    pub fn as_file(&self) -> Option<&Path> {
        match self {
            InputValue::File { file } => Some(file),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InputValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            InputValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            InputValue::Bool(b) => serde_json::Value::Bool(*b),
            InputValue::Integer(i) => serde_json::Value::from(*i),
            InputValue::Float(f) => serde_json::Value::from(*f),
            InputValue::Text(s) => serde_json::Value::String(s.clone()),
            InputValue::File { file } => serde_json::json!({ "file": file }),
            InputValue::List(items) => {
                serde_json::Value::Array(items.iter().map(InputValue::to_json).collect())
            }
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Bool(b) => write!(f, "{}", b),
            InputValue::Integer(i) => write!(f, "{}", i),
            InputValue::Float(x) => write!(f, "{}", x),
            InputValue::Text(s) => write!(f, "{:?}", s),
            InputValue::File { file } => write!(f, "file({})", file.display()),
            InputValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// `{a=1, b="x"}`
pub fn format_inputs(inputs: &Inputs) -> String {
    let parts: Vec<String> = inputs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        InputValue::Bool(value)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        InputValue::Integer(value)
    }
}

impl From<i32> for InputValue {
    fn from(value: i32) -> Self {
        InputValue::Integer(value.into())
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Float(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl<T: Into<InputValue>> From<Vec<T>> for InputValue {
    fn from(values: Vec<T>) -> Self {
        InputValue::List(values.into_iter().map(Into::into).collect())
    }
}
