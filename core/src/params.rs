//! Call parameters and their form encoding.

use serde_json::Value;

use crate::error::ApiError;

/// Ordered parameter set for one API call.
///
/// Inserting an existing name replaces its value in place, so the encoded
/// form keeps first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// True when `name` is present with a non-empty value.
    ///
    /// Null, `false`, `0`, `""`, `"0"` and empty arrays/objects all count as
    /// not supplied.
    pub fn is_supplied(&self, name: &str) -> bool {
        self.get(name).is_some_and(is_non_empty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Encode as `application/x-www-form-urlencoded`.
    ///
    /// Strings go out verbatim, `null` as the empty string, and every other
    /// value as its compact JSON text.
    pub fn to_form(&self) -> Result<String, ApiError> {
        let pairs: Vec<(&str, String)> = self
            .entries
            .iter()
            .map(|(name, value)| (name.as_str(), form_value(value)))
            .collect();
        serde_urlencoded::to_string(&pairs).map_err(|e| ApiError::Encode(e.to_string()))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl TryFrom<Value> for Params {
    type Error = ApiError;

    /// Accepts a JSON object (or `null`, as an empty set).
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(Params::new()),
            other => Err(ApiError::Encode(format!(
                "parameters must be a JSON object, got {other}"
            ))),
        }
    }
}

fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
