use serde_json::Value;

/// A value held under a storage key.
///
/// Strings are stored verbatim; everything else is stored as compact JSON text.
/// Reading reverses this: plaintext that parses as a JSON string becomes
/// [`StoredValue::String`], any other JSON becomes [`StoredValue::Json`], and
/// text that is not JSON at all is returned unchanged as a string.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(String),
    Json(Value),
}

impl StoredValue {
    /// Plaintext representation that gets encrypted.
    pub fn to_plaintext(&self) -> Result<String, serde_json::Error> {
        match self {
            StoredValue::String(s) => Ok(s.clone()),
            StoredValue::Json(Value::String(s)) => Ok(s.clone()),
            StoredValue::Json(value) => serde_json::to_string(value),
        }
    }

    /// Rebuild a value from decrypted plaintext. Never fails.
    pub fn from_plaintext(plaintext: &str) -> Self {
        match serde_json::from_str::<Value>(plaintext) {
            Ok(Value::String(s)) => StoredValue::String(s),
            Ok(value) => StoredValue::Json(value),
            Err(_) => StoredValue::String(plaintext.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::String(s) => Some(s),
            StoredValue::Json(Value::String(s)) => Some(s),
            StoredValue::Json(_) => None,
        }
    }

    /// JSON view of the value, as handed back to a bridge caller.
    pub fn into_json(self) -> Value {
        match self {
            StoredValue::String(s) => Value::String(s),
            StoredValue::Json(value) => value,
        }
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::String(value)
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::String(value.to_string())
    }
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => StoredValue::String(s),
            other => StoredValue::Json(other),
        }
    }
}
