//! Tagged method results
//!
//! On the wire a result is either `{"$success": true, ...payload}` or
//! `{"$error": "<CODE>"}`. Callers branch on the tag; business failures are
//! never raised as errors.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SUCCESS_TAG: &str = "$success";
const ERROR_TAG: &str = "$error";

/// Outcome of a method invocation
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResult {
    Success(Map<String, Value>),
    Error(String),
}

impl MethodResult {
    /// Success without payload
    pub fn success() -> Self {
        MethodResult::Success(Map::new())
    }

    pub fn error(code: impl Into<String>) -> Self {
        MethodResult::Error(code.into())
    }

    /// Builder-style payload field, ignored on error results
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let MethodResult::Success(payload) = &mut self {
            payload.insert(key.into(), value.into());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success(_))
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResult::Error(code) => Some(code),
            MethodResult::Success(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            MethodResult::Success(payload) => Some(payload),
            MethodResult::Error(_) => None,
        }
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            MethodResult::Success(payload) => {
                map.insert(SUCCESS_TAG.into(), Value::Bool(true));
                for (k, v) in payload {
                    map.insert(k.clone(), v.clone());
                }
            }
            MethodResult::Error(code) => {
                map.insert(ERROR_TAG.into(), Value::String(code.clone()));
            }
        }
        map
    }
}

impl Serialize for MethodResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MethodResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;

        if let Some(code) = map.remove(ERROR_TAG) {
            return match code {
                Value::String(code) => Ok(MethodResult::Error(code)),
                _ => Err(de::Error::custom("$error must be a string")),
            };
        }

        match map.remove(SUCCESS_TAG) {
            Some(Value::Bool(true)) => Ok(MethodResult::Success(map)),
            _ => Err(de::Error::custom("expected $success or $error tag")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_wire_format() {
        let result = MethodResult::success().with("credits", 10);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"$success": true, "credits": 10})
        );
    }

    #[test]
    fn test_error_wire_format() {
        let result = MethodResult::error("NO_SUCH_CODE");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"$error": "NO_SUCH_CODE"})
        );
        assert!(result.with("credits", 1).payload().is_none());
    }

    #[test]
    fn test_parse_tagged_results() {
        let ok: MethodResult = serde_json::from_value(json!({"$success": true, "credits": 5})).unwrap();
        assert_eq!(ok.payload().unwrap()["credits"], json!(5));

        let err: MethodResult = serde_json::from_value(json!({"$error": "MAXIMUM_REACHED"})).unwrap();
        assert_eq!(err.error_code(), Some("MAXIMUM_REACHED"));

        assert!(serde_json::from_value::<MethodResult>(json!({"credits": 5})).is_err());
    }
}
