//! Poll request frames

use crate::error::{ProtocolError, ProtocolResult};
use pubsync_core::WatermarkMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Credentials carried by a poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// Proposed mutations for one collection, still in wire form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insert: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<Value>,
}

/// One method invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Client-chosen id echoed in the result
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub opts: Value,
}

/// One subscription and the client's watermarks for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Map<String, Value>,
    #[serde(default)]
    pub updated_at: WatermarkMap,
}

/// A full poll: change set first, then methods, then subscriptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPayload>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub change_set: BTreeMap<String, CollectionChanges>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<SubscriptionRequest>,
}

impl PollRequest {
    pub fn session_id(&self) -> Option<&str> {
        self.auth.as_ref().and_then(|a| a.sid.as_deref())
    }
}

/// A decoded request line
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Ping,
    Poll(PollRequest),
}

impl Frame {
    /// Decode a single line
    pub fn decode(line: &str) -> ProtocolResult<Frame> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidFrame("expected a JSON object".into()))?;
        if object.get("ping") == Some(&Value::Bool(true)) {
            return Ok(Frame::Ping);
        }

        serde_json::from_value(value)
            .map(Frame::Poll)
            .map_err(|e| ProtocolError::InvalidFrame(e.to_string()))
    }
}
