//! Poll response frames

use bytes::{BufMut, BytesMut};
use pubsync_core::{DiffResult, MethodResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Diff produced by one subscription
///
/// A failed subscription carries an empty diff and a generic failure code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub name: String,
    pub results: DiffResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SubResult {
    pub fn delivered(name: impl Into<String>, results: DiffResult) -> Self {
        Self {
            name: name.into(),
            results,
            failure: None,
        }
    }

    pub fn failed(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: DiffResult::empty(),
            failure: Some(code.into()),
        }
    }
}

/// Outcome of one method call. Exactly one of `result` and `failure` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReturn {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MethodResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl MethodReturn {
    pub fn result(id: impl Into<String>, result: MethodResult) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            failure: None,
        }
    }

    pub fn failure(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            failure: Some(code.into()),
        }
    }
}

/// Per-entry outcome codes for one collection's change set, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeResults {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insert: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
}

/// Answer to one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    #[serde(default)]
    pub change_set_results: BTreeMap<String, ChangeResults>,
    #[serde(default)]
    pub methods_results: Vec<MethodReturn>,
    #[serde(default)]
    pub sub_results: Vec<SubResult>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

/// A response line
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Poll(PollResponse),
    Pong,
    Error { code: String, message: String },
}

impl Response {
    pub fn pong() -> Self {
        Response::Pong
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited() -> Self {
        Response::error("RATE_LIMITED", "Too many requests")
    }

    /// Encode the response to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the response into an existing buffer, newline terminated
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let encoded = match self {
            Response::Poll(poll) => serde_json::to_vec(poll),
            Response::Pong => Ok(br#"{"pong":true}"#.to_vec()),
            Response::Error { code, message } => serde_json::to_vec(&ErrorBody {
                error: code,
                message,
            }),
        };

        match encoded {
            Ok(bytes) => buf.put_slice(&bytes),
            Err(_) => buf.put_slice(br#"{"error":"INTERNAL","message":"encoding failed"}"#),
        }
        buf.put_u8(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn decode(response: &Response) -> Value {
        let bytes = response.encode();
        assert_eq!(bytes.last(), Some(&b'\n'));
        serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap()
    }

    #[test]
    fn test_encode_pong() {
        assert_eq!(Response::pong().encode().as_ref(), b"{\"pong\":true}\n");
    }

    #[test]
    fn test_encode_error() {
        assert_eq!(
            decode(&Response::rate_limited()),
            json!({"error": "RATE_LIMITED", "message": "Too many requests"})
        );
    }

    #[test]
    fn test_encode_poll() {
        let mut response = PollResponse::default();
        response
            .sub_results
            .push(SubResult::delivered("accounts", DiffResult::empty()));
        response.sub_results.push(SubResult::failed("orders", "INTERNAL_ERROR"));
        response
            .methods_results
            .push(MethodReturn::result("1", MethodResult::error("NO_SUCH_CODE")));
        response
            .methods_results
            .push(MethodReturn::failure("2", "INTERNAL_ERROR"));
        response.change_set_results.insert(
            "users".into(),
            ChangeResults {
                update: vec!["OK".into()],
                ..Default::default()
            },
        );

        assert_eq!(
            decode(&Response::Poll(response)),
            json!({
                "changeSetResults": {"users": {"update": ["OK"]}},
                "methodsResults": [
                    {"id": "1", "result": {"$error": "NO_SUCH_CODE"}},
                    {"id": "2", "failure": "INTERNAL_ERROR"}
                ],
                "subResults": [
                    {"name": "accounts", "results": []},
                    {"name": "orders", "results": [], "failure": "INTERNAL_ERROR"}
                ]
            })
        );
    }
}
