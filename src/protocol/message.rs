//! Request/response messages and their classification.
//!
//! A message is a JSON object. It is a [`Request`] when it carries a
//! `method` field and a [`Response`] when it carries a `result` field;
//! nothing else distinguishes the two.
//!
//! ```text
//! {"id":0,"method":"methods","arguments":[]}
//! {"id":0,"result":["methods","add"]}
//! {"id":3,"result":null,"error":"Method not found: sub"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::JsonCodec;
use crate::error::{PeerwireError, Result};

/// Name of the reflection method every peer answers during discovery.
pub const METHODS: &str = "methods";

/// A call of one of the peer's methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sender-assigned id, echoed back in the response.
    pub id: u64,
    /// Name of the method to invoke.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered.
    pub id: u64,
    /// Value returned by the handler (`null` for error responses).
    #[serde(default)]
    pub result: Value,
    /// Set when the request could not be served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Request {
    /// Create a new request.
    pub fn new(id: u64, method: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            arguments,
        }
    }
}

impl Response {
    /// Successful response carrying `result`.
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    /// Error response. `result` stays on the wire as `null` so that every
    /// peer still classifies the message as a response.
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Whether this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into the value delivered to the caller's completion.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(PeerwireError::Remote(message)),
            None => Ok(self.result),
        }
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Call of a peer method.
    Request(Request),
    /// Result of an earlier call.
    Response(Response),
}

impl Message {
    /// Parse one frame payload.
    ///
    /// Any failure here is a protocol error: the payload is not JSON, not an
    /// object, has neither `method` nor `result`, or has ill-typed fields.
    /// [`Message::classify`] is the lenient form.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Self::classify(payload)?.ok_or_else(|| {
            PeerwireError::Protocol("message has neither `method` nor `result`".to_string())
        })
    }

    /// Parse one frame payload, tolerating objects that are neither a
    /// request nor a response.
    ///
    /// Returns `Ok(None)` for a JSON object without `method` and `result`
    /// (a peer replying `{"id":N}` when its result was undefined). Payloads
    /// that are not JSON objects, or whose fields are ill-typed, are still
    /// protocol errors.
    pub fn classify(payload: &[u8]) -> Result<Option<Self>> {
        let value: Value = JsonCodec::decode(payload)
            .map_err(|e| PeerwireError::Protocol(format!("malformed frame: {}", e)))?;

        let map = match value {
            Value::Object(map) => map,
            _ => {
                return Err(PeerwireError::Protocol(
                    "malformed frame: message is not an object".to_string(),
                ))
            }
        };

        if map.contains_key("method") {
            Ok(Some(Message::Request(from_map(map, "request")?)))
        } else if map.contains_key("result") {
            Ok(Some(Message::Response(from_map(map, "response")?)))
        } else {
            Ok(None)
        }
    }

    /// Serialize to a single line of JSON, without the terminator.
    pub fn encode(&self) -> Result<String> {
        match self {
            Message::Request(request) => JsonCodec::encode(request),
            Message::Response(response) => JsonCodec::encode(response),
        }
    }

    /// The message id.
    pub fn id(&self) -> u64 {
        match self {
            Message::Request(request) => request.id,
            Message::Response(response) => response.id,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

fn from_map<T: serde::de::DeserializeOwned>(map: Map<String, Value>, what: &str) -> Result<T> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| PeerwireError::Protocol(format!("malformed {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = Message::from(Request::new(1, "add", vec![json!(2), json!(3)]));
        let encoded = request.encode().unwrap();

        assert_eq!(encoded, r#"{"id":1,"method":"add","arguments":[2,3]}"#);
        assert_eq!(Message::decode(encoded.as_bytes()).unwrap(), request);
    }

    #[test]
    fn test_response_wire_shape() {
        let encoded = Message::from(Response::ok(1, json!(5))).encode().unwrap();
        assert_eq!(encoded, r#"{"id":1,"result":5}"#);
    }

    #[test]
    fn test_error_response_keeps_result_field() {
        let encoded = Message::from(Response::error(4, "boom")).encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert!(value.get("result").unwrap().is_null());
        assert_eq!(value["error"], "boom");

        match Message::decode(encoded.as_bytes()).unwrap() {
            Message::Response(response) => {
                assert!(response.is_error());
                assert!(matches!(
                    response.into_result(),
                    Err(PeerwireError::Remote(m)) if m == "boom"
                ));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_null_result_is_a_response() {
        let message = Message::decode(br#"{"id":7,"result":null}"#).unwrap();
        assert_eq!(message, Message::Response(Response::ok(7, Value::Null)));
    }

    #[test]
    fn test_missing_arguments_default_to_empty() {
        let message = Message::decode(br#"{"id":0,"method":"methods"}"#).unwrap();
        assert_eq!(message, Message::Request(Request::new(0, METHODS, vec![])));
    }

    #[test]
    fn test_method_wins_over_result() {
        let message = Message::decode(br#"{"id":2,"method":"m","result":1}"#).unwrap();
        assert!(matches!(message, Message::Request(_)));
    }

    #[test]
    fn test_unclassifiable_message() {
        let err = Message::decode(br#"{"id":2}"#).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[test]
    fn test_classify_tolerates_unclassifiable_object() {
        assert_eq!(Message::classify(br#"{"id":2}"#).unwrap(), None);
        assert!(matches!(
            Message::classify(br#"{"id":2,"result":1}"#).unwrap(),
            Some(Message::Response(_))
        ));
        assert!(Message::classify(b"[1]").is_err());
    }

    #[test]
    fn test_malformed_payloads() {
        for payload in [&b"not json"[..], b"[1,2]", b"{\"id\":\"x\",\"result\":1}"] {
            let err = Message::decode(payload).unwrap_err();
            assert!(matches!(err, PeerwireError::Protocol(_)), "{:?}", err);
        }
    }
}
