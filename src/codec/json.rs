//! JSON codec using `serde_json`.
//!
//! `serde_json` escapes control characters inside strings, so an encoded
//! value never contains a raw `\n`. That is what lets stream transports use
//! a bare newline as the frame terminator.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PeerwireError, Result};

/// JSON codec for messages and argument lists.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to a single-line JSON string.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Convert any serializable value into a `serde_json::Value`.
    #[inline]
    pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Serialize call arguments into the positional `arguments` list.
    ///
    /// Tuples, arrays and `Vec`s become their elements; `()` becomes an
    /// empty list. Anything else is rejected, since a remote call always
    /// takes an ordered sequence of arguments.
    pub fn to_arguments<A: Serialize + ?Sized>(args: &A) -> Result<Vec<Value>> {
        match serde_json::to_value(args)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(PeerwireError::Protocol(format!(
                "arguments must serialize to a sequence, got {}",
                kind(&other)
            ))),
        }
    }

    /// Deserialize a positional argument list into a typed value.
    ///
    /// `T` is usually a tuple: `(i64, i64)` for two numbers, `(String,)` for
    /// a single string. An empty list also deserializes into `()`.
    pub fn from_arguments<T: DeserializeOwned>(args: Vec<Value>) -> Result<T> {
        if args.is_empty() {
            if let Ok(unit) = serde_json::from_value::<T>(Value::Null) {
                return Ok(unit);
            }
        }
        Ok(serde_json::from_value(Value::Array(args))?)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_encode_escapes_newlines() {
        let encoded = JsonCodec::encode(&"line one\nline two").unwrap();
        assert!(!encoded.contains('\n'));

        let decoded: String = JsonCodec::decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, "line one\nline two");
    }

    #[test]
    fn test_tuple_arguments() {
        let args = JsonCodec::to_arguments(&(2, "three", true)).unwrap();
        assert_eq!(args, vec![json!(2), json!("three"), json!(true)]);

        let (a, b, c): (i32, String, bool) = JsonCodec::from_arguments(args).unwrap();
        assert_eq!((a, b.as_str(), c), (2, "three", true));
    }

    #[test]
    fn test_unit_arguments() {
        let args = JsonCodec::to_arguments(&()).unwrap();
        assert!(args.is_empty());

        let () = JsonCodec::from_arguments(args).unwrap();
    }

    #[test]
    fn test_empty_arguments_into_vec() {
        let values: Vec<i32> = JsonCodec::from_arguments(Vec::new()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_struct_argument() {
        let args = JsonCodec::to_arguments(&(Point { x: 1, y: 2 },)).unwrap();
        assert_eq!(args, vec![json!({"x": 1, "y": 2})]);

        let (point,): (Point,) = JsonCodec::from_arguments(args).unwrap();
        assert_eq!(point, Point { x: 1, y: 2 });
    }

    #[test]
    fn test_non_sequence_arguments_rejected() {
        let result = JsonCodec::to_arguments(&Point { x: 1, y: 2 });
        let err = result.unwrap_err().to_string();
        assert!(err.contains("an object"), "{err}");
    }

    #[test]
    fn test_argument_type_mismatch() {
        let result: Result<(i32, i32)> = JsonCodec::from_arguments(vec![json!("a"), json!(1)]);
        assert!(matches!(result, Err(PeerwireError::Json(_))));
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Value> = JsonCodec::decode(b"{not json");
        assert!(result.is_err());
    }
}
