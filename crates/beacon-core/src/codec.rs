//! JSON envelope codec.
//!
//! Every envelope travels as one UTF-8 JSON document per frame. Decoding never
//! panics: malformed input comes back as a [`CodecError`] and the caller treats
//! it as a dropped message.

use beacon_types::config::EnvelopeKind;
use beacon_types::envelope::CommandResponse;
use beacon_types::error::CodecError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Serialize a value into frame bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Deserialize frame bytes into a typed value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Decode a broker reply according to the configured envelope shape.
pub fn decode_reply(kind: &EnvelopeKind, bytes: &[u8]) -> Result<CommandResponse, CodecError> {
    match kind {
        EnvelopeKind::Command { .. } => decode::<CommandResponse>(bytes),
        EnvelopeKind::Service { .. } => decode_service_reply(bytes),
    }
}

/// Lenient decoding for service-style replies.
///
/// Accepts `{"service": .., "data": {..}}` as well as a flat object. The body
/// is `data` when present, else the object itself. `status` falls back to
/// `"unknown"`; `message` is `description` or `message`, else the body as
/// compact JSON.
pub fn decode_service_reply(bytes: &[u8]) -> Result<CommandResponse, CodecError> {
    let value: Value = decode(bytes)?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(CodecError::UnexpectedShape(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )));
        }
    };

    let body: Map<String, Value> = match object.get("data") {
        Some(Value::Object(data)) => data.clone(),
        _ => object,
    };

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let message = ["description", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| Value::Object(body.clone()).to_string());

    Ok(CommandResponse { status, message })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_types::envelope::CommandRequest;

    fn service_kind() -> EnvelopeKind {
        EnvelopeKind::Service {
            service: "publish".into(),
        }
    }

    #[test]
    fn encode_command_request() {
        let bytes = encode(&CommandRequest::new("LIST")).unwrap();
        assert_eq!(bytes, br#"{"cmd":"LIST","args":{}}"#);
    }

    #[test]
    fn reply_survives_reencoding() {
        let bytes = br#"{"status":"ok","message":"5 items"}"#;
        let first: CommandResponse = decode(bytes).unwrap();
        let second: CommandResponse = decode(&encode(&first).unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.status, "ok");
        assert_eq!(second.message, "5 items");
    }

    #[test]
    fn malformed_reply_is_an_error_not_a_panic() {
        let kind = EnvelopeKind::default();
        for raw in [
            &b""[..],
            b"not json",
            b"{\"status\":\"ok\"}",
            b"[1,2,3]",
            b"\xff\xfe\x00",
            b"{\"status\":1,\"message\":\"x\"}",
        ] {
            assert!(decode_reply(&kind, raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn service_reply_with_nested_data() {
        let raw = br#"{"service":"publish","data":{"status":"sucesso","timestamp":1}}"#;
        let reply = decode_reply(&service_kind(), raw).unwrap();
        assert_eq!(reply.status, "sucesso");
        assert!(reply.message.contains("timestamp"));
    }

    #[test]
    fn service_reply_flat_with_description() {
        let raw = br#"{"status":"erro","description":"unknown service"}"#;
        let reply = decode_reply(&service_kind(), raw).unwrap();
        assert_eq!(reply.status, "erro");
        assert_eq!(reply.message, "unknown service");
    }

    #[test]
    fn service_reply_without_status() {
        let raw = br#"{"users":["a","b"]}"#;
        let reply = decode_service_reply(raw).unwrap();
        assert_eq!(reply.status, "unknown");
        assert_eq!(reply.message, r#"{"users":["a","b"]}"#);
    }

    #[test]
    fn service_reply_rejects_non_object() {
        let err = decode_service_reply(b"\"hello\"").unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedShape(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_kind() -> impl Strategy<Value = EnvelopeKind> {
            prop_oneof![Just(EnvelopeKind::default()), Just(service_kind())]
        }

        proptest! {
            #[test]
            fn any_reply_text_survives_the_wire(status in any::<String>(), message in any::<String>()) {
                let reply = CommandResponse { status, message };
                let bytes = encode(&reply).unwrap();
                prop_assert_eq!(&decode::<CommandResponse>(&bytes).unwrap(), &reply);
                // A flat object is also a valid service reply.
                prop_assert_eq!(&decode_service_reply(&bytes).unwrap(), &reply);
            }

            #[test]
            fn arbitrary_reply_bytes_never_panic(kind in any_kind(), bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = decode_reply(&kind, &bytes);
            }

            #[test]
            fn json_looking_noise_never_panics(kind in any_kind(), text in r#"[{}\[\]":,a-z0-9 ]{0,64}"#) {
                let _ = decode_reply(&kind, text.as_bytes());
            }
        }
    }
}
