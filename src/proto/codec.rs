//! JSON wire format for control messages.
//!
//! Every message is a single JSON object keyed by variant name, for
//! example `{"retrieveLastError":true}` or
//! `{"dnsResolutionFailure":["vpn.example.net"]}`. Decoding probes a
//! fixed list of keys in priority order and takes the first one whose
//! value has the right shape, so an object carrying several recognized
//! keys decodes deterministically and unknown keys are ignored.

use serde_json::{json, Value};

use crate::error::ProtoError;
use crate::proto::{FaultCode, Request, Response};

const NO_ERROR: &str = "noError";
const INVALID_SAVED_CONFIGURATION: &str = "invalidSavedConfiguration";
const DNS_RESOLUTION_FAILURE: &str = "dnsResolutionFailure";
const ENGINE_START_FAILED: &str = "engineStartFailed";
const NETWORK_SETTINGS_REJECTED: &str = "networkSettingsRejected";
const RETRIEVE_LAST_ERROR: &str = "retrieveLastError";
const LAST_ERROR: &str = "lastError";

/// Conversion between control messages and their JSON wire form.
pub trait WireMessage: Sized {
    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self, ProtoError>;

    /// Serialized wire bytes of this message.
    fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    /// Decodes wire bytes, absorbing every failure into `None`.
    fn from_bytes(data: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(data).ok()?;
        Self::from_value(&value).ok()
    }
}

/// True when `key` is present with the literal JSON value `true`.
fn flag_set(value: &Value, key: &str) -> bool {
    matches!(value.get(key), Some(Value::Bool(true)))
}

/// Extracts `key` as an array of strings, `None` on any shape mismatch.
fn string_array(value: &Value, key: &str) -> Option<Vec<String>> {
    let items = value.get(key)?.as_array()?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect()
}

impl WireMessage for FaultCode {
    fn to_value(&self) -> Value {
        match self {
            FaultCode::NoError => json!({ NO_ERROR: true }),
            FaultCode::InvalidSavedConfiguration => {
                json!({ INVALID_SAVED_CONFIGURATION: true })
            }
            FaultCode::DnsResolutionFailed { hostnames } => {
                json!({ DNS_RESOLUTION_FAILURE: hostnames })
            }
            FaultCode::EngineStartFailed => json!({ ENGINE_START_FAILED: true }),
            FaultCode::NetworkSettingsRejected => {
                json!({ NETWORK_SETTINGS_REJECTED: true })
            }
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtoError> {
        if flag_set(value, NO_ERROR) {
            return Ok(FaultCode::NoError);
        }
        if flag_set(value, INVALID_SAVED_CONFIGURATION) {
            return Ok(FaultCode::InvalidSavedConfiguration);
        }
        if let Some(hostnames) = string_array(value, DNS_RESOLUTION_FAILURE) {
            return Ok(FaultCode::DnsResolutionFailed { hostnames });
        }
        if flag_set(value, ENGINE_START_FAILED) {
            return Ok(FaultCode::EngineStartFailed);
        }
        if flag_set(value, NETWORK_SETTINGS_REJECTED) {
            return Ok(FaultCode::NetworkSettingsRejected);
        }
        Err(ProtoError::MalformedMessage)
    }
}

impl WireMessage for Request {
    fn to_value(&self) -> Value {
        match self {
            Request::RetrieveLastError => json!({ RETRIEVE_LAST_ERROR: true }),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtoError> {
        if flag_set(value, RETRIEVE_LAST_ERROR) {
            return Ok(Request::RetrieveLastError);
        }
        Err(ProtoError::MalformedMessage)
    }
}

impl WireMessage for Response {
    fn to_value(&self) -> Value {
        match self {
            Response::LastError(fault) => json!({ LAST_ERROR: fault.to_value() }),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtoError> {
        match value.get(LAST_ERROR) {
            Some(inner) => Ok(Response::LastError(FaultCode::from_value(inner)?)),
            None => Err(ProtoError::MalformedMessage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<M: WireMessage + PartialEq + std::fmt::Debug>(message: M) {
        let bytes = message.to_bytes();
        let decoded = M::from_bytes(&bytes);
        assert_eq!(decoded, Some(message));
    }

    #[test]
    fn test_fault_roundtrips() {
        roundtrip(FaultCode::NoError);
        roundtrip(FaultCode::InvalidSavedConfiguration);
        roundtrip(FaultCode::DnsResolutionFailed {
            hostnames: vec!["a.example".into(), "b.example".into()],
        });
        roundtrip(FaultCode::DnsResolutionFailed { hostnames: vec![] });
        roundtrip(FaultCode::EngineStartFailed);
        roundtrip(FaultCode::NetworkSettingsRejected);
    }

    #[test]
    fn test_request_and_response_roundtrips() {
        roundtrip(Request::RetrieveLastError);
        roundtrip(Response::LastError(FaultCode::NoError));
        roundtrip(Response::LastError(FaultCode::DnsResolutionFailed {
            hostnames: vec!["vpn.example.net".into()],
        }));
    }

    #[test]
    fn test_exact_wire_bytes() {
        assert_eq!(FaultCode::NoError.to_bytes(), br#"{"noError":true}"#);
        assert_eq!(
            Request::RetrieveLastError.to_bytes(),
            br#"{"retrieveLastError":true}"#
        );
        assert_eq!(
            FaultCode::DnsResolutionFailed {
                hostnames: vec!["a.example".into(), "b.example".into()],
            }
            .to_bytes(),
            br#"{"dnsResolutionFailure":["a.example","b.example"]}"#
        );
        assert_eq!(
            Response::LastError(FaultCode::EngineStartFailed).to_bytes(),
            br#"{"lastError":{"engineStartFailed":true}}"#
        );
    }

    #[test]
    fn test_decode_priority_is_fixed() {
        // noError wins over any later key regardless of object order.
        let fault = FaultCode::from_bytes(br#"{"engineStartFailed":true,"noError":true}"#);
        assert_eq!(fault, Some(FaultCode::NoError));

        let fault =
            FaultCode::from_bytes(br#"{"noError":true,"invalidSavedConfiguration":true}"#);
        assert_eq!(fault, Some(FaultCode::NoError));

        let fault = FaultCode::from_bytes(
            br#"{"networkSettingsRejected":true,"dnsResolutionFailure":["x.example"]}"#,
        );
        assert_eq!(
            fault,
            Some(FaultCode::DnsResolutionFailed {
                hostnames: vec!["x.example".into()],
            })
        );
    }

    #[test]
    fn test_false_flags_are_skipped() {
        // A key set to false does not select its variant, but later keys
        // may still match.
        assert_eq!(FaultCode::from_bytes(br#"{"noError":false}"#), None);
        assert_eq!(
            FaultCode::from_bytes(br#"{"noError":false,"engineStartFailed":true}"#),
            Some(FaultCode::EngineStartFailed)
        );
        assert_eq!(
            Request::from_bytes(br#"{"retrieveLastError":false}"#),
            None
        );
    }

    #[test]
    fn test_payload_shape_is_checked() {
        assert_eq!(
            FaultCode::from_bytes(br#"{"dnsResolutionFailure":"host.example"}"#),
            None
        );
        assert_eq!(
            FaultCode::from_bytes(br#"{"dnsResolutionFailure":true}"#),
            None
        );
        // A non-string element spoils the whole array.
        assert_eq!(
            FaultCode::from_bytes(br#"{"dnsResolutionFailure":["ok.example",7]}"#),
            None
        );
        // The spoiled payload key still falls through to later keys.
        assert_eq!(
            FaultCode::from_bytes(
                br#"{"dnsResolutionFailure":[7],"networkSettingsRejected":true}"#
            ),
            Some(FaultCode::NetworkSettingsRejected)
        );
    }

    #[test]
    fn test_unknown_and_garbage_input() {
        assert_eq!(FaultCode::from_bytes(b"{}"), None);
        assert_eq!(FaultCode::from_bytes(br#"{"somethingElse":true}"#), None);
        assert_eq!(FaultCode::from_bytes(b"not json at all"), None);
        assert_eq!(FaultCode::from_bytes(b""), None);
        assert_eq!(FaultCode::from_bytes(br#"[1,2,3]"#), None);
        assert_eq!(Request::from_bytes(br#""retrieveLastError""#), None);
        assert_eq!(Response::from_bytes(br#"{"lastError":{}}"#), None);
        assert_eq!(Response::from_bytes(br#"{"lastError":true}"#), None);
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let fault = FaultCode::from_bytes(
            br#"{"version":3,"engineStartFailed":true,"detail":"socket"}"#,
        );
        assert_eq!(fault, Some(FaultCode::EngineStartFailed));

        let request =
            Request::from_bytes(br#"{"retrieveLastError":true,"requestId":"abc"}"#);
        assert_eq!(request, Some(Request::RetrieveLastError));
    }

    #[test]
    fn test_response_decodes_nested_fault() {
        let response = Response::from_bytes(
            br#"{"lastError":{"dnsResolutionFailure":["p2.example"]}}"#,
        );
        assert_eq!(
            response,
            Some(Response::LastError(FaultCode::DnsResolutionFailed {
                hostnames: vec!["p2.example".into()],
            }))
        );
    }
}
