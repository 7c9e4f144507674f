// crates/trustgate-core/src/message.rs
//
// Wire schema for signed messages.
//
// Wire form (single-letter keys are part of the interoperability contract):
//   { "b": claimed signer, "c": client id, "message": payload,
//     "S": signer chain (oldest hop first), "hmac": hex tag }
//
// Parsing is strict: unknown keys, wrong types and oversized frames are
// rejected before any authentication or trust work happens.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Tag;
use crate::broker::BrokerId;
use crate::error::TrustGateError;

/// Largest raw frame accepted by `WireMessage::parse`.
pub const MAX_WIRE_BYTES: usize = 64 * 1024;

/// A message exactly as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireMessage {
    #[serde(rename = "b")]
    pub claimed_signer: BrokerId,
    #[serde(rename = "c")]
    pub client_id: String,
    pub message: Value,
    #[serde(rename = "S")]
    pub signer_chain: Vec<BrokerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl WireMessage {
    /// Parse a raw frame. Structural failures map to `MalformedMessage`.
    pub fn parse(raw: &[u8]) -> Result<Self, TrustGateError> {
        if raw.len() > MAX_WIRE_BYTES {
            return Err(TrustGateError::MalformedMessage(format!(
                "frame of {} bytes exceeds {} byte limit",
                raw.len(),
                MAX_WIRE_BYTES
            )));
        }
        match raw.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => {}
            _ => {
                return Err(TrustGateError::MalformedMessage(
                    "payload is not a JSON object".to_string(),
                ))
            }
        }
        serde_json::from_slice(raw).map_err(|e| TrustGateError::MalformedMessage(e.to_string()))
    }

    /// Validate the tag field and split the frame into body + tag.
    ///
    /// This is the cheapest rejection point after parsing: a missing or
    /// malformed tag fails here without canonicalizing anything.
    pub fn into_signed(self) -> Result<SignedMessage, TrustGateError> {
        let tag = match self.hmac.as_deref() {
            Some(hex_tag) => Tag::from_hex(hex_tag)?,
            None => return Err(TrustGateError::InvalidTag("missing hmac field".to_string())),
        };
        if self.claimed_signer.as_str().is_empty() {
            return Err(TrustGateError::MalformedMessage("empty signer id".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(TrustGateError::MalformedMessage("empty client id".to_string()));
        }
        Ok(SignedMessage {
            body: MessageBody {
                claimed_signer: self.claimed_signer,
                client_id: self.client_id,
                payload: self.message,
                signer_chain: self.signer_chain,
            },
            tag,
        })
    }

    /// Serialize in wire form (compact, declared key order).
    pub fn to_bytes(&self) -> Result<Vec<u8>, TrustGateError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// The authenticated content of a message: everything except the tag.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    pub claimed_signer: BrokerId,
    pub client_id: String,
    pub payload: Value,
    pub signer_chain: Vec<BrokerId>,
}

impl MessageBody {
    pub fn new(
        claimed_signer: impl Into<BrokerId>,
        client_id: impl Into<String>,
        payload: Value,
        signer_chain: Vec<BrokerId>,
    ) -> Self {
        Self {
            claimed_signer: claimed_signer.into(),
            client_id: client_id.into(),
            payload,
            signer_chain,
        }
    }
}

/// A parsed message whose tag is well-formed (not yet checked).
#[derive(Debug, Clone, PartialEq)]
pub struct SignedMessage {
    pub body: MessageBody,
    pub tag: Tag,
}

impl SignedMessage {
    pub fn claimed_signer(&self) -> &BrokerId {
        &self.body.claimed_signer
    }

    pub fn client_id(&self) -> &str {
        &self.body.client_id
    }

    pub fn signer_chain(&self) -> &[BrokerId] {
        &self.body.signer_chain
    }

    /// Back to wire form with the hex tag attached.
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            claimed_signer: self.body.claimed_signer.clone(),
            client_id: self.body.client_id.clone(),
            message: self.body.payload.clone(),
            signer_chain: self.body.signer_chain.clone(),
            hmac: Some(self.tag.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{"b":"B0","c":"C8","message":"dos","S":["B0","B1"],"hmac":"c4f05cb36ad846f5c41feda4896c06a8648e107fc640e2c1fc432015133fad32"}"#;

    #[test]
    fn parses_well_formed_frame() {
        let wire = WireMessage::parse(FRAME.as_bytes()).unwrap();
        assert_eq!(wire.claimed_signer.as_str(), "B0");
        assert_eq!(wire.client_id, "C8");
        assert_eq!(wire.message, Value::String("dos".to_string()));
        assert_eq!(wire.signer_chain.len(), 2);
        let signed = wire.into_signed().unwrap();
        assert_eq!(signed.signer_chain()[1].as_str(), "B1");
    }

    #[test]
    fn rejects_non_object_payloads() {
        for raw in ["", "hello", "[1,2]", "   42"] {
            let err = WireMessage::parse(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, TrustGateError::MalformedMessage(_)), "{raw:?}");
        }
    }

    #[test]
    fn rejects_unknown_keys_and_wrong_types() {
        let extra = r#"{"b":"B0","c":"C8","message":"x","S":[],"hmac":"00","Fp":["t"]}"#;
        assert!(matches!(
            WireMessage::parse(extra.as_bytes()),
            Err(TrustGateError::MalformedMessage(_))
        ));
        let wrong = r#"{"b":"B0","c":"C8","message":"x","S":"B0","hmac":"00"}"#;
        assert!(matches!(
            WireMessage::parse(wrong.as_bytes()),
            Err(TrustGateError::MalformedMessage(_))
        ));
        let non_string_hop = r#"{"b":"B0","c":"C8","message":"x","S":[1],"hmac":"00"}"#;
        assert!(WireMessage::parse(non_string_hop.as_bytes()).is_err());
    }

    #[test]
    fn rejects_oversized_frames() {
        let raw = format!("{{\"pad\":\"{}\"}}", "x".repeat(MAX_WIRE_BYTES));
        assert!(matches!(
            WireMessage::parse(raw.as_bytes()),
            Err(TrustGateError::MalformedMessage(_))
        ));
    }

    #[test]
    fn missing_or_placeholder_tag_is_invalid() {
        let no_tag = r#"{"b":"B0","c":"C8","message":"x","S":["B0"]}"#;
        let wire = WireMessage::parse(no_tag.as_bytes()).unwrap();
        assert!(matches!(wire.into_signed(), Err(TrustGateError::InvalidTag(_))));

        let fake = r#"{"b":"B0","c":"C8","message":"x","S":["B0"],"hmac":"tamperedhmac123"}"#;
        let wire = WireMessage::parse(fake.as_bytes()).unwrap();
        assert!(matches!(wire.into_signed(), Err(TrustGateError::InvalidTag(_))));
    }

    #[test]
    fn wire_round_trip_keeps_key_order() {
        let wire = WireMessage::parse(FRAME.as_bytes()).unwrap();
        let bytes = wire.to_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), FRAME);
    }
}
