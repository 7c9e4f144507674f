// crates/trustgate-core/src/auth.rs
//
// Message authentication: canonical byte form + HMAC-SHA256 tag.
//
// The canonical bytes are the compact JSON serialization of
// {"b","c","message","S"} in exactly that key order with no whitespace.
// Senders and brokers must both reproduce this form byte for byte; the tag is
// the lowercase hex HMAC-SHA256 of those bytes under the shared secret.
// Object payloads keep the sender's key order (serde_json `preserve_order`).

use std::fmt;

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::broker::BrokerId;
use crate::error::TrustGateError;
use crate::message::{MessageBody, SignedMessage};

type HmacSha256 = Hmac<Sha256>;

/// Length of a tag in bytes (HMAC-SHA256 output).
pub const TAG_LEN: usize = 32;

/// An authentication tag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag([u8; TAG_LEN]);

impl Tag {
    pub fn from_bytes(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a hex tag. Anything other than exactly `2 * TAG_LEN` hex digits
    /// is an `InvalidTag`.
    pub fn from_hex(s: &str) -> Result<Self, TrustGateError> {
        if s.len() != TAG_LEN * 2 {
            return Err(TrustGateError::InvalidTag(format!(
                "expected {} hex digits, got {}",
                TAG_LEN * 2,
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| TrustGateError::InvalidTag(e.to_string()))?;
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.to_hex())
    }
}

/// Borrowed view serialized for the canonical form. Field order is the
/// contract; do not reorder.
#[derive(Serialize)]
struct CanonicalView<'a> {
    b: &'a BrokerId,
    c: &'a str,
    message: &'a Value,
    #[serde(rename = "S")]
    s: &'a [BrokerId],
}

/// Produce the canonical bytes of a message body.
pub fn canonicalize(body: &MessageBody) -> Result<Vec<u8>, TrustGateError> {
    let view = CanonicalView {
        b: &body.claimed_signer,
        c: &body.client_id,
        message: &body.payload,
        s: &body.signer_chain,
    };
    Ok(serde_json::to_vec(&view)?)
}

/// Computes and checks keyed tags under one shared secret.
///
/// Independent of any trust logic; the secret is provisioned externally.
#[derive(Clone)]
pub struct MessageAuthenticator {
    secret: Vec<u8>,
}

impl MessageAuthenticator {
    /// Create an authenticator. An empty secret is refused.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TrustGateError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TrustGateError::Crypto("shared secret must not be empty".to_string()));
        }
        Ok(Self { secret })
    }

    fn mac(&self) -> Result<HmacSha256, TrustGateError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TrustGateError::Crypto(format!("invalid shared secret: {}", e)))
    }

    /// HMAC-SHA256 over already-canonical bytes.
    pub fn compute_tag(&self, bytes: &[u8]) -> Result<Tag, TrustGateError> {
        let mut mac = self.mac()?;
        mac.update(bytes);
        let out = mac.finalize().into_bytes();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&out);
        Ok(Tag(tag))
    }

    /// Check a message's tag against its canonical bytes in constant time.
    pub fn verify_tag(&self, message: &SignedMessage) -> Result<bool, TrustGateError> {
        let bytes = canonicalize(&message.body)?;
        let expected = self.compute_tag(&bytes)?;
        Ok(expected.0[..].ct_eq(&message.tag.0[..]).into())
    }

    /// Tag a body, producing a message ready for the wire.
    pub fn sign(&self, body: MessageBody) -> Result<SignedMessage, TrustGateError> {
        let bytes = canonicalize(&body)?;
        let tag = self.compute_tag(&bytes)?;
        Ok(SignedMessage { body, tag })
    }

    /// Forward an accepted message: append `local` to the signer chain unless
    /// it is already present, then re-tag over the new canonical bytes.
    pub fn relay(
        &self,
        message: SignedMessage,
        local: &BrokerId,
    ) -> Result<SignedMessage, TrustGateError> {
        let mut body = message.body;
        if !body.signer_chain.contains(local) {
            body.signer_chain.push(local.clone());
        }
        self.sign(body)
    }
}

impl fmt::Debug for MessageAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageAuthenticator")
            .field("secret", &"<redacted>")
            .finish()
    }
}
