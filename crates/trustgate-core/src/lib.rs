// crates/trustgate-core/src/lib.rs
//
// trustgate-core: Core types, wire schema, message authentication, and errors
// for TrustGate.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines broker identities, the signed wire message and its canonical
// byte form, the keyed-tag authenticator, verdict types, and the trait
// through which the aggregator reads per-broker reputation stores.

pub mod auth;
pub mod broker;
pub mod error;
pub mod message;
pub mod observation;
pub mod traits;
pub mod verdict;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use trustgate_core::SignedMessage;`

pub use auth::{canonicalize, MessageAuthenticator, Tag, TAG_LEN};
pub use broker::BrokerId;
pub use error::TrustGateError;
pub use message::{MessageBody, SignedMessage, WireMessage, MAX_WIRE_BYTES};
pub use observation::{Outcome, StoreLine};
pub use traits::StoreSource;
pub use verdict::{ReasonCode, VerificationVerdict};
