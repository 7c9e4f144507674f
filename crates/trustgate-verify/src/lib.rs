// crates/trustgate-verify/src/lib.rs
//
// trustgate-verify: Signer-chain authorization for TrustGate.
//
// Given an authenticated message, decides whether its client may publish on
// the topic and whether the claimed signer's chain is trusted enough under
// the configured policy and threshold.

pub mod acl;
pub mod config;
pub mod verifier;

pub use acl::{load_acl_file, AclAccess, AclRule, AclTable};
pub use config::VerifierConfig;
pub use verifier::SignerChainVerifier;
