// crates/trustgate-admission/src/lib.rs
//
// trustgate-admission: The admission gate for TrustGate.
//
// Every inbound frame passes a per-sender rate limit and a global in-flight
// bound before any parsing happens, then the cheapest checks run first:
// schema, tag presence, tag validity, and only then trust evaluation.
// Excess work is rejected, never queued.

pub mod gate;
pub mod rate_limiter;

pub use gate::{Admission, AdmissionConfig, AdmissionGate, AdmissionSlot};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
