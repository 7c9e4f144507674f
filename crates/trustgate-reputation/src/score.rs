// crates/trustgate-reputation/src/score.rs
//
// Beta-reputation trust score derived from observation counters.
//
//   score(r, s) = r / (r + s + 2) + delta * 2 / (r + s + 2)
//
// `r` counts positive observations, `s` negative ones, and `delta` is the
// base rate: the score of an edge nobody has observed yet.

use trustgate_core::TrustGateError;

/// Base rate used when none is configured.
pub const DEFAULT_BASE_RATE_DELTA: f64 = 0.5;

/// Ceiling for counters reconstructed from a map score of (almost) 1.0.
const MAX_INVERTED_COUNT: u64 = 999;

/// Counter reconstructed for a map score of exactly 0.0.
const ZERO_SCORE_NEGATIVE_COUNT: u64 = 99;

/// Check that `delta` is a usable base rate: finite and within [0, 1].
///
/// Outside that range `score(0, 0)` leaves [0, 1] and map scores no longer
/// invert.
pub fn validate_base_rate(delta: f64) -> Result<(), TrustGateError> {
    if !(0.0..=1.0).contains(&delta) {
        return Err(TrustGateError::Config(format!(
            "Base rate delta must be within [0, 1], got {}",
            delta
        )));
    }
    Ok(())
}

/// Trust score for counters `(r, s)` with base rate `delta`.
///
/// Negative counters yield 0.0 instead of an error.
pub fn score(r: i64, s: i64, delta: f64) -> f64 {
    if r < 0 || s < 0 {
        return 0.0;
    }
    let denominator = r as f64 + s as f64 + 2.0;
    let alpha = r as f64 / denominator;
    let gamma = 2.0 / denominator;
    alpha + delta * gamma
}

/// Invert `score` back to a plausible `(r, s)` pair.
///
/// Used when a broker rebuilds its graph from the published network map,
/// which only carries rounded scores. Scores above the base rate come back
/// as positive-only counters, scores at or below it as negative-only.
pub fn counters_from_score(t: f64, delta: f64) -> (u64, u64) {
    if !t.is_finite() {
        return (0, 0);
    }
    let t = t.clamp(0.0, 1.0);
    if t > delta {
        if t >= 1.0 {
            return (MAX_INVERTED_COUNT, 0);
        }
        let r = ((t - delta) * 2.0 / (1.0 - t)).round();
        (r.clamp(0.0, MAX_INVERTED_COUNT as f64) as u64, 0)
    } else if t <= 0.0 {
        (0, ZERO_SCORE_NEGATIVE_COUNT)
    } else {
        let s = (2.0 * delta / t - 2.0).round();
        (0, s.clamp(0.0, MAX_INVERTED_COUNT as f64) as u64)
    }
}
