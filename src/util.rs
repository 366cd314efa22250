use std::time::Duration;

/// Spreads `duration` by up to ±10%.
///
/// Listeners of a popular station all lose the stream at the same moment
/// when its server restarts; jitter keeps them from reconnecting in lockstep.
#[must_use]
pub fn jitter(duration: Duration) -> Duration {
    duration.mul_f64(fastrand::f64().mul_add(0.2, 0.9))
}

/// Exponential back-off: `base`, `2 * base`, `4 * base`, ... for attempts
/// 1, 2, 3, ..., with jitter.
#[must_use]
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1_u32 << attempt.saturating_sub(1).min(16);
    jitter(base.saturating_mul(factor))
}
