//! Jittered exponential backoff between same-provider retries.

use std::time::Duration;

use rand::Rng;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt` (0-based): `base * 2^attempt` with ±50 % jitter.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let nominal = nominal_delay(base, attempt);
    let factor = rand::thread_rng().gen_range(0.5..=1.5);
    nominal.mul_f64(factor).min(MAX_BACKOFF)
}

fn nominal_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
    base.checked_mul(multiplier)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}
