// src/retry.rs

//! Backoff calculation shared by the scheduler's task-retry loop and its
//! internal store-error retry loop.

/// Exponential backoff with a ceiling: `backoff_s * 2^(attempts_made - 1)`,
/// capped at 60 seconds so a generous `backoff_s` on a long-retried task
/// can't stall a run for an unbounded stretch.
///
/// `attempts_made` is the number of attempts already made (so the delay
/// before the *second* attempt uses `attempts_made == 1`).
pub fn backoff_delay_s(backoff_s: f64, attempts_made: u32) -> f64 {
    let exponent = attempts_made.saturating_sub(1);
    let factor = 2f64.powi(exponent as i32);
    (backoff_s * factor).min(60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay_s(1.0, 1), 1.0);
        assert_eq!(backoff_delay_s(1.0, 2), 2.0);
        assert_eq!(backoff_delay_s(1.0, 3), 4.0);
    }

    #[test]
    fn backoff_is_capped_at_60s() {
        assert_eq!(backoff_delay_s(10.0, 10), 60.0);
    }
}
