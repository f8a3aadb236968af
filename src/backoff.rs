//! Retry backoff law, generalized from the teacher's
//! `scheduler::RetryStrategy::delay_for_attempt` down to the two variants
//! this crate names. `attempts` is `attemptsMade` after incrementing
//! (>= 1).

use crate::job::{BackoffKind, BackoffOptions};

pub fn backoff_delay_ms(attempts: u32, options: &Option<BackoffOptions>) -> u64 {
    let Some(options) = options else {
        return 0;
    };

    match options.kind {
        BackoffKind::Fixed => options.delay,
        BackoffKind::Exponential => {
            let exponent = attempts.saturating_sub(1).min(62);
            options.delay.saturating_mul(1u64 << exponent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backoff_configured_is_zero() {
        assert_eq!(backoff_delay_ms(1, &None), 0);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let opts = Some(BackoffOptions {
            kind: BackoffKind::Fixed,
            delay: 50,
        });
        assert_eq!(backoff_delay_ms(1, &opts), 50);
        assert_eq!(backoff_delay_ms(2, &opts), 50);
        assert_eq!(backoff_delay_ms(5, &opts), 50);
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let opts = Some(BackoffOptions {
            kind: BackoffKind::Exponential,
            delay: 10,
        });
        assert_eq!(backoff_delay_ms(1, &opts), 10);
        assert_eq!(backoff_delay_ms(2, &opts), 20);
        assert_eq!(backoff_delay_ms(3, &opts), 40);
        assert_eq!(backoff_delay_ms(4, &opts), 80);
    }

    #[test]
    fn exponential_backoff_caps_exponent_instead_of_overflowing() {
        let opts = Some(BackoffOptions {
            kind: BackoffKind::Exponential,
            delay: 1,
        });
        assert_eq!(backoff_delay_ms(1000, &opts), 1u64 << 62);
    }
}
