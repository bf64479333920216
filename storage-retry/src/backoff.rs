use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::{Rng as _, RngCore};

use crate::options::RetryPolicyKind;

/// Nominal delay before a secondary attempt, whatever the policy.
pub(crate) const SECONDARY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Source of randomness for jitter.
#[derive(Clone, Default)]
pub(crate) enum JitterRng {
    /// The lazily-initialized thread-local generator from [`rand::rng`].
    #[default]
    ThreadLocal,
    /// A generator shared by every clone of the middleware. Lets tests pin the jitter.
    Shared(Arc<Mutex<Box<dyn RngCore + Send>>>),
}

impl fmt::Debug for JitterRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitterRng::ThreadLocal => f.debug_tuple("ThreadLocal").finish(),
            JitterRng::Shared(_) => f.debug_tuple("Shared").finish(),
        }
    }
}

impl JitterRng {
    pub(crate) fn shared<R>(rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        JitterRng::Shared(Arc::new(Mutex::new(Box::new(rng))))
    }

    /// A multiplier uniformly distributed in `[0.8, 1.3)`.
    pub(crate) fn factor(&self) -> f64 {
        let unit: f64 = match self {
            JitterRng::ThreadLocal => rand::rng().random(),
            JitterRng::Shared(rng) => {
                let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
                rng.random()
            }
        };
        // `unit` can be 1 - 2^-53, for which the sum rounds up to 1.3 itself.
        (0.8 + unit / 2.0).min(max_factor())
    }
}

/// The largest `f64` below 1.3.
fn max_factor() -> f64 {
    f64::from_bits(1.3f64.to_bits() - 1)
}

/// Delay before the `primary_try`-th attempt against the primary (1-based), before jitter.
///
/// The first primary attempt never waits.
pub(crate) fn primary_delay(policy: RetryPolicyKind, base: Duration, primary_try: u32) -> Duration {
    match policy {
        RetryPolicyKind::Exponential => {
            let multiplier = 1u32
                .checked_shl(primary_try.saturating_sub(1))
                .map_or(u32::MAX, |pow| pow - 1);
            base.saturating_mul(multiplier)
        }
        RetryPolicyKind::Fixed if primary_try > 1 => base,
        RetryPolicyKind::Fixed => Duration::ZERO,
    }
}

/// Scales `delay` by the jitter `factor`, then caps it at `max`.
///
/// Truncates to whole nanoseconds so a factor just below 1.3 never rounds up to it.
pub(crate) fn jittered(delay: Duration, factor: f64, max: Duration) -> Duration {
    let secs = delay.as_secs_f64() * factor;
    if secs >= max.as_secs_f64() {
        max
    } else {
        Duration::new(secs.trunc() as u64, (secs.fract() * 1e9) as u32)
    }
}
