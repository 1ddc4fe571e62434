use std::time::Duration;

use rand::Rng;

/// Randomised pause between consecutive calls against the same upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000), Duration::from_millis(5000))
    }
}

impl DelayPolicy {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        if min_delay <= max_delay {
            Self { min_delay, max_delay }
        } else {
            Self {
                min_delay: max_delay,
                max_delay: min_delay,
            }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.max_delay.is_zero()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if min == max {
            return self.min_delay;
        }
        Duration::from_millis(rng.random_range(min..=max))
    }

    pub async fn pause(&self) {
        if self.is_zero() {
            return;
        }
        let wait = self.sample_thread_rng();
        tracing::debug!(wait_ms = wait.as_millis() as u64, "politeness delay");
        tokio::time::sleep(wait).await;
    }

    fn sample_thread_rng(&self) -> Duration {
        self.sample(&mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn samples_stay_within_bounds() {
        let policy = DelayPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = policy.sample(&mut rng);
            assert!(d >= Duration::from_millis(2000) && d <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn reversed_bounds_are_normalised() {
        let policy = DelayPolicy::new(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(policy.min_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn zero_policy_returns_immediately() {
        let started = std::time::Instant::now();
        DelayPolicy::none().pause().await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
