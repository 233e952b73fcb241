use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential reconnect schedule: `min(base * factor^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    #[serde(with = "secs_f64")]
    pub base: Duration,
    pub factor: f64,
    #[serde(with = "secs_f64")]
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 1.5,
            max_delay: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Wait before the reconnect that follows the `failures`-th consecutive
    /// failure. `failures` of 0 is treated as 1.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = (failures.max(1) - 1).min(i32::MAX as u32) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_schedule() {
        let policy = BackoffPolicy::default();
        let waits: Vec<f64> = (1..=8).map(|n| policy.delay_for(n).as_secs_f64()).collect();
        let expected = [1.0, 1.5, 2.25, 3.375, 5.0625, 7.59375, 10.0, 10.0];
        for (got, want) in waits.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "got {got} want {want}");
        }
    }

    #[test]
    fn zero_failures_behaves_like_first() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn huge_exponent_stays_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn deserializes_seconds_from_toml() {
        let policy: BackoffPolicy = toml::from_str("base = 0.5\nmax_attempts = 3").unwrap();
        assert_eq!(policy.base, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.factor, 1.5);
    }
}
