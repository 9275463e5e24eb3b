//! Forward-velocity laws for the cruise phase.
//!
//! Both laws take the window-averaged obstacle probability `p` in [0, 1].
//! The law is fixed when the loop is built; it never changes mid-flight.

use anyhow::{anyhow, Result};
use std::str::FromStr;

pub const DEFAULT_THRESHOLD: f64 = 0.85;
pub const DEFAULT_CRUISE_VELOCITY: f64 = 0.35;
pub const DEFAULT_ALPHA: f64 = 0.85;
pub const DEFAULT_V_MAX: f64 = 0.40;

/// How the smoothed probability becomes a forward-velocity command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VelocityPolicy {
    /// Fly at `cruise_velocity` unless `p > threshold`, then hover in place.
    Threshold {
        threshold: f64,
        cruise_velocity: f64,
    },
    /// First-order low-pass toward `(1 - p) * v_max`.
    LowPass { alpha: f64, v_max: f64 },
}

/// Output of one policy step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityCommand {
    pub forward: f64,
    /// Whether this step counts toward the cruise distance.
    pub advances: bool,
}

impl VelocityPolicy {
    pub fn threshold() -> Self {
        Self::Threshold {
            threshold: DEFAULT_THRESHOLD,
            cruise_velocity: DEFAULT_CRUISE_VELOCITY,
        }
    }

    pub fn low_pass() -> Self {
        Self::LowPass {
            alpha: DEFAULT_ALPHA,
            v_max: DEFAULT_V_MAX,
        }
    }

    /// Next command given `p` and the previously commanded forward velocity.
    ///
    /// The threshold law ignores `previous`. Hover steps under it do not
    /// advance, so the vehicle may loiter for as long as the obstacle stays.
    pub fn next(&self, p: f64, previous: f64) -> VelocityCommand {
        match *self {
            Self::Threshold {
                threshold,
                cruise_velocity,
            } => match threshold_velocity(p, threshold, cruise_velocity) {
                Some(forward) => VelocityCommand {
                    forward,
                    advances: true,
                },
                None => VelocityCommand {
                    forward: 0.0,
                    advances: false,
                },
            },
            Self::LowPass { alpha, v_max } => VelocityCommand {
                forward: low_pass_velocity(previous, p, alpha, v_max),
                advances: true,
            },
        }
    }

    /// Largest forward velocity this policy can command.
    pub fn max_velocity(&self) -> f64 {
        match *self {
            Self::Threshold {
                cruise_velocity, ..
            } => cruise_velocity,
            Self::LowPass { v_max, .. } => v_max,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Threshold {
                threshold,
                cruise_velocity,
            } => {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(anyhow!("threshold must be within [0, 1], got {}", threshold));
                }
                if !(cruise_velocity.is_finite() && cruise_velocity >= 0.0) {
                    return Err(anyhow!(
                        "cruise velocity must be non-negative, got {}",
                        cruise_velocity
                    ));
                }
            }
            Self::LowPass { alpha, v_max } => {
                if !(alpha > 0.0 && alpha <= 1.0) {
                    return Err(anyhow!("alpha must be within (0, 1], got {}", alpha));
                }
                if !(v_max.is_finite() && v_max >= 0.0) {
                    return Err(anyhow!("v_max must be non-negative, got {}", v_max));
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::LowPass { .. } => "low_pass",
        }
    }
}

impl FromStr for VelocityPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "threshold" | "hover" | "static" => Ok(Self::threshold()),
            "low_pass" | "lowpass" | "dynamic" | "continuous" => Ok(Self::low_pass()),
            other => Err(anyhow!(
                "unknown velocity policy '{}': expected 'threshold' or 'low_pass'",
                other
            )),
        }
    }
}

impl std::fmt::Display for VelocityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `Some(cruise_velocity)` to keep flying, `None` to hover.
///
/// Strictly greater than: a probability equal to the threshold still flies.
pub fn threshold_velocity(p: f64, threshold: f64, cruise_velocity: f64) -> Option<f64> {
    if p > threshold {
        None
    } else {
        Some(cruise_velocity)
    }
}

/// `v_k = (1 - alpha) * v_{k-1} + alpha * (1 - p) * v_max`, with `p` clamped
/// to [0, 1].
pub fn low_pass_velocity(previous: f64, p: f64, alpha: f64, v_max: f64) -> f64 {
    let p = if p.is_nan() { 1.0 } else { p.clamp(0.0, 1.0) };
    (1.0 - alpha) * previous + alpha * (1.0 - p) * v_max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary_is_exclusive() {
        let policy = VelocityPolicy::threshold();

        let at = policy.next(0.85, 0.0);
        assert_eq!(at.forward, 0.35);
        assert!(at.advances);

        let above = policy.next(0.850_000_1, 0.35);
        assert_eq!(above.forward, 0.0);
        assert!(!above.advances);
    }

    #[test]
    fn threshold_ignores_previous_velocity() {
        let policy = VelocityPolicy::threshold();
        assert_eq!(policy.next(0.1, 0.0), policy.next(0.1, 0.3));
    }

    #[test]
    fn low_pass_matches_worked_example() {
        let v1 = low_pass_velocity(0.0, 0.0, 0.85, 0.40);
        assert!((v1 - 0.34).abs() < 1e-12);
        let v2 = low_pass_velocity(v1, 0.0, 0.85, 0.40);
        assert!((v2 - 0.391).abs() < 1e-12);
    }

    #[test]
    fn low_pass_rises_monotonically_to_v_max_without_overshoot() {
        let policy = VelocityPolicy::low_pass();
        let mut v = 0.0;
        for _ in 0..200 {
            let next = policy.next(0.0, v);
            assert!(next.advances);
            assert!(next.forward + 1e-12 >= v);
            assert!(next.forward <= DEFAULT_V_MAX + 1e-12);
            v = next.forward;
        }
        assert!((v - DEFAULT_V_MAX).abs() < 1e-9);
    }

    #[test]
    fn low_pass_decays_monotonically_to_zero() {
        let policy = VelocityPolicy::low_pass();
        let mut v = 0.4;
        for _ in 0..200 {
            let next = policy.next(1.0, v).forward;
            assert!(next <= v);
            assert!(next >= 0.0);
            v = next;
        }
        assert!(v < 1e-9);
    }

    #[test]
    fn low_pass_clamps_out_of_range_probability() {
        assert_eq!(
            low_pass_velocity(0.0, -0.5, 0.85, 0.40),
            low_pass_velocity(0.0, 0.0, 0.85, 0.40)
        );
        assert_eq!(low_pass_velocity(0.0, 1.7, 0.85, 0.40), 0.0);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("threshold".parse::<VelocityPolicy>().unwrap(), VelocityPolicy::threshold());
        assert_eq!("LOW_PASS".parse::<VelocityPolicy>().unwrap(), VelocityPolicy::low_pass());
        assert!("pid".parse::<VelocityPolicy>().is_err());
    }

    #[test]
    fn validate_rejects_bad_constants() {
        assert!(VelocityPolicy::LowPass { alpha: 0.0, v_max: 0.4 }.validate().is_err());
        assert!(VelocityPolicy::LowPass { alpha: 0.85, v_max: -1.0 }.validate().is_err());
        assert!(VelocityPolicy::Threshold { threshold: 1.5, cruise_velocity: 0.35 }
            .validate()
            .is_err());
        assert!(VelocityPolicy::threshold().validate().is_ok());
    }
}
