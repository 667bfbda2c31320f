//! Setpoint curves for move and sweep.

use crate::error::{AppResult, LabError};
use std::time::Duration;

/// Round `value` to `decimals` decimal places (half away from zero).
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Whether `a` and `b` agree when rounded to `decimals` places.
pub fn agrees(a: f64, b: f64, decimals: u32) -> bool {
    let scale = 10f64.powi(decimals as i32);
    (a * scale).round() == (b * scale).round()
}

/// Upper bound on the steps of one move (about 55 hours at 20 ms per step).
pub const MAX_MOVE_STEPS: u64 = 10_000_000;

/// `n` evenly spaced values from `start` to `stop`, both included, computed lazily.
///
/// `n == 1` yields `[start]`, `n == 0` an empty curve.
pub fn linspace_iter(start: f64, stop: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 {
        (stop - start) / (n - 1) as f64
    } else {
        0.0
    };
    (0..n).map(move |i| {
        if n > 1 && i == n - 1 {
            stop
        } else {
            start + step * i as f64
        }
    })
}

/// [`linspace_iter`] collected into a vector.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    linspace_iter(start, stop, n).collect()
}

/// Number of steps needed to ramp from `current` to `setpoint` at `rate`
/// (units per second) with one step per `step`.
///
/// Fails with [`LabError::TooManySteps`] when the ramp would exceed
/// [`MAX_MOVE_STEPS`], including when the count overflows to infinity.
pub fn step_count(current: f64, setpoint: f64, rate: f64, step: Duration) -> AppResult<usize> {
    let steps = ((setpoint - current).abs() / rate / step.as_secs_f64()).round();
    if steps.is_nan() || steps <= 0.0 {
        return Ok(0);
    }
    if !steps.is_finite() || steps > MAX_MOVE_STEPS as f64 {
        return Err(LabError::TooManySteps {
            steps,
            max: MAX_MOVE_STEPS,
        });
    }
    Ok(steps as usize)
}

/// Rounded setpoints of a move. A single step goes straight to `setpoint`.
pub fn move_curve(
    current: f64,
    setpoint: f64,
    steps: usize,
    decimals: u32,
) -> impl Iterator<Item = f64> {
    let (from, count) = if steps == 1 { (setpoint, 1) } else { (current, steps) };
    linspace_iter(from, setpoint, count).map(move |v| round_to(v, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-1.23456, 2), -1.23);
        assert_eq!(round_to(2.0, 0), 2.0);
        assert!(agrees(0.1 + 0.2, 0.3, 3));
        assert!(!agrees(0.301, 0.3, 3));
    }

    #[test]
    fn linspace_includes_endpoints() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(1.0, -1.0, 3), vec![1.0, 0.0, -1.0]);
        assert_eq!(linspace(3.0, 7.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn steps_from_rate() {
        // 1 V at 0.5 V/s in 20 ms steps: 2 s / 20 ms
        let step = Duration::from_millis(20);
        assert_eq!(step_count(0.0, 1.0, 0.5, step).unwrap(), 100);
        assert_eq!(step_count(1.0, 0.0, 0.5, step).unwrap(), 100);
        assert_eq!(step_count(0.0, 0.0, 0.5, step).unwrap(), 0);
        // less than half a step rounds to nothing
        assert_eq!(step_count(0.0, 0.004, 1.0, Duration::from_millis(10)).unwrap(), 0);
    }

    #[test]
    fn tiny_rates_exceed_the_step_limit() {
        let step = Duration::from_millis(20);
        for rate in [1e-12, 1e-17, 1e-310] {
            assert!(matches!(
                step_count(0.0, 1.0, rate, step),
                Err(LabError::TooManySteps { max: MAX_MOVE_STEPS, .. })
            ));
        }
        // exactly at the limit is still allowed
        let rate = 1.0 / (MAX_MOVE_STEPS as f64 * 0.02);
        assert_eq!(step_count(0.0, 1.0, rate, step).unwrap(), MAX_MOVE_STEPS as usize);
    }

    #[test]
    fn move_curve_is_rounded() {
        let curve: Vec<f64> = move_curve(0.0, 1.0, 4, 3).collect();
        assert_eq!(curve, vec![0.0, 0.333, 0.667, 1.0]);
        assert_eq!(move_curve(0.0, 0.12345, 1, 3).collect::<Vec<_>>(), vec![0.123]);
    }
}
