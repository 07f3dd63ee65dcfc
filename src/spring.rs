//! Closed-form damped spring integration.
//!
//! The ride spring is simulated analytically instead of by applying a force:
//! for a fixed timestep the damped harmonic oscillator has an exact solution
//! that maps `(position, velocity)` to their values one step later through a
//! constant 2x2 matrix. The matrix is computed once per tunables change
//! (see [`SpringCoefficients::compute`]) and reused every tick.
//!
//! Three regimes are handled, selected by the damping ratio `ζ`:
//! - `ζ > 1`: over-damped, two real exponential decays
//! - `ζ < 1`: under-damped, decaying oscillation
//! - `ζ = 1`: critically damped, fastest approach without overshoot

use bevy::prelude::*;

/// Tolerance used to treat a frequency as zero and a damping ratio as exactly one.
const SPRING_EPSILON: f32 = 1e-4;

/// Frequency/damping pair used to configure a spring.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct SpringSettings {
    /// Angular frequency of the spring (rad/s). Zero disables the spring.
    pub frequency: f32,
    /// Damping ratio. 1.0 = critically damped.
    pub damping: f32,
}

impl SpringSettings {
    pub const fn new(frequency: f32, damping: f32) -> Self {
        Self { frequency, damping }
    }
}

/// Precomputed motion coefficients of a damped spring for one timestep.
///
/// ```text
/// pos' = pos_pos * pos + pos_vel * vel
/// vel' = vel_pos * pos + vel_vel * vel
/// ```
/// where `pos` is measured relative to the equilibrium position.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct SpringCoefficients {
    pub pos_pos: f32,
    pub pos_vel: f32,
    pub vel_pos: f32,
    pub vel_vel: f32,
}

impl Default for SpringCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SpringCoefficients {
    /// Coefficients that leave position and velocity untouched.
    pub const IDENTITY: Self = Self {
        pos_pos: 1.0,
        pos_vel: 0.0,
        vel_pos: 0.0,
        vel_vel: 1.0,
    };

    /// Compute the coefficients for advancing a spring by `timestep` seconds.
    ///
    /// Negative frequency or damping are clamped to zero. A frequency of
    /// (almost) zero yields [`SpringCoefficients::IDENTITY`].
    pub fn compute(timestep: f32, angular_frequency: f32, damping_ratio: f32) -> Self {
        let damping_ratio = damping_ratio.max(0.0);
        let angular_frequency = angular_frequency.max(0.0);

        if angular_frequency < SPRING_EPSILON {
            return Self::IDENTITY;
        }

        if damping_ratio > 1.0 + SPRING_EPSILON {
            Self::over_damped(timestep, angular_frequency, damping_ratio)
        } else if damping_ratio < 1.0 - SPRING_EPSILON {
            Self::under_damped(timestep, angular_frequency, damping_ratio)
        } else {
            Self::critically_damped(timestep, angular_frequency)
        }
    }

    /// Compute coefficients from a [`SpringSettings`] pair.
    pub fn from_settings(timestep: f32, settings: SpringSettings) -> Self {
        Self::compute(timestep, settings.frequency, settings.damping)
    }

    fn over_damped(dt: f32, omega: f32, zeta: f32) -> Self {
        let za = -omega * zeta;
        let zb = omega * (zeta * zeta - 1.0).sqrt();
        let z1 = za - zb;
        let z2 = za + zb;

        let e1 = (z1 * dt).exp();
        let e2 = (z2 * dt).exp();

        // 1 / (z2 - z1)
        let inv_two_zb = 1.0 / (2.0 * zb);

        let e1_over_two_zb = e1 * inv_two_zb;
        let e2_over_two_zb = e2 * inv_two_zb;

        let z1_e1_over_two_zb = z1 * e1_over_two_zb;
        let z2_e2_over_two_zb = z2 * e2_over_two_zb;

        Self {
            pos_pos: e1_over_two_zb * z2 - z2_e2_over_two_zb + e2,
            pos_vel: -e1_over_two_zb + e2_over_two_zb,
            vel_pos: (z1_e1_over_two_zb - z2_e2_over_two_zb + e2) * z2,
            vel_vel: -z1_e1_over_two_zb + z2_e2_over_two_zb,
        }
    }

    fn under_damped(dt: f32, omega: f32, zeta: f32) -> Self {
        let omega_zeta = omega * zeta;
        let alpha = omega * (1.0 - zeta * zeta).sqrt();

        let exp_term = (-omega_zeta * dt).exp();
        let (sin_term, cos_term) = (alpha * dt).sin_cos();

        let inv_alpha = 1.0 / alpha;

        let exp_sin = exp_term * sin_term;
        let exp_cos = exp_term * cos_term;
        let exp_omega_zeta_sin_over_alpha = exp_term * omega_zeta * sin_term * inv_alpha;

        Self {
            pos_pos: exp_cos + exp_omega_zeta_sin_over_alpha,
            pos_vel: exp_sin * inv_alpha,
            vel_pos: -exp_sin * alpha - omega_zeta * exp_omega_zeta_sin_over_alpha,
            vel_vel: exp_cos - exp_omega_zeta_sin_over_alpha,
        }
    }

    fn critically_damped(dt: f32, omega: f32) -> Self {
        let exp_term = (-omega * dt).exp();
        let time_exp = dt * exp_term;
        let time_exp_freq = time_exp * omega;

        Self {
            pos_pos: time_exp_freq + exp_term,
            pos_vel: time_exp,
            vel_pos: -omega * time_exp_freq,
            vel_vel: -time_exp_freq + exp_term,
        }
    }

    /// Whether these coefficients leave the motion untouched.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Advance `(position, velocity)` one step toward `target`.
    ///
    /// Returns the new `(position, velocity)`.
    #[inline]
    pub fn advance(&self, position: f32, velocity: f32, target: f32) -> (f32, f32) {
        let offset = position - target;
        (
            offset * self.pos_pos + velocity * self.pos_vel + target,
            offset * self.vel_pos + velocity * self.vel_vel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f32 = 0.02;

    fn simulate(zeta: f32, ticks: usize) -> Vec<f32> {
        let coefficients = SpringCoefficients::compute(DT, 10.0, zeta);
        let (mut position, mut velocity) = (0.0, 0.0);
        let mut samples = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            (position, velocity) = coefficients.advance(position, velocity, 1.0);
            samples.push(position);
        }
        samples
    }

    #[test]
    fn zero_frequency_is_identity() {
        for (dt, zeta) in [(0.02, 0.0), (0.016, 1.0), (1.0, 5.0), (0.0, 0.5)] {
            let coefficients = SpringCoefficients::compute(dt, 0.0, zeta);
            assert_eq!(coefficients, SpringCoefficients::IDENTITY);
            assert!(coefficients.is_identity());
        }
    }

    #[test]
    fn negative_frequency_is_clamped_to_identity() {
        let coefficients = SpringCoefficients::compute(DT, -3.0, 1.0);
        assert!(coefficients.is_identity());
    }

    #[test]
    fn identity_advance_keeps_state() {
        let (position, velocity) = SpringCoefficients::IDENTITY.advance(2.5, -1.0, 10.0);
        assert_eq!(position, 2.5);
        assert_eq!(velocity, -1.0);
    }

    #[test]
    fn critically_damped_converges_monotonically() {
        let samples = simulate(1.0, 300);
        for pair in samples.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "overshoot reversal: {pair:?}");
            assert!(pair[1] <= 1.0 + 1e-4);
        }
        assert_abs_diff_eq!(*samples.last().unwrap(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn over_damped_converges_monotonically() {
        let samples = simulate(2.0, 600);
        for pair in samples.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6);
            assert!(pair[1] <= 1.0 + 1e-4);
        }
        assert_abs_diff_eq!(*samples.last().unwrap(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn under_damped_overshoots_and_decays() {
        let samples = simulate(0.5, 600);

        let peak = samples.iter().cloned().fold(f32::MIN, f32::max);
        assert!(peak > 1.0, "under-damped spring should overshoot");
        // Overshoot for ζ = 0.5 is exp(-πζ/√(1-ζ²)) ≈ 16%.
        assert!(peak < 1.2);

        let early_error = samples[..100]
            .iter()
            .map(|p| (p - 1.0).abs())
            .fold(0.0, f32::max);
        let late_error = samples[300..]
            .iter()
            .map(|p| (p - 1.0).abs())
            .fold(0.0, f32::max);
        assert!(late_error < early_error * 0.01);
        assert_abs_diff_eq!(*samples.last().unwrap(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn regimes_agree_near_critical_damping() {
        let below = SpringCoefficients::compute(DT, 10.0, 1.0 - 1e-3);
        let at = SpringCoefficients::compute(DT, 10.0, 1.0);
        let above = SpringCoefficients::compute(DT, 10.0, 1.0 + 1e-3);

        for other in [below, above] {
            assert_abs_diff_eq!(other.pos_pos, at.pos_pos, epsilon = 1e-3);
            assert_abs_diff_eq!(other.pos_vel, at.pos_vel, epsilon = 1e-3);
            assert_abs_diff_eq!(other.vel_pos, at.vel_pos, epsilon = 1e-1);
            assert_abs_diff_eq!(other.vel_vel, at.vel_vel, epsilon = 1e-2);
        }
    }

    #[test]
    fn at_equilibrium_and_rest_stays_put() {
        let coefficients = SpringCoefficients::compute(DT, 10.0, 1.0);
        let (position, velocity) = coefficients.advance(4.0, 0.0, 4.0);
        assert_abs_diff_eq!(position, 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(velocity, 0.0, epsilon = 1e-6);
    }
}
