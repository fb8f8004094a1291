//! Kalman filtering for smooth subject position tracking
//!
//! A 2D constant-velocity filter with a variable time step. Observations
//! arrive at irregular intervals (GPS at ~1 Hz, vision at frame rate with
//! dropouts), so every predict step takes the elapsed time explicitly.

use crate::PredictorConfig;
use tracing::trace;

/// State vector size: [x, y, vx, vy]
const STATE_SIZE: usize = 4;

type Matrix = [[f64; STATE_SIZE]; STATE_SIZE];

/// Kalman filter for 2D position tracking with velocity estimation
#[derive(Debug, Clone)]
pub struct KalmanTracker {
    /// State vector [x, y, vx, vy]
    state: [f64; STATE_SIZE],
    /// Error covariance matrix
    covariance: Matrix,
    /// Process noise spectral density
    process_noise: f64,
    /// Default measurement variance
    measurement_noise: f64,
    /// Velocity variance on (re)initialization
    initial_velocity_variance: f64,
    /// Whether the filter has been initialized
    initialized: bool,
    /// Number of updates
    update_count: u64,
}

impl KalmanTracker {
    /// Create a new Kalman tracker
    pub fn new(process_noise: f64, measurement_noise: f64, initial_velocity_variance: f64) -> Self {
        Self {
            state: [0.0; STATE_SIZE],
            covariance: [[0.0; STATE_SIZE]; STATE_SIZE],
            process_noise,
            measurement_noise,
            initial_velocity_variance,
            initialized: false,
            update_count: 0,
        }
    }

    pub fn from_config(config: &PredictorConfig) -> Self {
        Self::new(
            config.process_noise,
            config.measurement_noise,
            config.initial_velocity_variance,
        )
    }

    /// Initialize with a measurement
    ///
    /// Position is taken as measured. Velocity is zero unless a hint is
    /// supplied, in which case the hint is trusted to the measurement
    /// variance.
    pub fn initialize(&mut self, x: f64, y: f64, velocity: Option<(f64, f64)>, variance: f64) {
        let (vx, vy, velocity_variance) = match velocity {
            Some((vx, vy)) => (vx, vy, variance),
            None => (0.0, 0.0, self.initial_velocity_variance),
        };

        self.state = [x, y, vx, vy];
        self.covariance = [
            [variance, 0.0, 0.0, 0.0],
            [0.0, variance, 0.0, 0.0],
            [0.0, 0.0, velocity_variance, 0.0],
            [0.0, 0.0, 0.0, velocity_variance],
        ];
        self.initialized = true;
        self.update_count = 1;
        trace!("Kalman filter initialized at ({:.2}, {:.2}) v=({:.2}, {:.2})", x, y, vx, vy);
    }

    /// Advance the state by `dt` seconds
    pub fn predict(&mut self, dt: f64) -> (f64, f64) {
        if !self.initialized || dt <= 0.0 {
            return self.position();
        }

        // State transition: x' = x + vx*dt, y' = y + vy*dt
        self.state[0] += self.state[2] * dt;
        self.state[1] += self.state[3] * dt;

        // Covariance: P = F*P*F' + Q
        let f = Self::transition_matrix(dt);
        let q = self.process_noise_matrix(dt);
        let fp = mat_mul(&f, &self.covariance);
        let fpft = mat_mul_transpose(&fp, &f);

        for i in 0..STATE_SIZE {
            for j in 0..STATE_SIZE {
                self.covariance[i][j] = fpft[i][j] + q[i][j];
            }
        }

        trace!("Predicted position: ({:.2}, {:.2}) after {:.3}s", self.state[0], self.state[1], dt);
        self.position()
    }

    /// Update with a new measurement taken `dt` seconds after the last one,
    /// using the configured measurement variance
    pub fn update(&mut self, measured_x: f64, measured_y: f64, dt: f64) -> (f64, f64) {
        self.update_with_noise(measured_x, measured_y, dt, self.measurement_noise)
    }

    /// Update with a per-sample measurement variance
    pub fn update_with_noise(
        &mut self,
        measured_x: f64,
        measured_y: f64,
        dt: f64,
        variance: f64,
    ) -> (f64, f64) {
        if !self.initialized {
            self.initialize(measured_x, measured_y, None, variance);
            return (measured_x, measured_y);
        }

        self.predict(dt);

        // Measurement residual: y = z - H*x
        let residual_x = measured_x - self.state[0];
        let residual_y = measured_y - self.state[1];

        // Residual covariance: S = H*P*H' + R
        let s00 = self.covariance[0][0] + variance;
        let s01 = self.covariance[0][1];
        let s10 = self.covariance[1][0];
        let s11 = self.covariance[1][1] + variance;

        let det = s00 * s11 - s01 * s10;
        if det.abs() < 1e-12 {
            // Singular innovation, fall back to the measurement
            self.state[0] = measured_x;
            self.state[1] = measured_y;
            return self.position();
        }

        let s_inv_00 = s11 / det;
        let s_inv_01 = -s01 / det;
        let s_inv_10 = -s10 / det;
        let s_inv_11 = s00 / det;

        // K = P * H' * S_inv (H is [1 0 0 0; 0 1 0 0])
        let mut k = [[0.0; 2]; STATE_SIZE];
        for (i, row) in k.iter_mut().enumerate() {
            row[0] = self.covariance[i][0] * s_inv_00 + self.covariance[i][1] * s_inv_10;
            row[1] = self.covariance[i][0] * s_inv_01 + self.covariance[i][1] * s_inv_11;
        }

        // Update state: x = x + K*y
        for (i, row) in k.iter().enumerate() {
            self.state[i] += row[0] * residual_x + row[1] * residual_y;
        }

        // Update covariance: P = (I - K*H)*P
        let i_kh = [
            [1.0 - k[0][0], -k[0][1], 0.0, 0.0],
            [-k[1][0], 1.0 - k[1][1], 0.0, 0.0],
            [-k[2][0], -k[2][1], 1.0, 0.0],
            [-k[3][0], -k[3][1], 0.0, 1.0],
        ];
        self.covariance = mat_mul(&i_kh, &self.covariance);

        self.update_count += 1;
        trace!(
            "Updated position: ({:.2}, {:.2}), velocity: ({:.2}, {:.2})",
            self.state[0], self.state[1], self.state[2], self.state[3]
        );

        self.position()
    }

    /// Position after `horizon` seconds of constant velocity, without
    /// touching the filter state
    pub fn extrapolate(&self, horizon: f64) -> (f64, f64) {
        let horizon = horizon.max(0.0);
        (
            self.state[0] + self.state[2] * horizon,
            self.state[1] + self.state[3] * horizon,
        )
    }

    /// Get current position estimate
    pub fn position(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }

    /// Get current velocity estimate
    pub fn velocity(&self) -> (f64, f64) {
        (self.state[2], self.state[3])
    }

    /// Mean position variance across both axes
    pub fn position_variance(&self) -> f64 {
        (self.covariance[0][0] + self.covariance[1][1]) / 2.0
    }

    /// Check if initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get update count
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.state = [0.0; STATE_SIZE];
        self.covariance = [[0.0; STATE_SIZE]; STATE_SIZE];
        self.initialized = false;
        self.update_count = 0;
    }

    /// State transition matrix
    fn transition_matrix(dt: f64) -> Matrix {
        [
            [1.0, 0.0, dt, 0.0],
            [0.0, 1.0, 0.0, dt],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Process noise matrix (discrete white-noise acceleration)
    fn process_noise_matrix(&self, dt: f64) -> Matrix {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt2 * dt2;
        let q = self.process_noise;

        [
            [dt4 / 4.0 * q, 0.0, dt3 / 2.0 * q, 0.0],
            [0.0, dt4 / 4.0 * q, 0.0, dt3 / 2.0 * q],
            [dt3 / 2.0 * q, 0.0, dt2 * q, 0.0],
            [0.0, dt3 / 2.0 * q, 0.0, dt2 * q],
        ]
    }
}

impl Default for KalmanTracker {
    fn default() -> Self {
        Self::from_config(&PredictorConfig::default())
    }
}

fn mat_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                out[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    out
}

/// a * b'
fn mat_mul_transpose(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [[0.0; STATE_SIZE]; STATE_SIZE];
    for i in 0..STATE_SIZE {
        for j in 0..STATE_SIZE {
            for k in 0..STATE_SIZE {
                out[i][j] += a[i][k] * b[j][k];
            }
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> KalmanTracker {
        KalmanTracker::from_config(&PredictorConfig::gps())
    }

    #[test]
    fn test_kalman_initialization() {
        let mut tracker = tracker();
        assert!(!tracker.is_initialized());

        tracker.initialize(100.0, 200.0, None, 4.0);
        assert!(tracker.is_initialized());

        let pos = tracker.position();
        assert!((pos.0 - 100.0).abs() < 0.01);
        assert!((pos.1 - 200.0).abs() < 0.01);
        assert_eq!(tracker.velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_kalman_tracking() {
        let mut tracker = tracker();

        // Subject walking east at 1.5 m/s, one fix per second
        for i in 0..10 {
            tracker.update(i as f64 * 1.5, 20.0, 1.0);
        }

        let (vx, vy) = tracker.velocity();
        assert!(vx > 1.2 && vx < 1.8, "vx = {vx}");
        assert!(vy.abs() < 0.3);
    }

    #[test]
    fn test_two_samples_establish_velocity() {
        let mut tracker = tracker();
        tracker.update(0.0, 0.0, 0.0);
        tracker.update(2.0, 0.0, 1.0);

        let (x, _) = tracker.position();
        let (px, py) = tracker.extrapolate(1.0);
        assert!((px - x - 2.0).abs() < 0.2, "moved {}", px - x);
        assert!((px - 4.0).abs() < 0.3);
        assert!(py.abs() < 1e-6);
    }

    #[test]
    fn test_extrapolate_does_not_mutate() {
        let mut tracker = tracker();
        tracker.update(0.0, 0.0, 0.0);
        tracker.update(1.0, 1.0, 1.0);

        let before = (tracker.position(), tracker.velocity());
        let _ = tracker.extrapolate(5.0);
        assert_eq!((tracker.position(), tracker.velocity()), before);
    }

    #[test]
    fn test_velocity_hint_seeds_motion() {
        let mut tracker = tracker();
        tracker.initialize(0.0, 0.0, Some((0.0, 3.0)), 4.0);

        let (px, py) = tracker.extrapolate(2.0);
        assert!(px.abs() < 1e-9);
        assert!((py - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut tracker = tracker();
        tracker.update(5.0, 5.0, 0.0);
        tracker.reset();

        assert!(!tracker.is_initialized());
        assert_eq!(tracker.update_count(), 0);
        assert_eq!(tracker.position(), (0.0, 0.0));
    }
}
