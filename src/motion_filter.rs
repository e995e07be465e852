use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::kalman_filter::AxisSmoother;
use crate::math::clamp_symmetric;

/// Planar rigid motion, pixels and radians
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub dx: f64,
    pub dy: f64,
    pub dr: f64,
}

impl Motion {
    pub const ZERO: Motion = Motion {
        dx: 0.,
        dy: 0.,
        dr: 0.,
    };

    pub fn new(dx: f64, dy: f64, dr: f64) -> Self {
        Motion { dx, dy, dr }
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dr.is_finite()
    }
}

/// Cumulative camera trajectory with one smoother per axis.
///
/// The correction is the gap between the smoothed and the raw trajectory,
/// clamped per axis.
#[derive(Debug, Clone)]
pub struct MotionFilter {
    smoothers: [AxisSmoother; 3],
    raw: Motion,
    smoothed: Motion,
    bounds: Motion,
    update_count: usize,
}

impl MotionFilter {
    /// `max_r` in radians
    pub fn new(q: f64, r: f64, max_x: f64, max_y: f64, max_r: f64) -> Self {
        MotionFilter {
            smoothers: [
                AxisSmoother::new(q, r),
                AxisSmoother::new(q, r),
                AxisSmoother::new(q, r),
            ],
            raw: Motion::ZERO,
            smoothed: Motion::ZERO,
            bounds: Motion::new(max_x, max_y, max_r),
            update_count: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.kalman_q,
            config.kalman_r,
            config.max_horizontal_shift,
            config.max_vertical_shift,
            config.max_rotation_radians(),
        )
    }

    /// Add a frame to frame motion to the raw trajectory
    pub fn cumulate(&mut self, motion: Motion) {
        self.raw.dx += motion.dx;
        self.raw.dy += motion.dy;
        self.raw.dr += motion.dr;
        self.update_count += 1;
    }

    pub fn smooth(&mut self) {
        let [x, y, r] = &mut self.smoothers;
        self.smoothed = Motion {
            dx: x.update(self.raw.dx),
            dy: y.update(self.raw.dy),
            dr: r.update(self.raw.dr),
        };
    }

    pub fn compute_correction(&self) -> Motion {
        Motion {
            dx: clamp_symmetric(self.smoothed.dx - self.raw.dx, self.bounds.dx),
            dy: clamp_symmetric(self.smoothed.dy - self.raw.dy, self.bounds.dy),
            dr: clamp_symmetric(self.smoothed.dr - self.raw.dr, self.bounds.dr),
        }
    }

    /// (raw, smoothed) cumulative trajectories
    pub fn get_raw_and_smoothed_trajectory(&self) -> (Motion, Motion) {
        (self.raw, self.smoothed)
    }

    /// Number of motions folded into the raw trajectory
    pub fn update_count(&self) -> usize {
        self.update_count
    }
}
