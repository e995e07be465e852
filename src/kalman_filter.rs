/// Scalar random walk Kalman filter tracking one axis of the camera trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSmoother {
    /// estimated position
    x: f64,
    /// estimate variance
    p: f64,
    /// process noise
    q: f64,
    /// measurement noise
    r: f64,
}

impl AxisSmoother {
    pub fn new(q: f64, r: f64) -> Self {
        Self { x: 0., p: 1., q, r }
    }

    /// Fold in a measurement and return the new estimate
    pub fn update(&mut self, measurement: f64) -> f64 {
        let p_pred = self.p + self.q;
        let gain = p_pred / (p_pred + self.r);
        self.x += gain * (measurement - self.x);
        self.p = (1. - gain) * p_pred;
        self.x
    }

    pub fn value(&self) -> f64 {
        self.x
    }

    pub fn variance(&self) -> f64 {
        self.p
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn test_first_update() {
        let mut smoother = AxisSmoother::new(5e-5, 3e-2);
        let x = smoother.update(10.);
        let p_pred = 1. + 5e-5;
        let gain = p_pred / (p_pred + 3e-2);
        assert_approx_eq!(x, 10. * gain);
        assert_approx_eq!(smoother.variance(), (1. - gain) * p_pred);
    }

    #[test]
    fn test_converges_to_constant() {
        for (q, r) in [(5e-5, 3e-2), (1e-4, 1.), (1., 1e-3), (1e-3, 1e-3)] {
            let mut smoother = AxisSmoother::new(q, r);
            for _ in 0..20000 {
                smoother.update(42.);
            }
            assert_approx_eq!(smoother.value(), 42., 1e-6);
        }
    }

    #[test]
    fn test_lags_behind_a_step() {
        let mut smoother = AxisSmoother::new(5e-5, 3e-2);
        for _ in 0..200 {
            smoother.update(0.);
        }
        let after_step = smoother.update(100.);
        assert!(after_step > 0. && after_step < 100.);
    }
}
