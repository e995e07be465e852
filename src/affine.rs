use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::math::transform_point;
use crate::my_types::*;

/// Result of a robust transform fit
#[derive(Debug, Clone, PartialEq)]
pub struct AffineFit {
    /// None when no valid transform was found
    pub transform: Option<Matrix23d>,
    /// one flag per input correspondence
    pub inliers: Vec<bool>,
}

impl AffineFit {
    pub fn failed(len: usize) -> Self {
        AffineFit {
            transform: None,
            inliers: vec![false; len],
        }
    }

    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| inlier).count()
    }
}

/// Robustly fits a 2x3 transform mapping `from[i]` onto `to[i]`.
pub trait AffineEstimator {
    fn fit(&mut self, from: &[Point2d], to: &[Point2d]) -> AffineFit;
}

/// RANSAC over two point samples of a similarity transform
/// (rotation, uniform scale and translation), refined by least squares on the inliers.
pub struct RansacSimilarity {
    threshold: f64,
    iterations: usize,
    rng: Xoshiro256PlusPlus,
}

impl RansacSimilarity {
    pub fn new(threshold: f64, iterations: usize, seed: u64) -> Self {
        RansacSimilarity {
            threshold,
            iterations,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    fn mark_inliers(&self, model: &Matrix23d, from: &[Point2d], to: &[Point2d]) -> Vec<bool> {
        from.iter()
            .zip(to)
            .map(|(p, q)| (transform_point(model, p) - q).norm() < self.threshold)
            .collect()
    }
}

/// Least squares similarity `x' = a x - b y + tx, y' = b x + a y + ty`
fn fit_similarity<'a>(
    pairs: impl Iterator<Item = (&'a Point2d, &'a Point2d)> + Clone,
) -> Option<Matrix23d> {
    let n = pairs.clone().count();
    if n < 2 {
        return None;
    }
    let (sum_p, sum_q) = pairs
        .clone()
        .fold((Vector2d::zeros(), Vector2d::zeros()), |(sp, sq), (p, q)| {
            (sp + p.coords, sq + q.coords)
        });
    let mean_p = sum_p / n as f64;
    let mean_q = sum_q / n as f64;

    let mut norm = 0.;
    let mut dot = 0.;
    let mut cross = 0.;
    for (p, q) in pairs {
        let dp = p.coords - mean_p;
        let dq = q.coords - mean_q;
        norm += dp.norm_squared();
        dot += dp.dot(&dq);
        cross += dp.x * dq.y - dp.y * dq.x;
    }
    if norm < 1e-12 {
        return None;
    }
    let a = dot / norm;
    let b = cross / norm;
    let tx = mean_q.x - (a * mean_p.x - b * mean_p.y);
    let ty = mean_q.y - (b * mean_p.x + a * mean_p.y);
    let model = Matrix23d::new(a, -b, tx, b, a, ty);
    if model.iter().all(|v| v.is_finite()) {
        Some(model)
    } else {
        None
    }
}

impl AffineEstimator for RansacSimilarity {
    fn fit(&mut self, from: &[Point2d], to: &[Point2d]) -> AffineFit {
        let n = from.len();
        if n < 2 || n != to.len() {
            return AffineFit::failed(n);
        }

        let mut best: Option<(Matrix23d, usize)> = None;
        for _ in 0..self.iterations {
            let sample = rand::seq::index::sample(&mut self.rng, n, 2).into_vec();
            let Some(model) = fit_similarity(sample.iter().map(|&i| (&from[i], &to[i]))) else {
                continue;
            };
            let count = self
                .mark_inliers(&model, from, to)
                .iter()
                .filter(|&&inlier| inlier)
                .count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((model, count));
                if count == n {
                    break;
                }
            }
        }

        let Some((model, count)) = best else {
            return AffineFit::failed(n);
        };
        if count < 2 {
            return AffineFit::failed(n);
        }

        let inliers = self.mark_inliers(&model, from, to);
        let refined = fit_similarity(
            from.iter()
                .zip(to)
                .zip(inliers.iter())
                .filter(|(_, &inlier)| inlier)
                .map(|(pair, _)| pair),
        );
        match refined {
            Some(refined) => {
                let refined_inliers = self.mark_inliers(&refined, from, to);
                if refined_inliers.iter().filter(|&&i| i).count() >= count {
                    AffineFit {
                        transform: Some(refined),
                        inliers: refined_inliers,
                    }
                } else {
                    AffineFit {
                        transform: Some(model),
                        inliers,
                    }
                }
            }
            None => AffineFit {
                transform: Some(model),
                inliers,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rand::Rng;

    use super::*;
    use crate::math::{decompose, rigid_transform};

    fn scene(count: usize, seed: u64) -> Vec<Point2d> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        (0..count)
            .map(|_| Point2d::new(rng.gen_range(0. ..320.), rng.gen_range(0. ..240.)))
            .collect()
    }

    #[test]
    fn test_recovers_rigid_motion_with_outliers() {
        let truth = rigid_transform(4., -2.5, 0.03);
        let from = scene(60, 1);
        let mut to: Vec<Point2d> = from.iter().map(|p| transform_point(&truth, p)).collect();
        // a fifth of the correspondences are garbage
        for (i, q) in to.iter_mut().enumerate().filter(|(i, _)| i % 5 == 0) {
            *q = Point2d::new(q.x + 40. + i as f64, q.y - 25.);
        }

        let mut estimator = RansacSimilarity::new(3., 500, 0);
        let fit = estimator.fit(&from, &to);
        let (dx, dy, dr) = decompose(&fit.transform.unwrap());
        assert_approx_eq!(dx, 4., 1e-6);
        assert_approx_eq!(dy, -2.5, 1e-6);
        assert_approx_eq!(dr, 0.03, 1e-9);
        assert_eq!(fit.inlier_count(), 48);
        for (i, inlier) in fit.inliers.iter().enumerate() {
            assert_eq!(*inlier, i % 5 != 0);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let from = scene(30, 2);
        let to = scene(30, 3);
        let a = RansacSimilarity::new(3., 50, 9).fit(&from, &to);
        let b = RansacSimilarity::new(3., 50, 9).fit(&from, &to);
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_input() {
        let mut estimator = RansacSimilarity::new(3., 100, 0);
        let fit = estimator.fit(&[Point2d::new(1., 1.)], &[Point2d::new(2., 2.)]);
        assert!(fit.transform.is_none());
        assert_eq!(fit.inliers, vec![false]);

        let same = vec![Point2d::new(5., 5.); 12];
        let fit = estimator.fit(&same, &same);
        assert!(fit.transform.is_none());
        assert_eq!(fit.inlier_count(), 0);

        assert!(estimator.fit(&same, &same[..3]).transform.is_none());
    }
}
