use tracing::{info, warn};

use crate::affine::AffineEstimator;
use crate::config::Config;
use crate::detector::FeatureDetector;
use crate::extractor::KeypointExtractor;
use crate::feature::FeatureSet;
use crate::frame::Frame;
use crate::math::decompose;
use crate::matcher::DescriptorMatcher;
use crate::motion_filter::Motion;
use crate::my_types::*;
use crate::stationary::StaticSceneWindow;
use crate::Result;

/// Reasons a frame's motion could not be estimated. These are expected
/// conditions, the stabilizer falls back to its previous output.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum EstimationFailure {
    #[error("Descriptor(s) missing")]
    NoDescriptors,

    #[error("Too few matches ({found} < {required})")]
    InsufficientMatches { found: usize, required: usize },

    #[error("Estimated transform is not valid")]
    DegenerateOrInvalidFit,

    #[error("Too few inliers ({found} < {required})")]
    InsufficientInliers { found: usize, required: usize },

    #[error("Abnormal motion {0:?}")]
    ImplausibleMotion(Motion),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionEstimate {
    /// Motion from the previous to the current frame, in full resolution pixels
    Moving(Motion),
    /// Static scene, the frame is treated as not moving
    Static,
    Failed(EstimationFailure),
}

impl MotionEstimate {
    /// Motion to fold into the trajectory, None on failure
    pub fn motion(&self) -> Option<Motion> {
        match self {
            MotionEstimate::Moving(motion) => Some(*motion),
            MotionEstimate::Static => Some(Motion::ZERO),
            MotionEstimate::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, MotionEstimate::Failed(_))
    }
}

/// Frame to frame rigid motion from matched keypoints, with static scene suppression.
pub struct MotionEstimator {
    extractor: KeypointExtractor,
    matcher: Box<dyn DescriptorMatcher>,
    fitter: Box<dyn AffineEstimator>,

    prev: FeatureSet,
    window: StaticSceneWindow,
    was_static: bool,

    static_scene_threshold: f64,
    min_match_count: usize,
    min_inlier_count: usize,
    max_raw_translation: f64,
    /// radians
    max_raw_rotation: f64,

    frame_count: usize,
    replacement_count: usize,
}

impl MotionEstimator {
    pub fn new(
        config: &Config,
        detector: Box<dyn FeatureDetector>,
        matcher: Box<dyn DescriptorMatcher>,
        fitter: Box<dyn AffineEstimator>,
        first_frame: &Frame,
    ) -> Result<Self> {
        let mut extractor =
            KeypointExtractor::new(detector, config.resize_ratio, config.max_feature_count);
        let prev = extractor.extract(first_frame)?;
        Ok(Self {
            extractor,
            matcher,
            fitter,
            prev,
            window: StaticSceneWindow::new(config.static_window_size),
            was_static: false,
            static_scene_threshold: config.static_scene_threshold,
            min_match_count: config.min_match_count,
            min_inlier_count: config.min_inlier_count,
            max_raw_translation: config.max_raw_translation,
            max_raw_rotation: config.max_raw_rotation_radians(),
            frame_count: 0,
            replacement_count: 0,
        })
    }

    /// Estimate the motion between the previous frame and `frame`.
    ///
    /// Only an unusable frame is an error, estimation problems are reported
    /// through [`MotionEstimate::Failed`]. The current frame always becomes the
    /// previous one.
    pub fn estimate(&mut self, frame: &Frame) -> Result<MotionEstimate> {
        let curr = self.extractor.extract(frame)?;
        self.frame_count += 1;

        let diff = self
            .prev
            .image
            .mean_abs_diff(&curr.image)
            .unwrap_or(f64::INFINITY);
        self.window.push(diff);

        let estimate = match self.compare(&curr) {
            Ok(motion) => self.classify(motion),
            Err(failure) => MotionEstimate::Failed(failure),
        };
        if let MotionEstimate::Failed(failure) = estimate {
            warn!(frame = self.frame_count, "{}", failure);
        }

        self.prev = curr;
        self.replacement_count += 1;
        Ok(estimate)
    }

    fn compare(&mut self, curr: &FeatureSet) -> std::result::Result<Motion, EstimationFailure> {
        if !self.prev.has_descriptors() || !curr.has_descriptors() {
            return Err(EstimationFailure::NoDescriptors);
        }

        let matches = self
            .matcher
            .match_descriptors(&self.prev.descriptors, &curr.descriptors);
        let (from, to): (Vec<Point2d>, Vec<Point2d>) = matches
            .iter()
            .filter_map(|m| {
                let p = self.prev.keypoints.get(m.query_idx)?;
                let q = curr.keypoints.get(m.train_idx)?;
                Some((p.point, q.point))
            })
            .unzip();
        if from.len() < self.min_match_count {
            return Err(EstimationFailure::InsufficientMatches {
                found: from.len(),
                required: self.min_match_count,
            });
        }

        let fit = self.fitter.fit(&from, &to);
        let transform = match fit.transform {
            Some(t) if t.iter().all(|v| v.is_finite()) => t,
            _ => return Err(EstimationFailure::DegenerateOrInvalidFit),
        };
        let inliers = fit.inlier_count();
        if inliers < self.min_inlier_count {
            return Err(EstimationFailure::InsufficientInliers {
                found: inliers,
                required: self.min_inlier_count,
            });
        }

        let (dx, dy, dr) = decompose(&transform);
        // back to full resolution
        Ok(Motion::new(dx / curr.scale, dy / curr.scale, dr))
    }

    fn classify(&mut self, motion: Motion) -> MotionEstimate {
        if self.window.is_static(self.static_scene_threshold) {
            if !self.was_static {
                info!(frame = self.frame_count, "Static scene detected.");
                self.was_static = true;
            }
            return MotionEstimate::Static;
        }
        if self.was_static {
            info!(frame = self.frame_count, "Dynamic scene detected.");
            self.was_static = false;
        }

        let translation = motion.dx.hypot(motion.dy);
        if (self.max_raw_translation > 0. && translation > self.max_raw_translation)
            || (self.max_raw_rotation > 0. && motion.dr.abs() > self.max_raw_rotation)
        {
            return MotionEstimate::Failed(EstimationFailure::ImplausibleMotion(motion));
        }
        MotionEstimate::Moving(motion)
    }

    pub fn previous_features(&self) -> &FeatureSet {
        &self.prev
    }

    pub fn is_static(&self) -> bool {
        self.was_static
    }

    /// Frames passed to [`estimate`](Self::estimate)
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// How many times the previous feature set was replaced
    pub fn replacement_count(&self) -> usize {
        self.replacement_count
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use assert_approx_eq::assert_approx_eq;

    use super::*;
    use crate::affine::{AffineFit, RansacSimilarity};
    use crate::detector::FastBriefDetector;
    use crate::feature::{Descriptors, Keypoint};
    use crate::image::testing::{random_rectangles, window};
    use crate::image::Image;
    use crate::math::rigid_transform;
    use crate::matcher::BruteForceMatcher;

    /// Replays prepared detections, then reports nothing
    pub(crate) struct ScriptedDetector {
        pub outputs: VecDeque<(Vec<Keypoint>, Descriptors)>,
    }

    impl FeatureDetector for ScriptedDetector {
        fn detect(&mut self, _: &Image, _: usize) -> Result<(Vec<Keypoint>, Descriptors)> {
            Ok(self.outputs.pop_front().unwrap_or_default())
        }
    }

    /// `count` distinct descriptors on a grid, every point moved by (dx, dy)
    pub(crate) fn grid_detection(count: usize, dx: f64, dy: f64) -> (Vec<Keypoint>, Descriptors) {
        let keypoints = (0..count)
            .map(|i| Keypoint::new((i % 5) as f64 * 6. + 3. + dx, (i / 5) as f64 * 6. + 3. + dy))
            .collect();
        let data = (0..count).flat_map(|i| [i as u8, (i * 37) as u8]).collect();
        (keypoints, Descriptors::Binary { row_len: 2, data })
    }

    pub(crate) fn scripted_estimator(
        config: &Config,
        outputs: Vec<(Vec<Keypoint>, Descriptors)>,
        first_frame: &Frame,
    ) -> MotionEstimator {
        MotionEstimator::new(
            config,
            Box::new(ScriptedDetector {
                outputs: outputs.into(),
            }),
            Box::new(BruteForceMatcher::default()),
            Box::new(RansacSimilarity::new(config.ransac_threshold, 200, 0)),
            first_frame,
        )
        .unwrap()
    }

    /// Always answers with the same fit
    struct FixedFit(Option<Matrix23d>, usize);

    impl AffineEstimator for FixedFit {
        fn fit(&mut self, from: &[Point2d], _: &[Point2d]) -> AffineFit {
            AffineFit {
                transform: self.0,
                inliers: (0..from.len()).map(|i| i < self.1).collect(),
            }
        }
    }

    fn estimate_with_fit(fit: FixedFit) -> MotionEstimate {
        let config = Config::default();
        let outputs = vec![grid_detection(20, 0., 0.), grid_detection(20, 1., 0.)];
        let mut estimator = MotionEstimator::new(
            &config,
            Box::new(ScriptedDetector {
                outputs: outputs.into(),
            }),
            Box::new(BruteForceMatcher::default()),
            Box::new(fit),
            &blank(),
        )
        .unwrap();
        let estimate = estimator.estimate(&blank()).unwrap();

        // the current set replaces the previous one whatever the outcome
        assert_eq!(estimator.replacement_count(), 1);
        assert_eq!(estimator.previous_features().keypoints, grid_detection(20, 1., 0.).0);
        assert_eq!(estimate.motion(), None);
        assert!(!estimate.is_success());
        estimate
    }

    #[test]
    fn test_fit_without_transform() {
        let estimate = estimate_with_fit(FixedFit(None, 20));
        assert_eq!(estimate, MotionEstimate::Failed(EstimationFailure::DegenerateOrInvalidFit));
    }

    #[test]
    fn test_non_finite_transform() {
        let mut transform = rigid_transform(1., 0., 0.);
        transform[(0, 2)] = f64::NAN;
        let estimate = estimate_with_fit(FixedFit(Some(transform), 20));
        assert_eq!(estimate, MotionEstimate::Failed(EstimationFailure::DegenerateOrInvalidFit));

        transform[(0, 2)] = f64::INFINITY;
        let estimate = estimate_with_fit(FixedFit(Some(transform), 20));
        assert_eq!(estimate, MotionEstimate::Failed(EstimationFailure::DegenerateOrInvalidFit));
    }

    #[test]
    fn test_insufficient_inliers() {
        let transform = rigid_transform(1., 0., 0.);
        let estimate = estimate_with_fit(FixedFit(Some(transform), 5));
        assert_eq!(
            estimate,
            MotionEstimate::Failed(EstimationFailure::InsufficientInliers {
                found: 5,
                required: 10
            })
        );
    }

    fn blank() -> Frame {
        Frame::zeros(64, 48, 1).unwrap()
    }

    #[test]
    fn test_pure_translation() {
        let config = Config::default();
        let outputs = vec![grid_detection(20, 0., 0.), grid_detection(20, 2.5, 0.)];
        let mut estimator = scripted_estimator(&config, outputs, &blank());

        let estimate = estimator.estimate(&blank()).unwrap();
        let MotionEstimate::Moving(motion) = estimate else {
            panic!("unexpected {estimate:?}");
        };
        // ratio 0.5 doubles the downscaled shift
        assert_approx_eq!(motion.dx, 5., 0.5);
        assert_approx_eq!(motion.dy, 0., 0.5);
        assert_approx_eq!(motion.dr, 0., 1e-6);
    }

    #[test]
    fn test_no_descriptors_replaces_previous() {
        let config = Config::default();
        let outputs = vec![
            grid_detection(20, 0., 0.),
            Default::default(),
            grid_detection(20, 0., 0.),
        ];
        let mut estimator = scripted_estimator(&config, outputs, &blank());

        let estimate = estimator.estimate(&blank()).unwrap();
        assert_eq!(estimate, MotionEstimate::Failed(EstimationFailure::NoDescriptors));
        assert!(!estimator.previous_features().has_descriptors());

        // the empty set is now the previous one
        let estimate = estimator.estimate(&blank()).unwrap();
        assert_eq!(estimate, MotionEstimate::Failed(EstimationFailure::NoDescriptors));
        assert!(estimator.previous_features().has_descriptors());
        assert_eq!(estimator.replacement_count(), 2);
        assert_eq!(estimate.motion(), None);
    }

    #[test]
    fn test_insufficient_matches() {
        let config = Config::default();
        let outputs = vec![grid_detection(6, 0., 0.), grid_detection(6, 1., 0.)];
        let mut estimator = scripted_estimator(&config, outputs, &blank());
        assert_eq!(
            estimator.estimate(&blank()).unwrap(),
            MotionEstimate::Failed(EstimationFailure::InsufficientMatches {
                found: 6,
                required: 10
            })
        );
    }

    #[test]
    fn test_implausible_motion() {
        let config = Config {
            max_raw_translation: 30.,
            ..Default::default()
        };
        let outputs = vec![grid_detection(20, 0., 0.), grid_detection(20, 20., 0.)];
        let mut estimator = scripted_estimator(&config, outputs, &blank());
        let estimate = estimator.estimate(&blank()).unwrap();
        let MotionEstimate::Failed(EstimationFailure::ImplausibleMotion(motion)) = estimate else {
            panic!("unexpected {estimate:?}");
        };
        assert_approx_eq!(motion.dx, 40., 1e-6);
    }

    #[test]
    fn test_static_scene_after_window_fills() {
        let config = Config::default();
        let outputs = (0..13).map(|_| grid_detection(20, 0., 0.)).collect();
        let mut estimator = scripted_estimator(&config, outputs, &blank());

        for _ in 0..9 {
            let estimate = estimator.estimate(&blank()).unwrap();
            let MotionEstimate::Moving(motion) = estimate else {
                panic!("unexpected {estimate:?}");
            };
            assert_approx_eq!(motion.dx, 0., 1e-9);
            assert!(!estimator.is_static());
        }
        for _ in 0..2 {
            let estimate = estimator.estimate(&blank()).unwrap();
            assert_eq!(estimate, MotionEstimate::Static);
            assert_eq!(estimate.motion(), Some(Motion::ZERO));
            assert!(estimator.is_static());
        }

        // a very different frame pushes the window mean over the threshold
        let bright = Frame::from_gray(&Image::filled(64, 48, 255));
        assert!(matches!(
            estimator.estimate(&bright).unwrap(),
            MotionEstimate::Moving(_)
        ));
        assert!(!estimator.is_static());
        assert_eq!(estimator.frame_count(), 12);
    }

    #[test]
    fn test_textured_shift() {
        let config = Config::default();
        let scene = random_rectangles(340, 240, 60, 3);
        let first = Frame::from_gray(&window(&scene, 10, 0, 320, 240));
        // content moves 6 pixels to the right
        let second = Frame::from_gray(&window(&scene, 4, 0, 320, 240));

        let mut estimator = MotionEstimator::new(
            &config,
            Box::new(FastBriefDetector::new(config.fast_threshold, config.seed)),
            Box::new(BruteForceMatcher::default()),
            Box::new(RansacSimilarity::new(
                config.ransac_threshold,
                config.ransac_iterations,
                config.seed,
            )),
            &first,
        )
        .unwrap();

        let estimate = estimator.estimate(&second).unwrap();
        let MotionEstimate::Moving(motion) = estimate else {
            panic!("unexpected {estimate:?}");
        };
        assert_approx_eq!(motion.dx, 6., 0.5);
        assert_approx_eq!(motion.dy, 0., 0.5);
        assert_approx_eq!(motion.dr, 0., 0.01);
    }
}
